#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use rusty_wallet_core::{
    Address, Asset, BlockHandler, BlockHeader, ChainClient, ChainClientFactory, EventEmitter,
    ListenerId, NativeAsset, PortError, Provider, ProviderEvent, ProviderEventHandler,
    ProviderEventKind, ProviderHandle, ProviderResolver, ServiceContext, Subscription, Token,
    TokenRegistry, TxHash, WalletConnectionService, WalletRequests,
};

pub struct MockProvider {
    pub emits_events: bool,
    pub accepts_requests: bool,
    pub reject_requests: bool,
    pub granted: Vec<&'static str>,
    pub request_calls: AtomicUsize,
    handlers: Mutex<Vec<(ListenerId, ProviderEventKind, ProviderEventHandler)>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("emits_events", &self.emits_events)
            .field("accepts_requests", &self.accepts_requests)
            .finish_non_exhaustive()
    }
}

impl MockProvider {
    pub fn new(emits_events: bool, accepts_requests: bool) -> Self {
        Self {
            emits_events,
            accepts_requests,
            reject_requests: false,
            granted: Vec::new(),
            request_calls: AtomicUsize::new(0),
            handlers: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_requests = true;
        self
    }

    pub fn granting(mut self, accounts: Vec<&'static str>) -> Self {
        self.granted = accounts;
        self
    }

    pub fn emit(&self, kind: ProviderEventKind) {
        let handlers = self.handlers.lock().expect("handlers lock");
        for (_, registered, handler) in handlers.iter() {
            if *registered == kind {
                handler(ProviderEvent {
                    kind,
                    payload: Value::Null,
                });
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().expect("handlers lock").len()
    }
}

#[async_trait(?Send)]
impl ProviderHandle for MockProvider {
    fn label(&self) -> &str {
        "mock"
    }

    async fn send(&self, _method: &str, _params: Value) -> Result<Value, PortError> {
        Err(PortError::NotImplemented("mock.send"))
    }

    fn event_emitter(&self) -> Option<&dyn EventEmitter> {
        self.emits_events.then_some(self as &dyn EventEmitter)
    }

    fn wallet_requests(&self) -> Option<&dyn WalletRequests> {
        self.accepts_requests.then_some(self as &dyn WalletRequests)
    }
}

impl EventEmitter for MockProvider {
    fn on(
        &self,
        kind: ProviderEventKind,
        handler: ProviderEventHandler,
    ) -> Result<ListenerId, PortError> {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .lock()
            .map_err(|e| PortError::Transport(format!("handlers lock poisoned: {e}")))?
            .push((id, kind, handler));
        Ok(id)
    }

    fn off(&self, id: ListenerId) -> Result<(), PortError> {
        self.handlers
            .lock()
            .map_err(|e| PortError::Transport(format!("handlers lock poisoned: {e}")))?
            .retain(|(registered, _, _)| *registered != id);
        Ok(())
    }
}

#[async_trait(?Send)]
impl WalletRequests for MockProvider {
    async fn request(&self, method: &str, _params: Value) -> Result<Value, PortError> {
        assert_eq!(method, "eth_requestAccounts");
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_requests {
            return Err(PortError::Rejected {
                code: 4001,
                message: "User rejected the request.".to_owned(),
            });
        }
        Ok(serde_json::json!(self.granted))
    }
}

#[derive(Default)]
pub struct MockChainClient {
    pub accounts: Vec<Address>,
    pub native: U256,
    pub token_balances: HashMap<String, U256>,
    /// Number of scheduler yields before a token query completes.
    pub token_delays: HashMap<String, usize>,
    pub fail_accounts: bool,
    pub fail_subscribe: bool,
    pub accounts_gate: Option<Arc<Notify>>,
    pub journal: Mutex<Vec<String>>,
    pub transfers: Mutex<Vec<(Address, Address, U256, String)>>,
    pub block_handler: Mutex<Option<BlockHandler>>,
    pub subscriptions_opened: AtomicUsize,
    pub subscriptions_closed: Arc<AtomicUsize>,
}

impl MockChainClient {
    pub fn with_accounts(accounts: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| Address::from(*a)).collect(),
            ..Self::default()
        }
    }

    pub fn push_block(&self, header: Result<BlockHeader, PortError>) {
        let handler = self.block_handler.lock().expect("block handler lock");
        if let Some(handler) = handler.as_ref() {
            handler(header);
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().expect("journal lock").clone()
    }

    fn record(&self, entry: String) {
        self.journal.lock().expect("journal lock").push(entry);
    }
}

#[async_trait(?Send)]
impl ChainClient for MockChainClient {
    async fn get_accounts(&self) -> Result<Vec<Address>, PortError> {
        if let Some(gate) = &self.accounts_gate {
            gate.notified().await;
        }
        if self.fail_accounts {
            return Err(PortError::Transport("eth_accounts unavailable".to_owned()));
        }
        Ok(self.accounts.clone())
    }

    async fn get_native_balance(&self, address: &Address) -> Result<U256, PortError> {
        self.record(format!("start:native:{address}"));
        tokio::task::yield_now().await;
        self.record("end:native".to_owned());
        Ok(self.native)
    }

    async fn get_token_balance(&self, address: &Address, token: &Token) -> Result<U256, PortError> {
        self.record(format!("start:{}:{address}", token.symbol));
        let delay = self.token_delays.get(&token.symbol).copied().unwrap_or(1);
        for _ in 0..delay {
            tokio::task::yield_now().await;
        }
        self.record(format!("end:{}", token.symbol));
        self.token_balances
            .get(&token.symbol)
            .copied()
            .ok_or_else(|| PortError::NotFound(format!("no balance for {}", token.symbol)))
    }

    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: U256,
        asset: &Asset,
    ) -> Result<TxHash, PortError> {
        self.transfers.lock().expect("transfers lock").push((
            from.clone(),
            to.clone(),
            amount,
            asset.symbol().to_owned(),
        ));
        Ok(TxHash("0xfeed".to_owned()))
    }

    async fn subscribe_new_blocks(
        &self,
        handler: BlockHandler,
    ) -> Result<Box<dyn Subscription>, PortError> {
        if self.fail_subscribe {
            return Err(PortError::NotImplemented("newHeads"));
        }
        *self.block_handler.lock().expect("block handler lock") = Some(handler);
        self.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSubscription {
            closed: Arc::clone(&self.subscriptions_closed),
            done: AtomicBool::new(false),
        }))
    }
}

struct MockSubscription {
    closed: Arc<AtomicUsize>,
    done: AtomicBool,
}

#[async_trait(?Send)]
impl Subscription for MockSubscription {
    async fn unsubscribe(self: Box<Self>) -> Result<(), PortError> {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct MockFactory {
    pub client: Arc<MockChainClient>,
    pub binds: AtomicUsize,
}

impl ChainClientFactory for MockFactory {
    fn bind(&self, _provider: &Provider) -> Result<Arc<dyn ChainClient>, PortError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.client) as Arc<dyn ChainClient>)
    }
}

pub struct MockResolver(pub Option<Arc<MockProvider>>);

#[async_trait(?Send)]
impl ProviderResolver for MockResolver {
    async fn resolve(&self) -> Option<Provider> {
        self.0
            .as_ref()
            .map(|p| Provider::new(Arc::clone(p) as Arc<dyn ProviderHandle>))
    }
}

#[derive(Default)]
pub struct MockRegistry {
    pub tokens: Vec<Token>,
    pub fetches: AtomicUsize,
}

#[async_trait(?Send)]
impl TokenRegistry for MockRegistry {
    async fn supported_tokens(&self) -> Result<Vec<Token>, PortError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens.clone())
    }
}

pub fn token(symbol: &str, contract: &str) -> Token {
    Token {
        symbol: symbol.to_owned(),
        name: format!("{symbol} token"),
        address: Address::from(contract),
        decimals: 18,
    }
}

pub struct Harness {
    pub service: WalletConnectionService,
    pub provider: Option<Arc<MockProvider>>,
    pub client: Arc<MockChainClient>,
    pub factory: Arc<MockFactory>,
    pub registry: Arc<MockRegistry>,
}

pub async fn harness(
    provider: Option<MockProvider>,
    client: MockChainClient,
    tokens: Vec<Token>,
) -> Harness {
    let provider = provider.map(Arc::new);
    let client = Arc::new(client);
    let factory = Arc::new(MockFactory {
        client: Arc::clone(&client),
        binds: AtomicUsize::new(0),
    });
    let registry = Arc::new(MockRegistry {
        tokens,
        fetches: AtomicUsize::new(0),
    });
    let service = WalletConnectionService::create(ServiceContext {
        resolver: Arc::new(MockResolver(provider.clone())),
        registry: Arc::clone(&registry) as Arc<dyn TokenRegistry>,
        chain: Arc::clone(&factory) as Arc<dyn ChainClientFactory>,
        native_asset: NativeAsset::default(),
    })
    .await;
    Harness {
        service,
        provider,
        client,
        factory,
        registry,
    }
}
