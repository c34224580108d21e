//! Connection lifecycle and balance/transfer orchestration.
//!
//! All writes to the observable [`ConnectionState`] go through
//! [`Session::apply`] while the session lock is held. Each `connect()` call
//! captures a generation number; `disconnect()` and provider disconnect
//! events bump it, and a handshake whose generation went stale stops with
//! [`WalletError::Superseded`] without touching the newer state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::try_join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capabilities::Provider;
use crate::domain::{
    Address, Asset, Balance, BlockHeader, ConnectionState, NativeAsset, Token, TxHash, TxParams,
};
use crate::ports::{
    BlockHandler, ChainClient, ChainClientFactory, EventEmitter, PortError, ProviderEventKind,
    ProviderResolver, Subscription, TokenRegistry,
};
use crate::state::StateStore;
use crate::state_machine::{
    connection_transition, ConnectionAction, ConnectionStatus, StateTransition,
};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no wallet provider could be resolved")]
    ProviderUnavailable,
    #[error("no chain connection; call connect() first")]
    NotConnected,
    #[error("sender address cannot be determined")]
    AddressUnresolved,
    #[error("connect attempt superseded by a later state change")]
    Superseded,
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Result of [`WalletConnectionService::connect`].
#[must_use]
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected,
    Failed(WalletError),
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn error(&self) -> Option<&WalletError> {
        match self {
            Self::Connected => None,
            Self::Failed(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<(), WalletError> {
        match self {
            Self::Connected => Ok(()),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Collaborators the service is built from.
pub struct ServiceContext {
    pub resolver: Arc<dyn ProviderResolver>,
    pub registry: Arc<dyn TokenRegistry>,
    pub chain: Arc<dyn ChainClientFactory>,
    pub native_asset: NativeAsset,
}

struct Session {
    status: ConnectionStatus,
    generation: u64,
    client: Option<Arc<dyn ChainClient>>,
    supported_tokens: Vec<Token>,
    block_subscription: Option<Box<dyn Subscription>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            generation: 0,
            client: None,
            supported_tokens: Vec::new(),
            block_subscription: None,
        }
    }
}

impl Session {
    fn apply(
        &mut self,
        state: &StateStore,
        action: ConnectionAction,
    ) -> Result<StateTransition, PortError> {
        let (to, transition) = connection_transition(self.status, action)?;
        self.status = to;
        state.update(|s| {
            s.status = to;
            s.connected = to == ConnectionStatus::Connected;
        });
        debug!(
            from = ?transition.from,
            to = ?transition.to,
            reason = transition.reason,
            generation = self.generation,
            "connection transition"
        );
        Ok(transition)
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Default)]
struct Shared {
    session: Mutex<Session>,
    state: StateStore,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct WalletConnectionService {
    registry: Arc<dyn TokenRegistry>,
    chain: Arc<dyn ChainClientFactory>,
    native_asset: NativeAsset,
    provider: Option<Provider>,
    shared: Arc<Shared>,
}

impl fmt::Debug for WalletConnectionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConnectionService")
            .field("provider", &self.provider)
            .field("state", &self.shared.state.snapshot())
            .finish_non_exhaustive()
    }
}

impl WalletConnectionService {
    /// Resolves the provider and, when it emits events, installs the
    /// connect/disconnect handlers before the service is handed out.
    pub async fn create(context: ServiceContext) -> Self {
        let ServiceContext {
            resolver,
            registry,
            chain,
            native_asset,
        } = context;

        let provider = resolver.resolve().await;
        let shared = Arc::new(Shared::default());

        match &provider {
            Some(provider) => {
                info!(label = provider.label(), kind = ?provider.kind(), "wallet provider resolved");
                if let Some(emitter) = provider.event_emitter() {
                    wire_provider_events(emitter, Arc::downgrade(&shared));
                }
            }
            None => info!("no wallet provider found"),
        }

        Self {
            registry,
            chain,
            native_asset,
            provider,
            shared,
        }
    }

    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_ref()
    }

    pub fn get_state(&self) -> ConnectionState {
        self.shared.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn get_address(&self) -> Address {
        self.shared.state.snapshot().address
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.snapshot().connected
    }

    pub fn supported_tokens(&self) -> Vec<Token> {
        self.shared.lock().supported_tokens.clone()
    }

    pub async fn connect(&self) -> ConnectOutcome {
        if self.provider.is_none() {
            let err = match self.registry.supported_tokens().await {
                Ok(_) => WalletError::ProviderUnavailable,
                Err(err) => WalletError::Port(err),
            };
            warn!(error = %err, "wallet connect failed");
            return ConnectOutcome::Failed(err);
        }

        let (generation, stale) = self.begin();
        if let Some(subscription) = stale {
            release_subscription(subscription).await;
        }

        match self.handshake(generation).await {
            Ok(()) => {
                info!(address = %self.get_address(), "wallet connected");
                ConnectOutcome::Connected
            }
            Err(err) => {
                warn!(error = %err, "wallet connect failed");
                self.abort(generation);
                ConnectOutcome::Failed(err)
            }
        }
    }

    fn begin(&self) -> (u64, Option<Box<dyn Subscription>>) {
        let mut session = self.shared.lock();
        session.bump_generation();
        if let Err(err) = session.apply(&self.shared.state, ConnectionAction::Begin) {
            warn!(error = %err, "connect transition rejected");
        }
        (session.generation, session.block_subscription.take())
    }

    async fn handshake(&self, generation: u64) -> Result<(), WalletError> {
        let tokens = self.registry.supported_tokens().await?;

        let provider = self
            .provider
            .as_ref()
            .ok_or(WalletError::ProviderUnavailable)?;

        let client = self.chain.bind(provider)?;
        self.with_current(generation, |session, _| {
            session.client = Some(Arc::clone(&client));
        })?;

        let accounts = client.get_accounts().await?;
        self.with_current(generation, |_, state| {
            state.update(|s| s.set_accounts(accounts));
        })?;

        if let Some(wallet) = provider.wallet_requests() {
            let granted = wallet
                .request("eth_requestAccounts", serde_json::json!([]))
                .await?;
            if let Some(accounts) = granted_accounts(&granted) {
                self.with_current(generation, |_, state| {
                    state.update(|s| s.set_accounts(accounts));
                })?;
            }
        }

        self.with_current(generation, |session, state| {
            session.supported_tokens = tokens;
            session.apply(state, ConnectionAction::Commit)
        })??;

        self.open_block_subscription(&client, generation).await;
        Ok(())
    }

    fn with_current<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut Session, &StateStore) -> T,
    ) -> Result<T, WalletError> {
        let mut session = self.shared.lock();
        if session.generation != generation {
            return Err(WalletError::Superseded);
        }
        Ok(f(&mut session, &self.shared.state))
    }

    fn abort(&self, generation: u64) {
        let mut session = self.shared.lock();
        if session.generation != generation {
            debug!(generation, "stale connect attempt discarded");
            return;
        }
        session.client = None;
        if let Err(err) = session.apply(&self.shared.state, ConnectionAction::Fail) {
            warn!(error = %err, "failed connect left an unexpected state");
        }
    }

    async fn open_block_subscription(&self, client: &Arc<dyn ChainClient>, generation: u64) {
        let state = self.shared.state.clone();
        let handler: BlockHandler = Box::new(move |header: Result<BlockHeader, PortError>| {
            let log = match header {
                Ok(header) => header.hash.unwrap_or_else(|| "null".to_owned()),
                Err(err) => {
                    warn!(error = %err, "block subscription error");
                    "null".to_owned()
                }
            };
            state.update(|s| s.log = log);
        });

        match client.subscribe_new_blocks(handler).await {
            Ok(subscription) => {
                let stale = {
                    let mut session = self.shared.lock();
                    if session.generation == generation
                        && session.status == ConnectionStatus::Connected
                    {
                        session.block_subscription = Some(subscription);
                        None
                    } else {
                        Some(subscription)
                    }
                };
                if let Some(subscription) = stale {
                    release_subscription(subscription).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "block subscription unavailable");
                self.shared
                    .state
                    .update(|s| s.log = format!("subscription unavailable: {err}"));
            }
        }
    }

    /// Idempotent; always succeeds.
    pub async fn disconnect(&self) {
        let subscription = {
            let mut session = self.shared.lock();
            session.bump_generation();
            session.client = None;
            session.supported_tokens.clear();
            if let Err(err) = session.apply(&self.shared.state, ConnectionAction::Disconnect) {
                warn!(error = %err, "disconnect transition rejected");
            }
            session.block_subscription.take()
        };
        if let Some(subscription) = subscription {
            release_subscription(subscription).await;
        }
        info!("wallet disconnected");
    }

    /// Balances for `address` (default: the connected address).
    ///
    /// Returns an empty list when no chain client is bound or no address can
    /// be resolved. Without an asset filter the native balance comes first,
    /// followed by every supported token in registry order; all queries run
    /// concurrently.
    pub async fn get_balance(
        &self,
        address: Option<&Address>,
        asset: Option<&Asset>,
    ) -> Result<Vec<Balance>, WalletError> {
        let target = match address {
            Some(address) if !address.is_empty() => address.clone(),
            _ => self.get_address(),
        };
        let (client, tokens) = {
            let session = self.shared.lock();
            (session.client.clone(), session.supported_tokens.clone())
        };
        let Some(client) = client else {
            return Ok(Vec::new());
        };
        if target.is_empty() {
            return Ok(Vec::new());
        }

        let balances = match asset {
            Some(Asset::Native(native)) => {
                vec![native_balance(client.as_ref(), &target, native).await?]
            }
            Some(Asset::Erc20(token)) => {
                vec![token_balance(client.as_ref(), &target, token).await?]
            }
            None => {
                let native = native_balance(client.as_ref(), &target, &self.native_asset);
                let token_queries = tokens
                    .iter()
                    .map(|token| token_balance(client.as_ref(), &target, token));
                let (native, token_balances) =
                    futures::try_join!(native, try_join_all(token_queries))?;
                let mut balances = Vec::with_capacity(token_balances.len() + 1);
                balances.push(native);
                balances.extend(token_balances);
                balances
            }
        };
        Ok(balances)
    }

    /// Submits a transfer from the connected address. Amount and recipient
    /// are passed through to the chain client unchecked.
    pub async fn transfer(&self, params: &TxParams) -> Result<TxHash, WalletError> {
        let client = self
            .shared
            .lock()
            .client
            .clone()
            .ok_or(WalletError::NotConnected)?;
        let from = self.get_address();
        if from.is_empty() {
            return Err(WalletError::AddressUnresolved);
        }

        let hash = client
            .submit_transfer(&from, &params.recipient, params.amount, &params.asset)
            .await?;
        info!(%hash, asset = params.asset.symbol(), "transfer submitted");
        Ok(hash)
    }
}

fn wire_provider_events(emitter: &dyn EventEmitter, shared: Weak<Shared>) {
    let on_connect = shared.clone();
    let registered = emitter.on(
        ProviderEventKind::Connect,
        Box::new(move |_event| {
            let Some(shared) = on_connect.upgrade() else {
                return;
            };
            let mut session = shared.lock();
            if session.client.is_none() {
                debug!("provider connect event ignored: no chain client bound");
                return;
            }
            if let Err(err) = session.apply(&shared.state, ConnectionAction::ProviderConnected) {
                warn!(error = %err, "provider connect event rejected");
            }
        }),
    );
    if let Err(err) = registered {
        warn!(error = %err, "failed to register provider connect handler");
    }

    let on_disconnect = shared;
    let registered = emitter.on(
        ProviderEventKind::Disconnect,
        Box::new(move |_event| {
            let Some(shared) = on_disconnect.upgrade() else {
                return;
            };
            let mut session = shared.lock();
            session.bump_generation();
            if session.status == ConnectionStatus::Connecting {
                // the interrupted handshake never finished fetching accounts
                session.client = None;
            }
            if let Err(err) = session.apply(&shared.state, ConnectionAction::ProviderDisconnected)
            {
                warn!(error = %err, "provider disconnect event rejected");
            }
        }),
    );
    if let Err(err) = registered {
        warn!(error = %err, "failed to register provider disconnect handler");
    }
}

async fn release_subscription(subscription: Box<dyn Subscription>) {
    if let Err(err) = subscription.unsubscribe().await {
        warn!(error = %err, "block unsubscribe failed");
    }
}

fn granted_accounts(result: &Value) -> Option<Vec<Address>> {
    let accounts: Vec<Address> = result
        .as_array()?
        .iter()
        .filter_map(|item| item.as_str().map(Address::from))
        .collect();
    (!accounts.is_empty()).then_some(accounts)
}

async fn native_balance(
    client: &dyn ChainClient,
    address: &Address,
    native: &NativeAsset,
) -> Result<Balance, PortError> {
    let amount = client.get_native_balance(address).await?;
    Ok(Balance {
        asset: Asset::Native(native.clone()),
        amount,
    })
}

async fn token_balance(
    client: &dyn ChainClient,
    address: &Address,
    token: &Token,
) -> Result<Balance, PortError> {
    let amount = client.get_token_balance(address, token).await?;
    Ok(Balance {
        asset: Asset::Erc20(token.clone()),
        amount,
    })
}
