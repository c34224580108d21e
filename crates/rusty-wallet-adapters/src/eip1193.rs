use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use alloy::primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use serde_json::Value;

use rusty_wallet_core::{
    EventEmitter, ListenerId, PortError, ProviderEvent, ProviderEventHandler, ProviderEventKind,
    ProviderHandle, WalletRequests,
};

use crate::erc20;
#[cfg(not(target_arch = "wasm32"))]
use crate::WalletAdapterConfig;

/// EIP-1193 provider handle.
///
/// Browser mode wraps an injected JS object, proxy mode forwards JSON-RPC over
/// HTTP, deterministic mode answers from an in-memory wallet.
#[derive(Debug, Clone)]
pub struct Eip1193Provider {
    label: String,
    mode: ProviderMode,
    emits_events: bool,
    accepts_requests: bool,
    hooks: Arc<Mutex<EventHooks>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Deterministic(Arc<Mutex<DeterministicWallet>>),
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser(wasm_bindgen::JsValue),
}

#[derive(Debug, Clone)]
#[cfg(not(target_arch = "wasm32"))]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Default)]
struct EventHooks {
    next_id: u64,
    handlers: Vec<(ListenerId, ProviderEventKind, ProviderEventHandler)>,
    #[cfg(target_arch = "wasm32")]
    closures: Vec<(
        ListenerId,
        ProviderEventKind,
        wasm_bindgen::closure::Closure<dyn FnMut(wasm_bindgen::JsValue)>,
    )>,
}

impl EventHooks {
    fn allocate(&mut self) -> ListenerId {
        self.next_id = self.next_id.wrapping_add(1);
        ListenerId(self.next_id)
    }

    fn len(&self) -> usize {
        let count = self.handlers.len();
        #[cfg(target_arch = "wasm32")]
        let count = count + self.closures.len();
        count
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("listeners", &self.len())
            .finish_non_exhaustive()
    }
}

/// In-memory wallet backing deterministic mode.
///
/// Like an extension wallet, `eth_accounts` stays empty until
/// `eth_requestAccounts` has been approved (unless `authorized` is preset).
#[derive(Debug, Clone)]
pub struct DeterministicWallet {
    pub accounts: Vec<Address>,
    pub chain_id: u64,
    pub authorized: bool,
    pub approve_requests: bool,
    pub native_balances: HashMap<Address, U256>,
    /// Keyed by (token contract, owner).
    pub token_balances: HashMap<(Address, Address), U256>,
    pub sent_transactions: Vec<Value>,
    subscriptions: BTreeSet<String>,
    subscription_seq: u64,
}

impl Default for DeterministicWallet {
    fn default() -> Self {
        Self {
            accounts: vec![Address::with_last_byte(1)],
            chain_id: 1,
            authorized: false,
            approve_requests: true,
            native_balances: HashMap::new(),
            token_balances: HashMap::new(),
            sent_transactions: Vec::new(),
            subscriptions: BTreeSet::new(),
            subscription_seq: 0,
        }
    }
}

impl DeterministicWallet {
    fn handle(&mut self, method: &str, params: &Value) -> Result<Value, PortError> {
        match method {
            "eth_accounts" => Ok(self.visible_accounts()),
            "eth_requestAccounts" => {
                if !self.approve_requests {
                    return Err(PortError::Rejected {
                        code: 4001,
                        message: "User rejected the request.".to_owned(),
                    });
                }
                self.authorized = true;
                Ok(self.visible_accounts())
            }
            "eth_chainId" => Ok(Value::String(format!("0x{:x}", self.chain_id))),
            "eth_getBalance" => {
                let owner = param_address(params, 0)?;
                let balance = self.native_balances.get(&owner).copied().unwrap_or_default();
                Ok(Value::String(format!("0x{balance:x}")))
            }
            "eth_call" => {
                let call = params
                    .get(0)
                    .ok_or_else(|| PortError::Validation("eth_call: call object missing".to_owned()))?;
                let contract = json_address(call.get("to"), "eth_call.to")?;
                let data = json_bytes(call.get("data").or_else(|| call.get("input")))?;
                let owner = erc20::decode_balance_of_call(&data).ok_or_else(|| {
                    PortError::NotFound("deterministic eth_call only serves balanceOf".to_owned())
                })?;
                let balance = self
                    .token_balances
                    .get(&(contract, owner))
                    .copied()
                    .unwrap_or_default();
                Ok(Value::String(format!(
                    "0x{}",
                    alloy::hex::encode(balance.to_be_bytes::<32>())
                )))
            }
            "eth_sendTransaction" => {
                let tx = params.get(0).cloned().ok_or_else(|| {
                    PortError::Validation("eth_sendTransaction: tx object missing".to_owned())
                })?;
                let from = json_address(tx.get("from"), "eth_sendTransaction.from")?;
                if !self.authorized || !self.accounts.contains(&from) {
                    return Err(PortError::Rejected {
                        code: 4100,
                        message: "The requested account has not been authorized.".to_owned(),
                    });
                }
                let canonical = serde_json::to_vec(&tx).map_err(|e| {
                    PortError::Validation(format!("tx payload serialization failed: {e}"))
                })?;
                self.sent_transactions.push(tx);
                Ok(Value::String(keccak256(canonical).to_string()))
            }
            "eth_subscribe" => {
                self.subscription_seq = self.subscription_seq.saturating_add(1);
                let id = format!("0x{:x}", self.subscription_seq);
                self.subscriptions.insert(id.clone());
                Ok(Value::String(id))
            }
            "eth_unsubscribe" => {
                let id = params.get(0).and_then(Value::as_str).unwrap_or_default();
                Ok(Value::Bool(self.subscriptions.remove(id)))
            }
            other => Err(PortError::NotFound(format!(
                "method not supported by deterministic provider: {other}"
            ))),
        }
    }

    fn visible_accounts(&self) -> Value {
        if self.authorized {
            Value::Array(
                self.accounts
                    .iter()
                    .map(|a| Value::String(a.to_string()))
                    .collect(),
            )
        } else {
            Value::Array(Vec::new())
        }
    }
}

impl Eip1193Provider {
    /// In-memory provider that both emits events and accepts wallet requests.
    pub fn deterministic(wallet: DeterministicWallet) -> Self {
        Self {
            label: "deterministic".to_owned(),
            mode: ProviderMode::Deterministic(Arc::new(Mutex::new(wallet))),
            emits_events: true,
            accepts_requests: true,
            hooks: Arc::new(Mutex::new(EventHooks::default())),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn proxy(base_url: impl Into<String>, config: &WalletAdapterConfig) -> Result<Self, PortError> {
        let timeout = std::time::Duration::from_millis(config.proxy_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build eip1193 proxy client: {e}")))?;
        Ok(Self {
            label: "eip1193-proxy".to_owned(),
            mode: ProviderMode::Proxy(ProxyRuntime {
                base_url: base_url.into(),
                client,
            }),
            emits_events: false,
            accepts_requests: config.eip1193_proxy_wallet,
            hooks: Arc::new(Mutex::new(EventHooks::default())),
        })
    }

    /// Wraps an injected provider object, probing its capabilities once.
    #[cfg(target_arch = "wasm32")]
    pub fn browser(object: wasm_bindgen::JsValue, label: impl Into<String>) -> Self {
        let emits_events = is_function(&object, "on") || is_function(&object, "addListener");
        let accepts_requests = is_function(&object, "request");
        Self {
            label: label.into(),
            mode: ProviderMode::Browser(object),
            emits_events,
            accepts_requests,
            hooks: Arc::new(Mutex::new(EventHooks::default())),
        }
    }

    pub fn without_events(mut self) -> Self {
        self.emits_events = false;
        self
    }

    pub fn without_wallet_requests(mut self) -> Self {
        self.accepts_requests = false;
        self
    }

    /// Fires registered handlers as if the wallet had emitted `kind`.
    pub fn debug_emit(&self, kind: ProviderEventKind, payload: Value) -> Result<(), PortError> {
        let hooks = self.lock_hooks()?;
        for (_, registered, handler) in &hooks.handlers {
            if *registered == kind {
                handler(ProviderEvent {
                    kind,
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    /// Publishes a `newHeads` notification to every open deterministic subscription.
    pub fn debug_new_block(&self, number: u64, hash: &str) -> Result<usize, PortError> {
        let ProviderMode::Deterministic(wallet) = &self.mode else {
            return Err(PortError::NotImplemented(
                "debug_new_block requires deterministic mode",
            ));
        };
        let ids: Vec<String> = wallet
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))?
            .subscriptions
            .iter()
            .cloned()
            .collect();
        for id in &ids {
            self.debug_emit(
                ProviderEventKind::Message,
                serde_json::json!({
                    "type": "eth_subscription",
                    "data": {
                        "subscription": id,
                        "result": { "hash": hash, "number": format!("0x{number:x}") },
                    },
                }),
            )?;
        }
        Ok(ids.len())
    }

    /// Number of event handlers currently registered.
    pub fn debug_listener_count(&self) -> Result<usize, PortError> {
        Ok(self.lock_hooks()?.len())
    }

    fn lock_hooks(&self) -> Result<std::sync::MutexGuard<'_, EventHooks>, PortError> {
        self.hooks
            .lock()
            .map_err(|e| PortError::Transport(format!("provider hooks lock poisoned: {e}")))
    }

    pub fn debug_wallet(&self) -> Result<DeterministicWallet, PortError> {
        let ProviderMode::Deterministic(wallet) = &self.mode else {
            return Err(PortError::NotImplemented(
                "debug_wallet requires deterministic mode",
            ));
        };
        let g = wallet
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))?;
        Ok(g.clone())
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, PortError> {
        match &self.mode {
            ProviderMode::Deterministic(wallet) => {
                let mut g = wallet
                    .lock()
                    .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))?;
                g.handle(method, &params)
            }
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => proxy.call(method, params).await,
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser(object) => browser::request(object, method, params).await,
        }
    }
}

#[async_trait(?Send)]
impl ProviderHandle for Eip1193Provider {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, PortError> {
        self.dispatch(method, params).await
    }

    fn event_emitter(&self) -> Option<&dyn EventEmitter> {
        self.emits_events.then_some(self as &dyn EventEmitter)
    }

    fn wallet_requests(&self) -> Option<&dyn WalletRequests> {
        self.accepts_requests.then_some(self as &dyn WalletRequests)
    }
}

impl EventEmitter for Eip1193Provider {
    fn on(
        &self,
        kind: ProviderEventKind,
        handler: ProviderEventHandler,
    ) -> Result<ListenerId, PortError> {
        if !self.emits_events {
            return Err(PortError::NotImplemented("provider does not emit events"));
        }

        #[cfg(target_arch = "wasm32")]
        if let ProviderMode::Browser(object) = &self.mode {
            let closure = browser::register(object, kind, handler)?;
            let mut hooks = self.lock_hooks()?;
            let id = hooks.allocate();
            hooks.closures.push((id, kind, closure));
            return Ok(id);
        }

        let mut hooks = self.lock_hooks()?;
        let id = hooks.allocate();
        hooks.handlers.push((id, kind, handler));
        Ok(id)
    }

    fn off(&self, id: ListenerId) -> Result<(), PortError> {
        let mut hooks = self.lock_hooks()?;
        hooks.handlers.retain(|(registered, _, _)| *registered != id);

        #[cfg(target_arch = "wasm32")]
        if let Some(pos) = hooks.closures.iter().position(|(registered, _, _)| *registered == id) {
            let (_, kind, closure) = hooks.closures.remove(pos);
            if let ProviderMode::Browser(object) = &self.mode {
                browser::unregister(object, kind, &closure)?;
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl WalletRequests for Eip1193Provider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        if !self.accepts_requests {
            return Err(PortError::NotImplemented("provider does not accept wallet requests"));
        }
        self.dispatch(method, params).await
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ProxyRuntime {
    async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
        if let Some(err) = body.get("error") {
            return Err(rpc_error(err));
        }
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "eip1193 proxy status {status}: {body}"
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
    }
}

/// Maps a JSON-RPC / EIP-1193 error object onto [`PortError`].
pub(crate) fn rpc_error(err: &Value) -> PortError {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| err.to_string());
    match err.get("code").and_then(Value::as_i64) {
        Some(code) => PortError::Rejected { code, message },
        None => PortError::Transport(format!("provider returned error: {message}")),
    }
}

fn param_address(params: &Value, index: usize) -> Result<Address, PortError> {
    json_address(params.get(index), "address param")
}

fn json_address(value: Option<&Value>, what: &str) -> Result<Address, PortError> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| PortError::Validation(format!("{what} must be a hex string")))?;
    raw.parse()
        .map_err(|e| PortError::Validation(format!("invalid {what}: {e}")))
}

fn json_bytes(value: Option<&Value>) -> Result<Vec<u8>, PortError> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| PortError::Validation("call data must be a hex string".to_owned()))?;
    alloy::hex::decode(raw).map_err(|e| PortError::Validation(format!("invalid call data: {e}")))
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn is_function(target: &wasm_bindgen::JsValue, key: &str) -> bool {
    browser::get_prop(target, key)
        .map(|v| v.is_function())
        .unwrap_or(false)
}

#[cfg(target_arch = "wasm32")]
pub(crate) mod browser {
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};

    use rusty_wallet_core::{PortError, ProviderEvent, ProviderEventHandler, ProviderEventKind};
    use serde_json::Value;

    pub(crate) fn get_prop(target: &JsValue, key: &str) -> Result<JsValue, PortError> {
        js_sys::Reflect::get(target, &JsValue::from_str(key))
            .map_err(|e| PortError::Transport(format!("read provider property {key} failed: {e:?}")))
    }

    fn function(target: &JsValue, key: &str) -> Option<js_sys::Function> {
        get_prop(target, key)
            .ok()
            .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
    }

    fn js_error(err: JsValue) -> PortError {
        let decoded: Value = serde_wasm_bindgen::from_value(err.clone()).unwrap_or(Value::Null);
        if decoded.get("code").is_some() {
            return super::rpc_error(&decoded);
        }
        PortError::Transport(format!("provider request rejected: {err:?}"))
    }

    pub(crate) async fn request(
        provider: &JsValue,
        method: &str,
        params: Value,
    ) -> Result<Value, PortError> {
        let promise = if let Some(request_fn) = function(provider, "request") {
            let request = serde_json::json!({ "method": method, "params": params });
            let request_js = serde_wasm_bindgen::to_value(&request)
                .map_err(|e| PortError::Transport(format!("failed to encode wasm request: {e}")))?;
            request_fn
                .call1(provider, &request_js)
                .map_err(|e| PortError::Transport(format!("provider request dispatch failed: {e:?}")))?
                .dyn_into::<js_sys::Promise>()
                .map_err(|_| PortError::Transport("provider request did not return Promise".to_owned()))?
        } else if let Some(send_async) = function(provider, "sendAsync") {
            legacy_send_async(provider, &send_async, method, params)?
        } else {
            return Err(PortError::NotImplemented(
                "provider exposes neither request nor sendAsync",
            ));
        };

        let result_js = wasm_bindgen_futures::JsFuture::from(promise)
            .await
            .map_err(js_error)?;
        serde_wasm_bindgen::from_value(result_js)
            .map_err(|e| PortError::Transport(format!("failed to decode wasm response: {e}")))
    }

    /// Adapts the callback-style `sendAsync(payload, cb)` of legacy web3
    /// providers to a promise resolving with the bare `result`.
    fn legacy_send_async(
        provider: &JsValue,
        send_async: &js_sys::Function,
        method: &str,
        params: Value,
    ) -> Result<js_sys::Promise, PortError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let payload_js = serde_wasm_bindgen::to_value(&payload)
            .map_err(|e| PortError::Transport(format!("failed to encode wasm request: {e}")))?;

        let mut executor = |resolve: js_sys::Function, reject: js_sys::Function| {
            let reject_dispatch = reject.clone();
            let callback = Closure::once_into_js(move |err: JsValue, response: JsValue| {
                if !err.is_null() && !err.is_undefined() {
                    let _ = reject.call1(&JsValue::NULL, &err);
                    return;
                }
                let error = get_prop(&response, "error").unwrap_or(JsValue::UNDEFINED);
                if !error.is_null() && !error.is_undefined() {
                    let _ = reject.call1(&JsValue::NULL, &error);
                    return;
                }
                let result = get_prop(&response, "result").unwrap_or(JsValue::NULL);
                let _ = resolve.call1(&JsValue::NULL, &result);
            });
            if let Err(e) = send_async.call2(provider, &payload_js, &callback) {
                let _ = reject_dispatch.call1(&JsValue::NULL, &e);
            }
        };
        Ok(js_sys::Promise::new(&mut executor))
    }

    pub(crate) fn register(
        provider: &JsValue,
        kind: ProviderEventKind,
        handler: ProviderEventHandler,
    ) -> Result<Closure<dyn FnMut(JsValue)>, PortError> {
        let on_fn = function(provider, "on")
            .or_else(|| function(provider, "addListener"))
            .ok_or(PortError::NotImplemented(
                "provider does not expose on/addListener",
            ))?;

        let closure = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            let payload = serde_wasm_bindgen::from_value(value).unwrap_or(Value::Null);
            handler(ProviderEvent { kind, payload });
        });
        on_fn
            .call2(
                provider,
                &JsValue::from_str(kind.event_name()),
                closure.as_ref().unchecked_ref(),
            )
            .map_err(|e| {
                PortError::Transport(format!("register {} failed: {e:?}", kind.event_name()))
            })?;
        Ok(closure)
    }

    pub(crate) fn unregister(
        provider: &JsValue,
        kind: ProviderEventKind,
        closure: &Closure<dyn FnMut(JsValue)>,
    ) -> Result<(), PortError> {
        let Some(off_fn) =
            function(provider, "removeListener").or_else(|| function(provider, "off"))
        else {
            return Ok(());
        };
        off_fn
            .call2(
                provider,
                &JsValue::from_str(kind.event_name()),
                closure.as_ref().unchecked_ref(),
            )
            .map_err(|e| {
                PortError::Transport(format!("remove {} listener failed: {e:?}", kind.event_name()))
            })?;
        Ok(())
    }
}
