use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use rusty_wallet_core::{Provider, ProviderResolver};

use crate::WalletAdapterConfig;
#[cfg(not(target_arch = "wasm32"))]
use crate::Eip1193Provider;

/// Discovers the host's wallet provider.
///
/// In the browser this is the injected `window.ethereum` object, falling back
/// to a legacy `window.web3.currentProvider`. Natively the configured
/// JSON-RPC proxy plays the injected provider.
#[derive(Debug, Clone, Default)]
pub struct Eip1193Resolver {
    config: WalletAdapterConfig,
}

impl Eip1193Resolver {
    pub fn with_config(config: WalletAdapterConfig) -> Self {
        Self { config }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn resolve_proxy(&self) -> Option<Provider> {
        let url = self.config.eip1193_proxy_url.as_deref()?;
        if self.config.strict_runtime_required() && !url.starts_with("https://") {
            warn!(url, "production profile requires an https eip1193 proxy");
            return None;
        }
        match Eip1193Provider::proxy(url, &self.config) {
            Ok(provider) => {
                debug!(url, "using eip1193 proxy provider");
                Some(Provider::new(Arc::new(provider)))
            }
            Err(err) => {
                warn!(error = %err, "eip1193 proxy unavailable");
                None
            }
        }
    }
}

#[async_trait(?Send)]
impl ProviderResolver for Eip1193Resolver {
    #[cfg(not(target_arch = "wasm32"))]
    async fn resolve(&self) -> Option<Provider> {
        self.resolve_proxy()
    }

    #[cfg(target_arch = "wasm32")]
    async fn resolve(&self) -> Option<Provider> {
        use crate::Eip1193Provider;

        if let Some(object) = detect::injected_ethereum(self.config.detect_timeout_ms).await {
            debug!("using injected window.ethereum");
            return Some(Provider::new(Arc::new(Eip1193Provider::browser(
                object,
                "window.ethereum",
            ))));
        }
        if let Some(object) = detect::legacy_web3() {
            warn!("falling back to legacy window.web3.currentProvider");
            return Some(Provider::new(Arc::new(Eip1193Provider::browser(
                object,
                "window.web3",
            ))));
        }
        None
    }
}

/// Resolver returning a provider fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver(Option<Provider>);

impl StaticResolver {
    pub fn new(provider: Option<Provider>) -> Self {
        Self(provider)
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait(?Send)]
impl ProviderResolver for StaticResolver {
    async fn resolve(&self) -> Option<Provider> {
        self.0.clone()
    }
}

#[cfg(target_arch = "wasm32")]
mod detect {
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};

    use crate::eip1193::browser::get_prop;

    const INITIALIZED_EVENT: &str = "ethereum#initialized";

    fn present(value: &JsValue) -> bool {
        !value.is_undefined() && !value.is_null()
    }

    fn window_prop(window: &web_sys::Window, key: &str) -> Option<JsValue> {
        get_prop(window.as_ref(), key).ok().filter(present)
    }

    /// Returns `window.ethereum`, waiting for late injection up to `timeout_ms`.
    pub(super) async fn injected_ethereum(timeout_ms: u32) -> Option<JsValue> {
        let window = web_sys::window()?;
        if let Some(ethereum) = window_prop(&window, "ethereum") {
            return Some(ethereum);
        }

        let mut listener = JsValue::UNDEFINED;
        let mut executor = |resolve: js_sys::Function, _reject: js_sys::Function| {
            let resolve_init = resolve.clone();
            let on_init = Closure::once_into_js(move || {
                let _ = resolve_init.call0(&JsValue::NULL);
            });
            let on_timeout = Closure::once_into_js(move || {
                let _ = resolve.call0(&JsValue::NULL);
            });
            let _ = window
                .add_event_listener_with_callback(INITIALIZED_EVENT, on_init.unchecked_ref());
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                on_timeout.unchecked_ref(),
                i32::try_from(timeout_ms).unwrap_or(i32::MAX),
            );
            listener = on_init;
        };
        let promise = js_sys::Promise::new(&mut executor);
        let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
        let _ = window.remove_event_listener_with_callback(
            INITIALIZED_EVENT,
            listener.unchecked_ref(),
        );

        window_prop(&window, "ethereum")
    }

    pub(super) fn legacy_web3() -> Option<JsValue> {
        let window = web_sys::window()?;
        let web3 = window_prop(&window, "web3")?;
        get_prop(&web3, "currentProvider").ok().filter(present)
    }
}
