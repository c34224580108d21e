#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct WalletAdapterConfig {
    pub runtime_profile: RuntimeProfile,
    /// JSON-RPC endpoint used as the injected provider outside the browser.
    pub eip1193_proxy_url: Option<String>,
    /// Whether the proxy fronts a wallet (accepts `eth_requestAccounts`).
    pub eip1193_proxy_wallet: bool,
    pub proxy_timeout_ms: u64,
    /// How long browser detection waits for `ethereum#initialized`.
    pub detect_timeout_ms: u32,
    pub token_list_path: Option<String>,
}

impl Default for WalletAdapterConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            eip1193_proxy_url: None,
            eip1193_proxy_wallet: true,
            proxy_timeout_ms: 15_000,
            detect_timeout_ms: 3_000,
            token_list_path: None,
        }
    }
}

impl WalletAdapterConfig {
    #[allow(unused_mut)]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(profile) = env_string("RUSTY_WALLET_PROFILE") {
                cfg.runtime_profile = match profile.to_ascii_lowercase().as_str() {
                    "production" | "prod" => RuntimeProfile::Production,
                    _ => RuntimeProfile::Development,
                };
            }
            cfg.eip1193_proxy_url = env_string("RUSTY_WALLET_EIP1193_PROXY_URL");
            if let Some(wallet) = env_bool("RUSTY_WALLET_PROXY_WALLET") {
                cfg.eip1193_proxy_wallet = wallet;
            }
            if let Some(ms) = env_parse("RUSTY_WALLET_PROXY_TIMEOUT_MS") {
                cfg.proxy_timeout_ms = ms;
            }
            if let Some(ms) = env_parse("RUSTY_WALLET_DETECT_TIMEOUT_MS") {
                cfg.detect_timeout_ms = ms;
            }
            cfg.token_list_path = env_string("RUSTY_WALLET_TOKEN_LIST");
        }

        cfg
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(not(target_arch = "wasm32"))]
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

#[cfg(not(target_arch = "wasm32"))]
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}
