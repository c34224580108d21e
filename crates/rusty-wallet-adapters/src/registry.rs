use async_trait::async_trait;
use tracing::debug;

use rusty_wallet_core::{PortError, Token, TokenRegistry};

use crate::WalletAdapterConfig;

/// Token registry serving a fixed list, in the order given.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenRegistry {
    tokens: Vec<Token>,
}

impl StaticTokenRegistry {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Parses a JSON array of `{symbol, name, address, decimals}` entries.
    pub fn from_json(raw: &str) -> Result<Self, PortError> {
        let tokens: Vec<Token> = serde_json::from_str(raw)
            .map_err(|e| PortError::Validation(format!("invalid token list: {e}")))?;
        Ok(Self::new(tokens))
    }

    /// Loads `token_list_path` when configured, otherwise starts empty.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_config(config: &WalletAdapterConfig) -> Result<Self, PortError> {
        let Some(path) = config.token_list_path.as_deref() else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PortError::NotFound(format!("token list {path}: {e}")))?;
        let registry = Self::from_json(&raw)?;
        debug!(path, tokens = registry.tokens.len(), "token list loaded");
        Ok(registry)
    }

    #[cfg(target_arch = "wasm32")]
    pub fn from_config(_config: &WalletAdapterConfig) -> Result<Self, PortError> {
        Ok(Self::default())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

#[async_trait(?Send)]
impl TokenRegistry for StaticTokenRegistry {
    async fn supported_tokens(&self) -> Result<Vec<Token>, PortError> {
        Ok(self.tokens.clone())
    }
}
