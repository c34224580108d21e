use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::state_machine::ConnectionStatus;

/// Account identifier as reported by the chain client. Not validated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeAsset {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl Default for NativeAsset {
    fn default() -> Self {
        Self {
            symbol: "ETH".to_owned(),
            name: "Ether".to_owned(),
            decimals: 18,
        }
    }
}

/// Contract-based asset. `address` is the token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Asset {
    Native(NativeAsset),
    #[serde(rename = "ERC20")]
    Erc20(Token),
}

impl Asset {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Native(native) => &native.symbol,
            Self::Erc20(token) => &token.symbol,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Self::Native(native) => native.decimals,
            Self::Erc20(token) => token.decimals,
        }
    }
}

impl From<Token> for Asset {
    fn from(token: Token) -> Self {
        Self::Erc20(token)
    }
}

impl From<NativeAsset> for Asset {
    fn from(native: NativeAsset) -> Self {
        Self::Native(native)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: Asset,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    pub amount: U256,
    pub recipient: Address,
    pub asset: Asset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: Option<String>,
    pub number: Option<u64>,
}

/// Observable connection snapshot handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub status: ConnectionStatus,
    pub address: Address,
    pub accounts: Vec<Address>,
    pub log: String,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            connected: false,
            status: ConnectionStatus::Disconnected,
            address: Address::default(),
            accounts: Vec::new(),
            log: "unset".to_owned(),
        }
    }
}

impl ConnectionState {
    /// Replaces the account list; `address` tracks the first entry.
    pub fn set_accounts(&mut self, accounts: Vec<Address>) {
        self.address = accounts.first().cloned().unwrap_or_default();
        self.accounts = accounts;
    }
}
