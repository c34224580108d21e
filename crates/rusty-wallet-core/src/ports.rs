use std::fmt;
use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capabilities::Provider;
use crate::domain::{Address, Asset, BlockHeader, Token, TxHash};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected ({code}): {message}")]
    Rejected { code: i64, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderEventKind {
    Connect,
    Disconnect,
    Message,
}

impl ProviderEventKind {
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Message => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub kind: ProviderEventKind,
    pub payload: Value,
}

pub type ProviderEventHandler = Box<dyn Fn(ProviderEvent)>;

pub type BlockHandler = Box<dyn Fn(Result<BlockHeader, PortError>)>;

/// Wallet or node connection supplied by the host environment.
///
/// Optional capabilities are exposed through the accessor methods and are
/// read once, when a [`Provider`] is built from the handle.
#[async_trait(?Send)]
pub trait ProviderHandle: fmt::Debug {
    fn label(&self) -> &str;

    /// Raw JSON-RPC passthrough used by chain clients bound to this provider.
    async fn send(&self, method: &str, params: Value) -> Result<Value, PortError>;

    fn event_emitter(&self) -> Option<&dyn EventEmitter> {
        None
    }

    fn wallet_requests(&self) -> Option<&dyn WalletRequests> {
        None
    }
}

/// Registration token returned by [`EventEmitter::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub trait EventEmitter {
    fn on(
        &self,
        kind: ProviderEventKind,
        handler: ProviderEventHandler,
    ) -> Result<ListenerId, PortError>;

    /// Removes a handler; unknown ids are ignored.
    fn off(&self, id: ListenerId) -> Result<(), PortError>;
}

/// Permission negotiation (`eth_requestAccounts` and friends).
#[async_trait(?Send)]
pub trait WalletRequests {
    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError>;
}

#[async_trait(?Send)]
pub trait ProviderResolver {
    /// `None` is a normal outcome: no wallet is installed.
    async fn resolve(&self) -> Option<Provider>;
}

#[async_trait(?Send)]
pub trait TokenRegistry {
    async fn supported_tokens(&self) -> Result<Vec<Token>, PortError>;
}

pub trait ChainClientFactory {
    fn bind(&self, provider: &Provider) -> Result<Arc<dyn ChainClient>, PortError>;
}

#[async_trait(?Send)]
pub trait ChainClient {
    async fn get_accounts(&self) -> Result<Vec<Address>, PortError>;
    async fn get_native_balance(&self, address: &Address) -> Result<U256, PortError>;
    async fn get_token_balance(&self, address: &Address, token: &Token) -> Result<U256, PortError>;
    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: U256,
        asset: &Asset,
    ) -> Result<TxHash, PortError>;
    async fn subscribe_new_blocks(
        &self,
        handler: BlockHandler,
    ) -> Result<Box<dyn Subscription>, PortError>;
}

#[async_trait(?Send)]
pub trait Subscription {
    async fn unsubscribe(self: Box<Self>) -> Result<(), PortError>;
}
