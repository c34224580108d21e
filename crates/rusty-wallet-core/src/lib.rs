pub mod capabilities;
pub mod domain;
pub mod ports;
pub mod service;
pub mod state;
pub mod state_machine;

pub use capabilities::{
    is_event_emitting_provider, is_request_capable, is_token, Provider, ProviderKind,
};
pub use domain::{
    Address, Asset, Balance, BlockHeader, ConnectionState, NativeAsset, Token, TxHash, TxParams,
};
pub use ports::{
    BlockHandler, ChainClient, ChainClientFactory, EventEmitter, ListenerId, PortError,
    ProviderEvent, ProviderEventHandler, ProviderEventKind, ProviderHandle, ProviderResolver,
    Subscription, TokenRegistry, WalletRequests,
};
pub use service::{ConnectOutcome, ServiceContext, WalletConnectionService, WalletError};
pub use state::StateStore;
pub use state_machine::{
    connection_transition, ConnectionAction, ConnectionStatus, StateTransition,
};
