pub mod chain_client;
pub mod config;
pub mod eip1193;
pub mod erc20;
pub mod logging;
pub mod registry;
pub mod resolver;

pub use chain_client::{Eip1193ChainClient, Eip1193ChainClientFactory};
pub use config::{RuntimeProfile, WalletAdapterConfig};
pub use eip1193::{DeterministicWallet, Eip1193Provider};
pub use logging::init_tracing;
pub use registry::StaticTokenRegistry;
pub use resolver::{Eip1193Resolver, StaticResolver};
