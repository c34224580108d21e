#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use alloy::primitives::{Address as EvmAddress, U256};
use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};

use rusty_wallet_adapters::{
    DeterministicWallet, Eip1193ChainClientFactory, Eip1193Provider, StaticResolver,
    StaticTokenRegistry,
};
use rusty_wallet_core::{
    Address, NativeAsset, Provider, ProviderResolver, ServiceContext, Token,
    WalletConnectionService,
};

pub const OWNER: &str = "0x1000000000000000000000000000000000000001";
pub const SECOND: &str = "0x2000000000000000000000000000000000000002";
pub const DAI: &str = "0x3000000000000000000000000000000000000003";
pub const USDC: &str = "0x4000000000000000000000000000000000000004";
pub const TX_HASH: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

pub fn evm(raw: &str) -> EvmAddress {
    raw.parse().expect("fixture address")
}

pub fn token(symbol: &str, address: &str, decimals: u8) -> Token {
    Token {
        symbol: symbol.to_owned(),
        name: format!("{symbol} token"),
        address: Address::from(address),
        decimals,
    }
}

pub fn tokens() -> Vec<Token> {
    vec![token("DAI", DAI, 18), token("USDC", USDC, 6)]
}

/// Two accounts; OWNER holds 5000 wei, 42 DAI units and 7 USDC units.
pub fn funded_wallet() -> DeterministicWallet {
    let mut wallet = DeterministicWallet::default();
    wallet.accounts = vec![evm(OWNER), evm(SECOND)];
    wallet.native_balances.insert(evm(OWNER), U256::from(5_000u64));
    wallet
        .token_balances
        .insert((evm(DAI), evm(OWNER)), U256::from(42u64));
    wallet
        .token_balances
        .insert((evm(USDC), evm(OWNER)), U256::from(7u64));
    wallet
}

pub async fn service_with_resolver(
    resolver: Arc<dyn ProviderResolver>,
    tokens: Vec<Token>,
) -> WalletConnectionService {
    WalletConnectionService::create(ServiceContext {
        resolver,
        registry: Arc::new(StaticTokenRegistry::new(tokens)),
        chain: Arc::new(Eip1193ChainClientFactory),
        native_asset: NativeAsset::default(),
    })
    .await
}

/// Service over a clone of `provider`; the caller keeps the original to
/// inject events and inspect the in-memory wallet.
pub async fn service_for(provider: &Eip1193Provider) -> WalletConnectionService {
    let resolved = Provider::new(Arc::new(provider.clone()));
    service_with_resolver(Arc::new(StaticResolver::new(Some(resolved))), tokens()).await
}

/// Minimal JSON-RPC node answering from a fixed method table.
///
/// Unknown methods get a `-32601` error. Every method name received is
/// appended to `calls`.
pub fn spawn_rpc_server(
    answers: Vec<(&'static str, Value)>,
    calls: Arc<Mutex<Vec<String>>>,
) -> (String, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());

    let join = thread::spawn(move || {
        for _ in 0..32 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut body = String::new();
            if req.as_reader().read_to_string(&mut body).is_err() {
                let _ = req.respond(Response::from_string("").with_status_code(StatusCode(400)));
                continue;
            }
            let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let method = payload
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if let Ok(mut g) = calls.lock() {
                g.push(method.clone());
            }

            let id = payload.get("id").cloned().unwrap_or(json!(1));
            let answer = answers
                .iter()
                .find(|(name, _)| *name == method)
                .map(|(_, answer)| answer.clone());
            let reply = match answer {
                Some(answer) if answer.get("error").is_some() => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": answer["error"],
                }),
                Some(answer) => json!({ "jsonrpc": "2.0", "id": id, "result": answer }),
                None => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": "method not found" },
                }),
            };
            let response = Response::from_string(reply.to_string()).with_header(
                "Content-Type: application/json"
                    .parse::<tiny_http::Header>()
                    .expect("header"),
            );
            let _ = req.respond(response);
        }
    });

    (addr, join)
}
