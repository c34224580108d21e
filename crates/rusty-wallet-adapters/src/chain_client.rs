use std::sync::Arc;

use alloy::primitives::{Address as EvmAddress, B256, U256};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use rusty_wallet_core::{
    Address, Asset, BlockHandler, BlockHeader, ChainClient, ChainClientFactory, ListenerId,
    PortError, Provider, ProviderEvent, ProviderEventKind, Subscription, Token, TxHash,
};

use crate::erc20;

#[derive(Debug, Clone, Copy, Default)]
pub struct Eip1193ChainClientFactory;

impl ChainClientFactory for Eip1193ChainClientFactory {
    fn bind(&self, provider: &Provider) -> Result<Arc<dyn ChainClient>, PortError> {
        debug!(label = provider.label(), "binding chain client");
        Ok(Arc::new(Eip1193ChainClient::new(provider.clone())))
    }
}

/// Chain client issuing JSON-RPC through a provider's `send` passthrough.
///
/// Address and amount validation happens here; the orchestration layer
/// treats both as opaque.
#[derive(Debug, Clone)]
pub struct Eip1193ChainClient {
    provider: Provider,
}

impl Eip1193ChainClient {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        self.provider.handle().send(method, params).await
    }
}

#[async_trait(?Send)]
impl ChainClient for Eip1193ChainClient {
    async fn get_accounts(&self) -> Result<Vec<Address>, PortError> {
        let result = self.call("eth_accounts", serde_json::json!([])).await?;
        let arr = result
            .as_array()
            .ok_or_else(|| PortError::Transport("eth_accounts: array expected".to_owned()))?;
        arr.iter()
            .map(|item| {
                item.as_str()
                    .map(Address::from)
                    .ok_or_else(|| PortError::Transport("eth_accounts: string expected".to_owned()))
            })
            .collect()
    }

    async fn get_native_balance(&self, address: &Address) -> Result<U256, PortError> {
        let owner = evm_address(address, "balance owner")?;
        let result = self
            .call(
                "eth_getBalance",
                serde_json::json!([owner.to_string(), "latest"]),
            )
            .await?;
        parse_quantity(&result)
    }

    async fn get_token_balance(&self, address: &Address, token: &Token) -> Result<U256, PortError> {
        let owner = evm_address(address, "balance owner")?;
        let contract = evm_address(&token.address, "token contract")?;
        let data = erc20::encode_balance_of(owner);
        let result = self
            .call(
                "eth_call",
                serde_json::json!([{ "to": contract.to_string(), "data": data }, "latest"]),
            )
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| PortError::Transport("eth_call must return hex data".to_owned()))?;
        let bytes = alloy::hex::decode(raw)
            .map_err(|e| PortError::Validation(format!("invalid eth_call result: {e}")))?;
        erc20::decode_balance_of_return(&bytes)
    }

    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: U256,
        asset: &Asset,
    ) -> Result<TxHash, PortError> {
        let from = evm_address(from, "sender")?;
        let recipient = evm_address(to, "recipient")?;
        let tx = match asset {
            Asset::Native(_) => serde_json::json!({
                "from": from.to_string(),
                "to": recipient.to_string(),
                "value": format!("0x{amount:x}"),
            }),
            Asset::Erc20(token) => {
                let contract = evm_address(&token.address, "token contract")?;
                serde_json::json!({
                    "from": from.to_string(),
                    "to": contract.to_string(),
                    "value": "0x0",
                    "data": erc20::encode_transfer(recipient, amount),
                })
            }
        };

        let result = self
            .call("eth_sendTransaction", serde_json::json!([tx]))
            .await?;
        let hash = result.as_str().ok_or_else(|| {
            PortError::Transport("eth_sendTransaction must return tx hash".to_owned())
        })?;
        let parsed: B256 = hash
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid tx hash: {e}")))?;
        Ok(TxHash(parsed.to_string()))
    }

    async fn subscribe_new_blocks(
        &self,
        handler: BlockHandler,
    ) -> Result<Box<dyn Subscription>, PortError> {
        let emitter = self.provider.event_emitter().ok_or(PortError::NotImplemented(
            "provider does not deliver subscription messages",
        ))?;
        let result = self
            .call("eth_subscribe", serde_json::json!(["newHeads"]))
            .await?;
        let id = result
            .as_str()
            .ok_or_else(|| PortError::Transport("eth_subscribe must return an id".to_owned()))?
            .to_owned();

        let subscription_id = id.clone();
        let listener = emitter.on(
            ProviderEventKind::Message,
            Box::new(move |event: ProviderEvent| {
                if let Some(header) = subscription_payload(&event.payload, &subscription_id) {
                    handler(header);
                }
            }),
        )?;

        debug!(subscription = %id, "newHeads subscription opened");
        Ok(Box::new(Eip1193Subscription {
            provider: self.provider.clone(),
            id,
            listener,
        }))
    }
}

struct Eip1193Subscription {
    provider: Provider,
    id: String,
    listener: ListenerId,
}

#[async_trait(?Send)]
impl Subscription for Eip1193Subscription {
    async fn unsubscribe(self: Box<Self>) -> Result<(), PortError> {
        if let Some(emitter) = self.provider.event_emitter() {
            emitter.off(self.listener)?;
        }
        self.provider
            .handle()
            .send("eth_unsubscribe", serde_json::json!([self.id]))
            .await?;
        debug!(subscription = %self.id, "newHeads subscription closed");
        Ok(())
    }
}

/// Extracts a block header from an `eth_subscription` message addressed to `id`.
fn subscription_payload(payload: &Value, id: &str) -> Option<Result<BlockHeader, PortError>> {
    if payload.get("type").and_then(Value::as_str) != Some("eth_subscription") {
        return None;
    }
    let data = payload.get("data")?;
    if data.get("subscription").and_then(Value::as_str) != Some(id) {
        return None;
    }
    if let Some(err) = data.get("error") {
        return Some(Err(crate::eip1193::rpc_error(err)));
    }
    let result = data.get("result")?;
    let number = match result.get("number") {
        Some(n) => parse_quantity(n)
            .ok()
            .and_then(|n| u64::try_from(n).ok()),
        None => None,
    };
    Some(Ok(BlockHeader {
        hash: result.get("hash").and_then(Value::as_str).map(str::to_owned),
        number,
    }))
}

fn evm_address(address: &Address, what: &str) -> Result<EvmAddress, PortError> {
    address
        .as_str()
        .parse()
        .map_err(|e| PortError::Validation(format!("invalid {what} address '{address}': {e}")))
}

fn parse_quantity(value: &Value) -> Result<U256, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    let raw = value
        .as_str()
        .ok_or_else(|| PortError::Validation("quantity must be string or number".to_owned()))?;
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| PortError::Validation(format!("quantity must be 0x-prefixed: {raw}")))?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}")))
}
