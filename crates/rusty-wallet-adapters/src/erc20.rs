use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use rusty_wallet_core::PortError;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
        function transfer(address to, uint256 amount) external returns (bool success);
    }
}

pub fn encode_balance_of(owner: Address) -> Bytes {
    Bytes::from(IERC20::balanceOfCall { owner }.abi_encode())
}

pub fn decode_balance_of_return(data: &[u8]) -> Result<U256, PortError> {
    IERC20::balanceOfCall::abi_decode_returns(data, false)
        .map(|ret| ret.balance)
        .map_err(|e| PortError::Validation(format!("balanceOf return decode failed: {e}")))
}

pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    Bytes::from(IERC20::transferCall { to, amount }.abi_encode())
}

/// Owner argument of a `balanceOf` calldata blob, if that is what it is.
pub fn decode_balance_of_call(data: &[u8]) -> Option<Address> {
    IERC20::balanceOfCall::abi_decode(data, true)
        .ok()
        .map(|call| call.owner)
}
