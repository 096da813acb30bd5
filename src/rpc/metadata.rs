//! ERC-20 metadata lookups through Multicall3.
//!
//! Each token costs four sub-calls (name, symbol, decimals, totalSupply) in a
//! single `aggregate3`. Decimals is required; the other fields are optional.

use alloy::{
    primitives::{Address, U256},
    providers::{DynProvider, MULTICALL3_ADDRESS},
    sol,
    sol_types::SolCall,
};
use crate::{abis::IERC20, error::RpcError};

sol! {
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    struct McResult {
        bool success;
        bytes returnData;
    }

    #[sol(rpc)]
    interface IMulticall3 {
        function aggregate3(Call3[] calldata calls) external payable returns (McResult[] memory returnData);
    }
}

/// Batch size for multicall requests to avoid RPC congestion/timeouts
pub const MULTICALL_BATCH_SIZE: usize = 20;

/// Tokens reporting more decimals than this are treated as broken contracts
const MAX_DECIMALS: u8 = 36;

const CALLS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Option<U256>,
}

/// Fetch metadata for up to [`MULTICALL_BATCH_SIZE`] tokens in one call.
/// The result is index-aligned with `addresses`.
pub(crate) async fn fetch_metadata_chunk(
    provider: &DynProvider,
    addresses: &[Address],
) -> Result<Vec<Option<TokenMetadata>>, RpcError> {
    let multicall = IMulticall3::new(MULTICALL3_ADDRESS, provider);
    let mut calls = Vec::with_capacity(addresses.len() * CALLS_PER_TOKEN);

    for address in addresses {
        for call_data in [
            IERC20::nameCall {}.abi_encode(),
            IERC20::symbolCall {}.abi_encode(),
            IERC20::decimalsCall {}.abi_encode(),
            IERC20::totalSupplyCall {}.abi_encode(),
        ] {
            calls.push(Call3 {
                target: *address,
                allowFailure: true,
                callData: call_data.into(),
            });
        }
    }

    let results = multicall
        .aggregate3(calls)
        .call()
        .await
        .map_err(RpcError::from_contract)?;

    let mut tokens = Vec::with_capacity(addresses.len());

    for (i, address) in addresses.iter().enumerate() {
        let base = i * CALLS_PER_TOKEN;
        let Some(group) = results.get(base..base + CALLS_PER_TOKEN) else {
            // Not enough results, keep index alignment
            tokens.push(None);
            continue;
        };

        let decimals = if group[2].success {
            IERC20::decimalsCall::abi_decode_returns(&group[2].returnData).ok()
        } else {
            None
        };

        let Some(decimals) = decimals.filter(|d| *d <= MAX_DECIMALS) else {
            tokens.push(None);
            continue;
        };

        let name = if group[0].success {
            IERC20::nameCall::abi_decode_returns(&group[0].returnData).unwrap_or_default()
        } else {
            String::new()
        };

        let symbol = if group[1].success {
            IERC20::symbolCall::abi_decode_returns(&group[1].returnData).unwrap_or_default()
        } else {
            String::new()
        };

        let total_supply = if group[3].success {
            IERC20::totalSupplyCall::abi_decode_returns(&group[3].returnData).ok()
        } else {
            None
        };

        tokens.push(Some(TokenMetadata {
            address: *address,
            name,
            symbol,
            decimals,
            total_supply,
        }));
    }

    Ok(tokens)
}

/// Decimals of one token, rejecting values no real token reports.
pub(crate) async fn fetch_decimals(provider: &DynProvider, token: Address) -> Result<u8, RpcError> {
    let decimals = IERC20::new(token, provider)
        .decimals()
        .call()
        .await
        .map_err(RpcError::from_contract)?;

    if decimals > MAX_DECIMALS {
        return Err(RpcError::Decode(format!("{} reports {} decimals", token, decimals)));
    }
    Ok(decimals)
}

pub(crate) async fn fetch_name(provider: &DynProvider, token: Address) -> Result<String, RpcError> {
    IERC20::new(token, provider)
        .name()
        .call()
        .await
        .map_err(RpcError::from_contract)
}

pub(crate) async fn fetch_symbol(
    provider: &DynProvider,
    token: Address,
) -> Result<String, RpcError> {
    IERC20::new(token, provider)
        .symbol()
        .call()
        .await
        .map_err(RpcError::from_contract)
}

pub(crate) async fn fetch_total_supply(
    provider: &DynProvider,
    token: Address,
) -> Result<U256, RpcError> {
    IERC20::new(token, provider)
        .totalSupply()
        .call()
        .await
        .map_err(RpcError::from_contract)
}
