//! Selection of the ERC-20 and base tokens used by the tests.

use super::Token;
use crate::{config::L1Token, rpc::L2Rpc};
use alloy_primitives::{address, Address};
use color_eyre::{eyre::eyre, Result};
use indexmap::IndexMap;
use tracing::debug;

/// The L2 address of the base token system contract.
pub(crate) const L2_BASE_TOKEN_ADDRESS: Address =
    address!("000000000000000000000000000000000000800a");

/// How the bridge contracts refer to ETH.
pub(crate) const ETH_ADDRESS_IN_CONTRACTS: Address =
    address!("0000000000000000000000000000000000000001");

/// The preferred test token. WBTC has 8 decimals instead of 18, which surfaces decimals-related
/// bugs.
const PREFERRED_SYMBOL: &str = "WBTC";

/// Picks the test token from the YAML registry: `WBTC` if present, otherwise the first token,
/// unless that one is `WETH`, in which case the second.
pub(crate) fn select_primary_token(tokens: &IndexMap<String, L1Token>) -> Result<&L1Token> {
    if let Some(token) = tokens.get(PREFERRED_SYMBOL) {
        return Ok(token);
    }
    let (_, first) = tokens
        .get_index(0)
        .ok_or_else(|| eyre!("The ERC-20 token registry is empty"))?;
    if first.symbol != "WETH" {
        return Ok(first);
    }
    tokens
        .get_index(1)
        .map(|(_, token)| token)
        .ok_or_else(|| eyre!("The ERC-20 token registry only contains WETH"))
}

/// Picks the test token from a token list: `WBTC` if present, otherwise the first token.
pub(crate) fn select_primary_token_from_list(tokens: &[L1Token]) -> Result<&L1Token> {
    tokens
        .iter()
        .find(|token| token.symbol == PREFERRED_SYMBOL)
        .or_else(|| tokens.first())
        .ok_or_else(|| eyre!("The token list is empty"))
}

/// Returns the token whose L1 address is the chain's base token, if it is listed. The last match
/// of the registry wins.
pub(crate) fn find_base_token<'a>(
    tokens: impl IntoIterator<Item = &'a L1Token>,
    base_token_l1: Address,
) -> Option<&'a L1Token> {
    tokens
        .into_iter()
        .filter(|token| token.address == base_token_l1)
        .last()
}

/// Returns the first token of a token list whose L1 address is the chain's base token.
pub(crate) fn find_listed_base_token(
    tokens: &[L1Token],
    base_token_l1: Address,
) -> Option<&L1Token> {
    tokens.iter().find(|token| token.address == base_token_l1)
}

/// Resolves the L2 address of an L1 token.
pub(crate) async fn l2_token_address<R: L2Rpc + ?Sized>(
    rpc: &R,
    l1_token: Address,
    base_token_l1: Address,
) -> Result<Address> {
    let l1_token = if l1_token == Address::ZERO {
        ETH_ADDRESS_IN_CONTRACTS
    } else {
        l1_token
    };
    if l1_token == base_token_l1 {
        return Ok(L2_BASE_TOKEN_ADDRESS);
    }

    let bridge = rpc
        .bridge_contracts()
        .await?
        .l2_shared_default_bridge
        .ok_or_else(|| eyre!("The node reports no shared L2 bridge"))?;
    rpc.l2_token_address(bridge, l1_token).await
}

/// Builds the `(erc20_token, base_token)` pair.
///
/// The base token falls back to the primary token's metadata when it is not listed; its L2
/// address is always [L2_BASE_TOKEN_ADDRESS].
pub(crate) async fn resolve_tokens<R: L2Rpc + ?Sized>(
    rpc: &R,
    primary: &L1Token,
    base: Option<&L1Token>,
    base_token_l1: Address,
) -> Result<(Token, Token)> {
    let l2_address = l2_token_address(rpc, primary.address, base_token_l1).await?;
    debug!(target: "env", "Test token {} is at {l2_address} on L2", primary.symbol);

    let erc20_token = Token {
        name: primary.name.clone(),
        symbol: primary.symbol.clone(),
        decimals: primary.decimals,
        l1_address: primary.address,
        l2_address,
    };
    let base = base.unwrap_or(primary);
    let base_token = Token {
        name: base.name.clone(),
        symbol: base.symbol.clone(),
        decimals: base.decimals,
        l1_address: base.address,
        l2_address: L2_BASE_TOKEN_ADDRESS,
    };
    Ok((erc20_token, base_token))
}
