//! Resolution of the main test wallet's private key.

use super::VarSource;
use alloy_primitives::B256;
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder};
use color_eyre::{eyre::WrapErr, Result};
use serde::Deserialize;
use std::{fs, path::Path, str::FromStr};
use tracing::debug;

/// Partial `etc/test_config/constant/eth.json`.
#[derive(Debug, Deserialize)]
struct EthTestConfig {
    test_mnemonic: String,
}

/// Returns `MASTER_WALLET_PK` if set, otherwise the key derived from the ecosystem's test
/// mnemonic.
pub(crate) fn main_wallet_pk(vars: &VarSource, path_to_home: &Path) -> Result<B256> {
    if let Some(pk) = vars.get("MASTER_WALLET_PK") {
        return B256::from_str(pk).wrap_err("MASTER_WALLET_PK is not a valid private key");
    }

    let path = path_to_home.join("etc/test_config/constant/eth.json");
    debug!(target: "env", "Deriving main wallet key from {}", path.display());
    let config: EthTestConfig = serde_json::from_str(
        &fs::read_to_string(&path).wrap_err_with(|| format!("Failed to read {}", path.display()))?,
    )?;
    key_from_mnemonic(&config.test_mnemonic)
}

/// Derives the private key of the first account of a BIP-39 mnemonic.
pub(crate) fn key_from_mnemonic(phrase: &str) -> Result<B256> {
    let signer = MnemonicBuilder::<English>::default().phrase(phrase).build()?;
    Ok(B256::from_slice(signer.credential().to_bytes().as_slice()))
}
