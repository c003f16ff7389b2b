//! Typed views of the ecosystem's on-disk YAML configuration.
//!
//! Only the fields the harness reads are modelled. Hex scalars such as addresses are read as raw
//! strings first and parsed afterwards, so a YAML resolver never gets a chance to coerce them into
//! integers.

use crate::{env::DataAvailabilityMode, error::HarnessError};
use alloy_primitives::Address;
use color_eyre::{eyre::WrapErr, Result};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Reads and deserializes a YAML file, failing with [HarnessError::MissingConfigFile] if it does
/// not exist.
pub(crate) fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(HarnessError::MissingConfigFile(path.to_path_buf()).into());
    }
    let raw = fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).wrap_err_with(|| format!("Failed to parse {}", path.display()))
}

/// Locations of the config files of one chain within the ecosystem.
#[derive(Debug, Clone)]
pub(crate) struct ChainConfigPaths {
    /// The ecosystem root.
    pub(crate) path_to_home: PathBuf,
    /// The chain name.
    pub(crate) chain: String,
}

impl ChainConfigPaths {
    pub(crate) fn new(path_to_home: impl Into<PathBuf>, chain: impl Into<String>) -> Self {
        Self {
            path_to_home: path_to_home.into(),
            chain: chain.into(),
        }
    }

    /// The ecosystem descriptor.
    pub(crate) fn ecosystem(&self) -> PathBuf {
        self.path_to_home.join("ZkStack.yaml")
    }

    /// A file of the chain's `configs` folder, optionally from a nested folder (such as
    /// `external_node`).
    pub(crate) fn chain_config(&self, file: &str, suffix: Option<&str>) -> PathBuf {
        let mut path = self
            .path_to_home
            .join("chains")
            .join(&self.chain)
            .join("configs");
        if let Some(suffix) = suffix {
            path = path.join(suffix);
        }
        path.join(file)
    }

    /// The ERC-20 token registry.
    pub(crate) fn erc20(&self) -> PathBuf {
        self.path_to_home.join("configs").join("erc20.yaml")
    }

    /// The server log file of the chain.
    pub(crate) fn server_log(&self) -> PathBuf {
        self.path_to_home
            .join("logs")
            .join("server")
            .join(&self.chain)
            .join("server.log")
    }
}

/// `ZkStack.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct EcosystemConfig {
    /// The L1 network the ecosystem settles on.
    pub(crate) l1_network: String,
}

/// `genesis.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct GenesisConfig {
    pub(crate) l2_chain_id: u64,
    pub(crate) l1_batch_commit_data_generator_mode: DataAvailabilityMode,
}

/// `general.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct GeneralConfig {
    pub(crate) api: ApiConfig,
    pub(crate) contract_verifier: ContractVerifierConfig,
    pub(crate) state_keeper: StateKeeperConfig,
    pub(crate) timestamp_asserter: TimestampAsserterConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ApiConfig {
    pub(crate) web3_json_rpc: Web3JsonRpcConfig,
    pub(crate) healthcheck: HealthcheckConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Web3JsonRpcConfig {
    pub(crate) http_url: String,
    pub(crate) ws_url: String,
    #[serde(default = "default_req_entities_limit")]
    pub(crate) req_entities_limit: u64,
}

const fn default_req_entities_limit() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct HealthcheckConfig {
    pub(crate) port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ContractVerifierConfig {
    pub(crate) port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct StateKeeperConfig {
    pub(crate) minimal_l2_gas_price: u64,
    pub(crate) validation_computational_gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct TimestampAsserterConfig {
    pub(crate) min_time_till_end_sec: u64,
}

/// `secrets.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct SecretsConfig {
    pub(crate) l1: L1Secrets,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct L1Secrets {
    pub(crate) l1_rpc_url: String,
}

/// `contracts.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ContractsConfig {
    pub(crate) l1: L1Contracts,
    pub(crate) l2: L2Contracts,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct L1Contracts {
    #[serde(with = "hex_address")]
    pub(crate) base_token_addr: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct L2Contracts {
    #[serde(with = "hex_address")]
    pub(crate) timestamp_asserter_addr: Address,
    #[serde(default, with = "option_hex_address")]
    pub(crate) predeployed_l2_wrapped_base_token_address: Option<Address>,
}

/// `configs/erc20.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct Erc20Config {
    /// Tokens keyed by symbol, in document order.
    pub(crate) tokens: IndexMap<String, L1Token>,
}

/// A token deployed on L1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct L1Token {
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) decimals: u8,
    #[serde(with = "hex_address")]
    pub(crate) address: Address,
}

mod hex_address {
    use alloy_primitives::Address;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

mod option_hex_address {
    use alloy_primitives::Address;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| Address::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
