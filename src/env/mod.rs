//! Loading of the [TestEnvironment] the integration tests run against.
//!
//! Two strategies exist: a file-based one reading the chain's YAML configs (see [file]) and an
//! env-var based one (see [vars]). Both resolve every configuration value before talking to the
//! node, so configuration errors surface before any RPC traffic.

use crate::{error::HarnessError, readiness::ReadinessPoll};
use alloy_primitives::{Address, B256};
use color_eyre::{eyre::bail, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display, path::PathBuf, str::FromStr};
use tracing::info;

pub(crate) mod file;
pub(crate) mod tokens;
pub(crate) mod vars;
pub(crate) mod wallet;

/// The environment the integration tests run against. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestEnvironment {
    /// The ecosystem root directory.
    pub(crate) path_to_home: PathBuf,
    /// The L1 network name, lower-cased.
    pub(crate) network: String,
    /// The private key of the wallet funding the tests.
    pub(crate) main_wallet_pk: B256,
    /// The L1 RPC endpoint.
    pub(crate) l1_node_url: String,
    /// The L2 HTTP RPC endpoint.
    pub(crate) l2_node_url: String,
    /// The L2 websocket RPC endpoint.
    pub(crate) ws_l2_node_url: String,
    /// The contract verification API, when one is deployed.
    pub(crate) contract_verification_url: Option<String>,
    /// The process ID of the node, if the harness spawned it.
    pub(crate) l2_node_pid: Option<u32>,
    /// The L2 chain ID.
    pub(crate) l2_chain_id: u64,
    /// Whether the tests target the main node or an external node.
    pub(crate) node_mode: NodeMode,
    /// The data availability mode of the chain.
    pub(crate) l1_batch_commit_data_generator_mode: DataAvailabilityMode,
    /// Maximum gas limit of a priority transaction.
    pub(crate) priority_tx_max_gas_limit: u64,
    /// Maximum computational gas a transaction's validation may use.
    pub(crate) validation_computational_gas_limit: u64,
    /// The minimal L2 gas price accepted by the sequencer.
    pub(crate) minimal_l2_gas_price: u64,
    /// Maximum number of entities returned by log queries.
    pub(crate) max_logs_limit: u64,
    /// The port of the node's healthcheck server.
    pub(crate) healthcheck_port: u16,
    /// The ERC-20 token used by the tests.
    pub(crate) erc20_token: Token,
    /// The chain's base token.
    pub(crate) base_token: Token,
    /// The `TimestampAsserter` contract.
    pub(crate) timestamp_asserter_address: Address,
    /// Minimum time before a timestamp range ends for the asserter to accept it.
    pub(crate) timestamp_asserter_min_time_till_end_sec: u64,
    /// The predeployed wrapped base token, if any.
    pub(crate) l2_weth_address: Option<Address>,
}

/// A token known on both layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Token {
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) decimals: u8,
    pub(crate) l1_address: Address,
    pub(crate) l2_address: Address,
}

/// The kind of node under test.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum NodeMode {
    #[default]
    Main,
    External,
}

impl Display for NodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Where the chain publishes its state diffs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum DataAvailabilityMode {
    #[default]
    Rollup,
    Validium,
}

impl FromStr for DataAvailabilityMode {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Rollup" => Ok(Self::Rollup),
            "Validium" => Ok(Self::Validium),
            _ => bail!("Unknown data availability mode: {}", s),
        }
    }
}

impl Display for DataAvailabilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rollup => write!(f, "Rollup"),
            Self::Validium => write!(f, "Validium"),
        }
    }
}

/// Where the environment is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConfigSource {
    /// The YAML configs of the named chain.
    File {
        /// The chain name.
        chain: String,
    },
    /// Process environment variables.
    Env,
}

impl ConfigSource {
    /// File-based configs are used whenever `CHAIN_NAME` is set.
    pub(crate) fn from_vars(vars: &VarSource) -> Self {
        match vars.get("CHAIN_NAME") {
            Some(chain) => Self::File {
                chain: chain.to_string(),
            },
            None => Self::Env,
        }
    }
}

/// Options shared by both loading strategies.
#[derive(Debug, Clone)]
pub(crate) struct LoadOptions {
    /// The ecosystem root directory.
    pub(crate) path_to_home: PathBuf,
    /// The readiness poll used before the first RPC.
    pub(crate) poll: ReadinessPoll,
    /// The CLI that starts the node when `SPAWN_NODE` is set.
    pub(crate) zkstack_bin: PathBuf,
}

/// Loads the [TestEnvironment] from the given source.
pub(crate) async fn load_test_environment(
    source: &ConfigSource,
    vars: &VarSource,
    opts: &LoadOptions,
) -> Result<TestEnvironment> {
    match source {
        ConfigSource::File { chain } => {
            info!(target: "env", "Loading test environment from the configs of chain `{chain}`");
            file::load_from_file(chain, vars, opts).await
        }
        ConfigSource::Env => {
            info!(target: "env", "Loading test environment from environment variables");
            vars::load_from_env(vars, opts).await
        }
    }
}

/// A snapshot of environment variables. Empty values count as unset.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct VarSource(HashMap<String, String>);

impl VarSource {
    /// Snapshot the variables of the current process.
    pub(crate) fn from_process() -> Self {
        std::env::vars().collect()
    }

    /// Returns the value of `name`, if set and non-empty.
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Returns the value of the first of `names` that is set.
    pub(crate) fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    /// Returns the value of `name`, failing with [HarnessError::MissingVariable] if unset.
    pub(crate) fn require(&self, name: &'static str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| HarnessError::MissingVariable(name).into())
    }

    /// Parses the value of `name`, failing if it is unset or malformed.
    pub(crate) fn parse<T>(&self, name: &'static str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.require(name)?;
        parse_value(name, value)
    }

    /// Parses the value of `name` if it is set.
    pub(crate) fn parse_opt<T>(&self, name: &'static str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|value| parse_value(name, value))
            .transpose()
    }
}

fn parse_value<T>(name: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| {
        HarnessError::InvalidVariable {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VarSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
