//! Loads the [TestEnvironment] from environment variables.
//!
//! Unlike the file-based strategy, nothing is guessed here: every required variable that is
//! missing is a [HarnessError::MissingVariable].

use super::{
    tokens::{find_listed_base_token, resolve_tokens, select_primary_token_from_list},
    wallet::main_wallet_pk,
    DataAvailabilityMode, LoadOptions, NodeMode, TestEnvironment, VarSource,
};
use crate::{
    config::L1Token,
    error::HarnessError,
    rpc::{L2Rpc, ZkProvider},
};
use alloy_primitives::{Address, B256};
use color_eyre::{eyre::WrapErr, Result};
use std::{fs, path::Path};
use tracing::{debug, info};

/// The healthcheck port of a node started with default settings.
const DEFAULT_HEALTHCHECK_PORT: u16 = 3071;

/// Every setting the env-var strategy reads, resolved before any RPC is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EnvVarsConfig {
    pub(crate) network: String,
    pub(crate) l2_node_url: String,
    pub(crate) l1_node_url: String,
    pub(crate) ws_l2_node_url: String,
    pub(crate) contract_verification_url: Option<String>,
    pub(crate) l2_chain_id: u64,
    pub(crate) l1_batch_commit_data_generator_mode: DataAvailabilityMode,
    pub(crate) minimal_l2_gas_price: u64,
    pub(crate) node_mode: NodeMode,
    pub(crate) validation_computational_gas_limit: u64,
    pub(crate) priority_tx_max_gas_limit: u64,
    pub(crate) max_logs_limit: u64,
    pub(crate) healthcheck_port: u16,
    pub(crate) timestamp_asserter_address: Address,
    pub(crate) timestamp_asserter_min_time_till_end_sec: u64,
}

impl EnvVarsConfig {
    /// Reads the settings from `vars`, failing on the first missing or malformed one.
    pub(crate) fn from_vars(vars: &VarSource) -> Result<Self> {
        let network = vars.get("CHAIN_ETH_NETWORK").unwrap_or("localhost").to_string();
        let l2_node_url = vars
            .first_of(&["ZKSYNC_WEB3_API_URL", "API_WEB3_JSON_RPC_HTTP_URL"])
            .ok_or(HarnessError::MissingVariable("ZKSYNC_WEB3_API_URL"))?
            .to_string();
        let l1_node_url = vars
            .first_of(&["BRIDGE_LAYER_WEB3_URL", "L1_RPC_ADDRESS", "ETH_CLIENT_WEB3_URL"])
            .ok_or(HarnessError::MissingVariable("ETH_CLIENT_WEB3_URL"))?
            .to_string();
        let ws_l2_node_url = vars
            .first_of(&["ZKSYNC_WEB3_WS_API_URL", "API_WEB3_JSON_RPC_WS_URL"])
            .ok_or(HarnessError::MissingVariable("ZKSYNC_WEB3_WS_API_URL"))?
            .to_string();

        // External nodes may run without a contract verifier.
        let is_external_env = vars
            .get("ZKSYNC_ENV")
            .is_some_and(|env| env.starts_with("ext-node"));
        let contract_verification_url = if is_external_env {
            vars.get("CONTRACT_VERIFIER_URL").map(str::to_string)
        } else {
            Some(vars.require("CONTRACT_VERIFIER_URL")?.to_string())
        };

        let l1_batch_commit_data_generator_mode = vars
            .first_of(&[
                "CHAIN_STATE_KEEPER_L1_BATCH_COMMIT_DATA_GENERATOR_MODE",
                "EN_L1_BATCH_COMMIT_DATA_GENERATOR_MODE",
            ])
            .map(str::parse::<DataAvailabilityMode>)
            .transpose()?
            .unwrap_or_default();
        let node_mode = if vars.get("EN_MAIN_NODE_URL").is_some() {
            NodeMode::External
        } else {
            NodeMode::Main
        };

        let max_logs_limit: u64 = match vars.parse_opt("EN_REQ_ENTITIES_LIMIT")? {
            Some(limit) => limit,
            None => vars.parse("API_WEB3_JSON_RPC_REQ_ENTITIES_LIMIT")?,
        };

        Ok(Self {
            network,
            l2_node_url,
            l1_node_url,
            ws_l2_node_url,
            contract_verification_url,
            l2_chain_id: vars.parse("CHAIN_ETH_ZKSYNC_NETWORK_ID")?,
            l1_batch_commit_data_generator_mode,
            minimal_l2_gas_price: vars
                .parse_opt("CHAIN_STATE_KEEPER_MINIMAL_L2_GAS_PRICE")?
                .unwrap_or(0),
            node_mode,
            validation_computational_gas_limit: vars
                .parse("CHAIN_STATE_KEEPER_VALIDATION_COMPUTATIONAL_GAS_LIMIT")?,
            priority_tx_max_gas_limit: vars.parse("CONTRACTS_PRIORITY_TX_MAX_GAS_LIMIT")?,
            max_logs_limit,
            healthcheck_port: vars
                .parse_opt("API_HEALTHCHECK_PORT")?
                .unwrap_or(DEFAULT_HEALTHCHECK_PORT),
            timestamp_asserter_address: vars.parse("CONTRACTS_L2_TIMESTAMP_ASSERTER_ADDR")?,
            timestamp_asserter_min_time_till_end_sec: vars
                .parse("TIMESTAMP_ASSERTER_MIN_TIME_TILL_END_SEC")?,
        })
    }
}

/// Reads the legacy token list `etc/tokens/<network>.json`. A missing list is empty.
pub(crate) fn load_token_list(path_to_home: &Path, network: &str) -> Result<Vec<L1Token>> {
    let path = path_to_home.join("etc/tokens").join(format!("{network}.json"));
    if !path.exists() {
        debug!(target: "env", "No token list at {}", path.display());
        return Ok(Vec::new());
    }
    serde_json::from_str(&fs::read_to_string(&path)?)
        .wrap_err_with(|| format!("Failed to parse {}", path.display()))
}

/// Loads the environment from the process variables, waiting for the node before querying it.
pub(crate) async fn load_from_env(vars: &VarSource, opts: &LoadOptions) -> Result<TestEnvironment> {
    let config = EnvVarsConfig::from_vars(vars)?;
    let rpc = ZkProvider::new_http(&config.l2_node_url)?;
    load_with_rpc(&rpc, config, vars, opts).await
}

/// Resolves the wallet key and token list, then waits for `rpc` before querying it.
pub(crate) async fn load_with_rpc<R: L2Rpc + ?Sized>(
    rpc: &R,
    config: EnvVarsConfig,
    vars: &VarSource,
    opts: &LoadOptions,
) -> Result<TestEnvironment> {
    let main_wallet_pk = main_wallet_pk(vars, &opts.path_to_home)?;
    let tokens = load_token_list(&opts.path_to_home, &config.network)?;

    opts.poll.wait_for_server(rpc).await?;

    build_environment(rpc, config, &tokens, &opts.path_to_home, main_wallet_pk).await
}

/// Assembles the environment from the resolved settings and the node's view of its base token.
pub(crate) async fn build_environment<R: L2Rpc + ?Sized>(
    rpc: &R,
    config: EnvVarsConfig,
    tokens: &[L1Token],
    path_to_home: &Path,
    main_wallet_pk: B256,
) -> Result<TestEnvironment> {
    let base_token_l1 = rpc.base_token_l1_address().await?;
    let primary = select_primary_token_from_list(tokens)?;
    let base = find_listed_base_token(tokens, base_token_l1);
    let (erc20_token, base_token) = resolve_tokens(rpc, primary, base, base_token_l1).await?;

    info!(target: "env", "Loaded environment for L2 chain ID {}", config.l2_chain_id);
    Ok(TestEnvironment {
        path_to_home: path_to_home.to_path_buf(),
        network: config.network,
        main_wallet_pk,
        l1_node_url: config.l1_node_url,
        l2_node_url: config.l2_node_url,
        ws_l2_node_url: config.ws_l2_node_url,
        contract_verification_url: config.contract_verification_url,
        l2_node_pid: None,
        l2_chain_id: config.l2_chain_id,
        node_mode: config.node_mode,
        l1_batch_commit_data_generator_mode: config.l1_batch_commit_data_generator_mode,
        priority_tx_max_gas_limit: config.priority_tx_max_gas_limit,
        validation_computational_gas_limit: config.validation_computational_gas_limit,
        minimal_l2_gas_price: config.minimal_l2_gas_price,
        max_logs_limit: config.max_logs_limit,
        healthcheck_port: config.healthcheck_port,
        erc20_token,
        base_token,
        timestamp_asserter_address: config.timestamp_asserter_address,
        timestamp_asserter_min_time_till_end_sec: config.timestamp_asserter_min_time_till_end_sec,
        l2_weth_address: None,
    })
}
