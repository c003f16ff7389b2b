//! Loads the [TestEnvironment] from the chain's YAML configs.

use super::{
    tokens::{find_base_token, resolve_tokens, select_primary_token},
    wallet::main_wallet_pk,
    LoadOptions, NodeMode, TestEnvironment, VarSource,
};
use crate::{
    config::{
        load_yaml, ChainConfigPaths, ContractsConfig, EcosystemConfig, Erc20Config,
        GeneralConfig, GenesisConfig, SecretsConfig,
    },
    node::NodeSpawner,
    rpc::{L2Rpc, ZkProvider},
};
use alloy_primitives::B256;
use color_eyre::Result;
use tracing::info;

/// Priority transactions are capped at this gas limit in file-based setups.
pub(crate) const PRIORITY_TX_MAX_GAS_LIMIT: u64 = 72_000_000;

/// The folder holding the external node's variant of `general.yaml` and `secrets.yaml`.
const EXTERNAL_NODE_CONFIGS: &str = "external_node";

/// All config documents of one chain.
#[derive(Debug, Clone)]
pub(crate) struct FileConfigs {
    pub(crate) paths: ChainConfigPaths,
    pub(crate) ecosystem: EcosystemConfig,
    pub(crate) genesis: GenesisConfig,
    pub(crate) general: GeneralConfig,
    pub(crate) secrets: SecretsConfig,
    pub(crate) contracts: ContractsConfig,
    pub(crate) erc20: Erc20Config,
}

impl FileConfigs {
    /// Reads the config documents of a chain. The genesis is shared between node kinds, the
    /// general config and secrets are not.
    pub(crate) fn load(paths: ChainConfigPaths, node_mode: NodeMode) -> Result<Self> {
        let suffix = (node_mode == NodeMode::External).then_some(EXTERNAL_NODE_CONFIGS);
        Ok(Self {
            ecosystem: load_yaml(&paths.ecosystem())?,
            genesis: load_yaml(&paths.chain_config("genesis.yaml", None))?,
            general: load_yaml(&paths.chain_config("general.yaml", suffix))?,
            secrets: load_yaml(&paths.chain_config("secrets.yaml", suffix))?,
            contracts: load_yaml(&paths.chain_config("contracts.yaml", None))?,
            erc20: load_yaml(&paths.erc20())?,
            paths,
        })
    }
}

/// Loads the environment of `chain`, spawning the node first when `SPAWN_NODE` is set.
pub(crate) async fn load_from_file(
    chain: &str,
    vars: &VarSource,
    opts: &LoadOptions,
) -> Result<TestEnvironment> {
    let node_mode = if vars.get("EXTERNAL_NODE") == Some("true") {
        NodeMode::External
    } else {
        NodeMode::Main
    };
    let configs = FileConfigs::load(ChainConfigPaths::new(&opts.path_to_home, chain), node_mode)?;
    let rpc = ZkProvider::new_http(&configs.general.api.web3_json_rpc.http_url)?;
    load_with_rpc(&rpc, &configs, node_mode, vars, opts).await
}

/// Resolves the wallet key, spawns and waits for the node if requested, then queries `rpc`.
pub(crate) async fn load_with_rpc<R: L2Rpc + ?Sized>(
    rpc: &R,
    configs: &FileConfigs,
    node_mode: NodeMode,
    vars: &VarSource,
    opts: &LoadOptions,
) -> Result<TestEnvironment> {
    let main_wallet_pk = main_wallet_pk(vars, &opts.path_to_home)?;

    let l2_node_pid = if vars.get("SPAWN_NODE").is_some() {
        // The node may not be running yet, e.g. right after a deployment.
        let auto_kill = vars.get("NO_KILL") != Some("true");
        let spawner = NodeSpawner::new(
            &opts.path_to_home,
            &configs.paths.chain,
            configs.paths.server_log(),
            vars.get("ENABLE_CONSENSUS") == Some("true"),
        )
        .with_program(&opts.zkstack_bin);
        let node = spawner.kill_and_spawn_main_node(auto_kill).await?;
        opts.poll.wait_for_server(rpc).await?;
        Some(node.pid)
    } else {
        None
    };

    build_environment(rpc, configs, node_mode, main_wallet_pk, l2_node_pid).await
}

/// Assembles the environment from the loaded configs and the node's view of its base token.
pub(crate) async fn build_environment<R: L2Rpc + ?Sized>(
    rpc: &R,
    configs: &FileConfigs,
    node_mode: NodeMode,
    main_wallet_pk: B256,
    l2_node_pid: Option<u32>,
) -> Result<TestEnvironment> {
    let FileConfigs {
        paths,
        ecosystem,
        genesis,
        general,
        secrets,
        contracts,
        erc20,
    } = configs;

    let base_token_l1 = rpc.base_token_l1_address().await?;
    let primary = select_primary_token(&erc20.tokens)?;
    let base = find_base_token(erc20.tokens.values(), base_token_l1);
    let (erc20_token, base_token) = resolve_tokens(rpc, primary, base, base_token_l1).await?;

    let env = TestEnvironment {
        path_to_home: paths.path_to_home.clone(),
        network: ecosystem.l1_network.to_lowercase(),
        main_wallet_pk,
        l1_node_url: secrets.l1.l1_rpc_url.clone(),
        l2_node_url: general.api.web3_json_rpc.http_url.clone(),
        ws_l2_node_url: general.api.web3_json_rpc.ws_url.clone(),
        contract_verification_url: Some(format!(
            "http://127.0.0.1:{}",
            general.contract_verifier.port
        )),
        l2_node_pid,
        l2_chain_id: genesis.l2_chain_id,
        node_mode,
        l1_batch_commit_data_generator_mode: genesis.l1_batch_commit_data_generator_mode,
        priority_tx_max_gas_limit: PRIORITY_TX_MAX_GAS_LIMIT,
        validation_computational_gas_limit: general.state_keeper.validation_computational_gas_limit,
        minimal_l2_gas_price: general.state_keeper.minimal_l2_gas_price,
        max_logs_limit: general.api.web3_json_rpc.req_entities_limit,
        healthcheck_port: general.api.healthcheck.port,
        erc20_token,
        base_token,
        timestamp_asserter_address: contracts.l2.timestamp_asserter_addr,
        timestamp_asserter_min_time_till_end_sec: general.timestamp_asserter.min_time_till_end_sec,
        l2_weth_address: contracts.l2.predeployed_l2_wrapped_base_token_address,
    };
    info!(target: "env", "Loaded environment for chain {} (L2 chain ID {})", paths.chain, env.l2_chain_id);
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{tokens::L2_BASE_TOKEN_ADDRESS, DataAvailabilityMode},
        error::HarnessError,
        node::tests::{read_log_until, stub_server},
        readiness::ReadinessPoll,
        rpc::tests::MockNode,
    };
    use alloy_primitives::{address, Address};
    use std::{fs, path::Path, time::Duration};

    const GENERAL: &str = r#"
api:
  web3_json_rpc:
    http_url: http://127.0.0.1:3050
    ws_url: ws://127.0.0.1:3051
    req_entities_limit: 5000
  healthcheck:
    port: 3071
contract_verifier:
  port: 3070
state_keeper:
  minimal_l2_gas_price: 100000000
  validation_computational_gas_limit: 300000
timestamp_asserter:
  min_time_till_end_sec: 60
"#;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Lays out a minimal ecosystem with one chain named `era`.
    fn ecosystem(root: &Path) {
        write(root, "ZkStack.yaml", "l1_network: Localhost\n");
        write(
            root,
            "chains/era/configs/genesis.yaml",
            "l2_chain_id: 271\nl1_batch_commit_data_generator_mode: Validium\n",
        );
        write(root, "chains/era/configs/general.yaml", GENERAL);
        write(
            root,
            "chains/era/configs/external_node/general.yaml",
            &GENERAL.replace("3050", "3060"),
        );
        for dir in ["chains/era/configs", "chains/era/configs/external_node"] {
            write(
                root,
                &format!("{dir}/secrets.yaml"),
                "l1:\n  l1_rpc_url: http://127.0.0.1:8545\n",
            );
        }
        write(
            root,
            "chains/era/configs/contracts.yaml",
            r#"
l1:
  base_token_addr: 0x0000000000000000000000000000000000000001
l2:
  timestamp_asserter_addr: 0x00000000000000000000000000000000000c0ffe
  predeployed_l2_wrapped_base_token_address: 0x0000000000000000000000000000000000000eee
"#,
        );
        write(
            root,
            "configs/erc20.yaml",
            r#"
tokens:
  WETH:
    name: Wrapped Ether
    symbol: WETH
    decimals: 18
    address: 0x0000000000000000000000000000000000000a01
  DAI:
    name: DAI
    symbol: DAI
    decimals: 18
    address: 0x0000000000000000000000000000000000000a02
"#,
        );
    }

    #[tokio::test]
    async fn builds_environment_from_configs() {
        let dir = tempfile::tempdir().unwrap();
        ecosystem(dir.path());
        let configs =
            FileConfigs::load(ChainConfigPaths::new(dir.path(), "era"), NodeMode::Main).unwrap();

        let mut node = MockNode::ready(271);
        node.base_token = address!("0000000000000000000000000000000000000001");
        node.l2_tokens.insert(
            address!("0000000000000000000000000000000000000a02"),
            address!("00000000000000000000000000000000000b0a02"),
        );

        let env = build_environment(&node, &configs, NodeMode::Main, B256::ZERO, None)
            .await
            .unwrap();

        assert_eq!(env.network, "localhost");
        assert_eq!(env.l2_node_url, "http://127.0.0.1:3050");
        assert_eq!(env.l1_node_url, "http://127.0.0.1:8545");
        assert_eq!(env.contract_verification_url.as_deref(), Some("http://127.0.0.1:3070"));
        assert_eq!(env.l2_chain_id, 271);
        assert_eq!(
            env.l1_batch_commit_data_generator_mode,
            DataAvailabilityMode::Validium
        );
        assert_eq!(env.priority_tx_max_gas_limit, PRIORITY_TX_MAX_GAS_LIMIT);
        assert_eq!(env.max_logs_limit, 5000);
        assert_eq!(env.erc20_token.symbol, "DAI");
        assert_eq!(
            env.erc20_token.l2_address,
            address!("00000000000000000000000000000000000b0a02")
        );
        // ETH is not in the registry, so the base token mirrors the test token.
        assert_eq!(env.base_token.symbol, "DAI");
        assert_eq!(env.base_token.l2_address, L2_BASE_TOKEN_ADDRESS);
        assert_eq!(
            env.timestamp_asserter_address,
            address!("00000000000000000000000000000000000c0ffe")
        );
        assert_eq!(
            env.l2_weth_address,
            Some(address!("0000000000000000000000000000000000000eee"))
        );
        assert_eq!(env.l2_node_pid, None);
    }

    #[tokio::test]
    async fn listed_base_token_is_matched() {
        let dir = tempfile::tempdir().unwrap();
        ecosystem(dir.path());
        let configs =
            FileConfigs::load(ChainConfigPaths::new(dir.path(), "era"), NodeMode::Main).unwrap();

        let mut node = MockNode::ready(271);
        node.base_token = address!("0000000000000000000000000000000000000a01");
        node.l2_tokens
            .insert(address!("0000000000000000000000000000000000000a02"), Address::repeat_byte(2));

        let env = build_environment(&node, &configs, NodeMode::Main, B256::ZERO, None)
            .await
            .unwrap();

        assert_eq!(env.base_token.symbol, "WETH");
        assert_eq!(
            env.base_token.l1_address,
            address!("0000000000000000000000000000000000000a01")
        );
    }

    #[test]
    fn external_node_reads_its_own_general_config() {
        let dir = tempfile::tempdir().unwrap();
        ecosystem(dir.path());
        let configs =
            FileConfigs::load(ChainConfigPaths::new(dir.path(), "era"), NodeMode::External)
                .unwrap();
        assert_eq!(configs.general.api.web3_json_rpc.http_url, "http://127.0.0.1:3060");
    }

    #[test]
    fn missing_token_registry_fails() {
        let dir = tempfile::tempdir().unwrap();
        ecosystem(dir.path());
        fs::remove_file(dir.path().join("configs/erc20.yaml")).unwrap();

        let err = FileConfigs::load(ChainConfigPaths::new(dir.path(), "era"), NodeMode::Main)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::MissingConfigFile(_))
        ));
    }

    fn spawning_options(root: &Path) -> LoadOptions {
        LoadOptions {
            path_to_home: root.to_path_buf(),
            poll: ReadinessPoll {
                interval: Duration::from_millis(1),
                max_attempts: 10,
            },
            zkstack_bin: "sh".into(),
        }
    }

    /// A node that refuses `unreachable_for` connections and serves the test ecosystem's tokens.
    fn starting_node(unreachable_for: u32) -> MockNode {
        let mut node = MockNode::ready(271);
        node.unreachable_for = unreachable_for;
        node.base_token = address!("0000000000000000000000000000000000000001");
        node.l2_tokens
            .insert(address!("0000000000000000000000000000000000000a02"), Address::repeat_byte(2));
        node
    }

    #[tokio::test]
    async fn spawned_node_is_awaited_before_queries() {
        let dir = tempfile::tempdir().unwrap();
        ecosystem(dir.path());
        stub_server(dir.path());
        let configs =
            FileConfigs::load(ChainConfigPaths::new(dir.path(), "era"), NodeMode::Main).unwrap();
        let pk = B256::repeat_byte(1).to_string();
        let vars = VarSource::from_iter([
            ("SPAWN_NODE", "1"),
            ("NO_KILL", "true"),
            ("MASTER_WALLET_PK", pk.as_str()),
        ]);
        let node = starting_node(2);

        let opts = spawning_options(dir.path());
        let env = load_with_rpc(&node, &configs, NodeMode::Main, &vars, &opts)
            .await
            .unwrap();

        assert_eq!(node.attempts(), 3);
        assert!(env.l2_node_pid.is_some_and(|pid| pid != 0));
        assert_eq!(env.main_wallet_pk, B256::repeat_byte(1));
        assert_eq!(env.erc20_token.symbol, "DAI");
        read_log_until(&configs.paths.server_log(), "out-line").await;
    }

    #[tokio::test]
    async fn running_node_is_not_spawned() {
        let dir = tempfile::tempdir().unwrap();
        ecosystem(dir.path());
        let configs =
            FileConfigs::load(ChainConfigPaths::new(dir.path(), "era"), NodeMode::Main).unwrap();
        let vars = VarSource::from_iter([("MASTER_WALLET_PK", B256::repeat_byte(1).to_string())]);
        let node = starting_node(0);

        let opts = spawning_options(dir.path());
        let env = load_with_rpc(&node, &configs, NodeMode::Main, &vars, &opts)
            .await
            .unwrap();

        assert_eq!(node.attempts(), 0);
        assert_eq!(env.l2_node_pid, None);
        assert!(!configs.paths.server_log().exists());
    }
}
