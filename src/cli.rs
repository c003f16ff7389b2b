//! CLI definition for `l2t`.

use crate::{
    env::{load_test_environment, ConfigSource, LoadOptions, TestEnvironment, Token, VarSource},
    interop::{get_interop_bundle_data, get_interop_trigger_data, Output},
    node::DEFAULT_ZKSTACK_BIN,
    readiness::ReadinessPoll,
    rpc::ZkProvider,
};
use alloy_primitives::B256;
use clap::{ArgAction, Args, Parser, Subcommand};
use cli_table::{Cell, Style, Table};
use color_eyre::{eyre::eyre, owo_colors::OwoColorize, Result};
use itertools::Itertools;
use serde::Serialize;
use std::{path::PathBuf, time::Duration};
use tracing::{info, Level};

/// The CLI options for `l2t`.
#[derive(Parser, Debug, Clone)]
pub(crate) struct Cli {
    /// Verbosity level (0-2)
    #[arg(long, short, action = ArgAction::Count)]
    pub v: u8,
    /// The subcommand to run.
    #[clap(subcommand)]
    pub subcommand: CliSubcommand,
}

impl Cli {
    /// Parses the CLI arguments and runs the application.
    pub(crate) async fn run(self) -> Result<()> {
        match self.subcommand {
            CliSubcommand::Env(cfg) => {
                let vars = VarSource::from_process();
                let source = ConfigSource::from_vars(&vars);
                let opts = LoadOptions {
                    path_to_home: cfg.home,
                    poll: cfg.poll.into(),
                    zkstack_bin: cfg.zkstack_bin,
                };
                let env = load_test_environment(&source, &vars, &opts).await?;
                print_environment(&env)?;
            }
            CliSubcommand::Wait(cfg) => {
                let rpc = ZkProvider::new_http(&cfg.l2_rpc)?;
                let attempts = ReadinessPoll::from(cfg.poll).wait_for_server(&rpc).await?;
                info!(target: "cli", "{} is ready ({attempts} attempt(s))", cfg.l2_rpc);
            }
            CliSubcommand::Bundle(cfg) => {
                let rpc = ZkProvider::new_http(&cfg.l2_rpc)?;
                let output = get_interop_bundle_data(&rpc, cfg.hash, cfg.index).await?;
                print_output(&output)?;
            }
            CliSubcommand::Trigger(cfg) => {
                let rpc = ZkProvider::new_http(&cfg.l2_rpc)?;
                let output = get_interop_trigger_data(&rpc, cfg.hash, cfg.index).await?;
                print_output(&output)?;
            }
        }
        Ok(())
    }

    /// Initializes the tracing subscriber
    ///
    /// # Arguments
    /// * `verbosity_level` - The verbosity level (0-2)
    ///
    /// # Returns
    /// * `Result<()>` - Ok if successful, Err otherwise.
    pub(crate) fn init_tracing_subscriber(self) -> Result<Self> {
        color_eyre::install()?;

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match self.v {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .finish();

        tracing::subscriber::set_global_default(subscriber).map_err(|e| eyre!(e))?;

        Ok(self)
    }
}

/// Prints the environment as a two-column table.
fn print_environment(env: &TestEnvironment) -> Result<()> {
    let or_none = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    let rows = vec![
        ("Home", env.path_to_home.display().to_string()),
        ("Network", env.network.clone()),
        ("Node mode", env.node_mode.to_string()),
        ("L1 RPC", env.l1_node_url.clone()),
        ("L2 RPC", env.l2_node_url.clone()),
        ("L2 WS RPC", env.ws_l2_node_url.clone()),
        ("Contract verifier", or_none(env.contract_verification_url.clone())),
        ("Node PID", or_none(env.l2_node_pid.map(|pid| pid.to_string()))),
        ("L2 chain ID", env.l2_chain_id.to_string()),
        ("DA mode", env.l1_batch_commit_data_generator_mode.to_string()),
        ("Priority tx gas limit", env.priority_tx_max_gas_limit.to_string()),
        (
            "Validation gas limit",
            env.validation_computational_gas_limit.to_string(),
        ),
        ("Minimal L2 gas price", env.minimal_l2_gas_price.to_string()),
        ("Max logs limit", env.max_logs_limit.to_string()),
        ("Healthcheck port", env.healthcheck_port.to_string()),
        ("ERC-20 token", describe_token(&env.erc20_token)),
        ("Base token", describe_token(&env.base_token)),
        ("Timestamp asserter", env.timestamp_asserter_address.to_string()),
        (
            "Asserter min time till end",
            format!("{}s", env.timestamp_asserter_min_time_till_end_sec),
        ),
        ("L2 WETH", or_none(env.l2_weth_address.map(|a| a.to_string()))),
    ];

    let table = rows
        .into_iter()
        .map(|(field, value)| vec![field.green().to_string().cell(), value.cell()])
        .collect::<Vec<_>>()
        .table()
        .title(vec!["Field".cell(), "Value".cell()])
        .bold(true);
    cli_table::print_stdout(table)?;
    Ok(())
}

fn describe_token(token: &Token) -> String {
    let meta = [
        token.symbol.magenta().to_string(),
        format!("{} decimals", token.decimals),
        format!("L1 {}", token.l1_address),
        format!("L2 {}", token.l2_address),
    ];
    meta.iter().join(", ")
}

/// Prints a decoded interop message, with its re-encodings, as JSON.
fn print_output<T: Serialize>(output: &Output<T>) -> Result<()> {
    if !output.is_found() {
        info!(target: "cli", "No interop message found for the withdrawal");
    }
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliSubcommand {
    /// Loads the test environment and prints it.
    Env(EnvConfig),
    /// Waits until a node is ready.
    Wait(WaitConfig),
    /// Decodes the interop bundle sent by a transaction.
    Bundle(MessageConfig),
    /// Decodes the interop trigger sent by a transaction.
    Trigger(MessageConfig),
}

#[derive(Args, Debug, Clone, Copy)]
pub(crate) struct PollConfig {
    /// Milliseconds between two readiness checks.
    #[clap(long, default_value = "1000")]
    pub(crate) interval_ms: u64,
    /// Readiness checks before giving up.
    #[clap(long, default_value = "180")]
    pub(crate) max_attempts: u32,
}

impl From<PollConfig> for ReadinessPoll {
    fn from(cfg: PollConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.interval_ms),
            max_attempts: cfg.max_attempts,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct EnvConfig {
    /// The ecosystem root directory.
    #[clap(long, env = "ZKSYNC_HOME", default_value = ".")]
    pub(crate) home: PathBuf,
    /// The `zkstack` binary used to spawn the node.
    #[clap(long, env = "ZKSTACK_BIN", default_value = DEFAULT_ZKSTACK_BIN)]
    pub(crate) zkstack_bin: PathBuf,
    #[clap(flatten)]
    pub(crate) poll: PollConfig,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct WaitConfig {
    /// The L2 RPC
    #[clap(long, env = "L2_RPC")]
    pub(crate) l2_rpc: String,
    #[clap(flatten)]
    pub(crate) poll: PollConfig,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct MessageConfig {
    /// The L2 RPC
    #[clap(long, env = "L2_RPC")]
    pub(crate) l2_rpc: String,
    /// The hash of the transaction that sent the message.
    #[clap(long)]
    pub(crate) hash: B256,
    /// The index of the message among the transaction's L1 messages.
    #[clap(long, default_value = "0")]
    pub(crate) index: usize,
}
