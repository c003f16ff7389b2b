//! Spawning of the main node under test.

use crate::util::{open_append_log, run_cmd};
use color_eyre::{eyre::eyre, Result};
use std::{path::PathBuf, process::Stdio};
use tokio::process::Command;
use tracing::{info, warn};

/// The components the node runs with when consensus is enabled.
const CONSENSUS_COMPONENTS: &str =
    "api,tree,eth,state_keeper,da_dispatcher,vm_runner_protective_reads,consensus";

/// The CLI that starts the node.
pub(crate) const DEFAULT_ZKSTACK_BIN: &str = "zkstack";

/// The name of the node's process, as seen by `killall`.
const SERVER_PROCESS_NAME: &str = "zksync_server";

/// Starts the main node of a chain through `zkstack`, appending its output to the chain's server
/// log.
#[derive(Debug, Clone)]
pub(crate) struct NodeSpawner {
    program: PathBuf,
    path_to_home: PathBuf,
    chain: String,
    log_path: PathBuf,
    enable_consensus: bool,
}

/// A node started by a [NodeSpawner]. The process is detached and outlives the harness; the
/// next spawn with `auto_kill` set tears it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SpawnedNode {
    pub(crate) pid: u32,
}

impl NodeSpawner {
    pub(crate) fn new(
        path_to_home: impl Into<PathBuf>,
        chain: &str,
        log_path: PathBuf,
        enable_consensus: bool,
    ) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_ZKSTACK_BIN),
            path_to_home: path_to_home.into(),
            chain: chain.to_string(),
            log_path,
            enable_consensus,
        }
    }

    /// Starts the node through `program` instead of `zkstack`.
    pub(crate) fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Builds the `zkstack server` invocation for the chain.
    pub(crate) fn server_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["server", "--ignore-prerequisites", "--chain", &self.chain])
            .current_dir(&self.path_to_home)
            .kill_on_drop(false);
        if self.enable_consensus {
            cmd.arg(format!("--components={CONSENSUS_COMPONENTS}"));
        }
        cmd
    }

    /// Kills every running node process. Failures are logged and otherwise ignored, e.g. when no
    /// node is running.
    pub(crate) async fn kill_all(&self) {
        match run_cmd(Command::new("killall").args(["-KILL", SERVER_PROCESS_NAME])).await {
            Ok(status) if status.success() => {
                info!(target: "node", "Killed running {SERVER_PROCESS_NAME} processes")
            }
            Ok(status) => {
                warn!(target: "node", "Ignored error: killall exited with {status}")
            }
            Err(e) => warn!(target: "node", "Ignored error: {e}"),
        }
    }

    /// Optionally kills the running nodes, then spawns a fresh main node in the background.
    pub(crate) async fn kill_and_spawn_main_node(&self, auto_kill: bool) -> Result<SpawnedNode> {
        if auto_kill {
            self.kill_all().await;
        }

        let log = open_append_log(&self.log_path)?;
        let child = self
            .server_command()
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| eyre!("The spawned node exited before reporting its PID"))?;

        info!(
            target: "node",
            "Spawned main node for chain {} (PID {pid}), logging to {}",
            self.chain,
            self.log_path.display()
        );
        Ok(SpawnedNode { pid })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{ffi::OsStr, fs, path::Path, time::Duration};

    fn args(cmd: &Command) -> Vec<&OsStr> {
        cmd.as_std().get_args().collect()
    }

    #[test]
    fn server_command_without_consensus() {
        let spawner = NodeSpawner::new("/home/zk", "era", PathBuf::from("server.log"), false);
        let cmd = spawner.server_command();

        assert_eq!(cmd.as_std().get_program(), "zkstack");
        assert_eq!(
            args(&cmd),
            ["server", "--ignore-prerequisites", "--chain", "era"]
        );
        assert_eq!(cmd.as_std().get_current_dir(), Some(Path::new("/home/zk")));
    }

    #[test]
    fn server_command_with_consensus() {
        let spawner = NodeSpawner::new("/home/zk", "era", PathBuf::from("server.log"), true);
        let cmd = spawner.server_command();

        assert_eq!(
            args(&cmd).last().copied(),
            Some(OsStr::new(
                "--components=api,tree,eth,state_keeper,da_dispatcher,vm_runner_protective_reads,consensus"
            ))
        );
    }

    /// Writes a `server` script that `sh server ...` runs in place of the node.
    pub(crate) fn stub_server(home: &Path) {
        fs::write(home.join("server"), "echo out-line\necho err-line >&2\n").unwrap();
    }

    /// Waits for the detached node to write `expected` to its log.
    pub(crate) async fn read_log_until(path: &Path, expected: &str) -> String {
        for _ in 0..500 {
            let log = fs::read_to_string(path).unwrap_or_default();
            if log.contains(expected) {
                return log;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never contained {expected:?}", path.display());
    }

    #[tokio::test]
    async fn spawned_node_appends_both_streams_to_log() {
        let dir = tempfile::tempdir().unwrap();
        stub_server(dir.path());
        let log_path = dir.path().join("logs/server/era/server.log");
        fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        fs::write(&log_path, "previous\n").unwrap();

        let node = NodeSpawner::new(dir.path(), "era", log_path.clone(), false)
            .with_program("sh")
            .kill_and_spawn_main_node(false)
            .await
            .unwrap();

        assert_ne!(node.pid, 0);
        let log = read_log_until(&log_path, "err-line").await;
        assert_eq!(log, "previous\nout-line\nerr-line\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeSpawner::new(dir.path(), "era", dir.path().join("server.log"), false)
            .with_program(dir.path().join("no-such-zkstack"))
            .kill_and_spawn_main_node(false)
            .await;
        assert!(result.is_err());
    }
}
