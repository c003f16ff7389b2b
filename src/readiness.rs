//! Polls a node until its RPC answers and its shared L2 bridge is deployed.

use crate::{error::HarnessError, rpc::L2Rpc};
use color_eyre::{eyre::eyre, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{info, warn};

/// Fixed-interval readiness poll.
///
/// Server startup may take a long time on staging, hence the generous default budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadinessPoll {
    /// Pause between two attempts.
    pub(crate) interval: Duration,
    /// Number of attempts before giving up.
    pub(crate) max_attempts: u32,
}

impl Default for ReadinessPoll {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 3 * 60,
        }
    }
}

impl ReadinessPoll {
    /// Waits until the node is ready, returning the number of attempts it took.
    ///
    /// Attempt failures are logged and retried. Only exhausting the attempt budget is an error
    /// ([HarnessError::ServerNotReady]).
    pub(crate) async fn wait_for_server<R: L2Rpc + ?Sized>(&self, rpc: &R) -> Result<u32> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {wide_msg}")?.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        pb.set_message("Connecting to server");

        for attempt in 1..=self.max_attempts {
            match check_server(rpc).await {
                Ok(()) => {
                    pb.finish_with_message("Connected to server");
                    info!(target: "readiness", "Server is ready after {attempt} attempt(s)");
                    return Ok(attempt);
                }
                Err(e) => {
                    warn!(target: "readiness", "Attempt #{attempt} to check the server readiness failed: {e}");
                    pb.tick();
                    tokio::time::sleep(self.interval).await;
                }
            }
        }

        pb.abandon_with_message("Failed to connect to server");
        Err(HarnessError::ServerNotReady {
            attempts: self.max_attempts,
        }
        .into())
    }
}

/// A single readiness attempt.
async fn check_server<R: L2Rpc + ?Sized>(rpc: &R) -> Result<()> {
    // Fails if the server is not up yet.
    rpc.chain_id().await?;

    let bridge = rpc
        .bridge_contracts()
        .await?
        .l2_shared_default_bridge
        .ok_or_else(|| eyre!("shared L2 bridge is not configured yet"))?;
    let code = rpc.code_at(bridge).await?;
    if code.is_empty() {
        return Err(eyre!("L2 ERC20 bridge is not deployed yet, server is not ready"));
    }
    Ok(())
}
