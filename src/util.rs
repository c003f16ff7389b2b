//! Utilities for the `l2t` binary.

use color_eyre::Result;
use std::{
    fs::{self, File, OpenOptions},
    path::Path,
    process::ExitStatus,
};
use tokio::{process::Command, try_join};

/// Runs a command in a child process, discarding its output.
///
/// ## Takes
/// - `cmd` - The command to run.
///
/// ## Returns
/// - `Result<ExitStatus>` - Ok if the process could be run, Err otherwise.
pub(crate) async fn run_cmd(cmd: &mut Command) -> Result<ExitStatus> {
    let mut child = cmd.kill_on_drop(true).spawn()?;
    let proc_handle = tokio::spawn(async move { child.wait().await });

    let (proc_res,) = try_join!(proc_handle)?;
    proc_res.map_err(Into::into)
}

/// Opens a log file for appending, creating it and its parent directories if needed.
///
/// The file is synced before it is returned, so output written by a child process that inherits
/// it lands after everything already on disk.
pub(crate) fn open_append_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.sync_all()?;
    Ok(file)
}
