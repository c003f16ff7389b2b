//! Typed failure classes surfaced by the harness.
//!
//! Everything else flows through [color_eyre::Report]; these variants exist so callers (and
//! tests) can tell a configuration problem from a malformed message with `downcast_ref`.

use alloy_primitives::U256;
use std::path::PathBuf;
use thiserror::Error;

/// The fatal error classes of the harness.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum HarnessError {
    /// A required environment variable is absent or empty.
    #[error("{0} is not defined in the env")]
    MissingVariable(&'static str),
    /// An environment variable is present but could not be parsed.
    #[error("{name} has an invalid value `{value}`: {reason}")]
    InvalidVariable {
        /// The variable name.
        name: &'static str,
        /// The raw value.
        value: String,
        /// Why parsing failed.
        reason: String,
    },
    /// A required configuration file does not exist.
    #[error("config file not found: {}", .0.display())]
    MissingConfigFile(PathBuf),
    /// The node never became ready.
    #[error("failed to wait for the server to start after {attempts} attempts")]
    ServerNotReady {
        /// The number of attempts made.
        attempts: u32,
    },
    /// A trigger message did not carry the expected gas-per-pubdata marker.
    #[error("trigger is not found: gasPerPubdataByteLimit is {gas_per_pubdata}")]
    MalformedTrigger {
        /// The gas-per-pubdata value found in the message.
        gas_per_pubdata: U256,
    },
}
