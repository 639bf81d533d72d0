//! Error types for link shaping

use scenarios::ScenarioError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShapingError {
    #[error("Command error: {0}")]
    Command(#[from] std::io::Error),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Permission denied (requires root privileges)")]
    PermissionDenied,

    #[error("tc {args} rejected: {stderr}")]
    Rejected { args: String, stderr: String },

    #[error("Invalid shaping request: {0}")]
    InvalidRequest(#[from] ScenarioError),
}

impl ShapingError {
    /// Map a failed tc invocation to the closest error variant
    pub fn from_tc_failure(interface: &str, args: &[String], stderr: &str) -> Self {
        let stderr = stderr.trim();
        if stderr.contains("Cannot find device") {
            ShapingError::InterfaceNotFound(interface.to_string())
        } else if stderr.contains("Operation not permitted")
            || stderr.contains("a password is required")
        {
            ShapingError::PermissionDenied
        } else {
            ShapingError::Rejected {
                args: args.join(" "),
                stderr: stderr.to_string(),
            }
        }
    }
}

/// True when tc complains only that there was nothing to delete
pub fn is_missing_qdisc(stderr: &str) -> bool {
    [
        "No such file or directory",
        "Cannot delete qdisc with handle of zero",
        "Cannot find specified qdisc",
    ]
    .iter()
    .any(|needle| stderr.contains(needle))
}
