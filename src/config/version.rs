//! Tool-version gating for patch sets.
//!
//! A patch set may declare `requires = ">=0.1.0, <0.3.0"` in its `[meta]`
//! table; loading fails when the running tool does not satisfy it.

use semver::{Version, VersionReq};
use thiserror::Error;

/// Version of this tool.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{value}': {message}")]
    InvalidVersion { value: String, message: String },

    #[error("invalid version requirement '{value}': {message}")]
    InvalidRequirement { value: String, message: String },

    #[error("patch set requires tool version {required}, running {running}")]
    Unsatisfied { required: String, running: String },
}

/// Check `version` against an optional requirement string.
///
/// A missing or blank requirement accepts every version.
///
/// ```
/// use anchor_patch::config::version::check_requirement;
///
/// assert!(check_requirement("0.1.0", Some(">=0.1.0")).is_ok());
/// assert!(check_requirement("0.1.0", Some(">=0.2.0")).is_err());
/// assert!(check_requirement("9.9.9", None).is_ok());
/// ```
pub fn check_requirement(version: &str, requirement: Option<&str>) -> Result<(), VersionError> {
    let Some(req_str) = requirement.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(());
    };

    let parsed = Version::parse(version).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        message: e.to_string(),
    })?;
    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        message: e.to_string(),
    })?;

    if req.matches(&parsed) {
        Ok(())
    } else {
        Err(VersionError::Unsatisfied {
            required: req_str.to_string(),
            running: version.to_string(),
        })
    }
}

/// Check a requirement against the running tool.
pub fn check_tool_requirement(requirement: Option<&str>) -> Result<(), VersionError> {
    check_requirement(TOOL_VERSION, requirement)
}
