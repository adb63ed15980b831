//! Proc-receive configuration parsing from Git config.

use crate::Error;
use gix_config::File;
use gix_object::bstr::BStr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for proc-receive protocol handling.
///
/// This struct holds configuration values that control proc-receive
/// protocol negotiation and helper execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcReceiveConfig {
    /// Whether proc-receive protocol is enabled
    pub enabled: bool,
    /// Path to the proc-receive helper executable
    pub helper_path: Option<PathBuf>,
    /// Protocol version to negotiate (default: 1)
    pub version: u32,
    /// Timeout for helper operations in milliseconds
    pub timeout_ms: u64,
}

impl ProcReceiveConfig {
    /// Create a new ProcReceiveConfig with default settings.
    pub fn new() -> Self {
        Self {
            enabled: false,
            helper_path: None,
            version: 1,
            timeout_ms: 30_000, // 30 seconds default
        }
    }

    /// Load proc-receive configuration from a Git config file.
    ///
    /// This method parses the following configuration keys:
    /// - `procReceive.enabled`: Boolean, enable proc-receive protocol (default: false)
    /// - `procReceive.helperPath`: String, path to helper executable
    /// - `procReceive.version`: Integer, protocol version (default: 1)
    /// - `procReceive.timeout`: Integer, timeout in milliseconds (default: 30000)
    ///
    /// # Arguments
    /// * `config` - Git configuration file to parse
    ///
    /// # Returns
    /// A ProcReceiveConfig with parsed settings, or Error if parsing fails
    pub fn from_config(config: &File<'static>) -> Result<Self, Error> {
        let mut proc_config = Self::new();

        // Parse procReceive.enabled
        if let Some(result) = config.boolean("procReceive.enabled") {
            match result {
                Ok(value) => proc_config.enabled = value,
                Err(e) => return Err(Error::Validation(format!("invalid boolean value for 'procReceive.enabled': {}", e))),
            }
        }

        // Parse procReceive.helperPath
        if let Some(value) = config.string("procReceive.helperPath") {
            proc_config.helper_path = Some(parse_path_from_string(&value, "procReceive.helperPath")?);
        }

        // Parse procReceive.version
        if let Some(result) = config.integer("procReceive.version") {
            match result {
                Ok(value) => proc_config.version = parse_version_from_integer(value, "procReceive.version")?,
                Err(e) => return Err(Error::Validation(format!("invalid integer value for 'procReceive.version': {}", e))),
            }
        }

        // Parse procReceive.timeout
        if let Some(result) = config.integer("procReceive.timeout") {
            match result {
                Ok(value) => proc_config.timeout_ms = parse_timeout_from_integer(value, "procReceive.timeout")?,
                Err(e) => return Err(Error::Validation(format!("invalid integer value for 'procReceive.timeout': {}", e))),
            }
        }

        Ok(proc_config)
    }

    /// Check if proc-receive is enabled and has a helper path configured.
    pub fn is_available(&self) -> bool {
        self.enabled && self.helper_path.is_some()
    }

    /// Get the helper path if available.
    pub fn helper_path(&self) -> Option<&PathBuf> {
        self.helper_path.as_ref()
    }

    /// Get the timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the protocol version.
    pub fn protocol_version(&self) -> u32 {
        self.version
    }

    /// Check if proc-receive is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProcReceiveConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a file path configuration value from a string.
fn parse_path_from_string(value: &std::borrow::Cow<'_, BStr>, key: &str) -> Result<PathBuf, Error> {
    let path_str = std::str::from_utf8(value.as_ref())
        .map_err(|e| Error::Validation(format!("invalid UTF-8 in '{}': {}", key, e)))?;
    
    if path_str.is_empty() {
        return Err(Error::Validation(format!(
            "empty path value for '{}'",
            key
        )));
    }
    
    Ok(PathBuf::from(path_str))
}

/// Parse a protocol version value from an i64.
fn parse_version_from_integer(value: i64, key: &str) -> Result<u32, Error> {
    if value < 1 {
        return Err(Error::Validation(format!(
            "protocol version for '{}' must be at least 1, got: {}",
            key, value
        )));
    }
    
    Ok(value as u32)
}

/// Parse a timeout value in milliseconds from an i64.
fn parse_timeout_from_integer(value: i64, key: &str) -> Result<u64, Error> {
    if value < 0 {
        return Err(Error::Validation(format!(
            "timeout value for '{}' must be non-negative, got: {}",
            key, value
        )));
    }
    
    Ok(value as u64)
}
