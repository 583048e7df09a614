//! Client configuration
//!
//! Transport and session settings, loadable from a JSON file. Every field is
//! optional in the file; missing fields keep their defaults.
//!
//! ```json
//! {
//!   "transport": { "port_name": "COM16", "baud_rate": 9600 },
//!   "session": { "response_timeout_ms": 3000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::protocol::{ProtocolError, SessionConfig, TransportConfig};

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Serial transport settings
    pub transport: TransportConfig,
    /// Command session settings
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProtocolError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProtocolError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}
