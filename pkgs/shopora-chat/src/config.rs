use serde::{Deserialize, Serialize};
use shopora_store::{HistoryConfig, RETENTION_WINDOW_MS};
use std::path::PathBuf;
use std::time::Duration;

/// Storefront backend hosting both the REST API and the Socket.IO endpoint
pub const DEFAULT_BACKEND_URL: &str = "https://shopora-backend-deploy.onrender.com";

/// Address every customer message is sent to
pub const DEFAULT_SUPPORT_ADDRESS: &str = "admin@shopora.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Socket.IO server base URL (http(s) or ws(s))
    pub server_url: String,

    /// REST API base URL used for identity lookup and sign-out
    pub api_url: String,

    /// Recipient of outgoing messages; messages from it mark the admin as connected
    pub support_address: String,

    /// How long messages are kept, in seconds
    pub retention_secs: u64,

    /// Path to the SQLite history database
    pub db_path: PathBuf,

    /// Transport connect timeout, in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let mut db_path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        db_path.push(".shopora");
        db_path.push("chat.db");

        Self {
            server_url: DEFAULT_BACKEND_URL.to_string(),
            api_url: DEFAULT_BACKEND_URL.to_string(),
            support_address: DEFAULT_SUPPORT_ADDRESS.to_string(),
            retention_secs: (RETENTION_WINDOW_MS / 1000) as u64,
            db_path,
            connect_timeout_secs: 10,
        }
    }
}

impl ChatConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            retention: self.retention(),
        }
    }

    pub fn apply(&mut self, updates: ChatConfigUpdates) {
        if let Some(server_url) = updates.server_url {
            self.server_url = server_url;
        }
        if let Some(api_url) = updates.api_url {
            self.api_url = api_url;
        }
        if let Some(support_address) = updates.support_address {
            self.support_address = support_address;
        }
        if let Some(retention_secs) = updates.retention_secs {
            self.retention_secs = retention_secs;
        }
        if let Some(db_path) = updates.db_path {
            self.db_path = db_path;
        }
        if let Some(connect_timeout_secs) = updates.connect_timeout_secs {
            self.connect_timeout_secs = connect_timeout_secs;
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatConfigUpdates {
    pub server_url: Option<String>,
    pub api_url: Option<String>,
    pub support_address: Option<String>,
    pub retention_secs: Option<u64>,
    pub db_path: Option<PathBuf>,
    pub connect_timeout_secs: Option<u64>,
}
