// Application state module
// Read-only state shared by every connection task

use std::path::{Path, PathBuf};

use super::types::Config;
use crate::logger;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Document root, canonicalized at startup when it exists
    pub root: PathBuf,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let configured = PathBuf::from(&config.root.dir);
        let root = match configured.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                // Requests resolve to 404 until the directory appears
                logger::log_warning(&format!(
                    "Document root '{}' is not accessible: {e}",
                    configured.display()
                ));
                configured
            }
        };

        Self { config, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn access_log_enabled(&self) -> bool {
        self.config.logging.access_log
    }
}
