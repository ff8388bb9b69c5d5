use log::{debug, info};

/// Scoped logger handed to each stage so messages carry the beam they concern.
#[derive(Debug, Clone)]
pub struct LogManager {
    scope: String,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            scope: "mosaic".to_string(),
        }
    }

    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            scope: format!("{}/{}", self.scope, scope),
        }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.scope, message);
    }

    pub fn detail(&self, message: &str) {
        debug!("[{}] {}", self.scope, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
