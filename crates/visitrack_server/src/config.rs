//! Server configuration.

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page size used when a query asks for zero rows.
    pub default_page_size: u32,
    /// Largest page a query may ask for.
    pub max_page_size: u32,
    /// Largest batch `register` accepts.
    pub max_register_batch: usize,
    /// Whether finalization is allowed.
    pub allow_finalize: bool,
    /// Whether host notifications are delivered.
    pub notify_hosts: bool,
    /// Whether subject notifications are delivered.
    pub notify_subjects: bool,
}

impl ServerConfig {
    /// Creates a configuration with the given page limits.
    pub fn new(default_page_size: u32, max_page_size: u32) -> Self {
        Self {
            default_page_size,
            max_page_size,
            max_register_batch: 100,
            allow_finalize: true,
            notify_hosts: true,
            notify_subjects: true,
        }
    }

    /// Sets the maximum register batch.
    pub fn with_max_register_batch(mut self, size: usize) -> Self {
        self.max_register_batch = size;
        self
    }

    /// Enables or disables finalization.
    pub fn with_allow_finalize(mut self, allow: bool) -> Self {
        self.allow_finalize = allow;
        self
    }

    /// Sets which notification channels deliver.
    pub fn with_notifications(mut self, hosts: bool, subjects: bool) -> Self {
        self.notify_hosts = hosts;
        self.notify_subjects = subjects;
        self
    }

    /// Page size actually served for a requested size.
    pub fn effective_page_size(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.default_page_size
        } else {
            requested.min(self.max_page_size)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(10, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_page_size, 100);
        assert!(config.allow_finalize);
        assert!(config.notify_hosts && config.notify_subjects);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new(5, 20)
            .with_max_register_batch(3)
            .with_allow_finalize(false)
            .with_notifications(true, false);

        assert_eq!(config.max_register_batch, 3);
        assert!(!config.allow_finalize);
        assert!(!config.notify_subjects);
    }

    #[test]
    fn page_size_is_bounded() {
        let config = ServerConfig::new(5, 20);
        assert_eq!(config.effective_page_size(0), 5);
        assert_eq!(config.effective_page_size(12), 12);
        assert_eq!(config.effective_page_size(500), 20);
    }
}
