use project_store::config::{DatabaseSettings, Environment};

/// Builder for database settings with test-friendly defaults
pub struct SettingsBuilder {
    settings: DatabaseSettings,
}

impl SettingsBuilder {
    pub fn new(environment: Environment) -> Self {
        let mut settings = DatabaseSettings::new("memory://localhost/projects_test", environment);
        settings.retry_delay_ms = 5;
        settings.health_check_interval_ms = 20;
        settings.transaction_timeout_ms = 1000;
        Self { settings }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.settings.max_retries = max_retries;
        self
    }

    pub fn retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.settings.retry_delay_ms = delay_ms;
        self
    }

    pub fn healthy_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.settings.healthy_threshold_ms = threshold_ms;
        self
    }

    pub fn health_check_enabled(mut self, enabled: bool) -> Self {
        self.settings.health_check_enabled = enabled;
        self
    }

    pub fn transaction_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.settings.transaction_timeout_ms = timeout_ms;
        self
    }

    pub fn build(self) -> DatabaseSettings {
        self.settings
    }
}
