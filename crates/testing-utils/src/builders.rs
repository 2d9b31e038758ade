//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use app_scheduler_domain::{App, AppRuntime, AppSchedule};

/// Builder for creating test App entities
pub struct AppBuilder {
    app: App,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            app: App {
                name: "test_app".to_string(),
                app_type: "test_runner".to_string(),
                schedule: AppSchedule::hourly(),
                runtime: AppRuntime { enabled: true },
                app_configuration: serde_json::json!({}),
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.app.name = name.to_string();
        self
    }

    pub fn with_app_type(mut self, app_type: &str) -> Self {
        self.app.app_type = app_type.to_string();
        self
    }

    pub fn with_schedule(mut self, schedule: AppSchedule) -> Self {
        self.app.schedule = schedule;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.app.runtime.enabled = false;
        self
    }

    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.app.app_configuration = configuration;
        self
    }

    pub fn build(self) -> App {
        self.app
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
