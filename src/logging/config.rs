/// Logging settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub environment: String,
    pub level: String,
    pub dir: String,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var("ENVIRONMENT").ok(),
            std::env::var("LOG_LEVEL").ok(),
            std::env::var("LOG_DIR").ok(),
        )
    }

    fn resolve(environment: Option<String>, level: Option<String>, dir: Option<String>) -> Self {
        let environment = environment.unwrap_or_else(|| "development".to_string());
        let level = level.unwrap_or_else(|| {
            if environment == "production" {
                "info".to_string()
            } else {
                "debug".to_string()
            }
        });

        Self {
            environment,
            level,
            dir: dir.unwrap_or_else(|| "logs".to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Default directive when `RUST_LOG` is not set.
    pub fn filter_directive(&self) -> String {
        format!(
            "etnoapp_backend={},etno_field={},tower_http=debug,axum=debug",
            self.level, self.level
        )
    }
}
