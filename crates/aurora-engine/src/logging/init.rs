use std::sync::Once;

use log::LevelFilter;

/// Crates whose info-level output drowns the engine's own.
const NOISY_BACKENDS: [&str; 3] = ["wgpu_core", "wgpu_hal", "naga"];

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` filter string (e.g. "aurora_engine=debug"). Overrides
    /// both `RUST_LOG` and `level`.
    pub env_filter: Option<String>,

    /// Level used when neither `env_filter` nor `RUST_LOG` is set.
    pub level: LevelFilter,

    /// Cap graphics-backend crates at `Warn` under the default level.
    pub quiet_backends: bool,

    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            level: LevelFilter::Info,
            quiet_backends: true,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: LevelFilter) -> Self {
        Self { level, ..Self::default() }
    }

    fn builder(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        let explicit = self
            .env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok());

        match explicit {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => {
                builder.filter_level(self.level);
                if self.quiet_backends {
                    for module in NOISY_BACKENDS {
                        builder.filter_module(module, self.level.min(LevelFilter::Warn));
                    }
                }
            }
        }
        builder.write_style(self.write_style);
        builder
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        // A test harness may already own the global logger.
        if config.builder().try_init().is_ok() {
            log::debug!("logging initialized at {}", config.level);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_logging(LoggingConfig::with_level(LevelFilter::Debug));
        init_logging(LoggingConfig::default());
        log::info!("still logging");
    }
}
