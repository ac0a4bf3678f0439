use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingConfig, ObservabilityConfig};

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TracingError> {
    let logging = &config.logging;
    tracing_subscriber::registry()
        .with(output_layer(logging))
        .with(env_filter(logging))
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))
}

fn output_layer(logging: &LoggingConfig) -> OutputLayer {
    let source = logging.source_location;
    let base = fmt::layer().with_file(source).with_line_number(source);
    match (logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Json, true) => base.json().with_current_span(true).boxed(),
        (LogFormat::Json, false) => base.json().with_current_span(true).without_time().boxed(),
    }
}

/// `RUST_LOG` wins over configuration. Without extra directives the HTTP and
/// Redis stacks are held at a quieter level than ours.
fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    let level = logging.level.directive();
    let directives = match (std::env::var("RUST_LOG"), &logging.filter) {
        (Ok(from_env), _) => from_env,
        (Err(_), Some(extra)) => format!("{level},{extra}"),
        (Err(_), None) => format!("{level},hyper=warn,h2=warn,tower=info,redis=warn"),
    };
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter '{directives}': {e}");
        EnvFilter::new(level)
    })
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn rust_log_overrides_configured_filter() {
        temp_env::with_var("RUST_LOG", Some("idp_callback=trace"), || {
            let logging = LoggingConfig {
                filter: Some("tower_http=debug".into()),
                ..Default::default()
            };
            assert_eq!(env_filter(&logging).to_string(), "idp_callback=trace");
        });
    }

    #[test]
    fn configured_filter_extends_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            let logging = LoggingConfig {
                level: LogLevel::Warn,
                filter: Some("tower_http=debug".into()),
                ..Default::default()
            };
            let filter = env_filter(&logging).to_string();
            assert!(filter.contains("warn"));
            assert!(filter.contains("tower_http=debug"));
        });
    }

    #[test]
    fn invalid_filter_falls_back_to_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            let logging = LoggingConfig {
                level: LogLevel::Debug,
                filter: Some("tower_http=loud".into()),
                ..Default::default()
            };
            assert_eq!(env_filter(&logging).to_string(), "debug");
        });
    }

    #[test]
    fn level_names_parse_from_toml() {
        let logging: LoggingConfig = toml::from_str("level = \"error\"\nformat = \"json\"").unwrap();
        assert_eq!(logging.level, LogLevel::Error);
        assert_eq!(logging.format, LogFormat::Json);
        assert!(logging.timestamps);
    }
}
