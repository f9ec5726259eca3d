use serde::Deserialize;
use std::ffi::c_int;
use std::path::Path;

use crate::constants::{DEFAULT_MAX_ARGS, DEFAULT_MAX_COUNTERS};
use crate::error::{BridgeError, Result};

/// Termination signals the lifecycle controller can intercept.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HandledSignal {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
}

impl HandledSignal {
    pub fn number(self) -> c_int {
        match self {
            HandledSignal::Interrupt => libc::SIGINT,
            HandledSignal::Terminate => libc::SIGTERM,
            HandledSignal::Hangup => libc::SIGHUP,
            HandledSignal::Quit => libc::SIGQUIT,
        }
    }
}

/// What the value-profile forwarders do with integers wider than 64 bits.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BigIntegerPolicy {
    /// Skip the trace call entirely.
    #[default]
    Ignore,
    /// Forward the low 64 bits, two's complement.
    Truncate,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Critical,
    Error,
    #[default]
    Warning,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for slog::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical => slog::Level::Critical,
            LogLevel::Error => slog::Level::Error,
            LogLevel::Warning => slog::Level::Warning,
            LogLevel::Info => slog::Level::Info,
            LogLevel::Debug => slog::Level::Debug,
            LogLevel::Trace => slog::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Slots in the native argv, terminator included.
    #[serde(default = "default_max_args")]
    pub max_args: usize,
    /// Capacity of the branch counter table.
    #[serde(default = "default_max_counters")]
    pub max_counters: usize,
    #[serde(default = "default_handled_signals")]
    pub handled_signals: Vec<HandledSignal>,
    #[serde(default)]
    pub big_integer_operands: BigIntegerPolicy,
    #[serde(default)]
    pub log_level: LogLevel,
}

pub fn default_max_args() -> usize {
    DEFAULT_MAX_ARGS
}

pub fn default_max_counters() -> usize {
    DEFAULT_MAX_COUNTERS
}

fn default_handled_signals() -> Vec<HandledSignal> {
    vec![HandledSignal::Interrupt]
}

impl BridgeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: BridgeConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the limits a bridge relies on.
    pub fn validate(&self) -> Result<()> {
        // Program name plus terminator.
        if self.max_args < 2 {
            return Err(BridgeError::InvalidArgument(format!(
                "max-args must be at least 2, got {}",
                self.max_args
            )));
        }
        if self.max_args > c_int::MAX as usize {
            return Err(BridgeError::InvalidArgument(format!(
                "max-args must fit in a C int, got {}",
                self.max_args
            )));
        }
        if self.max_counters == 0 {
            return Err(BridgeError::InvalidArgument(
                "max-counters must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_args: default_max_args(),
            max_counters: default_max_counters(),
            handled_signals: default_handled_signals(),
            big_integer_operands: BigIntegerPolicy::default(),
            log_level: LogLevel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.max_args, 128);
        assert_eq!(config.handled_signals, vec![HandledSignal::Interrupt]);
    }

    #[test]
    fn all_keys_are_kebab_case() {
        let file = write_config(
            r#"
max-args = 16
max-counters = 1024
handled-signals = ["interrupt", "terminate"]
big-integer-operands = "truncate"
log-level = "debug"
"#,
        );
        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_args, 16);
        assert_eq!(config.max_counters, 1024);
        assert_eq!(
            config.handled_signals,
            vec![HandledSignal::Interrupt, HandledSignal::Terminate]
        );
        assert_eq!(config.big_integer_operands, BigIntegerPolicy::Truncate);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("max-argz = 3\n");
        assert!(BridgeConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn limits_are_validated() {
        let too_few_args = BridgeConfig {
            max_args: 1,
            ..Default::default()
        };
        assert_matches!(too_few_args.validate(), Err(BridgeError::InvalidArgument(_)));

        let no_counters = BridgeConfig {
            max_counters: 0,
            ..Default::default()
        };
        assert_matches!(no_counters.validate(), Err(BridgeError::InvalidArgument(_)));

        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_limits_in_file_are_rejected() {
        let file = write_config("max-counters = 0\n");
        assert!(BridgeConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn signals_map_to_their_numbers() {
        assert_eq!(HandledSignal::Interrupt.number(), libc::SIGINT);
        assert_eq!(HandledSignal::Terminate.number(), libc::SIGTERM);
    }
}
