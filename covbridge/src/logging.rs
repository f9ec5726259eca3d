//! A minimal `slog` drain writing one line per record to stderr.

use slog::{Drain, Key, Level, Logger, OwnedKVList, Record, Serializer, o};
use std::fmt::{self, Write as _};
use std::io::Write as _;

/// Writes records at or above `level` to stderr.
pub struct StderrDrain {
    level: Level,
}

impl StderrDrain {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Drain for StderrDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<(), slog::Never> {
        if !record.level().is_at_least(self.level) {
            return Ok(());
        }
        let line = format_record(record, values);
        // Nothing sensible to do if stderr is gone.
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        Ok(())
    }
}

pub(crate) fn format_record(record: &Record<'_>, values: &OwnedKVList) -> String {
    let mut line = format!(
        "{} {} {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.level().as_short_str(),
        record.msg()
    );
    let mut kv = KvWriter(&mut line);
    let _ = slog::KV::serialize(&record.kv(), record, &mut kv);
    let _ = slog::KV::serialize(values, record, &mut kv);
    line.push('\n');
    line
}

struct KvWriter<'a>(&'a mut String);

impl Serializer for KvWriter<'_> {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments<'_>) -> slog::Result {
        let _ = write!(self.0, " {key}={val}");
        Ok(())
    }
}

/// A root logger tagged with the bridge's component name.
pub fn stderr_logger(level: Level) -> Logger {
    Logger::root(StderrDrain::new(level), o!("component" => "covbridge"))
}

/// A logger that drops everything.
pub fn discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<String>>>);

    impl Drain for Capture {
        type Ok = ();
        type Err = slog::Never;

        fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<(), slog::Never> {
            self.0.lock().unwrap().push(format_record(record, values));
            Ok(())
        }
    }

    #[test]
    fn records_carry_message_and_key_values() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let log = Logger::root(Capture(Arc::clone(&lines)), o!("component" => "covbridge"));

        slog::info!(log, "native driver finished"; "exit_code" => 77);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO native driver finished"));
        assert!(lines[0].contains("exit_code=77"));
        assert!(lines[0].contains("component=covbridge"));
        assert!(lines[0].ends_with('\n'));
    }

    #[test]
    fn level_threshold_is_respected() {
        let drain = StderrDrain::new(Level::Warning);
        assert!(!Level::Info.is_at_least(drain.level));
        assert!(Level::Error.is_at_least(drain.level));
    }
}
