use std::sync::OnceLock;

use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

static LOGGER: OnceLock<ConsoleLogger> = OnceLock::new();

/// Timestamped console logger writing to stderr
pub struct ConsoleLogger {
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Installs the logger. Fails when another logger is already set.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| ConsoleLogger::new(level));
        log::set_logger(logger).map(|()| log::set_max_level(level))
    }

    fn format_line(record: &Record) -> String {
        format!(
            "[{}] [{}] {}",
            Local::now().to_rfc3339(),
            record.level(),
            record.args()
        )
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", Self::format_line(record));
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log};

    #[test]
    fn line_carries_level_and_message() {
        let line = ConsoleLogger::format_line(
            &Record::builder()
                .args(format_args!("link lost"))
                .level(Level::Warn)
                .build(),
        );
        assert!(line.ends_with("[WARN] link lost"));
        assert!(line.starts_with('['));
    }

    #[test]
    fn level_filter_is_honoured() {
        let logger = ConsoleLogger::new(LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
    }
}
