//! A `log` sink that forwards records over a channel.
//!
//! The store only logs through the `log` facade and never installs a logger. Hosts that want
//! to collect store diagnostics (tools, test harnesses) can install a [`ChannelLogger`] and
//! drain the receiver on their own schedule.
//!
//! ```rust,ignore
//! let (logger, records) = ChannelLogger::with_receiver(log::LevelFilter::Debug);
//! log::set_boxed_logger(Box::new(logger))?;
//! log::set_max_level(log::LevelFilter::Debug);
//! ```

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{Level, LevelFilter, Metadata, Record};

/// One forwarded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: Level,
    pub target: String,
    pub message: String,
}

pub struct ChannelLogger {
    sender: Sender<LogMessage>,
    level: LevelFilter,
}

impl log::Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = self.sender.try_send(LogMessage {
                level: record.metadata().level(),
                target: record.target().to_string(),
                message: format!("{}", record.args()),
            });
        }
    }

    fn flush(&self) {}
}

impl ChannelLogger {
    pub fn new(sender: Sender<LogMessage>, level: LevelFilter) -> Self {
        Self { sender, level }
    }

    pub fn with_receiver(level: LevelFilter) -> (Self, Receiver<LogMessage>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender, level), receiver)
    }
}

#[cfg(test)]
mod tests {
    use log::Log;

    use super::*;

    #[test]
    fn forwards_enabled_records() {
        // Given
        let (logger, records) = ChannelLogger::with_receiver(LevelFilter::Warn);

        // When
        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("rusty_blocks::ecs")
                .args(format_args!("duplicate registration"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("new block"))
                .build(),
        );

        // Then
        assert_eq!(records.try_iter().collect::<Vec<_>>(), vec![LogMessage {
            level: Level::Warn,
            target: "rusty_blocks::ecs".to_string(),
            message: "duplicate registration".to_string(),
        }]);
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        // Given
        let (logger, records) = ChannelLogger::with_receiver(LevelFilter::Trace);
        drop(records);

        // When / Then - does not panic
        logger.log(&Record::builder().args(format_args!("lost")).build());
    }
}
