//! Log records are formatted where they are emitted and handed to a single
//! consumer task over a channel, so protocol code never waits on the console.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use env_logger::{Builder, Env, Logger};
use log::{Level, Log, Metadata, Record, SetLoggerError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

enum LogEvent {
    Line {
        at: SystemTime,
        level: Level,
        target: String,
        message: String,
    },
    Quit,
}

struct ChannelLogger {
    filter: Logger,
    tx: UnboundedSender<LogEvent>,
}

impl Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }
        // consumer already gone, nothing left to print to
        let _ = self.tx.send(LogEvent::Line {
            at: SystemTime::now(),
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

/// Keeps the consumer alive until [`LogHandle::shutdown`].
pub struct LogHandle {
    tx: UnboundedSender<LogEvent>,
    consumer: JoinHandle<()>,
}

impl LogHandle {
    /// Print everything queued so far, then stop the consumer.
    pub async fn shutdown(self) {
        let _ = self.tx.send(LogEvent::Quit);
        let _ = self.consumer.await;
    }
}

/// UTC time of day with microseconds, taken when the record was emitted.
struct Stamp(SystemTime);

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let since = self.0.duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs = since.as_secs() % 86_400;
        write!(
            f,
            "{:02}:{:02}:{:02}.{:06}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60,
            since.subsec_micros()
        )
    }
}

// lines carry their own `Stamp`; the consumer adds none
fn builder() -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp(None);
    builder
}

/// Install the global logger. Must be called inside a tokio runtime.
pub fn init() -> Result<LogHandle, SetLoggerError> {
    let filter = builder().build();
    let max_level = filter.filter();
    let (tx, rx) = mpsc::unbounded_channel();

    log::set_boxed_logger(Box::new(ChannelLogger {
        filter,
        tx: tx.clone(),
    }))?;
    log::set_max_level(max_level);

    let consumer = tokio::spawn(drain(builder().build(), rx));
    Ok(LogHandle { tx, consumer })
}

async fn drain(writer: Logger, mut rx: UnboundedReceiver<LogEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            LogEvent::Line {
                at,
                level,
                target,
                message,
            } => writer.log(
                &Record::builder()
                    .args(format_args!("{} {message}", Stamp(at)))
                    .level(level)
                    .target(&target)
                    .build(),
            ),
            LogEvent::Quit => break,
        }
    }
    writer.flush();
}
