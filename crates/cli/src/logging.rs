//! Logging setup: console on stderr plus a daily log file.
//!
//! Console lines go through [`ConsoleWriter`], which hides the progress bar
//! while a line is written so the two never interleave on one row.

use indicatif::ProgressBar;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "vidfix.log";

/// Default filter directive. `RUST_LOG` takes precedence when set.
pub fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("vidfix={}", level)
}

/// Stderr writer that suspends an attached progress bar around each line.
#[derive(Debug, Clone, Default)]
pub struct ConsoleWriter {
    bar: Arc<Mutex<Option<ProgressBar>>>,
}

impl ConsoleWriter {
    /// Route console output around `bar` until [`ConsoleWriter::detach`].
    pub fn attach(&self, bar: ProgressBar) {
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            *slot = None;
        }
    }

    fn active(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|slot| slot.clone())
    }
}

/// One formatted log line on its way to stderr.
pub struct ConsoleLine {
    bar: Option<ProgressBar>,
}

impl Write for ConsoleLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.bar {
            Some(bar) => bar.suspend(|| io::stderr().write_all(buf))?,
            None => io::stderr().write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLine { bar: self.active() }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be held
/// until the program exits.
pub fn init(log_dir: &Path, verbose: bool, console: ConsoleWriter) -> io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    let stderr_layer = fmt::layer()
        .with_writer(console)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "vidfix=info");
        assert_eq!(default_directive(true), "vidfix=debug");
    }

    #[test]
    fn test_console_writer_follows_attached_bar() {
        let console = ConsoleWriter::default();
        assert!(console.make_writer().bar.is_none());

        let bar = ProgressBar::hidden();
        console.attach(bar.clone());
        let mut line = console.make_writer();
        assert!(line.bar.is_some());
        assert_eq!(line.write(b"").unwrap(), 0);

        // clones share the slot, as the subscriber holds its own copy
        let shared = console.clone();
        console.detach();
        assert!(shared.make_writer().bar.is_none());
        assert!(!bar.is_finished());
    }
}
