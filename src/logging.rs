//! Leveled log output.
//!
//! The framework logs through `tracing` macros. [`init`] installs a
//! subscriber that keeps events at or above the configured [`LogLevel`] and
//! writes them to one [`LogOutput`]: standard error, an append-only file, or
//! a caller-supplied callback that forwards to an external logging service.

use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use crate::error::ConfigError;

/// Minimum severity that gets written. Ordered `Debug < Info < Warn < Error`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info  => LevelFilter::INFO,
            Self::Warn  => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug"           => Ok(Self::Debug),
            "info"            => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error"           => Ok(Self::Error),
            _                 => Err(ConfigError::UnknownLogLevel(s.to_owned())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

/// Where log lines go.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogOutput {
    #[default]
    Stderr,
    File,
    Service,
}

impl FromStr for LogOutput {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr"  => Ok(Self::Stderr),
            "file"    => Ok(Self::File),
            "service" => Ok(Self::Service),
            _         => Err(ConfigError::UnknownLogOutput(s.to_owned())),
        }
    }
}

impl TryFrom<String> for LogOutput {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

/// Receives every emitted event when the output is [`LogOutput::Service`].
pub type LogCallback = Arc<dyn Fn(Level, &str) + Send + Sync>;

/// Log settings.
#[derive(Clone)]
pub struct LogOptions {
    pub level: LogLevel,
    pub output: LogOutput,
    /// Target of [`LogOutput::File`].
    pub file: PathBuf,
    /// Target of [`LogOutput::Service`].
    pub callback: Option<LogCallback>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Stderr,
            file: PathBuf::from("server.log"),
            callback: None,
        }
    }
}

impl fmt::Debug for LogOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogOptions")
            .field("level", &self.level)
            .field("output", &self.output)
            .field("file", &self.file)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

type Sink = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builds the subscriber described by `options` without installing it.
///
/// An output that cannot be used (a `service` output with no callback, a log
/// file that cannot be opened) falls back to standard error; the returned
/// note says why.
pub fn subscriber(options: &LogOptions) -> (impl Subscriber + Send + Sync + 'static, Option<String>) {
    let (sink, fallback) = sink(options);
    let subscriber = tracing_subscriber::registry()
        .with(sink)
        .with(options.level.filter());
    (subscriber, fallback)
}

/// Installs the global subscriber. Returns `false` if one was already set;
/// that subscriber stays in charge and `options` are ignored.
pub fn init(options: &LogOptions) -> bool {
    let (subscriber, fallback) = subscriber(options);
    if subscriber.try_init().is_err() {
        return false;
    }
    if let Some(reason) = fallback {
        tracing::warn!("{reason}, logging to stderr instead");
    }
    true
}

fn sink(options: &LogOptions) -> (Sink, Option<String>) {
    match options.output {
        LogOutput::Stderr => (stderr(), None),
        LogOutput::File => {
            let file = OpenOptions::new().create(true).append(true).open(&options.file);
            match file {
                Ok(file) => {
                    let layer = tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file));
                    (Box::new(layer), None)
                }
                Err(e) => (stderr(), Some(format!("cannot open {}: {e}", options.file.display()))),
            }
        }
        LogOutput::Service => match &options.callback {
            Some(callback) => (Box::new(CallbackLayer::new(Arc::clone(callback))), None),
            None => (stderr(), Some("service output configured without a callback".to_owned())),
        },
    }
}

fn stderr() -> Sink {
    Box::new(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
}

/// Forwards each event to a callback as `(level, rendered line)`.
///
/// The line is the event message followed by its fields as `key=value`.
pub struct CallbackLayer {
    callback: LogCallback,
}

impl CallbackLayer {
    pub fn new(callback: LogCallback) -> Self {
        Self { callback }
    }
}

impl<S: Subscriber> Layer<S> for CallbackLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = LineVisitor::default();
        event.record(&mut line);
        (self.callback)(*event.metadata().level(), &line.finish());
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(mut self) -> String {
        self.message.push_str(&self.fields);
        self.message
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::{debug, error, info, warn};

    use super::*;

    fn capture(level: LogLevel) -> (LogOptions, Arc<Mutex<Vec<(Level, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let options = LogOptions {
            level,
            output: LogOutput::Service,
            callback: Some(Arc::new(move |level: Level, line: &str| {
                sink.lock().unwrap().push((level, line.to_owned()));
            })),
            ..LogOptions::default()
        };
        (options, lines)
    }

    #[test]
    fn levels_are_ordered_by_priority() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!("File".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn only_events_at_or_above_level_reach_the_sink() {
        let (options, lines) = capture(LogLevel::Warn);
        let (subscriber, fallback) = subscriber(&options);
        assert!(fallback.is_none());

        tracing::subscriber::with_default(subscriber, || {
            debug!("hidden");
            info!("hidden too");
            warn!(client = "1.2.3.4", "slow client");
            error!("boom");
        });

        let lines = lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (Level::WARN, "slow client client=1.2.3.4".to_owned()),
                (Level::ERROR, "boom".to_owned()),
            ],
        );
    }

    #[test]
    fn second_init_is_silent() {
        let (options, lines) = capture(LogLevel::Debug);
        let (capturing, _) = subscriber(&options);

        tracing::subscriber::with_default(capturing, || {
            init(&LogOptions::default());
            let unusable = LogOptions { output: LogOutput::Service, ..LogOptions::default() };
            assert!(!init(&unusable));
        });

        assert!(lines.lock().unwrap().is_empty());
    }

    #[test]
    fn service_without_callback_falls_back() {
        let options = LogOptions { output: LogOutput::Service, ..LogOptions::default() };
        let (_, fallback) = subscriber(&options);
        assert!(fallback.is_some());
    }

    #[test]
    fn file_output_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "existing\n").unwrap();

        let options = LogOptions { output: LogOutput::File, file: path.clone(), ..LogOptions::default() };
        let (subscriber, fallback) = subscriber(&options);
        assert!(fallback.is_none());
        tracing::subscriber::with_default(subscriber, || info!("appended line"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing\n"));
        assert!(contents.contains("appended line"));
    }

    #[test]
    fn unwritable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            output: LogOutput::File,
            file: dir.path().join("missing-dir").join("server.log"),
            ..LogOptions::default()
        };
        let (_, fallback) = subscriber(&options);
        assert!(fallback.unwrap().contains("cannot open"));
    }
}
