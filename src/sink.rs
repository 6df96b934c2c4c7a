/*!
 * Structured log sink injected into the client, and its tracing adapter
 */

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{Dispatch, Level};

/// Target used for events forwarded by [`TracingSink`]
pub const LOG_TARGET: &str = "sso_client::rpc";

/// Numeric log level
///
/// Levels are ordered integers with gaps so callers can slot custom levels
/// between the named ones. Conversion to a named level happens only at the
/// sink boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogLevel(i8);

impl LogLevel {
    pub const DEBUG: LogLevel = LogLevel(-4);
    pub const INFO: LogLevel = LogLevel(0);
    pub const WARN: LogLevel = LogLevel(4);
    pub const ERROR: LogLevel = LogLevel(8);

    pub const fn new(value: i8) -> Self {
        LogLevel(value)
    }

    pub const fn value(self) -> i8 {
        self.0
    }

    /// Map the numeric level onto the nearest named tracing level at or below it
    pub fn to_tracing(self) -> Level {
        match self.0 {
            i8::MIN..=-5 => Level::TRACE,
            -4..=-1 => Level::DEBUG,
            0..=3 => Level::INFO,
            4..=7 => Level::WARN,
            _ => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tracing())
    }
}

/// Value of a structured field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{:?}", s),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::UInt(u64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        FieldValue::UInt(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A single structured log event
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub fields: Vec<(&'static str, FieldValue)>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Append a structured field
    pub fn with_field(mut self, key: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    /// Look up the first field with the given key
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn value(&self, key: &str) -> Option<&dyn tracing::Value> {
        self.field(key).map(FieldValue::as_value)
    }
}

/// Destination for structured log events
///
/// Implementations must be safe to call concurrently from every in-flight
/// call sharing the client.
pub trait LogSink: Send + Sync {
    fn log(&self, event: LogEvent);
}

/// Keys forwarded to tracing as fields of their own
pub const KNOWN_KEYS: [&str; 12] = [
    "op",
    "address",
    "error",
    "grpc.component",
    "grpc.service",
    "grpc.method",
    "grpc.attempt",
    "grpc.code",
    "grpc.time_ms",
    "grpc.request.content",
    "grpc.response.content",
    "grpc.error",
];

impl FieldValue {
    fn as_value(&self) -> &dyn tracing::Value {
        match self {
            FieldValue::Str(s) => s,
            FieldValue::Int(v) => v,
            FieldValue::UInt(v) => v,
            FieldValue::Bool(v) => v,
        }
    }
}

/// Renders fields as `key=value` pairs
struct Fields<'a>(Vec<&'a (&'static str, FieldValue)>);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Adapter forwarding [`LogEvent`]s to a tracing dispatcher
///
/// The dispatcher is held by the sink rather than looked up per event, so
/// the client logs to whatever subscriber it was handed at construction.
#[derive(Clone)]
pub struct TracingSink {
    dispatch: Dispatch,
}

impl TracingSink {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Capture the dispatcher that is in scope right now
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone))
    }
}

impl fmt::Debug for TracingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingSink").finish_non_exhaustive()
    }
}

/// Emit `$event` at a fixed level with every known key as its own field
macro_rules! forward {
    ($level:expr, $event:expr, $extra:expr) => {
        tracing::event!(
            target: LOG_TARGET,
            $level,
            op = $event.value("op"),
            address = $event.value("address"),
            error = $event.value("error"),
            grpc.component = $event.value("grpc.component"),
            grpc.service = $event.value("grpc.service"),
            grpc.method = $event.value("grpc.method"),
            grpc.attempt = $event.value("grpc.attempt"),
            grpc.code = $event.value("grpc.code"),
            grpc.time_ms = $event.value("grpc.time_ms"),
            grpc.request.content = $event.value("grpc.request.content"),
            grpc.response.content = $event.value("grpc.response.content"),
            grpc.error = $event.value("grpc.error"),
            extra = $extra,
            "{}",
            $event.message
        )
    };
}

impl LogSink for TracingSink {
    fn log(&self, event: LogEvent) {
        // Keys outside the known set are kept together in `extra`
        let unknown = Fields(
            event
                .fields
                .iter()
                .filter(|(key, _)| !KNOWN_KEYS.contains(key))
                .collect(),
        );
        let extra = (!unknown.0.is_empty()).then(|| tracing::field::display(&unknown));

        tracing::dispatcher::with_default(&self.dispatch, || match event.level.to_tracing() {
            Level::ERROR => forward!(Level::ERROR, event, extra),
            Level::WARN => forward!(Level::WARN, event, extra),
            Level::INFO => forward!(Level::INFO, event, extra),
            Level::DEBUG => forward!(Level::DEBUG, event, extra),
            _ => forward!(Level::TRACE, event, extra),
        });
    }
}

/// Sink that keeps every event in memory
///
/// Useful for asserting on the client's log output in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded events with exactly the given level
    pub fn events_at(&self, level: LogLevel) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn log(&self, event: LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
