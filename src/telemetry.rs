use std::cmp::Ordering;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(level: LogLevel) -> u8 {
            match level {
                LogLevel::Debug => 0,
                LogLevel::Info => 1,
                LogLevel::Warn => 2,
            }
        }

        rank(*self).cmp(&rank(*other))
    }
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            _ => None,
        }
    }
}

type Sink = Rc<dyn Fn(LogLevel, &str)>;

/// Structured one-line JSON event logger.
///
/// Cheap to clone; every engine component holds its own copy.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    sink: Sink,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(min_level: LogLevel) -> Self {
        Self::with_sink(min_level, default_sink)
    }

    pub fn with_sink(min_level: LogLevel, sink: impl Fn(LogLevel, &str) + 'static) -> Self {
        Self {
            min_level,
            sink: Rc::new(sink),
        }
    }

    /// A logger that drops everything.
    pub fn silent() -> Self {
        Self::with_sink(LogLevel::Warn, |_, _| {})
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn event(&self, level: LogLevel, event: &str, fields: serde_json::Value) {
        if !self.enabled(level) {
            return;
        }

        let mut payload = serde_json::Map::new();
        payload.insert(
            "ts".to_string(),
            serde_json::Value::Number(serde_json::Number::from(now_unix_millis())),
        );
        payload.insert(
            "level".to_string(),
            serde_json::Value::String(level.as_str().to_string()),
        );
        payload.insert(
            "event".to_string(),
            serde_json::Value::String(event.to_string()),
        );

        if let serde_json::Value::Object(extra) = fields {
            for (key, value) in extra {
                payload.insert(key, value);
            }
        }

        (self.sink)(level, &serde_json::Value::Object(payload).to_string());
    }

    pub fn debug(&self, event: &str, fields: serde_json::Value) {
        self.event(LogLevel::Debug, event, fields);
    }

    pub fn info(&self, event: &str, fields: serde_json::Value) {
        self.event(LogLevel::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: serde_json::Value) {
        self.event(LogLevel::Warn, event, fields);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_sink(_level: LogLevel, line: &str) {
    eprintln!("{line}");
}

#[cfg(target_arch = "wasm32")]
fn default_sink(level: LogLevel, line: &str) {
    let line = wasm_bindgen::JsValue::from_str(line);
    match level {
        LogLevel::Warn => web_sys::console::warn_1(&line),
        LogLevel::Debug | LogLevel::Info => web_sys::console::log_1(&line),
    }
}

// `SystemTime::now` panics on wasm32-unknown-unknown.
#[cfg(target_arch = "wasm32")]
fn now_unix_millis() -> u64 {
    js_sys::Date::now() as u64
}

#[cfg(not(target_arch = "wasm32"))]
fn now_unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}
