use serde_json::json;
use thiserror::Error;

use crate::telemetry::Logger;

/// Storage key holding the persisted dark-mode flag.
pub const THEME_KEY: &str = "darkMode";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Value written to the preference store.
    pub fn as_stored(self) -> &'static str {
        match self {
            Self::Light => "false",
            Self::Dark => "true",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "true" => Some(Self::Dark),
            "false" => Some(Self::Light),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn toggle_label(self) -> String {
        let next = self.toggled().as_str();
        format!("Switch to {next} theme")
    }

    pub fn is_dark(self) -> bool {
        matches!(self, Self::Dark)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("preference storage is unavailable")]
    Unavailable,
    #[error("preference storage refused the write: {0}")]
    WriteRefused(String),
}

/// Durable key/value storage for a single browser profile.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Host-level "prefers dark" query. `None` means the host cannot answer.
pub trait AmbientSignal {
    fn prefers_dark(&self) -> Option<bool>;
}

/// Document-level marker every descendant style keys off.
pub trait ThemeMarker {
    fn apply(&self, theme: Theme);
}

/// Stored preference wins, then the ambient signal, then light.
pub fn resolve_preference(stored: Option<Theme>, ambient: Option<bool>) -> Theme {
    stored.unwrap_or(match ambient {
        Some(true) => Theme::Dark,
        Some(false) | None => Theme::Light,
    })
}

/// Owns the only write path to the theme marker.
pub struct ThemeResolver<S, M> {
    store: S,
    marker: M,
    logger: Logger,
    current: Option<Theme>,
}

impl<S, M> ThemeResolver<S, M>
where
    S: PreferenceStore,
    M: ThemeMarker,
{
    pub fn new(store: S, marker: M, logger: Logger) -> Self {
        Self {
            store,
            marker,
            logger,
            current: None,
        }
    }

    /// Last theme written to the marker, if any.
    pub fn current(&self) -> Option<Theme> {
        self.current
    }

    pub fn resolve(&mut self, ambient: &impl AmbientSignal) -> Theme {
        let stored = match self.store.get(THEME_KEY) {
            Ok(value) => value.as_deref().and_then(Theme::from_stored),
            Err(error) => {
                self.logger.warn(
                    "theme_storage_read_failed",
                    json!({ "error": error.to_string() }),
                );
                None
            }
        };
        let ambient_dark = if stored.is_some() {
            None
        } else {
            ambient.prefers_dark()
        };
        let theme = resolve_preference(stored, ambient_dark);
        let source = match (stored, ambient_dark) {
            (Some(_), _) => "stored",
            (None, Some(_)) => "ambient",
            (None, None) => "default",
        };

        self.mark(theme);
        self.logger.info(
            "theme_resolved",
            json!({ "theme": theme.as_str(), "source": source }),
        );
        theme
    }

    /// Flips `current`, marks the document, then persists. A refused write
    /// still leaves the in-memory theme changed.
    pub fn toggle(&mut self, current: Theme) -> Theme {
        let next = current.toggled();
        self.mark(next);

        if let Err(error) = self.store.set(THEME_KEY, next.as_stored()) {
            self.logger.warn(
                "theme_persist_failed",
                json!({ "theme": next.as_str(), "error": error.to_string() }),
            );
        }

        self.logger
            .info("theme_toggled", json!({ "theme": next.as_str() }));
        next
    }

    fn mark(&mut self, theme: Theme) {
        self.marker.apply(theme);
        self.current = Some(theme);
    }
}
