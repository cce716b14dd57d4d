//! Presentation state engine for a single-page personal site: persisted
//! theme preference, one-shot viewport reveals, and the work-history
//! selection that drives the detail panel.
//!
//! Everything here is host-agnostic. The browser wiring lives in the binary.

pub mod config;
pub mod contact;
pub mod content;
pub mod reveal;
pub mod selection;
pub mod telemetry;
pub mod theme;
pub mod timeline;
pub mod viewport;

pub use config::EngineConfig;
pub use reveal::{MotionPolicy, RenderHost, RevealHandle, RevealSequencer, RevealSettings, RevealStart};
pub use selection::{PanelMount, SelectionController, SelectionError};
pub use telemetry::{LogLevel, Logger};
pub use theme::{resolve_preference, AmbientSignal, PreferenceStore, Theme, ThemeMarker, ThemeResolver};
pub use viewport::{RegionId, ViewportObserver};
