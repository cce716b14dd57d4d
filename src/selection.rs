use serde_json::json;
use thiserror::Error;

use crate::reveal::RevealHandle;
use crate::telemetry::Logger;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("selection index {index} is outside 0..{len}")]
    OutOfRange { index: isize, len: usize },
    #[error("selection needs at least one entry")]
    Empty,
}

/// Identifies one mount of the detail panel. A new generation means the old
/// panel and its reveal are gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PanelMount {
    pub index: usize,
    pub generation: u64,
}

/// Single active index into a fixed, non-empty list of entries.
pub struct SelectionController<T> {
    entries: Vec<T>,
    index: usize,
    generation: u64,
    attached: Option<(u64, RevealHandle)>,
    logger: Logger,
}

impl<T> std::fmt::Debug for SelectionController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionController")
            .field("len", &self.entries.len())
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<T> SelectionController<T> {
    pub fn new(entries: Vec<T>, logger: Logger) -> Result<Self, SelectionError> {
        if entries.is_empty() {
            return Err(SelectionError::Empty);
        }

        Ok(Self {
            entries,
            index: 0,
            generation: 0,
            attached: None,
            logger,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn current(&self) -> &T {
        &self.entries[self.index]
    }

    pub fn mount(&self) -> PanelMount {
        PanelMount {
            index: self.index,
            generation: self.generation,
        }
    }

    /// Moves to `index` and remounts the detail panel, even when `index` is
    /// already selected. The previous panel's reveal is abandoned where it
    /// stands.
    pub fn select(&mut self, index: isize) -> Result<PanelMount, SelectionError> {
        let len = self.entries.len();
        let next = usize::try_from(index)
            .ok()
            .filter(|candidate| *candidate < len)
            .ok_or(SelectionError::OutOfRange { index, len })?;

        if let Some((_, handle)) = self.attached.take() {
            handle.cancel();
        }

        let previous = self.index;
        self.index = next;
        self.generation += 1;
        self.logger.debug(
            "selection_changed",
            json!({ "from": previous, "to": next, "generation": self.generation }),
        );
        Ok(self.mount())
    }

    /// Binds the reveal running inside `mount`. A handle for a stale
    /// generation is cancelled on the spot.
    pub fn attach(&mut self, mount: PanelMount, handle: RevealHandle) {
        if mount.generation != self.generation {
            handle.cancel();
            return;
        }

        if let Some((_, previous)) = self.attached.replace((mount.generation, handle)) {
            previous.cancel();
        }
    }

    /// Releases the current panel's reveal, e.g. when the section unmounts.
    pub fn detach(&mut self) {
        if let Some((_, handle)) = self.attached.take() {
            handle.cancel();
        }
    }
}
