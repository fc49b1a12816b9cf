use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::trace;

use crate::runtime::Debouncer;

/// Phase of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// Nothing compiled yet.
    #[default]
    Idle,
    /// A debounced recompilation was handed out and has not finished.
    Compiling,
    Rendering,
}

/// Decides when edited text should be recompiled.
///
/// The first observed text is released immediately; later edits wait for
/// the debounce window, and every new edit restarts it.
#[derive(Debug, Clone)]
pub struct RenderLoop {
    state: LoopState,
    debouncer: Debouncer,
    pending: Option<String>,
    last_compiled: Option<String>,
}

impl RenderLoop {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: LoopState::Idle,
            debouncer: Debouncer::new(debounce),
            pending: None,
            last_compiled: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn last_compiled(&self) -> Option<&str> {
        self.last_compiled.as_deref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds the current editor text into the loop.
    pub fn observe(&mut self, text: &str, now: Instant) {
        if self.last_compiled.as_deref() == Some(text) {
            if self.pending.take().is_some() {
                trace!("edit reverted to compiled text");
                self.debouncer.cancel();
            }
            return;
        }
        if self.pending.as_deref() == Some(text) {
            return;
        }
        self.pending = Some(text.to_string());
        if self.last_compiled.is_none() && self.state == LoopState::Idle {
            self.debouncer.trigger_now(now);
        } else {
            self.debouncer.touch(now);
        }
    }

    /// Returns text that is due for recompilation, switching to `Compiling`.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        if self.pending.is_none() || !self.debouncer.fire(now) {
            return None;
        }
        self.state = LoopState::Compiling;
        self.pending.take()
    }

    /// Records that `text` was synthesized and compiled, whatever the outcome.
    pub fn finish_compile(&mut self, text: String) {
        self.last_compiled = Some(text);
        self.state = LoopState::Rendering;
    }
}
