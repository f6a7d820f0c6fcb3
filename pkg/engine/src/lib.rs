//! Segmentation engine capability.
//!
//! An engine is anything that accepts a text and then reports word boundary
//! offsets one at a time. Offsets are UTF-8 byte positions, strictly
//! increasing, starting with the first boundary after 0; `None` marks the end
//! of the stream until the next `set_text`.

mod icu;

use thiserror::Error;

pub use icu::{IcuWordEngine, MAX_TEXT_BYTES, WordModel, parse_locale};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid locale '{locale}': {reason}")]
    InvalidLocale { locale: String, reason: String },
    #[error("text of {len} bytes exceeds the engine limit of {limit} bytes")]
    TextTooLarge { len: usize, limit: usize },
    #[error("engine rejected text: {reason}")]
    Rejected { reason: String },
}

pub trait SegmentationEngine {
    /// Presents a new text. Any boundaries left from the previous text are
    /// discarded.
    fn set_text(&mut self, text: &str) -> Result<(), EngineError>;

    /// Next boundary of the current text, `None` once exhausted.
    fn next_boundary(&mut self) -> Option<usize>;

    fn boundaries(&mut self) -> Boundaries<'_, Self> {
        Boundaries { engine: self }
    }
}

impl<E: SegmentationEngine + ?Sized> SegmentationEngine for &mut E {
    fn set_text(&mut self, text: &str) -> Result<(), EngineError> {
        (**self).set_text(text)
    }

    fn next_boundary(&mut self) -> Option<usize> {
        (**self).next_boundary()
    }
}

/// Pull iterator over the boundaries of an engine's current text.
pub struct Boundaries<'a, E: ?Sized> {
    engine: &'a mut E,
}

impl<E: SegmentationEngine + ?Sized> Iterator for Boundaries<'_, E> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.engine.next_boundary()
    }
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// Replays the same boundary list for every text it is given. Individual
/// `set_text` calls (counted from 0) can be scripted to fail.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    script: Vec<usize>,
    rejected_calls: Vec<usize>,
    calls: usize,
    cursor: usize,
    loaded: bool,
}

impl ScriptedEngine {
    pub fn new(script: impl Into<Vec<usize>>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    pub fn rejecting_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.rejected_calls.extend(calls);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl SegmentationEngine for ScriptedEngine {
    fn set_text(&mut self, _text: &str) -> Result<(), EngineError> {
        let call = self.calls;
        self.calls += 1;
        self.cursor = 0;
        self.loaded = !self.rejected_calls.contains(&call);
        if !self.loaded {
            return Err(EngineError::Rejected {
                reason: format!("scripted rejection of call {call}"),
            });
        }
        Ok(())
    }

    fn next_boundary(&mut self) -> Option<usize> {
        if !self.loaded {
            return None;
        }
        let boundary = self.script.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(boundary)
    }
}
