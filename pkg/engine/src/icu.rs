use icu_locid::Locale;
use icu_segmenter::WordSegmenter;
use tracing::debug;

use crate::{EngineError, SegmentationEngine};

/// ICU reports boundaries as 32-bit offsets; longer texts are refused.
pub const MAX_TEXT_BYTES: usize = i32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordModel {
    #[default]
    Auto,
    Dictionary,
    Lstm,
}

impl WordModel {
    pub fn from_arg(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "dictionary" | "dict" => Some(Self::Dictionary),
            "lstm" => Some(Self::Lstm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Dictionary => "dictionary",
            Self::Lstm => "lstm",
        }
    }
}

/// Parses a BCP-47 locale. ICU-style `th_TH` is accepted as well.
pub fn parse_locale(raw: &str) -> Result<Locale, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidLocale {
            locale: raw.to_string(),
            reason: "empty locale identifier".to_string(),
        });
    }
    let normalized = trimmed.replace('_', "-");
    Locale::try_from_bytes(normalized.as_bytes()).map_err(|err| EngineError::InvalidLocale {
        locale: raw.to_string(),
        reason: format!("{err:?}"),
    })
}

/// Word segmenter backed by ICU4X compiled data. `set_text` segments the
/// whole text up front; `next_boundary` then walks the stored offsets.
///
/// The locale is validated and kept for reporting only. ICU4X word
/// segmenters take no locale: the model is picked per script from the text
/// itself, so `th-TH` and `en` segment a given text identically.
pub struct IcuWordEngine {
    segmenter: WordSegmenter,
    locale: Locale,
    model: WordModel,
    breaks: Vec<usize>,
    cursor: usize,
}

impl IcuWordEngine {
    pub fn new(locale: &str, model: WordModel) -> Result<Self, EngineError> {
        let locale = parse_locale(locale)?;
        let segmenter = match model {
            WordModel::Auto => WordSegmenter::new_auto(),
            WordModel::Dictionary => WordSegmenter::new_dictionary(),
            WordModel::Lstm => WordSegmenter::new_lstm(),
        };
        debug!(locale = %locale, model = model.as_str(), "word segmenter constructed");
        Ok(Self {
            segmenter,
            locale,
            model,
            breaks: Vec::new(),
            cursor: 0,
        })
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn model(&self) -> WordModel {
        self.model
    }
}

impl SegmentationEngine for IcuWordEngine {
    fn set_text(&mut self, text: &str) -> Result<(), EngineError> {
        self.breaks.clear();
        self.cursor = 0;
        if text.len() > MAX_TEXT_BYTES {
            return Err(EngineError::TextTooLarge {
                len: text.len(),
                limit: MAX_TEXT_BYTES,
            });
        }
        // The segmenter always reports offset 0 first.
        self.breaks.extend(
            self.segmenter
                .segment_str(text)
                .filter(|offset| *offset > 0),
        );
        Ok(())
    }

    fn next_boundary(&mut self) -> Option<usize> {
        let boundary = self.breaks.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(boundary)
    }
}
