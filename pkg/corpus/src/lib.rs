use std::{io, path::Path};

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Reference tokens
// ---------------------------------------------------------------------------

/// A reference token: `len` UTF-8 bytes starting at `offset` in the corpus text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub offset: usize,
    pub len: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("unable to read corpus '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("corpus '{path}' is not valid UTF-8")]
    Encoding { path: String },
    #[error("corpus '{path}' contains no tokens")]
    Empty { path: String },
}

/// Reference tokenization in natural (file) order, backed by one text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    text: String,
    tokens: Vec<Token>,
    source_bytes: u64,
}

impl Corpus {
    /// Builds a corpus from already split tokens. Empty tokens are dropped.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut spans = Vec::new();
        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() {
                continue;
            }
            spans.push(Token {
                offset: text.len(),
                len: token.len(),
            });
            text.push_str(token);
        }
        let source_bytes = text.len() as u64;
        Self {
            text,
            tokens: spans,
            source_bytes,
        }
    }

    /// Parses one token per line, stripping `\n` and `\r\n` terminators.
    pub fn parse(raw: &str) -> Self {
        let mut corpus = Self::from_tokens(raw.lines().map(|line| line.trim_end_matches('\r')));
        corpus.source_bytes = raw.len() as u64;
        corpus
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| CorpusError::Io {
            path: shown.clone(),
            source,
        })?;
        let raw = String::from_utf8(bytes).map_err(|_| CorpusError::Encoding {
            path: shown.clone(),
        })?;

        let corpus = Self::parse(&raw);
        if corpus.is_empty() {
            return Err(CorpusError::Empty { path: shown });
        }
        debug!(
            path = %shown,
            tokens = corpus.len(),
            text_bytes = corpus.text_len(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_str(&self, token: Token) -> &str {
        &self.text[token.offset..token.end()]
    }

    pub fn token_strs(&self) -> impl Iterator<Item = &str> + '_ {
        self.tokens.iter().map(|token| self.token_str(*token))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    /// Size of the source the corpus was parsed from, line terminators included.
    pub fn source_bytes(&self) -> u64 {
        self.source_bytes
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Expected segmentation of a (possibly permuted) token order
// ---------------------------------------------------------------------------

/// Half-open byte range `[offset, bound)` of one expected token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub bound: usize,
}

/// Concatenated text for one token order plus the spans a perfect segmenter
/// would report. Bounds are strictly increasing and the last equals the text
/// length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSegmentation {
    text: String,
    spans: Vec<Span>,
}

impl ExpectedSegmentation {
    pub fn natural(corpus: &Corpus) -> Self {
        Self::from_order(corpus, corpus.tokens().iter().copied())
    }

    /// Uniformly shuffles the corpus tokens and rebuilds text and spans.
    pub fn shuffled<R: Rng + ?Sized>(corpus: &Corpus, rng: &mut R) -> Self {
        let mut order = corpus.tokens().to_vec();
        order.shuffle(rng);
        Self::from_order(corpus, order)
    }

    pub fn from_order<I>(corpus: &Corpus, order: I) -> Self
    where
        I: IntoIterator<Item = Token>,
    {
        let mut text = String::with_capacity(corpus.text_len());
        let mut spans = Vec::with_capacity(corpus.len());
        for token in order {
            let offset = text.len();
            text.push_str(corpus.token_str(token));
            spans.push(Span {
                offset,
                bound: text.len(),
            });
        }
        Self { text, spans }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn boundaries(&self) -> impl Iterator<Item = usize> + '_ {
        self.spans.iter().map(|span| span.bound)
    }

    /// Splits the text back into token strings at the expected spans.
    pub fn split(&self) -> impl Iterator<Item = &str> + '_ {
        self.spans
            .iter()
            .map(|span| &self.text[span.offset..span.bound])
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
