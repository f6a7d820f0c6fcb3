use std::fmt;

use corpus::Span;

// ---------------------------------------------------------------------------
// Boundary reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrialCounts {
    pub true_positive: usize,
    /// Predicted boundaries pulled after the first one.
    pub predicted_positive: usize,
    pub expected_positive: usize,
    /// The stream produced at least one boundary.
    pub received_any: bool,
}

/// Aligns a predicted boundary stream against the expected spans.
///
/// Both sequences are monotone but may disagree in granularity. A predicted
/// boundary short of the current expected bound is consumed (over-segmentation);
/// one at or past it retires the expected span without credit
/// (under-segmentation). Only a predicted piece starting and ending exactly on
/// an expected span counts as a true positive. Stops as soon as either side is
/// exhausted.
pub fn reconcile<I>(expected: &[Span], predicted: I) -> TrialCounts
where
    I: IntoIterator<Item = usize>,
{
    let mut counts = TrialCounts {
        expected_positive: expected.len(),
        ..TrialCounts::default()
    };
    let mut predicted = predicted.into_iter();
    let Some(mut next) = predicted.next() else {
        return counts;
    };
    counts.received_any = true;

    let mut cur = 0usize;
    let mut index = 0usize;
    while let Some(span) = expected.get(index) {
        if cur == span.offset && next == span.bound {
            counts.true_positive += 1;
            index += 1;
        } else if next >= span.bound {
            index += 1;
            continue;
        }

        cur = next;
        match predicted.next() {
            Some(boundary) => {
                counts.predicted_positive += 1;
                next = boundary;
            }
            None => break,
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Trial scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degenerate {
    NoPredictedBoundaries,
    NoExpectedTokens,
    NoAgreement,
}

impl Degenerate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPredictedBoundaries => "no predicted boundaries",
            Self::NoExpectedTokens => "no expected tokens",
            Self::NoAgreement => "precision + recall is zero",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum F1Score {
    Defined(f64),
    Undefined(Degenerate),
}

impl F1Score {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Defined(value) => Some(value),
            Self::Undefined(_) => None,
        }
    }
}

impl fmt::Display for F1Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(value) => write!(f, "{value:.6}"),
            Self::Undefined(reason) => write!(f, "undefined ({})", reason.as_str()),
        }
    }
}

impl TrialCounts {
    /// Every predicted boundary consumed, the first one included.
    pub fn predicted_boundaries(&self) -> usize {
        self.predicted_positive + usize::from(self.received_any)
    }

    pub fn precision(&self) -> Option<f64> {
        let predicted = self.predicted_boundaries();
        (predicted > 0).then(|| self.true_positive as f64 / predicted as f64)
    }

    pub fn recall(&self) -> Option<f64> {
        (self.expected_positive > 0)
            .then(|| self.true_positive as f64 / self.expected_positive as f64)
    }

    /// Undefined when no expected tokens exist, when no boundary was pulled
    /// after the first one (`predicted_positive == 0`), or when precision and
    /// recall are both zero.
    pub fn f1(&self) -> F1Score {
        let Some(recall) = self.recall() else {
            return F1Score::Undefined(Degenerate::NoExpectedTokens);
        };
        if self.predicted_positive == 0 {
            return F1Score::Undefined(Degenerate::NoPredictedBoundaries);
        }
        let Some(precision) = self.precision() else {
            return F1Score::Undefined(Degenerate::NoPredictedBoundaries);
        };
        let sum = precision + recall;
        if sum <= f64::EPSILON {
            return F1Score::Undefined(Degenerate::NoAgreement);
        }
        F1Score::Defined((2.0 * precision * recall) / sum)
    }
}
