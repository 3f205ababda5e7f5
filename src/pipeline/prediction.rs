//! Thresholded classifier output.

use std::fmt;

use serde::Serialize;

/// Diagnosis derived from the classifier probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Pneumonia,
    Normal,
}

impl Label {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pneumonia => "Pneumonia",
            Self::Normal => "Normal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classification result.
///
/// Label and percentage are both derived from `probability` when the
/// value is constructed and never recomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub probability: f64,
    pub label: Label,
    /// Probability scaled to [0, 100], rounded to two decimals.
    pub percentage: f64,
}

impl Prediction {
    /// Threshold a probability. Strictly greater than `threshold` is positive.
    #[must_use]
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        let label = if probability > threshold {
            Label::Pneumonia
        } else {
            Label::Normal
        };

        Self {
            probability,
            label,
            percentage: round2(probability * 100.0),
        }
    }
}

/// Formats as `"<Label> (<percentage>%)"`, e.g. `Pneumonia (97.13%)`.
impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.percentage.fract() == 0.0 {
            write!(f, "{} ({:.1}%)", self.label, self.percentage)
        } else {
            write!(f, "{} ({}%)", self.label, self.percentage)
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
