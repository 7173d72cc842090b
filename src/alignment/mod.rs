mod frames;
mod phonemes;

pub use frames::{alignment_to_indices, frame_times};
pub use phonemes::{PhonemeMap, PHONEMES};

use std::path::Path;

use textgrid::{TextGrid, TierType};

use crate::error::PpgsError;

const PHONEME_TIER_NAMES: [&str; 3] = ["phones", "phonemes", "phone"];
const WORD_TIER_NAMES: [&str; 2] = ["words", "word"];

/// One labelled time span, in seconds. Intervals within a tier are
/// contiguous and non-overlapping; silence spans keep their original label.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub label: String,
    pub start: f64,
    pub end: f64,
}

/// Time alignment for one recording: a phoneme tier and a word tier
/// spanning `[0, duration)`.
#[derive(Debug, Clone)]
pub struct Alignment {
    phonemes: Vec<Interval>,
    words: Vec<Interval>,
}

impl Alignment {
    /// Build an alignment from pre-parsed tiers, validating interval order.
    pub fn new(phonemes: Vec<Interval>, words: Vec<Interval>) -> Result<Self, PpgsError> {
        if phonemes.is_empty() {
            return Err(PpgsError::invalid_input(
                "alignment has no phoneme intervals",
            ));
        }
        validate_tier(&phonemes, "phoneme")?;
        validate_tier(&words, "word")?;
        Ok(Self { phonemes, words })
    }

    /// Parse a `.textgrid` file. The phoneme tier is required; the word tier
    /// is optional and defaults to empty.
    pub fn from_textgrid(path: &Path) -> Result<Self, PpgsError> {
        let textgrid =
            TextGrid::from_file(path).map_err(|e| PpgsError::runtime("parse textgrid", e))?;

        let phonemes = find_tier(&textgrid, &PHONEME_TIER_NAMES).ok_or_else(|| {
            PpgsError::invalid_input(format!(
                "no phoneme interval tier in '{}'",
                path.display()
            ))
        })?;
        let words = find_tier(&textgrid, &WORD_TIER_NAMES).unwrap_or_default();
        Self::new(phonemes, words)
    }

    /// Total duration in seconds: the end of the last phoneme interval.
    pub fn duration(&self) -> f64 {
        self.phonemes.last().map_or(0.0, |interval| interval.end)
    }

    pub fn phonemes(&self) -> &[Interval] {
        &self.phonemes
    }

    pub fn words(&self) -> &[Interval] {
        &self.words
    }
}

fn find_tier(textgrid: &TextGrid, names: &[&str]) -> Option<Vec<Interval>> {
    let tier = textgrid.tiers.iter().find(|tier| {
        tier.tier_type == TierType::IntervalTier
            && names.iter().any(|name| tier.name.eq_ignore_ascii_case(name))
    })?;
    Some(
        tier.intervals
            .iter()
            .map(|interval| Interval {
                label: interval.text.trim().to_string(),
                start: interval.xmin,
                end: interval.xmax,
            })
            .collect(),
    )
}

fn validate_tier(intervals: &[Interval], tier: &str) -> Result<(), PpgsError> {
    let mut previous_end = 0.0f64;
    for interval in intervals {
        if !interval.start.is_finite() || !interval.end.is_finite() {
            return Err(PpgsError::invalid_input(format!(
                "non-finite {tier} interval bounds [{}, {})",
                interval.start, interval.end
            )));
        }
        if interval.end < interval.start {
            return Err(PpgsError::invalid_input(format!(
                "{tier} interval '{}' ends before it starts: [{}, {})",
                interval.label, interval.start, interval.end
            )));
        }
        if interval.start < previous_end {
            return Err(PpgsError::invalid_input(format!(
                "{tier} interval '{}' overlaps its predecessor at {}",
                interval.label, interval.start
            )));
        }
        previous_end = interval.end;
    }
    Ok(())
}

/// Labels that mark non-speech spans in MFA/charsiu alignments.
pub(crate) fn is_silence(label: &str) -> bool {
    let lowered = label.trim().to_ascii_lowercase();
    matches!(lowered.as_str(), "" | "sp" | "spn" | "sil" | "[sil]" | "<silent>")
}
