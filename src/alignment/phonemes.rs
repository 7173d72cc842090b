use std::collections::HashMap;

use crate::alignment::is_silence;

/// Fixed phoneme vocabulary: 39 CMU/charsiu phoneme classes plus silence.
/// Class indices are positions in this list; silence is the final class.
pub const PHONEMES: [&str; 40] = [
    "aa", "ae", "ah", "ao", "aw", "ay", "b", "ch", "d", "dh", "eh", "er", "ey", "f", "g", "hh",
    "ih", "iy", "jh", "k", "l", "m", "n", "ng", "ow", "oy", "p", "r", "s", "sh", "t", "th", "uh",
    "uw", "v", "w", "y", "z", "zh", "sil",
];

/// Phoneme label to class index lookup with MFA-style normalization:
/// labels are lowercased, trailing stress digits stripped, and silence
/// aliases collapsed onto the silence class.
#[derive(Debug, Clone)]
pub struct PhonemeMap {
    index: HashMap<String, i64>,
    silence: i64,
}

impl Default for PhonemeMap {
    fn default() -> Self {
        let index = PHONEMES
            .iter()
            .enumerate()
            .map(|(i, phoneme)| (phoneme.to_string(), i as i64))
            .collect();
        Self {
            index,
            silence: (PHONEMES.len() - 1) as i64,
        }
    }
}

impl PhonemeMap {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn silence_index(&self) -> i64 {
        self.silence
    }

    /// Look up the class index for an alignment label, or `None` when the
    /// label is not in the vocabulary.
    pub fn index_of(&self, label: &str) -> Option<i64> {
        if is_silence(label) {
            return Some(self.silence);
        }
        let normalized = normalize(label);
        self.index.get(&normalized).copied()
    }
}

fn normalize(label: &str) -> String {
    let lowered = label.trim().to_ascii_lowercase();
    lowered
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_string()
}
