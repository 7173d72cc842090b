use crate::alignment::{is_silence, Alignment, PhonemeMap};
use crate::error::PpgsError;

/// Margin by which a clamped final frame timestamp sits below the alignment
/// duration, keeping it strictly inside the last interval.
const BOUNDARY_EPSILON: f64 = 1e-10;

/// Per-frame center timestamps: frame `k` is centered on `k * hopsize`
/// seconds. Hop rounding can push the final center past the alignment end;
/// that timestamp is pulled back to just inside `duration` so the interval
/// lookup for the last frame cannot fall off the end.
pub fn frame_times(frames: usize, hopsize: f64, duration: f64) -> Vec<f64> {
    let mut times: Vec<f64> = (0..frames).map(|k| k as f64 * hopsize).collect();
    if let Some(last) = times.last_mut() {
        if *last >= duration {
            *last = duration - BOUNDARY_EPSILON;
        }
    }
    times
}

/// Convert a time alignment to a frame-aligned phoneme index sequence and
/// the frame indices where new words begin.
///
/// When `times` is `None` the frame grid is derived from `hopsize` and the
/// alignment duration. Every timestamp must fall inside a phoneme interval;
/// a timestamp in a gap or past the end is an error, as is a phoneme label
/// outside the vocabulary.
pub fn alignment_to_indices(
    alignment: &Alignment,
    hopsize: f64,
    times: Option<&[f64]>,
    map: &PhonemeMap,
) -> Result<(Vec<i64>, Vec<usize>), PpgsError> {
    let derived;
    let times = match times {
        Some(times) => times,
        None => {
            if hopsize <= 0.0 || !hopsize.is_finite() {
                return Err(PpgsError::invalid_input(format!(
                    "cannot derive frame times from hopsize {hopsize}"
                )));
            }
            let frames = (alignment.duration() / hopsize).floor() as usize + 1;
            derived = frame_times(frames, hopsize, alignment.duration());
            &derived
        }
    };

    let phonemes = alignment.phonemes();
    let words = alignment.words();
    let mut indices = Vec::with_capacity(times.len());
    let mut word_breaks = Vec::new();
    let mut phoneme_cursor = 0usize;
    let mut word_cursor = 0usize;
    let mut previous_word: Option<usize> = None;
    let mut previous_time = f64::NEG_INFINITY;

    for (frame, &time) in times.iter().enumerate() {
        if time < previous_time {
            return Err(PpgsError::invalid_input(format!(
                "frame timestamps must be non-decreasing, frame {frame} went backwards"
            )));
        }
        previous_time = time;

        while phoneme_cursor + 1 < phonemes.len() && time >= phonemes[phoneme_cursor].end {
            phoneme_cursor += 1;
        }
        let interval = &phonemes[phoneme_cursor];
        if time < interval.start || time >= interval.end {
            return Err(PpgsError::invalid_input(format!(
                "frame {frame} timestamp {time:.6}s falls outside the alignment (duration {:.6}s)",
                alignment.duration()
            )));
        }
        let class = map.index_of(&interval.label).ok_or_else(|| {
            PpgsError::invalid_input(format!(
                "unknown phoneme label '{}' at {time:.6}s",
                interval.label
            ))
        })?;
        indices.push(class);

        if words.is_empty() {
            continue;
        }
        while word_cursor + 1 < words.len() && time >= words[word_cursor].end {
            word_cursor += 1;
        }
        let word = &words[word_cursor];
        if time >= word.start && time < word.end {
            if previous_word != Some(word_cursor) && !is_silence(&word.label) {
                word_breaks.push(frame);
            }
            previous_word = Some(word_cursor);
        } else {
            previous_word = None;
        }
    }

    Ok((indices, word_breaks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Interval;

    fn interval(label: &str, start: f64, end: f64) -> Interval {
        Interval {
            label: label.to_string(),
            start,
            end,
        }
    }

    fn hello_alignment() -> Alignment {
        Alignment::new(
            vec![
                interval("hh", 0.0, 0.3),
                interval("ah", 0.3, 0.6),
                interval("sp", 0.6, 1.0),
            ],
            vec![interval("hello", 0.0, 0.6), interval("sp", 0.6, 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn final_frame_time_is_clamped_inside_duration() {
        // Duration 1.0005s at a 10ms hop: 102 frames put the last raw
        // center at 1.01s, past the end of the alignment.
        let duration = 1.0005;
        let times = frame_times(102, 0.01, duration);
        assert_eq!(times.len(), 102);
        assert!(times[100] <= duration);
        let last = *times.last().unwrap();
        assert!(last < duration);
        assert!(duration - last >= 0.9e-10);
    }

    #[test]
    fn in_range_frame_times_are_untouched() {
        let times = frame_times(5, 0.01, 1.0);
        assert_eq!(times, vec![0.0, 0.01, 0.02, 0.03, 0.04]);
    }

    #[test]
    fn converts_to_framewise_indices_and_word_breaks() {
        let map = PhonemeMap::default();
        let alignment = hello_alignment();
        let times: Vec<f64> = (0..10).map(|k| k as f64 * 0.1).collect();
        let (indices, word_breaks) =
            alignment_to_indices(&alignment, 0.1, Some(&times), &map).unwrap();

        let hh = map.index_of("hh").unwrap();
        let ah = map.index_of("ah").unwrap();
        let sil = map.silence_index();
        assert_eq!(indices, vec![hh, hh, hh, ah, ah, ah, sil, sil, sil, sil]);
        assert_eq!(word_breaks, vec![0]);
    }

    #[test]
    fn word_break_after_leading_silence() {
        let map = PhonemeMap::default();
        let alignment = Alignment::new(
            vec![
                interval("sp", 0.0, 0.2),
                interval("hh", 0.2, 0.5),
                interval("sp", 0.5, 1.0),
            ],
            vec![
                interval("sp", 0.0, 0.2),
                interval("hi", 0.2, 0.5),
                interval("sp", 0.5, 1.0),
            ],
        )
        .unwrap();
        let times: Vec<f64> = (0..10).map(|k| k as f64 * 0.1).collect();
        let (_, word_breaks) = alignment_to_indices(&alignment, 0.1, Some(&times), &map).unwrap();
        assert_eq!(word_breaks, vec![2]);
    }

    #[test]
    fn derives_frame_grid_when_times_are_absent() {
        let map = PhonemeMap::default();
        let alignment = hello_alignment();
        let (indices, _) = alignment_to_indices(&alignment, 0.25, None, &map).unwrap();
        // floor(1.0 / 0.25) + 1 = 5 frames; the last center is clamped from
        // 1.0 to just below the duration.
        assert_eq!(indices.len(), 5);
        assert_eq!(*indices.last().unwrap(), map.silence_index());
    }

    #[test]
    fn timestamp_past_duration_is_an_error() {
        let map = PhonemeMap::default();
        let alignment = hello_alignment();
        let times = vec![0.0, 0.5, 1.01];
        let err = alignment_to_indices(&alignment, 0.5, Some(&times), &map).unwrap_err();
        assert!(err.to_string().contains("outside the alignment"));
    }

    #[test]
    fn timestamp_in_tier_gap_is_an_error() {
        let map = PhonemeMap::default();
        let alignment = Alignment::new(
            vec![interval("hh", 0.0, 0.3), interval("ah", 0.5, 1.0)],
            vec![],
        )
        .unwrap();
        let err = alignment_to_indices(&alignment, 0.1, Some(&[0.0, 0.4]), &map).unwrap_err();
        assert!(err.to_string().contains("outside the alignment"));
    }

    #[test]
    fn unknown_phoneme_label_is_an_error() {
        let map = PhonemeMap::default();
        let alignment = Alignment::new(vec![interval("qx", 0.0, 1.0)], vec![]).unwrap();
        let err = alignment_to_indices(&alignment, 0.1, Some(&[0.0]), &map).unwrap_err();
        assert!(err.to_string().contains("unknown phoneme label 'qx'"));
    }

    #[test]
    fn descending_timestamps_are_rejected() {
        let map = PhonemeMap::default();
        let alignment = hello_alignment();
        let err =
            alignment_to_indices(&alignment, 0.1, Some(&[0.5, 0.2]), &map).unwrap_err();
        assert!(err.to_string().contains("non-decreasing"));
    }
}
