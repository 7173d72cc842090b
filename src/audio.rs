use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::PpgsError;
use crate::types::Waveform;

const RESAMPLE_CHUNK: usize = 1024;

/// Decode a wav file to mono f32. Multi-channel input is averaged down.
pub fn load_wav(path: &Path) -> Result<Waveform, PpgsError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(source) => PpgsError::io("open wav", source),
        other => PpgsError::runtime("open wav", other),
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(PpgsError::invalid_input(format!(
            "wav has zero channels: {}",
            path.display()
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| PpgsError::runtime("read wav samples", e))?,
        hound::SampleFormat::Int => {
            let scale = if spec.bits_per_sample > 1 {
                ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| PpgsError::runtime("read wav samples", e))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(Waveform {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Resample mono audio between sample rates with a windowed-sinc filter.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, PpgsError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(PpgsError::invalid_input(format!(
            "cannot resample between rates {from_rate} and {to_rate}"
        )));
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| PpgsError::runtime("resampler init", e))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + RESAMPLE_CHUNK);
    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let input = if chunk.len() < RESAMPLE_CHUNK {
            let mut padded = chunk.to_vec();
            padded.resize(RESAMPLE_CHUNK, 0.0);
            vec![padded]
        } else {
            vec![chunk.to_vec()]
        };
        let resampled = resampler
            .process(&input, None)
            .map_err(|e| PpgsError::runtime("resample", e))?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_same_rate_is_identity() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample(&samples, 16_000, 16_000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn resample_halves_sample_count() {
        let samples = vec![0.0f32; 16_000];
        let out = resample(&samples, 16_000, 8_000).unwrap();
        let expected = samples.len() / 2;
        let tolerance = RESAMPLE_CHUNK;
        assert!(
            out.len().abs_diff(expected) <= tolerance,
            "expected ~{expected} samples, got {}",
            out.len()
        );
    }

    #[test]
    fn resample_rejects_zero_rate() {
        assert!(resample(&[0.0], 0, 16_000).is_err());
        assert!(resample(&[0.0], 16_000, 0).is_err());
    }

    #[test]
    fn load_wav_mixes_stereo_to_mono() {
        let dir = std::env::temp_dir();
        let path = dir.join("ppgs_rs_audio_stereo_test.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        for _ in 0..100 {
            writer.write_sample(10_000i16).expect("write sample");
            writer.write_sample(-10_000i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");

        let waveform = load_wav(&path).expect("load wav");
        assert_eq!(waveform.sample_rate, 16_000);
        assert_eq!(waveform.samples.len(), 100);
        for sample in &waveform.samples {
            assert!(sample.abs() < 1e-6, "stereo average should cancel out");
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_wav_missing_file_is_io_error() {
        let err = load_wav(Path::new("/nonexistent/ppgs_rs_missing.wav")).unwrap_err();
        assert!(matches!(err, PpgsError::Io { .. }));
    }
}
