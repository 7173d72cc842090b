//! End-to-end data pipeline checks: a synthetic cache directory driven
//! through Dataset, Loader and the collation engine.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use ppgs_rs::data::sampler::SequentialBatchPolicy;
use ppgs_rs::{Dataset, Loader, PpgsConfig, RandomBatchPolicy, IGNORE_INDEX, SAMPLE_RATE};
use textgrid::{TextGrid, Tier, TierType};

const CHANNELS: usize = 4;

struct Fixture {
    dir: PathBuf,
    stems: Vec<String>,
    frames: Vec<usize>,
}

impl Fixture {
    /// One stem per entry in `frames`; stem `i` has feature value
    /// `i * 1000 + c * 100 + l` at channel `c`, frame `l`.
    fn new(name: &str, frames: &[usize]) -> Self {
        let dir = std::env::temp_dir().join(format!("ppgs_rs_pipeline_{name}"));
        std::fs::create_dir_all(&dir).expect("create fixture dir");
        let mut stems = Vec::new();
        for (i, &frame_count) in frames.iter().enumerate() {
            let stem = format!("utt{i}");
            write_stem(&dir, &stem, i, frame_count);
            stems.push(stem);
        }
        Self {
            dir,
            stems,
            frames: frames.to_vec(),
        }
    }

    fn dataset(&self) -> Dataset {
        Dataset::new(&self.dir, self.stems.clone(), "ppg")
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn feature_value(stem_index: usize, channel: usize, frame: usize) -> f32 {
    (stem_index * 1000 + channel * 100 + frame) as f32
}

fn write_stem(dir: &Path, stem: &str, stem_index: usize, frames: usize) {
    let mut data = Vec::with_capacity(CHANNELS * frames);
    for c in 0..CHANNELS {
        for l in 0..frames {
            data.push(feature_value(stem_index, c, l));
        }
    }
    let ppg = Tensor::from_vec(data, (CHANNELS, frames), &Device::Cpu).unwrap();
    ppg.save_safetensors("ppg", dir.join(format!("{stem}-ppg.safetensors")))
        .expect("write features");

    // Frame centers sit at k * 10ms; a duration of exactly (frames - 1)
    // hops puts the last center on the alignment end so the boundary clamp
    // is exercised for every stem.
    let duration = (frames.max(2) - 1) as f64 * 0.01;
    let half = duration / 2.0;
    let mut textgrid = TextGrid::new(0.0, duration).expect("textgrid");
    textgrid
        .add_tier(Tier {
            name: "phones".to_string(),
            tier_type: TierType::IntervalTier,
            xmin: 0.0,
            xmax: duration,
            intervals: vec![
                textgrid::Interval {
                    xmin: 0.0,
                    xmax: half,
                    text: "hh".to_string(),
                },
                textgrid::Interval {
                    xmin: half,
                    xmax: duration,
                    text: "ah".to_string(),
                },
            ],
            points: Vec::new(),
        })
        .expect("phones tier");
    textgrid
        .add_tier(Tier {
            name: "words".to_string(),
            tier_type: TierType::IntervalTier,
            xmin: 0.0,
            xmax: duration,
            intervals: vec![textgrid::Interval {
                xmin: 0.0,
                xmax: duration,
                text: "ha".to_string(),
            }],
            points: Vec::new(),
        })
        .expect("words tier");
    textgrid
        .to_file(&dir.join(format!("{stem}.textgrid")), false)
        .expect("write textgrid");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(dir.join(format!("{stem}.wav")), spec).expect("wav");
    for i in 0..(duration * SAMPLE_RATE as f64) as usize {
        writer.write_sample((i % 64) as i16).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

#[test]
fn training_batches_satisfy_padding_invariants() {
    let fixture = Fixture::new("invariants", &[40, 103, 77]);
    let loader = Loader::new(
        fixture.dataset(),
        Box::new(SequentialBatchPolicy::new(3)),
        2,
    );

    let mut batches = loader.training_batches();
    let batch = batches.next().expect("one batch").expect("batch ok");
    assert!(batches.next().is_none());

    let max_length = *fixture.frames.iter().max().unwrap();
    assert_eq!(batch.ppgs.dims(), &[3, CHANNELS, max_length]);
    assert_eq!(batch.indices.dims(), &[3, max_length]);
    assert_eq!(
        batch.lengths.to_vec1::<i64>().unwrap(),
        fixture
            .frames
            .iter()
            .map(|&f| f as i64)
            .collect::<Vec<i64>>()
    );

    let features = batch.ppgs.to_vec3::<f32>().unwrap();
    let indices = batch.indices.to_vec2::<i64>().unwrap();
    for (i, &frames) in fixture.frames.iter().enumerate() {
        // Real frames are copied exactly, in order.
        for c in 0..CHANNELS {
            for l in 0..frames {
                assert_eq!(features[i][c][l], feature_value(i, c, l));
            }
            // Feature padding is zero.
            for l in frames..max_length {
                assert_eq!(features[i][c][l], 0.0);
            }
        }
        // Real labels are valid classes; label padding is the sentinel.
        for l in 0..frames {
            assert!(indices[i][l] >= 0);
        }
        for l in frames..max_length {
            assert_eq!(indices[i][l], IGNORE_INDEX);
        }
    }
}

#[test]
fn evaluation_batches_pass_artifacts_through_in_order() {
    let fixture = Fixture::new("eval", &[40, 103, 77, 55]);
    let loader = Loader::new(
        fixture.dataset(),
        Box::new(SequentialBatchPolicy::new(2)),
        2,
    );

    let batches: Vec<_> = loader
        .evaluation_batches()
        .collect::<Result<_, _>>()
        .expect("eval batches");
    assert_eq!(batches.len(), 2);

    assert_eq!(batches[0].stems, vec!["utt0", "utt1"]);
    assert_eq!(batches[1].stems, vec!["utt2", "utt3"]);
    for batch in &batches {
        assert_eq!(batch.alignments.len(), 2);
        assert_eq!(batch.word_breaks.len(), 2);
        assert_eq!(batch.waveforms.len(), 2);
        for word_breaks in &batch.word_breaks {
            assert_eq!(word_breaks, &vec![0]);
        }
        for (alignment, waveform) in batch.alignments.iter().zip(batch.waveforms.iter()) {
            assert!(alignment.duration() > 0.0);
            assert_eq!(waveform.sample_rate, SAMPLE_RATE);
        }
    }
}

#[test]
fn random_policy_epochs_are_reproducible_across_loaders() {
    let fixture = Fixture::new("random", &[40, 103, 77, 55, 62]);

    let stems_with_seed = |seed: u64| -> Vec<Vec<String>> {
        let loader = Loader::new(
            fixture.dataset(),
            Box::new(RandomBatchPolicy::new(2, seed)),
            2,
        );
        loader
            .evaluation_batches()
            .map(|batch| batch.expect("eval batch").stems)
            .collect()
    };

    let first = stems_with_seed(7);
    assert_eq!(first, stems_with_seed(7));

    let mut all_stems: Vec<String> = first.into_iter().flatten().collect();
    all_stems.sort();
    assert_eq!(all_stems, vec!["utt0", "utt1", "utt2", "utt3", "utt4"]);
}

#[test]
fn config_composes_a_partition_loader() {
    let fixture = Fixture::new("config", &[40, 55]);
    std::fs::write(
        fixture.dir.join("partitions.json"),
        r#"{"train": ["utt0", "utt1"], "valid": []}"#,
    )
    .expect("write partitions");

    let config = PpgsConfig {
        cache_dir: fixture.dir.clone(),
        num_workers: 2,
        ..PpgsConfig::default()
    };
    let loader = config
        .loader("train", Box::new(SequentialBatchPolicy::new(2)))
        .expect("loader from config");
    let batch = loader
        .training_batches()
        .next()
        .expect("one batch")
        .expect("batch ok");
    assert_eq!(batch.lengths.to_vec1::<i64>().unwrap(), vec![40, 55]);

    assert!(config.loader("test", Box::new(SequentialBatchPolicy::new(2))).is_err());
}

#[test]
fn single_item_batch_keeps_batch_dimensions_end_to_end() {
    let fixture = Fixture::new("single", &[25]);
    let loader = Loader::new(
        fixture.dataset(),
        Box::new(SequentialBatchPolicy::new(1)),
        0,
    );
    let batch = loader
        .training_batches()
        .next()
        .expect("one batch")
        .expect("batch ok");
    assert_eq!(batch.ppgs.dims(), &[1, CHANNELS, 25]);
    assert_eq!(batch.indices.dims(), &[1, 25]);
    assert_eq!(batch.lengths.dims(), &[1]);
}
