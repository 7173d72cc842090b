use std::path::{Path, PathBuf};

use clap::Parser;
use ppgs_rs::BottleneckExtractor;

#[derive(Debug, Parser)]
#[command(name = "extract_ppgs")]
#[command(about = "Extract bottleneck PPG features from audio files")]
struct Args {
    #[arg(long, env = "PPGS_CONFIG")]
    config: PathBuf,
    #[arg(long, env = "PPGS_CHECKPOINT")]
    checkpoint: PathBuf,
    #[arg(long, env = "PPGS_DEVICE", default_value = "cpu")]
    device: String,
    /// Directory receiving one `{stem}-ppg.safetensors` per input file.
    #[arg(long, env = "PPGS_OUTPUT_DIR")]
    output_dir: PathBuf,
    /// Audio files to extract features for, processed in order.
    #[arg(required = true)]
    audio_files: Vec<PathBuf>,
}

fn main() {
    if run().is_err() {
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();

    require_path_exists(&args.config, "Missing model config.")?;
    require_path_exists(&args.checkpoint, "Missing model checkpoint.")?;
    for audio_file in &args.audio_files {
        require_path_exists(audio_file, "Missing input audio file.")?;
    }
    std::fs::create_dir_all(&args.output_dir).map_err(|err| {
        format!(
            "Failed to create output directory '{}': {err}",
            args.output_dir.display()
        )
    })?;

    let output_files = args
        .audio_files
        .iter()
        .map(|audio_file| output_path(&args.output_dir, audio_file))
        .collect::<Result<Vec<_>, String>>()?;

    let extractor = BottleneckExtractor::load(&args.config, &args.checkpoint, &args.device)
        .map_err(|err| format!("Failed to load extractor: {err}"))?;
    extractor
        .from_files_to_files(&args.audio_files, &output_files)
        .map_err(|err| format!("Extraction failed: {err}"))?;

    println!(
        "Wrote {} feature file(s) to {}",
        output_files.len(),
        args.output_dir.display()
    );
    Ok(())
}

fn output_path(output_dir: &Path, audio_file: &Path) -> Result<PathBuf, String> {
    let stem = audio_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            format!(
                "Failed to derive stem from audio path '{}'.",
                audio_file.display()
            )
        })?;
    Ok(output_dir.join(format!("{stem}-{}.safetensors", ppgs_rs::REPRESENTATION)))
}

fn require_path_exists(path: &Path, message: &str) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    Err(format!("{message} Missing path: {}", path.display()))
}
