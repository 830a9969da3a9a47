/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX export and tokenizer of the local embedding model when
/// they are not already present.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// HuggingFace repository of the default local model.
pub const DEFAULT_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Files required for the embedder, with their paths inside the repository.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Return the default model directory path.
#[must_use]
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models/all-MiniLM-L6-v2")
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Files from [`MODEL_FILES`] that are not yet in `model_dir`.
fn missing_files(model_dir: &Path) -> Vec<(&'static str, &'static str)> {
    MODEL_FILES
        .iter()
        .filter(|(name, _)| !model_dir.join(name).exists())
        .copied()
        .collect()
}

/// Download the default model's files into `model_dir` if any are missing.
pub fn download_model_files(model_dir: &Path) -> Result<()> {
    download_from_repo(model_dir, DEFAULT_REPO)
}

/// Download missing files of `repo` into `model_dir`.
///
/// Files are written to a `.part` sibling first and renamed once complete,
/// so an interrupted download is retried on the next start.
pub fn download_from_repo(model_dir: &Path, repo: &str) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    let missing = missing_files(model_dir);
    if missing.is_empty() {
        info!("All model files found in {}", model_dir.display());
        return Ok(());
    }

    info!("Downloading {} model files from {repo}...", missing.len());

    for (filename, url_path) in missing {
        let dest = model_dir.join(filename);
        let url = format!("https://huggingface.co/{repo}/resolve/main/{url_path}");
        info!("Downloading {filename}...");
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
    }

    info!("Model download complete");
    Ok(())
}

/// Download a single file with a progress bar.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let mut resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);
    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                .context("invalid progress template")?
                .progress_chars("█▓░"),
        );
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let partial = dest.with_extension("part");
    let file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;
    let mut writer = pb.wrap_write(file);
    resp.copy_to(&mut writer)
        .context("failed to stream response body")?;
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;
    Ok(())
}
