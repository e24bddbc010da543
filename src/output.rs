//! Output directory preparation.

use crate::config::OutputConfig;
use rand::Rng;
use sceneloom_common::{Error, Result};
use std::path::{Path, PathBuf};

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const RANDOM_SUFFIX_LEN: usize = 8;

/// Create the directory a run writes into and return it.
///
/// Without a suffix this is `output.dir` itself. With one, it is a fresh
/// `{dir}/video_{suffix}` that must not exist yet, so two runs never share it.
pub fn prepare_output_dir(config: &OutputConfig) -> Result<PathBuf> {
    create_dir(&config.dir)?;

    let suffix = if config.random_suffix {
        Some(random_suffix())
    } else {
        match &config.suffix {
            Some(raw) => Some(clean_suffix(raw)?),
            None => None,
        }
    };

    let Some(suffix) = suffix else {
        return Ok(config.dir.clone());
    };

    let dir = config.dir.join(format!("video_{suffix}"));
    if dir.exists() {
        return Err(Error::setup(format!(
            "output directory {} already exists; choose another suffix",
            dir.display()
        )));
    }
    create_dir(&dir)?;

    tracing::info!(dir = %dir.display(), "Prepared output directory");
    Ok(dir)
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::setup(format!(
            "failed to create output directory {}: {}",
            dir.display(),
            e
        ))
    })
}

fn clean_suffix(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();

    if cleaned.is_empty() {
        return Err(Error::setup(
            "output suffix is empty; provide a suffix or enable random_suffix",
        ));
    }
    Ok(cleaned)
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}
