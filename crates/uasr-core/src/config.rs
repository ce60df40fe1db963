//! Pipeline configuration, loaded once at startup and passed by reference.
//!
//! Every knob the external tools need lives here; nothing is read from
//! process-wide state after construction.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PipelineError;

fn default_valid_percent() -> f64 {
    0.01
}

fn default_seed() -> u32 {
    1
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Directory of raw audio the pipeline consumes.
    pub dataset_dir: PathBuf,
    /// Root under which every generated artifact lands.
    pub output_dir: PathBuf,

    /// External tool checkouts. Invoked as-is; never introspected.
    pub fairseq_root: PathBuf,
    pub rvad_root: PathBuf,
    pub kenlm_root: PathBuf,
    pub kaldi_root: PathBuf,
    /// Kaldi self-training script directory (train.sh, decode_phone.sh, ...).
    pub kaldi_st_root: PathBuf,

    /// Pretrained wav2vec checkpoint fed to feature extraction and GAN
    /// training.
    pub w2v_checkpoint: PathBuf,
    /// Raw text corpus for LM/text preparation.
    pub text_corpus: PathBuf,
    /// Hydra config name for the GAN trainer (file under the trainer's
    /// `config/gan/` directory, patched in place before training).
    pub gan_config: String,

    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_valid_percent")]
    pub valid_percent: f64,
    #[serde(default = "default_seed")]
    pub seed: u32,
}

const REQUIRED_FIELDS: &[&str] = &[
    "dataset_dir",
    "output_dir",
    "fairseq_root",
    "rvad_root",
    "kenlm_root",
    "kaldi_root",
    "kaldi_st_root",
    "w2v_checkpoint",
    "text_corpus",
    "gan_config",
];

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let value: serde_yaml::Value = serde_yaml::from_str(&raw)
            .map_err(|err| PipelineError::Config(format!("{}: {}", path.display(), err)))?;
        validate_required_fields(&value)?;
        serde_yaml::from_value(value)
            .map_err(|err| PipelineError::Config(format!("{}: {}", path.display(), err)))
    }
}

/// Report every missing field at once instead of failing on the first.
fn validate_required_fields(value: &serde_yaml::Value) -> Result<(), PipelineError> {
    let mut missing = Vec::new();
    for field in REQUIRED_FIELDS {
        let present = value
            .get(field)
            .map(|v| !v.is_null() && v.as_str() != Some(""))
            .unwrap_or(false);
        if !present {
            missing.push(*field);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}
