//! The fixed step sequences of the three pipeline stages.
//!
//! Step order encodes the real data dependencies between the external
//! tools: manifests before VAD, silence removal before feature extraction,
//! GAN training before transcription, transcription before self-training.
//! Stages are separate entry points and never chain automatically; the
//! operator inspects outputs between them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Result};
use tracing::{info, warn};
use uasr_analysis::{path_field, select_best, BestResult};
use uasr_config::vars::shell_quote;
use uasr_config::yaml::{apply_file, PatchOp};
use uasr_core::ensure_dir;

use crate::command::{latest_log, require_artifact, run_tool, shell};
use crate::runner::{run_stage, run_step, Step};
use crate::PipelineContext;

/// PCA dimension and transformer layer used for feature extraction,
/// matched to the wav2vec checkpoint family the pipeline targets.
const PCA_DIM: u32 = 512;
const FEATURE_LAYER: u32 = 14;

fn unsup_scripts(fairseq_root: &Path) -> PathBuf {
    fairseq_root.join("examples/wav2vec/unsupervised/scripts")
}

fn features_dir(ctx: &PipelineContext) -> PathBuf {
    ctx.paths
        .clustering_dir
        .join(format!("precompute_pca{}_cls128_mean_pooled", PCA_DIM))
}

fn phones_dir(ctx: &PipelineContext) -> PathBuf {
    ctx.paths.text_dir.join("phones")
}

fn phone_lm(ctx: &PipelineContext) -> PathBuf {
    phones_dir(ctx).join("lm.phones.filtered.04.bin")
}

fn clean_audio_dir(ctx: &PipelineContext) -> PathBuf {
    ctx.config.output_dir.join("audio_clean")
}

fn clean_manifest_dir(ctx: &PipelineContext) -> PathBuf {
    ctx.paths.manifest_dir.join("clean")
}

/// Stage 1: manifests and silence removal.
pub fn run_setup(ctx: &PipelineContext) -> Result<()> {
    let steps = vec![
        Step::new("manifest", || step_manifest(ctx)),
        Step::new("vads", || step_vads(ctx)),
        Step::new("remove_silence", || step_remove_silence(ctx)),
        Step::new("manifest_clean", || step_manifest_clean(ctx)),
    ];
    run_stage(&ctx.store, "setup", steps)
}

fn step_manifest(ctx: &PipelineContext) -> Result<()> {
    let cfg = &ctx.config;
    let mut cmd = Command::new("python");
    cmd.arg(cfg.fairseq_root.join("examples/wav2vec/wav2vec_manifest.py"))
        .arg(&cfg.dataset_dir)
        .arg("--dest")
        .arg(&ctx.paths.manifest_dir)
        .arg("--ext")
        .arg("wav")
        .arg("--valid-percent")
        .arg(cfg.valid_percent.to_string());
    run_tool("manifest", cmd, &ctx.paths.log_dir)?;
    require_artifact(&ctx.paths.manifest_dir.join("train.tsv"))?;
    Ok(())
}

fn step_vads(ctx: &PipelineContext) -> Result<()> {
    let script = vads_script(
        &unsup_scripts(&ctx.config.fairseq_root).join("vads.py"),
        &ctx.config.rvad_root,
        &ctx.paths.manifest_dir.join("train.tsv"),
        &ctx.paths.manifest_dir.join("train.vads"),
    );
    run_tool("vads", shell(&script), &ctx.paths.log_dir)?;
    require_artifact(&ctx.paths.manifest_dir.join("train.vads"))?;
    Ok(())
}

/// vads.py reads the manifest on stdin and writes one VAD line per
/// utterance on stdout, so this step goes through `sh -c`. Every
/// interpolated path is quoted; they come from operator config.
fn vads_script(script: &Path, rvad_root: &Path, manifest: &Path, vads_out: &Path) -> String {
    format!(
        "python {} -r {} < {} > {}",
        shell_quote(&script.display().to_string()),
        shell_quote(&rvad_root.display().to_string()),
        shell_quote(&manifest.display().to_string()),
        shell_quote(&vads_out.display().to_string()),
    )
}

fn step_remove_silence(ctx: &PipelineContext) -> Result<()> {
    let out = clean_audio_dir(ctx);
    ensure_dir(&out)?;
    let mut cmd = Command::new("python");
    cmd.arg(unsup_scripts(&ctx.config.fairseq_root).join("remove_silence.py"))
        .arg("--tsv")
        .arg(ctx.paths.manifest_dir.join("train.tsv"))
        .arg("--vads")
        .arg(ctx.paths.manifest_dir.join("train.vads"))
        .arg("--out")
        .arg(&out);
    run_tool("remove_silence", cmd, &ctx.paths.log_dir)?;
    Ok(())
}

fn step_manifest_clean(ctx: &PipelineContext) -> Result<()> {
    let cfg = &ctx.config;
    let dest = clean_manifest_dir(ctx);
    ensure_dir(&dest)?;
    let mut cmd = Command::new("python");
    cmd.arg(cfg.fairseq_root.join("examples/wav2vec/wav2vec_manifest.py"))
        .arg(clean_audio_dir(ctx))
        .arg("--dest")
        .arg(&dest)
        .arg("--ext")
        .arg("wav")
        .arg("--valid-percent")
        .arg(cfg.valid_percent.to_string());
    run_tool("manifest_clean", cmd, &ctx.paths.log_dir)?;
    require_artifact(&dest.join("train.tsv"))?;
    Ok(())
}

/// Stage 2: feature/text preparation and GAN training.
pub fn run_train(ctx: &PipelineContext) -> Result<()> {
    let steps = vec![
        Step::new("prepare_audio", || step_prepare_audio(ctx)),
        Step::new("prepare_text", || step_prepare_text(ctx)),
        Step::new("train_gan", || step_train_gan(ctx)),
        Step::new("generate_transcriptions", || step_generate(ctx)),
    ];
    run_stage(&ctx.store, "train", steps)
}

fn step_prepare_audio(ctx: &PipelineContext) -> Result<()> {
    let cfg = &ctx.config;
    let mut cmd = Command::new("bash");
    cmd.arg(unsup_scripts(&cfg.fairseq_root).join("prepare_audio.sh"))
        .arg(clean_manifest_dir(ctx))
        .arg(&ctx.paths.clustering_dir)
        .arg(&cfg.w2v_checkpoint)
        .arg(PCA_DIM.to_string())
        .arg(FEATURE_LAYER.to_string())
        .env("FAIRSEQ_ROOT", &cfg.fairseq_root);
    run_tool("prepare_audio", cmd, &ctx.paths.log_dir)?;
    require_artifact(&features_dir(ctx).join("train.npy"))?;
    Ok(())
}

fn step_prepare_text(ctx: &PipelineContext) -> Result<()> {
    let cfg = &ctx.config;
    let mut cmd = Command::new("bash");
    cmd.arg(unsup_scripts(&cfg.fairseq_root).join("prepare_text.sh"))
        .arg(&cfg.language)
        .arg(&cfg.text_corpus)
        .arg(&ctx.paths.text_dir)
        .arg("100")
        .arg("espeak")
        .arg("0.25")
        .env("FAIRSEQ_ROOT", &cfg.fairseq_root)
        .env("KENLM_ROOT", &cfg.kenlm_root)
        .env("KALDI_ROOT", &cfg.kaldi_root);
    run_tool("prepare_text", cmd, &ctx.paths.log_dir)?;
    require_artifact(&phone_lm(ctx))?;
    Ok(())
}

fn step_train_gan(ctx: &PipelineContext) -> Result<()> {
    let cfg = &ctx.config;
    let config_dir = cfg
        .fairseq_root
        .join("examples/wav2vec/unsupervised/config/gan");
    let config_file = config_dir.join(format!("{}.yaml", cfg.gan_config));
    let save_dir = ctx.paths.results_dir.join("gan");

    // One load-mutate-save pass over the trainer's own config; the trainer
    // is then launched without command-line overrides.
    apply_file(
        &config_file,
        &[
            PatchOp::set("task.data", &features_dir(ctx).display().to_string()),
            PatchOp::set("task.text_data", &phones_dir(ctx).display().to_string()),
            PatchOp::set("task.kenlm_path", &phone_lm(ctx).display().to_string()),
            PatchOp::set("common.seed", &cfg.seed.to_string()),
            PatchOp::set("checkpoint.save_dir", &save_dir.display().to_string()),
            // The stock config publishes metrics to a tracking project the
            // pipeline host cannot reach.
            PatchOp::delete("common.wandb_project"),
        ],
    )?;

    let mut cmd = Command::new("python");
    cmd.arg(cfg.fairseq_root.join("fairseq_cli/hydra_train.py"))
        .arg("--config-dir")
        .arg(&config_dir)
        .arg("--config-name")
        .arg(&cfg.gan_config)
        .env("PYTHONPATH", &cfg.fairseq_root)
        .env("HYDRA_FULL_ERROR", "1");
    run_tool("train_gan", cmd, &ctx.paths.log_dir)?;
    require_artifact(&save_dir.join("checkpoint_best.pt"))?;
    Ok(())
}

fn step_generate(ctx: &PipelineContext) -> Result<()> {
    let cfg = &ctx.config;
    let out = ctx.paths.results_dir.join("transcriptions");
    let mut cmd = Command::new("python");
    cmd.arg(unsup_scripts(&cfg.fairseq_root).join("w2vu_generate.py"))
        .arg("--config-dir")
        .arg(
            cfg.fairseq_root
                .join("examples/wav2vec/unsupervised/config/generate"),
        )
        .arg("--config-name")
        .arg("viterbi")
        .arg(format!(
            "fairseq.common_eval.path={}",
            ctx.paths.results_dir.join("gan/checkpoint_best.pt").display()
        ))
        .arg(format!("fairseq.task.data={}", features_dir(ctx).display()))
        .arg(format!("results_path={}", out.display()))
        .env("PYTHONPATH", &cfg.fairseq_root);
    run_tool("generate_transcriptions", cmd, &ctx.paths.log_dir)?;
    require_artifact(&out)?;
    Ok(())
}

/// Stage 3: HMM self-training and the three decoding passes.
///
/// Each pass's best decode (lowest WER mined from its run log) selects the
/// experiment and LM parameters fed to the next pass through the kaldi
/// scripts' variable assignments.
pub fn run_self_train(ctx: &PipelineContext) -> Result<()> {
    let st_root = ctx.config.kaldi_st_root.clone();
    let out_dir = ctx.paths.results_dir.join("st");
    let lab_dir = ctx.paths.results_dir.join("transcriptions");

    run_step(&ctx.store, "hmm_pass1", || {
        require_artifact(&lab_dir)?;
        patch_script(
            &st_root.join("train.sh"),
            &[
                ("w2v_dir", features_dir(ctx).display().to_string()),
                ("lab_dir", lab_dir.display().to_string()),
                ("out_dir", out_dir.display().to_string()),
                (
                    "arpa_lm",
                    phones_dir(ctx).join("lm.phones.filtered.04.arpa").display().to_string(),
                ),
                ("arpa_lm_bin", phone_lm(ctx).display().to_string()),
            ],
        )?;
        run_st_script(ctx, "hmm_pass1", "train.sh")
    })?;

    run_step(&ctx.store, "decode_phone", || {
        patch_script(
            &st_root.join("decode_phone.sh"),
            &[("out_dir", out_dir.display().to_string())],
        )?;
        run_st_script(ctx, "decode_phone", "decode_phone.sh")
    })?;

    let Some(best_phone) = mine(ctx, "decode_phone")? else {
        warn!("no phone decode results yet; stopping before word passes");
        return Ok(());
    };
    let (dec_exp, dec_lmparam) = decode_fields(&best_phone)?;
    info!(wer = best_phone.wer, exp = %dec_exp, lmparam = %dec_lmparam, "best phone decode");

    run_step(&ctx.store, "hmm_pass2", || {
        patch_script(
            &st_root.join("train_1.sh"),
            &[
                ("out_dir", out_dir.display().to_string()),
                ("dec_exp", dec_exp.clone()),
                ("dec_lmparam", dec_lmparam.clone()),
            ],
        )?;
        run_st_script(ctx, "hmm_pass2", "train_1.sh")
    })?;

    run_step(&ctx.store, "decode_word_1", || {
        patch_script(
            &st_root.join("decode_word_step1.sh"),
            &[
                ("w2v_dir", features_dir(ctx).display().to_string()),
                ("out_dir", out_dir.display().to_string()),
                ("dec_exp", dec_exp.clone()),
            ],
        )?;
        run_st_script(ctx, "decode_word_1", "decode_word_step1.sh")
    })?;

    let Some(best_word) = mine(ctx, "decode_word_1")? else {
        warn!("no word decode results yet; stopping before the final pass");
        return Ok(());
    };
    let (word_exp, word_lmparam) = decode_fields(&best_word)?;
    info!(wer = best_word.wer, exp = %word_exp, lmparam = %word_lmparam, "best word decode");

    run_step(&ctx.store, "hmm_pass3", || {
        patch_script(
            &st_root.join("train_2.sh"),
            &[
                ("out_dir", out_dir.display().to_string()),
                ("dec_exp", word_exp.clone()),
                ("dec_lmparam", word_lmparam.clone()),
            ],
        )?;
        run_st_script(ctx, "hmm_pass3", "train_2.sh")
    })?;

    run_step(&ctx.store, "decode_word_2", || {
        patch_script(
            &st_root.join("decode_word_step2.sh"),
            &[
                ("out_dir", out_dir.display().to_string()),
                ("dec_exp", word_exp.clone()),
            ],
        )?;
        run_st_script(ctx, "decode_word_2", "decode_word_step2.sh")
    })?;

    match mine(ctx, "decode_word_2")? {
        Some(best) => {
            info!(wer = best.wer, path = %best.path.display(), "self-training finished");
        }
        None => warn!("final decode produced no results"),
    }
    Ok(())
}

fn run_st_script(ctx: &PipelineContext, step: &str, script: &str) -> Result<()> {
    let mut cmd = Command::new("bash");
    cmd.arg(ctx.config.kaldi_st_root.join(script))
        .current_dir(&ctx.config.kaldi_st_root)
        .env("KALDI_ROOT", &ctx.config.kaldi_root)
        .env("FAIRSEQ_ROOT", &ctx.config.fairseq_root);
    run_tool(step, cmd, &ctx.paths.log_dir)?;
    Ok(())
}

/// Update the script's `name=value` assignments, logging any variable the
/// script turned out not to declare (update-only contract).
fn patch_script(script: &Path, pairs: &[(&str, String)]) -> Result<()> {
    let wanted: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let updated = uasr_config::vars::update_vars(script, &wanted)?;
    for name in wanted.keys() {
        if !updated.contains(name) {
            warn!(script = %script.display(), var = %name, "variable not declared in script; left as-is");
        }
    }
    Ok(())
}

/// Best result mined from the most recent log of `step`, or `None` when no
/// run has reported yet.
fn mine(ctx: &PipelineContext, step: &str) -> Result<Option<BestResult>> {
    let Some(log) = latest_log(&ctx.paths.log_dir, step)? else {
        return Ok(None);
    };
    let text = fs::read_to_string(&log)?;
    Ok(select_best(&text))
}

/// The decode directory encodes `<experiment>/decode_<lmparam>` in its two
/// trailing path segments.
fn decode_fields(best: &BestResult) -> Result<(String, String)> {
    let exp = path_field(&best.path, 1)
        .ok_or_else(|| anyhow!("decode path too short: {}", best.path.display()))?;
    let last = path_field(&best.path, 0)
        .ok_or_else(|| anyhow!("decode path too short: {}", best.path.display()))?;
    let lmparam = last.strip_prefix("decode_").unwrap_or(&last).to_string();
    Ok((exp, lmparam))
}
