use std::path::{Path, PathBuf};

use tracing::debug;

const WER_MARKER: &str = "WER:";

#[derive(Debug, Clone, PartialEq)]
pub struct BestResult {
    pub wer: f64,
    pub path: PathBuf,
}

/// Pick the lowest-WER trial reported in `log_text`. Ties keep the first
/// occurrence. `None` means no trial has reported yet, which is a normal
/// outcome early in a stage, not an error.
pub fn select_best(log_text: &str) -> Option<BestResult> {
    let mut best: Option<BestResult> = None;
    for line in log_text.lines() {
        let Some((wer, path)) = parse_trial_line(line) else {
            continue;
        };
        let better = match &best {
            Some(current) => wer < current.wer,
            None => true,
        };
        if better {
            best = Some(BestResult { wer, path });
        }
    }
    if let Some(result) = &best {
        debug!(wer = result.wer, path = %result.path.display(), "selected best trial");
    }
    best
}

/// A trial line carries `WER: <float>%` followed by a parenthesized decode
/// path. The path is the parenthesized token after the score, never an
/// earlier one (tool banners put parentheses before the marker too). Lines
/// missing either token are not trial reports and are skipped.
fn parse_trial_line(line: &str) -> Option<(f64, PathBuf)> {
    let after_label = &line[line.find(WER_MARKER)? + WER_MARKER.len()..];
    let pct = after_label.find('%')?;
    let wer: f64 = after_label[..pct].trim().parse().ok()?;

    let after_score = &after_label[pct..];
    let open = after_score.find('(')?;
    let close = after_score[open + 1..].find(')')? + open + 1;
    let path = after_score[open + 1..close].trim();
    if path.is_empty() {
        return None;
    }
    Some((wer, PathBuf::from(path)))
}

/// Segment of `path` at a fixed offset from the end (0 = last). The decode
/// directories encode the experiment and LM-parameter ids in their last
/// components, e.g. `.../tri3b/decode_7.0.0`.
pub fn path_field(path: &Path, offset_from_end: usize) -> Option<String> {
    let parts: Vec<String> = path
        .iter()
        .map(|c| c.to_string_lossy().into_owned())
        .filter(|c| c != "/")
        .collect();
    let idx = parts.len().checked_sub(1 + offset_from_end)?;
    Some(parts[idx].clone())
}
