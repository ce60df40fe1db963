//! Dotted-path point operations over YAML documents.
//!
//! Values are always written as string scalars; the external consumers
//! (hydra and friends) coerce them on their side, and guessing types here
//! would change what the tool sees.

use std::fs;
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::PatchError;

#[derive(Debug, Clone)]
pub enum PatchOp {
    Set { path: String, value: String },
    Delete { path: String },
}

impl PatchOp {
    pub fn set(path: &str, value: &str) -> Self {
        PatchOp::Set {
            path: path.to_string(),
            value: value.to_string(),
        }
    }

    pub fn delete(path: &str) -> Self {
        PatchOp::Delete {
            path: path.to_string(),
        }
    }
}

fn split_path(dotted: &str) -> Result<Vec<&str>, PatchError> {
    if dotted.is_empty() {
        return Err(PatchError::InvalidPath(dotted.to_string()));
    }
    let segments: Vec<&str> = dotted.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PatchError::InvalidPath(dotted.to_string()));
    }
    Ok(segments)
}

/// Create-or-overwrite the leaf at `dotted`, creating intermediate mappings
/// as needed. An existing scalar in the middle of the path is an error, not
/// something to silently clobber.
pub fn set_path(doc: &mut Value, dotted: &str, value: &str) -> Result<(), PatchError> {
    let segments = split_path(dotted)?;
    let mut cur = doc;
    for segment in &segments[..segments.len() - 1] {
        if cur.is_null() {
            *cur = Value::Mapping(Mapping::new());
        }
        let map = cur
            .as_mapping_mut()
            .ok_or_else(|| PatchError::NotAMapping {
                path: dotted.to_string(),
                segment: segment.to_string(),
            })?;
        let key = Value::String(segment.to_string());
        if !map.contains_key(&key) {
            map.insert(key.clone(), Value::Mapping(Mapping::new()));
        }
        cur = map.get_mut(&key).ok_or_else(|| PatchError::NotAMapping {
            path: dotted.to_string(),
            segment: segment.to_string(),
        })?;
    }
    if cur.is_null() {
        *cur = Value::Mapping(Mapping::new());
    }
    let leaf = segments[segments.len() - 1];
    let map = cur
        .as_mapping_mut()
        .ok_or_else(|| PatchError::NotAMapping {
            path: dotted.to_string(),
            segment: leaf.to_string(),
        })?;
    map.insert(
        Value::String(leaf.to_string()),
        Value::String(value.to_string()),
    );
    Ok(())
}

/// Remove the key (and any subtree) at `dotted`. A missing path is an
/// error so a typo in a patch does not pass silently.
pub fn delete_path(doc: &mut Value, dotted: &str) -> Result<(), PatchError> {
    let segments = split_path(dotted)?;
    let mut cur = doc;
    for segment in &segments[..segments.len() - 1] {
        cur = cur
            .as_mapping_mut()
            .and_then(|map| map.get_mut(&Value::String(segment.to_string())))
            .ok_or_else(|| PatchError::MissingPath {
                path: dotted.to_string(),
            })?;
    }
    let leaf = segments[segments.len() - 1];
    cur.as_mapping_mut()
        .and_then(|map| map.remove(&Value::String(leaf.to_string())))
        .ok_or_else(|| PatchError::MissingPath {
            path: dotted.to_string(),
        })?;
    Ok(())
}

/// Read the value at `dotted`, if present.
pub fn get_path<'a>(doc: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut cur = doc;
    for segment in dotted.split('.') {
        cur = cur.as_mapping()?.get(&Value::String(segment.to_string()))?;
    }
    Some(cur)
}

/// Apply a batch of ops against one file in a single load-mutate-save
/// cycle. The rewrite happens only if every op applied; a failing op leaves
/// the file untouched.
pub fn apply_file(file: &Path, ops: &[PatchOp]) -> Result<(), PatchError> {
    if !file.exists() {
        return Err(PatchError::MissingFile(file.to_path_buf()));
    }
    let raw = fs::read_to_string(file)?;
    let mut doc: Value = serde_yaml::from_str(&raw)?;
    for op in ops {
        match op {
            PatchOp::Set { path, value } => set_path(&mut doc, path, value)?,
            PatchOp::Delete { path } => delete_path(&mut doc, path)?,
        }
    }
    let out = serde_yaml::to_string(&doc)?;
    fs::write(file, out)?;
    debug!(file = %file.display(), ops = ops.len(), "patched config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc(raw: &str) -> Value {
        serde_yaml::from_str(raw).expect("yaml")
    }

    #[test]
    fn set_round_trips_and_creates_intermediates() {
        let mut value = doc("task:\n  data: old\n");
        set_path(&mut value, "task.data", "/feats/precompute").expect("set");
        set_path(&mut value, "model.discriminator.depth", "2").expect("set nested");
        assert_eq!(
            get_path(&value, "task.data").and_then(|v| v.as_str()),
            Some("/feats/precompute")
        );
        assert_eq!(
            get_path(&value, "model.discriminator.depth").and_then(|v| v.as_str()),
            Some("2")
        );
    }

    #[test]
    fn set_writes_string_scalars_without_type_inference() {
        let mut value = doc("common: {}\n");
        set_path(&mut value, "common.seed", "7").expect("set");
        let leaf = get_path(&value, "common.seed").expect("leaf");
        assert!(leaf.is_string());
    }

    #[test]
    fn set_through_scalar_is_an_error() {
        let mut value = doc("task: plain\n");
        let err = set_path(&mut value, "task.data", "x").expect_err("must fail");
        assert!(matches!(err, PatchError::NotAMapping { .. }));
    }

    #[test]
    fn delete_removes_subtree_and_missing_is_an_error() {
        let mut value = doc("common:\n  wandb_project: w2vu\n  seed: 1\n");
        delete_path(&mut value, "common.wandb_project").expect("delete");
        assert!(get_path(&value, "common.wandb_project").is_none());
        let err = delete_path(&mut value, "common.wandb_project").expect_err("must fail");
        assert!(matches!(err, PatchError::MissingPath { .. }));
    }

    #[test]
    fn empty_segments_are_rejected() {
        let mut value = doc("a: 1\n");
        assert!(matches!(
            set_path(&mut value, "a..b", "x"),
            Err(PatchError::InvalidPath(_))
        ));
        assert!(matches!(
            delete_path(&mut value, ""),
            Err(PatchError::InvalidPath(_))
        ));
    }

    fn temp_file(tag: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "uasr_yaml_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.yaml");
        fs::write(&path, body).expect("seed file");
        path
    }

    #[test]
    fn batch_applies_all_ops_in_one_rewrite() {
        let path = temp_file("batch", "task:\n  data: old\ncommon:\n  wandb_project: w2vu\n");
        apply_file(
            &path,
            &[
                PatchOp::set("task.data", "/feats"),
                PatchOp::set("task.kenlm_path", "/lm/lm.bin"),
                PatchOp::delete("common.wandb_project"),
            ],
        )
        .expect("apply");
        let value = doc(&fs::read_to_string(&path).expect("read back"));
        assert_eq!(
            get_path(&value, "task.kenlm_path").and_then(|v| v.as_str()),
            Some("/lm/lm.bin")
        );
        assert!(get_path(&value, "common.wandb_project").is_none());
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn failing_op_leaves_file_untouched() {
        let path = temp_file("atomic", "task:\n  data: old\n");
        let before = fs::read_to_string(&path).expect("read");
        let err = apply_file(
            &path,
            &[
                PatchOp::set("task.data", "/feats"),
                PatchOp::delete("common.wandb_project"),
            ],
        )
        .expect_err("must fail");
        assert!(matches!(err, PatchError::MissingPath { .. }));
        let after = fs::read_to_string(&path).expect("read");
        assert_eq!(before, after);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn missing_file_is_reported_before_any_work() {
        let err = apply_file(
            Path::new("/nonexistent/uasr/config.yaml"),
            &[PatchOp::set("a.b", "c")],
        )
        .expect_err("must fail");
        assert!(matches!(err, PatchError::MissingFile(_)));
    }
}
