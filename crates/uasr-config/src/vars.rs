//! In-place updates of `name=value` lines in external shell scripts.
//!
//! Update-only by contract: a name with no matching line is skipped, not
//! created. The kaldi self-training scripts declare every variable up
//! front, so a miss means the caller targeted the wrong script.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::PatchError;

/// Replace each `name=...` line with `name=<value>`. Values that need it
/// are shell-quoted first so the rewritten line stays a valid assignment.
/// Returns the names actually updated, letting callers log the misses.
pub fn update_vars(
    file: &Path,
    pairs: &BTreeMap<String, String>,
) -> Result<Vec<String>, PatchError> {
    if !file.exists() {
        return Err(PatchError::MissingFile(file.to_path_buf()));
    }
    for (name, value) in pairs {
        if value.contains('\n') {
            return Err(PatchError::UnescapableValue { name: name.clone() });
        }
    }

    let raw = fs::read_to_string(file)?;
    let mut updated = Vec::new();
    let mut lines: Vec<String> = Vec::with_capacity(raw.lines().count());
    for line in raw.lines() {
        let replacement = pairs.iter().find_map(|(name, value)| {
            let rest = line.strip_prefix(name.as_str())?;
            if rest.starts_with('=') {
                Some((name, value))
            } else {
                None
            }
        });
        match replacement {
            Some((name, value)) => {
                lines.push(format!("{}={}", name, shell_quote(value)));
                updated.push(name.clone());
            }
            None => lines.push(line.to_string()),
        }
    }

    if updated.is_empty() {
        // Nothing matched; leave the file byte-for-byte untouched.
        return Ok(updated);
    }

    let mut out = lines.join("\n");
    if raw.ends_with('\n') {
        out.push('\n');
    }
    fs::write(file, out)?;
    debug!(file = %file.display(), updated = updated.len(), "updated script variables");
    Ok(updated)
}

/// Single-quote `s` for the shell unless it is made of safe characters.
/// Shared by the variable patcher and by callers that build `sh -c`
/// snippets from configured paths.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_script(tag: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "uasr_vars_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("train.sh");
        fs::write(&path, body).expect("seed file");
        path
    }

    fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn matching_line_is_replaced_exactly_once() {
        let path = temp_script("replace", "#!/bin/bash\nlab_dir=old\nout_dir=/exp\n");
        let updated =
            update_vars(&path, &pairs(&[("lab_dir", "new/path")])).expect("update");
        assert_eq!(updated, vec!["lab_dir".to_string()]);
        let body = fs::read_to_string(&path).expect("read back");
        assert_eq!(body, "#!/bin/bash\nlab_dir=new/path\nout_dir=/exp\n");
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn absent_name_leaves_file_byte_for_byte_unchanged() {
        let body = "#!/bin/bash\nlab_dir=old\n";
        let path = temp_script("absent", body);
        let updated = update_vars(&path, &pairs(&[("dec_exp", "tri3b")])).expect("update");
        assert!(updated.is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read back"), body);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn prefix_names_do_not_match_longer_variables() {
        let path = temp_script("prefix", "lab_dir_extra=keep\nlab_dir=old\n");
        update_vars(&path, &pairs(&[("lab_dir", "new")])).expect("update");
        let body = fs::read_to_string(&path).expect("read back");
        assert_eq!(body, "lab_dir_extra=keep\nlab_dir=new\n");
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn metacharacter_values_are_quoted() {
        let path = temp_script("quote", "arpa_lm=old\n");
        update_vars(&path, &pairs(&[("arpa_lm", "/lm/dir with space/lm.arpa")]))
            .expect("update");
        let body = fs::read_to_string(&path).expect("read back");
        assert_eq!(body, "arpa_lm='/lm/dir with space/lm.arpa'\n");
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn newline_in_value_is_rejected_before_any_write() {
        let body = "lab_dir=old\n";
        let path = temp_script("newline", body);
        let err = update_vars(&path, &pairs(&[("lab_dir", "bad\nvalue")]))
            .expect_err("must fail");
        assert!(matches!(err, PatchError::UnescapableValue { .. }));
        assert_eq!(fs::read_to_string(&path).expect("read back"), body);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn shell_quote_passes_safe_strings_and_wraps_the_rest() {
        assert_eq!(shell_quote("/opt/fairseq/vads.py"), "/opt/fairseq/vads.py");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("/data/my set"), "'/data/my set'");
        assert_eq!(shell_quote("a'b"), "'a'\"'\"'b'");
    }

    #[test]
    fn missing_script_is_a_fatal_config_error() {
        let err = update_vars(
            Path::new("/nonexistent/uasr/train.sh"),
            &pairs(&[("lab_dir", "x")]),
        )
        .expect_err("must fail");
        assert!(matches!(err, PatchError::MissingFile(_)));
    }
}
