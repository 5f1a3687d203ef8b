//! Unified diff parsing.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::types::{ChangeStatus, FileChange};

static HUNK_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,\d+)? @@").ok());

const DEV_NULL: &str = "/dev/null";

#[derive(Default)]
struct PendingFile<'a> {
    old_path: Option<String>,
    new_path: Option<String>,
    status: Option<ChangeStatus>,
    additions: u64,
    deletions: u64,
    patch: Vec<&'a str>,
    in_hunk: bool,
    /// Started from a bare `---` header rather than `diff --git`
    plain: bool,
}

impl PendingFile<'_> {
    fn finish(self) -> Result<FileChange> {
        let filename = self
            .new_path
            .or(self.old_path)
            .ok_or_else(|| Error::InvalidDiffFormat("file header without a path".to_string()))?;

        Ok(FileChange {
            filename,
            status: self.status.unwrap_or(ChangeStatus::Modified),
            additions: self.additions,
            deletions: self.deletions,
            changes: self.additions + self.deletions,
            patch: (!self.patch.is_empty()).then(|| self.patch.join("\n")),
            is_sensitive: false,
        })
    }
}

fn strip_side(path: &str, prefix: &str) -> Option<String> {
    let path = path.trim();
    // git appends a tab and timestamp in some modes
    let path = path.split('\t').next().unwrap_or(path);
    if path == DEV_NULL {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

fn git_header_paths(line: &str) -> (Option<String>, Option<String>) {
    let rest = line.trim_start_matches("diff --git ");
    match rest.rfind(" b/") {
        Some(idx) => (
            strip_side(&rest[..idx], "a/"),
            strip_side(&rest[idx + 1..], "b/"),
        ),
        None => (None, None),
    }
}

/// Parse a unified diff (as produced by `git diff`) into file entries.
///
/// Patches keep the hunk text starting at the first `@@` line. Binary files
/// have no patch.
pub fn parse_unified_diff(diff: &str) -> Result<Vec<FileChange>> {
    let mut files = Vec::new();
    let mut current: Option<PendingFile> = None;
    let mut lines = diff.lines().peekable();

    while let Some(line) = lines.next() {
        if line.starts_with("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file.finish()?);
            }
            let (old_path, new_path) = git_header_paths(line);
            current = Some(PendingFile {
                old_path,
                new_path,
                ..PendingFile::default()
            });
            continue;
        }

        let starts_plain_file = line.starts_with("--- ")
            && lines.peek().is_some_and(|next| next.starts_with("+++ "))
            && current.as_ref().map_or(true, |f| f.plain && f.in_hunk);
        if starts_plain_file {
            if let Some(file) = current.take() {
                files.push(file.finish()?);
            }
            current = Some(PendingFile {
                plain: true,
                ..PendingFile::default()
            });
        }

        let Some(file) = current.as_mut() else {
            if line.starts_with("@@") {
                return Err(Error::InvalidDiffFormat(
                    "hunk without a file header".to_string(),
                ));
            }
            continue;
        };

        if file.in_hunk {
            match line.as_bytes().first() {
                Some(b'+') => file.additions += 1,
                Some(b'-') => file.deletions += 1,
                _ => {}
            }
            file.patch.push(line);
            continue;
        }

        if line.starts_with("@@") {
            file.in_hunk = true;
            file.patch.push(line);
        } else if line.starts_with("new file mode") {
            file.status = Some(ChangeStatus::Added);
        } else if line.starts_with("deleted file mode") {
            file.status = Some(ChangeStatus::Removed);
        } else if let Some(path) = line.strip_prefix("rename from ") {
            file.old_path = Some(path.to_string());
            file.status = Some(ChangeStatus::Renamed);
        } else if let Some(path) = line.strip_prefix("rename to ") {
            file.new_path = Some(path.to_string());
            file.status = Some(ChangeStatus::Renamed);
        } else if let Some(path) = line.strip_prefix("--- ") {
            match strip_side(path, "a/") {
                Some(old) => file.old_path = Some(old),
                None => {
                    file.status.get_or_insert(ChangeStatus::Added);
                }
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            match strip_side(path, "b/") {
                Some(new) => file.new_path = Some(new),
                None => {
                    file.new_path = None;
                    file.status = Some(ChangeStatus::Removed);
                }
            }
        }
    }

    if let Some(file) = current {
        files.push(file.finish()?);
    }

    Ok(files)
}

/// New-side line numbers of lines added by `patch`.
pub fn added_line_numbers(patch: &str) -> Vec<u32> {
    let Some(hunk_header) = HUNK_HEADER.as_ref() else {
        return Vec::new();
    };

    let mut added = Vec::new();
    let mut current = 0u32;

    for line in patch.lines() {
        if let Some(caps) = hunk_header.captures(line) {
            current = caps[1].parse().unwrap_or(0);
            continue;
        }
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        match line.as_bytes().first() {
            Some(b'+') => {
                added.push(current);
                current += 1;
            }
            Some(b' ') => current += 1,
            _ => {}
        }
    }

    added
}
