//! Rank changed files by review value and cap how many survive.
//!
//! A file's score is its path priority (first matching pattern wins) plus a
//! logarithmic boost for change size, a penalty for trivial edits and a boost
//! when a patch is present. Ties keep their original order.
//!
//! This is the one stage that reorders the diff list: every collector and the
//! filters before it see files in diff order, everything after sees them ranked.
//! The budget filter's floor keeps the *first* patches, so it relies on this
//! ranking to keep the most relevant ones.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::context::{ContextBundle, ContextFilter};
use crate::error::Result;
use crate::types::FileChange;

/// Files kept after ranking.
pub const MAX_FILES: usize = 50;

const DEFAULT_SCORE: i32 = 50;

const PRIORITY_PATTERNS: &[(&str, i32)] = &[
    // Core source
    (r"^app/", 100),
    (r"^src/", 100),
    (r"^lib/", 90),
    // Configuration
    (r"^config/", 80),
    (r"\.env\.example$", 70),
    // Database
    (r"^database/migrations/", 85),
    (r"^database/factories/", 60),
    (r"^database/seeders/", 50),
    (r"^routes/", 75),
    // Tests
    (r"^tests/", 65),
    (r"\.test\.(ts|js|tsx|jsx)$", 65),
    (r"\.spec\.(ts|js|tsx|jsx)$", 65),
    (r"Test\.php$", 65),
    // Frontend
    (r"^resources/", 70),
    (r"^components/", 70),
    (r"^pages/", 70),
    // Documentation
    (r"(?i)\.md$", 30),
    (r"^docs/", 25),
    // Manifests and lock files
    (r"^composer\.json$", 55),
    (r"^package\.json$", 55),
    (r"^composer\.lock$", 20),
    (r"^package-lock\.json$", 15),
    (r"^yarn\.lock$", 15),
    (r"^pnpm-lock\.yaml$", 15),
    // Tooling
    (r"^\.github/", 35),
    (r"^\.circleci/", 35),
    (r"^Dockerfile", 40),
    (r"^docker-compose", 40),
    (r"phpstan\.", 30),
    (r"phpunit\.", 30),
    (r"eslint", 25),
    (r"prettier", 20),
];

static COMPILED_PATTERNS: LazyLock<Vec<(Regex, i32)>> = LazyLock::new(|| {
    PRIORITY_PATTERNS
        .iter()
        .filter_map(|&(pattern, score)| Regex::new(pattern).ok().map(|re| (re, score)))
        .collect()
});

fn pattern_score(filename: &str) -> i32 {
    COMPILED_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(filename))
        .map(|&(_, score)| score)
        .unwrap_or(DEFAULT_SCORE)
}

/// Relevance score of a single changed file.
pub fn relevance_score(file: &FileChange) -> i32 {
    let changes = file.additions + file.deletions;

    let change_boost = (((changes + 1) as f64).log2() * 5.0).min(30.0) as i32;
    let small_change_penalty = if changes <= 2 { -10 } else { 0 };
    let patch_boost = if file.patch.is_some() { 15 } else { 0 };

    pattern_score(&file.filename) + change_boost + small_change_penalty + patch_boost
}

pub struct RelevanceFilter;

#[async_trait]
impl ContextFilter for RelevanceFilter {
    fn name(&self) -> &str {
        "relevance"
    }

    fn order(&self) -> i32 {
        40
    }

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()> {
        if bundle.files.is_empty() {
            return Ok(());
        }

        let before = bundle.files.len();
        let mut scored: Vec<(i32, FileChange)> = std::mem::take(&mut bundle.files)
            .into_iter()
            .map(|file| (relevance_score(&file), file))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(MAX_FILES);

        bundle.files = scored.into_iter().map(|(_, file)| file).collect();
        bundle.recompute_metrics();

        debug!(
            files = before,
            kept = bundle.files.len(),
            "Ranked files by relevance"
        );
        Ok(())
    }
}
