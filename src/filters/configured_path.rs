//! Apply the repository's `paths` rules (`ignore`, `include`, `sensitive`).
//!
//! Rules are glob patterns matched against repository-relative paths:
//! `*` stays within one segment, `**` spans directories, a rule ending in `/`
//! or naming a plain directory covers everything below it, and a rule without
//! any `/` also matches the file's base name.

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use tracing::debug;

use crate::context::{metadata_keys, ContextBundle, ContextFilter};
use crate::error::Result;
use crate::types::PathsConfig;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn rule_matches(path: &str, rule: &str) -> bool {
    let rule = rule.trim();
    let rule = rule.strip_prefix("./").unwrap_or(rule);
    if rule.is_empty() {
        return false;
    }

    if let Some(dir) = rule.strip_suffix('/') {
        return rule_matches(path, &format!("{}/**", dir));
    }

    let Ok(pattern) = Pattern::new(rule) else {
        return path == rule;
    };
    if pattern.matches_with(path, MATCH_OPTIONS) {
        return true;
    }

    let is_literal = !rule.contains(['*', '?', '[']);
    if is_literal && path.starts_with(rule) && path[rule.len()..].starts_with('/') {
        return true;
    }

    !rule.contains('/')
        && path
            .rsplit('/')
            .next()
            .is_some_and(|name| pattern.matches_with(name, MATCH_OPTIONS))
}

/// True when `path` matches at least one rule.
pub fn matches_any(path: &str, rules: &[String]) -> bool {
    rules.iter().any(|rule| rule_matches(path, rule))
}

fn is_included(path: &str, config: &PathsConfig) -> bool {
    if !config.ignore.is_empty() && matches_any(path, &config.ignore) {
        return false;
    }
    config.include.is_empty() || matches_any(path, &config.include)
}

pub struct ConfiguredPathFilter;

#[async_trait]
impl ContextFilter for ConfiguredPathFilter {
    fn name(&self) -> &str {
        "configured_path"
    }

    fn order(&self) -> i32 {
        15
    }

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()> {
        let Some(config) = bundle.paths_config() else {
            return Ok(());
        };
        if config.is_empty() {
            return Ok(());
        }

        let original_files = bundle.files.len();
        bundle.files.retain(|f| is_included(&f.filename, &config));

        let mut sensitive = Vec::new();
        if !config.sensitive.is_empty() {
            for file in &mut bundle.files {
                if matches_any(&file.filename, &config.sensitive) {
                    file.is_sensitive = true;
                    sensitive.push(file.filename.clone());
                }
            }
        }
        if !sensitive.is_empty() {
            bundle.set_metadata(metadata_keys::SENSITIVE_FILES, &sensitive)?;
        }

        let contents_before = bundle.file_contents.len();
        bundle.file_contents.retain(|path, _| is_included(path, &config));

        let semantics_before = bundle.semantics.len();
        bundle.semantics.retain(|path, _| is_included(path, &config));

        let guidelines_before = bundle.guidelines.len();
        bundle.guidelines.retain(|g| is_included(&g.path, &config));

        let mut removed_docs = 0;
        let docs = &mut bundle.repository_docs;
        if docs.readme_path.as_deref().is_some_and(|p| !is_included(p, &config)) {
            docs.readme = None;
            docs.readme_path = None;
            removed_docs += 1;
        }
        if docs
            .contributing_path
            .as_deref()
            .is_some_and(|p| !is_included(p, &config))
        {
            docs.contributing = None;
            docs.contributing_path = None;
            removed_docs += 1;
        }

        bundle.recompute_metrics();

        debug!(
            original_files,
            removed_files = original_files - bundle.files.len(),
            sensitive_files = sensitive.len(),
            removed_file_contents = contents_before - bundle.file_contents.len(),
            removed_semantics = semantics_before - bundle.semantics.len(),
            removed_guidelines = guidelines_before - bundle.guidelines.len(),
            removed_repository_docs = removed_docs,
            "Applied path rules"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileChange, FileSemantics, Guideline};

    fn rules(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_rule_matching() {
        assert!(matches_any("docs/guide/intro.md", &rules(&["docs/**"])));
        assert!(matches_any("docs/guide/intro.md", &rules(&["docs/"])));
        assert!(matches_any("docs/guide/intro.md", &rules(&["docs"])));
        assert!(matches_any("src/deep/file.snap", &rules(&["*.snap"])));
        assert!(matches_any("src/app.rs", &rules(&["src/*.rs"])));
        assert!(!matches_any("src/nested/app.rs", &rules(&["src/*.rs"])));
        assert!(matches_any("src/nested/app.rs", &rules(&["src/**/*.rs"])));
        assert!(!matches_any("documentation/a.md", &rules(&["docs"])));
        assert!(!matches_any("src/app.rs", &rules(&[""])));
    }

    fn configured_bundle(config: PathsConfig) -> ContextBundle {
        let mut bundle = ContextBundle::new();
        bundle.files = vec![
            FileChange::new("src/app.rs", 10, 2),
            FileChange::new("src/secrets/keys.rs", 3, 0),
            FileChange::new("docs/api.md", 5, 5),
            FileChange::new("tests/app_test.rs", 4, 0),
        ];
        bundle
            .file_contents
            .insert("docs/api.md".to_string(), "api".to_string());
        bundle
            .file_contents
            .insert("src/app.rs".to_string(), "fn main() {}".to_string());
        bundle
            .semantics
            .insert("docs/api.md".to_string(), FileSemantics::default());
        bundle.guidelines = vec![Guideline {
            path: "docs/STYLE.md".to_string(),
            description: None,
            content: "style".to_string(),
        }];
        bundle.repository_docs.readme = Some("readme".to_string());
        bundle.repository_docs.readme_path = Some("README.md".to_string());
        bundle
            .set_metadata(metadata_keys::PATHS_CONFIG, &config)
            .unwrap();
        bundle
    }

    #[tokio::test]
    async fn test_applies_ignore_and_sensitive_rules() {
        let mut bundle = configured_bundle(PathsConfig {
            ignore: rules(&["docs/**"]),
            include: vec![],
            sensitive: rules(&["src/secrets/**"]),
        });

        ConfiguredPathFilter.filter(&mut bundle).await.unwrap();

        let names: Vec<&str> = bundle.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["src/app.rs", "src/secrets/keys.rs", "tests/app_test.rs"]);
        assert!(bundle.files[1].is_sensitive);
        assert!(!bundle.files[0].is_sensitive);
        assert_eq!(bundle.sensitive_files(), vec!["src/secrets/keys.rs"]);
        assert!(!bundle.file_contents.contains_key("docs/api.md"));
        assert!(bundle.semantics.is_empty());
        assert!(bundle.guidelines.is_empty());
        assert!(bundle.repository_docs.readme.is_some());
        assert_eq!(bundle.metrics.files_changed, 3);
    }

    #[tokio::test]
    async fn test_include_rules_restrict_everything() {
        let mut bundle = configured_bundle(PathsConfig {
            ignore: vec![],
            include: rules(&["src/**"]),
            sensitive: vec![],
        });

        ConfiguredPathFilter.filter(&mut bundle).await.unwrap();

        assert_eq!(bundle.files.len(), 2);
        assert_eq!(bundle.file_contents.len(), 1);
        assert!(bundle.repository_docs.readme.is_none());
        assert!(bundle.repository_docs.readme_path.is_none());
        assert!(bundle.sensitive_files().is_empty());
    }

    #[tokio::test]
    async fn test_noop_without_paths_config() {
        let mut bundle = configured_bundle(PathsConfig::default());
        bundle.metadata.clear();
        let before = bundle.clone();

        ConfiguredPathFilter.filter(&mut bundle).await.unwrap();
        assert_eq!(bundle, before);
    }
}
