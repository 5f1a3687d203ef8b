//! Repository-level context types.
//!
//! Documentation, review guidelines, review configuration, prior reviews, and
//! project/dependency metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static repository documentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDocs {
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub readme_path: Option<String>,
    #[serde(default)]
    pub contributing: Option<String>,
    #[serde(default)]
    pub contributing_path: Option<String>,
}

impl RepositoryDocs {
    pub fn is_empty(&self) -> bool {
        self.readme.is_none() && self.contributing.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A custom review guideline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guideline {
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: String,
}

/// Reference to a guideline file declared in review configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineRef {
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Path rules from review configuration, as glob lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Paths removed from the context entirely
    #[serde(default)]
    pub ignore: Vec<String>,
    /// When non-empty, only matching paths are kept
    #[serde(default)]
    pub include: Vec<String>,
    /// Paths kept but whose contents are redacted
    #[serde(default)]
    pub sensitive: Vec<String>,
}

impl PathsConfig {
    pub fn is_empty(&self) -> bool {
        self.ignore.is_empty() && self.include.is_empty() && self.sensitive.is_empty()
    }
}

/// Repository review configuration (`.review-context.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub guidelines: Vec<GuidelineRef>,
}

/// A finding from an earlier review, as stored by the history source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFinding {
    pub severity: String,
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_start: Option<u32>,
}

/// A completed earlier review of the same pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastReview {
    pub run_id: u64,
    pub created_at: DateTime<Utc>,
    /// Findings ordered by severity, most severe first
    pub findings: Vec<KeyFinding>,
}

/// Summary of one earlier review as placed in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewHistoryEntry {
    pub run_id: u64,
    pub summary: String,
    pub findings_count: usize,
    pub severity_breakdown: BTreeMap<String, usize>,
    pub key_findings: Vec<KeyFinding>,
    pub created_at: DateTime<Utc>,
}

/// Language runtime requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub name: String,
    pub version: String,
}

/// A detected framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    pub version: String,
}

/// A declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
}

/// Project and dependency metadata parsed from manifests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl ProjectContext {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.runtime.is_none()
            && self.frameworks.is_empty()
            && self.dependencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_config_from_yaml() {
        let yaml = r#"
paths:
  ignore: ["docs/**"]
  sensitive: ["config/secrets/*"]
guidelines:
  - path: docs/REVIEWING.md
    description: House style
"#;
        let config: ReviewConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.paths.ignore, vec!["docs/**"]);
        assert!(config.paths.include.is_empty());
        assert_eq!(config.guidelines.len(), 1);
        assert_eq!(
            config.guidelines[0].description.as_deref(),
            Some("House style")
        );
    }

    #[test]
    fn test_project_context_is_empty() {
        let mut project = ProjectContext::default();
        assert!(project.is_empty());

        project.languages.push("rust".to_string());
        assert!(!project.is_empty());
    }

    #[test]
    fn test_repository_docs_clear() {
        let mut docs = RepositoryDocs {
            readme: Some("# Widgets".to_string()),
            readme_path: Some("README.md".to_string()),
            ..RepositoryDocs::default()
        };
        assert!(!docs.is_empty());
        docs.clear();
        assert!(docs.is_empty());
        assert!(docs.readme_path.is_none());
    }
}
