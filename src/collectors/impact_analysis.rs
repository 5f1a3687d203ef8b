//! Files outside the diff that reference symbols the diff modified.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::pull_request_target;
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::diff_parser::added_line_numbers;
use crate::sources::{CodeSearch, RepositorySource};
use crate::types::{ImpactedFile, MatchType, RepositoryRef};

/// Search limits for impact analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysisSettings {
    pub max_symbols: usize,
    pub max_files: usize,
    pub max_file_chars: usize,
    pub search_limit_per_symbol: usize,
    pub min_relevance_score: f64,
}

impl Default for ImpactAnalysisSettings {
    fn default() -> Self {
        Self {
            max_symbols: 25,
            max_files: 20,
            max_file_chars: 50_000,
            search_limit_per_symbol: 50,
            min_relevance_score: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Function,
    Class,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ModifiedSymbol {
    name: String,
    kind: SymbolKind,
}

impl ModifiedSymbol {
    fn search_patterns(&self) -> Vec<(String, MatchType)> {
        let name = &self.name;
        match self.kind {
            SymbolKind::Function => vec![(format!("{}(", name), MatchType::FunctionCall)],
            SymbolKind::Class => vec![
                (format!("new {}", name), MatchType::ClassInstantiation),
                (format!("extends {}", name), MatchType::Extends),
                (format!("implements {}", name), MatchType::Implements),
            ],
            SymbolKind::Method => vec![
                (format!("->{}(", name), MatchType::MethodCall),
                (format!("::{}(", name), MatchType::MethodCall),
                (format!(".{}(", name), MatchType::MethodCall),
            ],
        }
    }
}

#[derive(Debug)]
struct Candidate {
    file_path: String,
    symbol: String,
    match_type: MatchType,
    score: f64,
    match_count: u32,
}

/// Functions, classes and methods whose span contains an added line.
fn modified_symbols(bundle: &ContextBundle) -> Vec<ModifiedSymbol> {
    let mut symbols = Vec::new();

    for (path, semantics) in &bundle.semantics {
        let Some(patch) = bundle.file(path).and_then(|f| f.patch.as_deref()) else {
            continue;
        };
        let added = added_line_numbers(patch);
        if added.is_empty() {
            continue;
        }

        let mut push = |name: &str, kind| {
            if !name.is_empty() {
                symbols.push(ModifiedSymbol {
                    name: name.to_string(),
                    kind,
                });
            }
        };

        for function in &semantics.functions {
            if function.overlaps(&added) {
                push(&function.name, SymbolKind::Function);
            }
        }
        for class in &semantics.classes {
            if class.span().overlaps(&added) {
                push(&class.name, SymbolKind::Class);
            }
            for method in &class.methods {
                if method.overlaps(&added) {
                    push(&method.name, SymbolKind::Method);
                }
            }
        }
    }

    symbols
}

/// Fills `impacted_files`.
pub struct ImpactAnalysisCollector {
    search: Arc<dyn CodeSearch>,
    source: Arc<dyn RepositorySource>,
    settings: ImpactAnalysisSettings,
}

impl ImpactAnalysisCollector {
    pub fn new(search: Arc<dyn CodeSearch>, source: Arc<dyn RepositorySource>) -> Self {
        Self {
            search,
            source,
            settings: ImpactAnalysisSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ImpactAnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn find_candidates(
        &self,
        repo: &RepositoryRef,
        symbols: &[ModifiedSymbol],
        exclude: &[&str],
    ) -> Vec<Candidate> {
        let mut candidates: IndexMap<String, Candidate> = IndexMap::new();

        for symbol in symbols {
            for (pattern, match_type) in symbol.search_patterns() {
                let hits = match self
                    .search
                    .keyword_search(repo, &pattern, self.settings.search_limit_per_symbol)
                    .await
                {
                    Ok(hits) => hits,
                    Err(e) => {
                        debug!(pattern = %pattern, error = %e, "Keyword search failed");
                        continue;
                    }
                };

                for hit in hits {
                    if exclude.contains(&hit.file_path.as_str())
                        || hit.score < self.settings.min_relevance_score
                    {
                        continue;
                    }

                    let key = format!("{}:{}", hit.file_path, symbol.name);
                    candidates
                        .entry(key)
                        .and_modify(|c| {
                            c.match_count += 1;
                            c.score = c.score.max(hit.score);
                        })
                        .or_insert_with(|| Candidate {
                            file_path: hit.file_path.clone(),
                            symbol: symbol.name.clone(),
                            match_type,
                            score: hit.score,
                            match_count: 1,
                        });
                }
            }
        }

        let mut ranked: Vec<Candidate> = candidates.into_values().collect();
        ranked.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| b.score.total_cmp(&a.score))
        });
        ranked.truncate(self.settings.max_files);
        ranked
    }
}

#[async_trait]
impl Collector for ImpactAnalysisCollector {
    fn name(&self) -> &str {
        "impact_analysis"
    }

    fn priority(&self) -> i32 {
        75
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, _)) = pull_request_target(params) else {
            return Ok(());
        };
        if !self.search.is_indexed(repo).await {
            debug!(repository = %repo.full_name, "Repository has no code index");
            return Ok(());
        }
        if bundle.semantics.is_empty() {
            return Ok(());
        }

        let mut symbols = modified_symbols(bundle);
        if symbols.is_empty() {
            return Ok(());
        }
        let total_modified = symbols.len();
        symbols.truncate(self.settings.max_symbols);
        debug!(
            symbols_count = symbols.len(),
            total_modified,
            "Searching for impacted files"
        );

        let pr_files: Vec<&str> = bundle.files.iter().map(|f| f.filename.as_str()).collect();
        let candidates = self.find_candidates(repo, &symbols, &pr_files).await;

        let mut impacted = Vec::new();
        for candidate in candidates {
            match self
                .source
                .file_content(repo, &candidate.file_path, params.head_sha())
                .await
            {
                Ok(Some(content))
                    if content.chars().count() <= self.settings.max_file_chars =>
                {
                    impacted.push(ImpactedFile::new(
                        candidate.file_path,
                        content,
                        candidate.symbol,
                        candidate.match_type,
                        candidate.score,
                        candidate.match_count,
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(file = %candidate.file_path, error = %e, "Failed to fetch impacted file");
                }
            }
        }

        info!(
            repository = %repo.full_name,
            symbols_searched = symbols.len(),
            impacted_files = impacted.len(),
            "Collected impacted files"
        );
        bundle.impacted_files = impacted;
        Ok(())
    }
}
