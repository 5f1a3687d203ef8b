//! Fit the bundle into the token budget.
//!
//! Enforcement runs in four stages, stopping as soon as the estimate fits:
//!
//! 1. Every section is capped at a share of the budget. Oversized entries are
//!    truncated with a visible marker and entries past the cap are dropped.
//! 2. Lower-value sections are reduced, then cleared, in this order: review
//!    history, repository docs, project context, PR comments, semantics,
//!    linked issues, full file contents, impacted files, guidelines.
//! 3. The diff is cut to its first 15 patches of at most 2000 characters.
//!    Later patches are dropped and their count is recorded under the
//!    `patches_omitted` metadata key; the files stay listed by name.
//! 4. The largest remaining text (a patch, the PR body or the PR title) is
//!    truncated until the estimate fits.
//!
//! The file list and the PR metadata are never removed, only shortened. A bundle
//! that still exceeds the budget after stage 4 is returned as is with a warning.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::bundle::count_text;
use crate::context::{metadata_keys, ContextBundle, ContextFilter};
use crate::error::Result;
use crate::tokens::{TokenCounter, TokenCounterContext};
use crate::types::{
    FileChange, FileSemantics, Guideline, ImpactedFile, LinkedIssue, ProjectContext,
    PullRequestComment, ReviewHistoryEntry,
};

/// Budget used when the bundle carries no override.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 80_000;

/// Smallest budget honored from metadata.
pub const MIN_CONTEXT_TOKENS: usize = 8_000;

const MIN_SECTION_TOKENS: usize = 500;

// Section shares of the total budget, with absolute caps for large windows
const RATIO_FILES_TOTAL: f64 = 0.45;
const RATIO_FILES_PER: f64 = 0.08;
const RATIO_IMPACTED_FILES: f64 = 0.12;
const RATIO_IMPACTED_FILE_SINGLE: f64 = 0.25;
const RATIO_ISSUES: f64 = 0.08;
const RATIO_COMMENTS: f64 = 0.04;
const RATIO_GUIDELINES: f64 = 0.06;
const RATIO_REPOSITORY_DOCS: f64 = 0.05;
const RATIO_REVIEW_HISTORY: f64 = 0.05;
const RATIO_PROJECT_CONTEXT: f64 = 0.03;
const RATIO_FILE_CONTENTS: f64 = 0.10;
const RATIO_FILE_CONTENTS_SINGLE: f64 = 0.20;
const RATIO_SEMANTICS: f64 = 0.05;

const MAX_FILES_TOTAL: usize = 150_000;
const MAX_FILES_PER: usize = 20_000;
const MAX_IMPACTED_FILES: usize = 40_000;
const MAX_FILE_CONTENTS: usize = 30_000;
const MAX_SEMANTICS: usize = 15_000;

/// Tokens charged for an omitted patch placeholder.
const OMITTED_PATCH_TOKENS: usize = 50;
/// Tokens charged for an impacted file's path, symbol and reason.
const IMPACTED_METADATA_TOKENS: usize = 50;
/// Tokens held back for an issue's title and labels when it is shortened.
const ISSUE_METADATA_TOKENS: usize = 200;

const FLOOR_PATCH_FILES: usize = 15;
const FLOOR_PATCH_CHARS: usize = 2000;
const MAX_FINAL_PASSES: usize = 64;

const FILE_TOO_LARGE: &str = "\n... [truncated - file too large]";
const SECTION_LIMIT: &str = "\n... [truncated - token limit]";
const PATCH_OMITTED: &str = "[patch omitted - token limit reached]";
const ISSUE_TRUNCATED: &str = "... [truncated]";
const GUIDELINE_TRUNCATED: &str = "... [truncated - guideline too long]";
const REPOSITORY_DOCS_TRUNCATED: &str = "... [truncated - repository context too long]";
const REVIEW_HISTORY_TRUNCATED: &str = "... [truncated - review history too long]";
const IMPACTED_FILE_TOO_LARGE: &str = "\n... [truncated - impacted file too large]";
const FLOOR_TRUNCATED: &str = "\n... [aggressively truncated]";
const FIELD_TRUNCATED: &str = "... [truncated - token limit]";

/// Per-section token caps derived from the total budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionBudgets {
    files_total: usize,
    files_per: usize,
    impacted_files: usize,
    file_contents: usize,
    semantics: usize,
    issues: usize,
    comments: usize,
    guidelines: usize,
    repository_docs: usize,
    review_history: usize,
    project_context: usize,
}

fn scale(max_tokens: usize, ratio: f64, cap: Option<usize>) -> usize {
    let scaled = ((max_tokens as f64) * ratio).round() as usize;
    let scaled = scaled.max(MIN_SECTION_TOKENS);
    cap.map_or(scaled, |cap| scaled.min(cap))
}

impl SectionBudgets {
    fn for_budget(max_tokens: usize) -> Self {
        let files_total = scale(max_tokens, RATIO_FILES_TOTAL, Some(MAX_FILES_TOTAL));
        let files_per = scale(max_tokens, RATIO_FILES_PER, Some(MAX_FILES_PER)).min(files_total);

        Self {
            files_total,
            files_per,
            impacted_files: scale(max_tokens, RATIO_IMPACTED_FILES, Some(MAX_IMPACTED_FILES)),
            file_contents: scale(max_tokens, RATIO_FILE_CONTENTS, Some(MAX_FILE_CONTENTS)),
            semantics: scale(max_tokens, RATIO_SEMANTICS, Some(MAX_SEMANTICS)),
            issues: scale(max_tokens, RATIO_ISSUES, None),
            comments: scale(max_tokens, RATIO_COMMENTS, None),
            guidelines: scale(max_tokens, RATIO_GUIDELINES, None),
            repository_docs: scale(max_tokens, RATIO_REPOSITORY_DOCS, None),
            review_history: scale(max_tokens, RATIO_REVIEW_HISTORY, None),
            project_context: scale(max_tokens, RATIO_PROJECT_CONTEXT, None),
        }
    }
}

/// Sections that progressive reduction may shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    ReviewHistory,
    RepositoryDocs,
    ProjectContext,
    PrComments,
    Semantics,
    LinkedIssues,
    FileContents,
    ImpactedFiles,
    Guidelines,
}

/// Reduction steps, lowest value first: (section, entries kept).
const REDUCTIONS: &[(Section, usize)] = &[
    (Section::ReviewHistory, 0),
    (Section::RepositoryDocs, 0),
    (Section::ProjectContext, 0),
    (Section::PrComments, 5),
    (Section::PrComments, 0),
    (Section::Semantics, 5),
    (Section::Semantics, 0),
    (Section::LinkedIssues, 2),
    (Section::LinkedIssues, 0),
    (Section::FileContents, 3),
    (Section::FileContents, 0),
    (Section::ImpactedFiles, 5),
    (Section::ImpactedFiles, 0),
    (Section::Guidelines, 1),
    (Section::Guidelines, 0),
];

fn reduce(bundle: &mut ContextBundle, section: Section, keep: usize) {
    match section {
        Section::ReviewHistory => bundle.review_history.truncate(keep),
        Section::RepositoryDocs => bundle.repository_docs.clear(),
        Section::ProjectContext => bundle.project_context = ProjectContext::default(),
        Section::PrComments => bundle.pr_comments.truncate(keep),
        Section::Semantics => bundle.semantics.truncate(keep),
        Section::LinkedIssues => bundle.linked_issues.truncate(keep),
        Section::FileContents => bundle.file_contents.truncate(keep),
        Section::ImpactedFiles => bundle.impacted_files.truncate(keep),
        Section::Guidelines => bundle.guidelines.truncate(keep),
    }
}

/// Keep the first patches, capped in length; drop the rest.
///
/// Returns how many patches were dropped. Their files stay listed by name.
fn truncate_patches_to_floor(files: &mut [FileChange]) -> usize {
    let mut with_patches = 0;
    let mut omitted = 0;
    for file in files.iter_mut() {
        let Some(patch) = file.patch.as_mut() else {
            continue;
        };
        if patch.is_empty() {
            continue;
        }
        with_patches += 1;

        if with_patches > FLOOR_PATCH_FILES {
            file.patch = None;
            omitted += 1;
        } else if patch.chars().count() > FLOOR_PATCH_CHARS {
            let mut kept: String = patch.chars().take(FLOOR_PATCH_CHARS).collect();
            kept.push_str(FLOOR_TRUNCATED);
            *patch = kept;
        }
    }
    omitted
}

/// Text fields the last stage may shorten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Patch(usize),
    Body,
    Title,
}

fn field_mut(bundle: &mut ContextBundle, field: Field) -> Option<&mut String> {
    match field {
        Field::Patch(index) => bundle.files.get_mut(index).and_then(|f| f.patch.as_mut()),
        Field::Body => bundle.pull_request.as_mut().and_then(|pr| pr.body.as_mut()),
        Field::Title => bundle.pull_request.as_mut().map(|pr| &mut pr.title),
    }
}

/// Token arithmetic bound to one strategy and counting context.
struct Budgeter<'a> {
    counter: &'a dyn TokenCounter,
    context: TokenCounterContext,
}

impl Budgeter<'_> {
    async fn tokens(&self, text: &str) -> usize {
        count_text(self.counter, &self.context, text).await
    }

    async fn json_tokens<T: Serialize>(&self, value: &T) -> usize {
        self.tokens(&serde_json::to_string(value).unwrap_or_default())
            .await
    }

    async fn estimate(&self, bundle: &ContextBundle) -> usize {
        bundle.estimate_tokens(self.counter, &self.context).await
    }

    /// `text` unchanged when it fits, else its longest fitting prefix plus `suffix`.
    async fn truncate_text(&self, text: &str, max_tokens: usize, suffix: &str) -> String {
        if self.tokens(text).await <= max_tokens {
            return text.to_string();
        }
        let budget = max_tokens.saturating_sub(self.tokens(suffix).await);
        let mut trimmed = self.trim_to_budget(text, budget).await;
        trimmed.push_str(suffix);
        trimmed
    }

    /// Longest prefix of `text` within `max_tokens`, by binary search on characters.
    async fn trim_to_budget(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }

        // boundaries[n] is the byte offset just past the first n characters
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut low = 0;
        let mut high = boundaries.len() - 1;
        while low < high {
            let mid = (low + high + 1) / 2;
            if self.tokens(&text[..boundaries[mid]]).await <= max_tokens {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        text[..boundaries[low]].to_string()
    }

    // ===== Stage 1: per-section caps =====

    async fn truncate_files(&self, files: &mut [FileChange], per_file: usize, total: usize) {
        let mut used = 0;
        for file in files.iter_mut() {
            let Some(mut patch) = file.patch.take() else {
                continue;
            };

            let mut tokens = self.tokens(&patch).await;
            if tokens > per_file {
                patch = self.truncate_text(&patch, per_file, FILE_TOO_LARGE).await;
                tokens = per_file;
            }

            if used + tokens > total {
                let remaining = total.saturating_sub(used);
                if remaining > MIN_SECTION_TOKENS {
                    patch = self.truncate_text(&patch, remaining, SECTION_LIMIT).await;
                    tokens = remaining;
                } else {
                    patch = PATCH_OMITTED.to_string();
                    tokens = OMITTED_PATCH_TOKENS;
                }
            }

            used += tokens;
            file.patch = Some(patch);
        }
    }

    async fn issue_tokens(&self, issue: &LinkedIssue) -> usize {
        let mut tokens = self.tokens(&issue.title).await;
        tokens += self.tokens(issue.body.as_deref().unwrap_or("")).await;
        for comment in &issue.comments {
            tokens += self.tokens(&comment.body).await;
        }
        tokens
    }

    async fn truncate_issues(&self, issues: Vec<LinkedIssue>, max_tokens: usize) -> Vec<LinkedIssue> {
        let mut used = 0;
        let mut kept = Vec::with_capacity(issues.len());

        for mut issue in issues {
            let tokens = self.issue_tokens(&issue).await;
            if used + tokens > max_tokens {
                if used + MIN_SECTION_TOKENS < max_tokens {
                    let remaining = (max_tokens - used).saturating_sub(ISSUE_METADATA_TOKENS);
                    if let Some(body) = issue.body.take() {
                        let half = remaining / 2;
                        let body = if self.tokens(&body).await > half {
                            self.truncate_text(&body, half, ISSUE_TRUNCATED).await
                        } else {
                            body
                        };
                        issue.body = Some(body);
                    }
                    issue.comments.truncate(3);
                    kept.push(issue);
                }
                break;
            }
            used += tokens;
            kept.push(issue);
        }
        kept
    }

    async fn truncate_comments(
        &self,
        comments: Vec<PullRequestComment>,
        max_tokens: usize,
    ) -> Vec<PullRequestComment> {
        let mut used = 0;
        let mut kept = Vec::with_capacity(comments.len());
        for comment in comments {
            let tokens = self.tokens(&comment.body).await;
            if used + tokens > max_tokens {
                break;
            }
            used += tokens;
            kept.push(comment);
        }
        kept
    }

    async fn truncate_guidelines(&self, guidelines: Vec<Guideline>, max_tokens: usize) -> Vec<Guideline> {
        let mut used = 0;
        let mut kept = Vec::with_capacity(guidelines.len());

        for mut guideline in guidelines {
            let tokens = self.tokens(&guideline.content).await
                + self.tokens(guideline.description.as_deref().unwrap_or("")).await;
            if used + tokens > max_tokens {
                let remaining = max_tokens.saturating_sub(used);
                if remaining > MIN_SECTION_TOKENS {
                    guideline.content = self
                        .truncate_text(&guideline.content, remaining, GUIDELINE_TRUNCATED)
                        .await;
                    kept.push(guideline);
                }
                break;
            }
            used += tokens;
            kept.push(guideline);
        }
        kept
    }

    async fn truncate_document(
        &self,
        content: &mut Option<String>,
        path: &mut Option<String>,
        used: &mut usize,
        max_tokens: usize,
    ) {
        let Some(text) = content.take() else {
            return;
        };

        let tokens = self.tokens(&text).await;
        if *used + tokens <= max_tokens {
            *used += tokens;
            *content = Some(text);
            return;
        }

        let remaining = max_tokens.saturating_sub(*used);
        if remaining > MIN_SECTION_TOKENS {
            *content = Some(
                self.truncate_text(&text, remaining, REPOSITORY_DOCS_TRUNCATED)
                    .await,
            );
            *used = max_tokens;
        } else {
            *path = None;
        }
    }

    async fn truncate_review_history(
        &self,
        history: Vec<ReviewHistoryEntry>,
        max_tokens: usize,
    ) -> Vec<ReviewHistoryEntry> {
        let mut used = 0;
        let mut kept = Vec::with_capacity(history.len());

        for mut entry in history {
            let tokens =
                self.tokens(&entry.summary).await + self.json_tokens(&entry.key_findings).await;
            if used + tokens > max_tokens {
                let remaining = max_tokens.saturating_sub(used);
                if remaining > MIN_SECTION_TOKENS {
                    entry.summary = self
                        .truncate_text(&entry.summary, remaining, REVIEW_HISTORY_TRUNCATED)
                        .await;
                    entry.key_findings.truncate(5);
                    kept.push(entry);
                }
                break;
            }
            used += tokens;
            kept.push(entry);
        }
        kept
    }

    async fn truncate_project_context(&self, project: &mut ProjectContext, max_tokens: usize) {
        if project.is_empty() || self.json_tokens(project).await <= max_tokens {
            return;
        }
        project.dependencies.truncate(10);
        if self.json_tokens(project).await <= max_tokens {
            return;
        }
        project.frameworks.truncate(3);
        if self.json_tokens(project).await <= max_tokens {
            return;
        }
        project.languages.truncate(3);
    }

    async fn truncate_impacted_files(
        &self,
        files: Vec<ImpactedFile>,
        max_tokens: usize,
    ) -> Vec<ImpactedFile> {
        let per_file = ((max_tokens as f64) * RATIO_IMPACTED_FILE_SINGLE) as usize;
        let mut used = 0;
        let mut kept = Vec::with_capacity(files.len());

        for mut file in files {
            let mut tokens = self.tokens(&file.content).await + IMPACTED_METADATA_TOKENS;
            if tokens > per_file {
                file.content = self
                    .truncate_text(
                        &file.content,
                        per_file.saturating_sub(IMPACTED_METADATA_TOKENS),
                        IMPACTED_FILE_TOO_LARGE,
                    )
                    .await;
                tokens = per_file;
            }

            if used + tokens > max_tokens {
                let remaining = max_tokens.saturating_sub(used);
                if remaining > MIN_SECTION_TOKENS {
                    file.content = self
                        .truncate_text(
                            &file.content,
                            remaining - IMPACTED_METADATA_TOKENS,
                            SECTION_LIMIT,
                        )
                        .await;
                    kept.push(file);
                }
                break;
            }
            used += tokens;
            kept.push(file);
        }
        kept
    }

    async fn truncate_file_contents(&self, bundle: &mut ContextBundle, max_tokens: usize) {
        let per_file = ((max_tokens as f64) * RATIO_FILE_CONTENTS_SINGLE) as usize;
        let contents = std::mem::take(&mut bundle.file_contents);
        let mut used = 0;

        for (path, mut content) in contents {
            let mut tokens = self.tokens(&content).await;
            if tokens > per_file {
                content = self.truncate_text(&content, per_file, FILE_TOO_LARGE).await;
                tokens = per_file;
            }

            if used + tokens > max_tokens {
                let remaining = max_tokens.saturating_sub(used);
                if remaining > MIN_SECTION_TOKENS {
                    let content = self.truncate_text(&content, remaining, SECTION_LIMIT).await;
                    bundle.file_contents.insert(path, content);
                }
                break;
            }
            used += tokens;
            bundle.file_contents.insert(path, content);
        }
    }

    async fn truncate_semantics(&self, bundle: &mut ContextBundle, max_tokens: usize) {
        let semantics = std::mem::take(&mut bundle.semantics);
        let mut used = 0;

        for (path, data) in semantics {
            let tokens = self.json_tokens(&data).await;
            if used + tokens > max_tokens {
                let remaining = max_tokens.saturating_sub(used);
                if remaining > MIN_SECTION_TOKENS {
                    let reduced = self.reduce_semantics(&data, remaining).await;
                    bundle.semantics.insert(path, reduced);
                }
                break;
            }
            used += tokens;
            bundle.semantics.insert(path, data);
        }
    }

    async fn reduce_semantics(&self, data: &FileSemantics, max_tokens: usize) -> FileSemantics {
        let reduced = FileSemantics {
            language: data.language.clone(),
            functions: data.functions.iter().take(5).cloned().collect(),
            classes: data
                .classes
                .iter()
                .take(3)
                .cloned()
                .map(|mut class| {
                    class.methods.truncate(5);
                    class
                })
                .collect(),
            imports: data.imports.iter().take(5).cloned().collect(),
        };
        if self.json_tokens(&reduced).await <= max_tokens {
            return reduced;
        }

        FileSemantics {
            language: reduced.language,
            functions: reduced.functions.into_iter().take(2).collect(),
            classes: reduced.classes.into_iter().take(1).collect(),
            imports: Vec::new(),
        }
    }

    async fn cap_sections(&self, bundle: &mut ContextBundle, budgets: &SectionBudgets) {
        self.truncate_files(&mut bundle.files, budgets.files_per, budgets.files_total)
            .await;

        let impacted = std::mem::take(&mut bundle.impacted_files);
        bundle.impacted_files = self
            .truncate_impacted_files(impacted, budgets.impacted_files)
            .await;

        self.truncate_file_contents(bundle, budgets.file_contents)
            .await;
        self.truncate_semantics(bundle, budgets.semantics).await;

        let issues = std::mem::take(&mut bundle.linked_issues);
        bundle.linked_issues = self.truncate_issues(issues, budgets.issues).await;

        let comments = std::mem::take(&mut bundle.pr_comments);
        bundle.pr_comments = self.truncate_comments(comments, budgets.comments).await;

        let guidelines = std::mem::take(&mut bundle.guidelines);
        bundle.guidelines = self
            .truncate_guidelines(guidelines, budgets.guidelines)
            .await;

        let docs = &mut bundle.repository_docs;
        let mut used = 0;
        self.truncate_document(
            &mut docs.contributing,
            &mut docs.contributing_path,
            &mut used,
            budgets.repository_docs,
        )
        .await;
        self.truncate_document(
            &mut docs.readme,
            &mut docs.readme_path,
            &mut used,
            budgets.repository_docs,
        )
        .await;

        let history = std::mem::take(&mut bundle.review_history);
        bundle.review_history = self
            .truncate_review_history(history, budgets.review_history)
            .await;

        self.truncate_project_context(&mut bundle.project_context, budgets.project_context)
            .await;
    }

    // ===== Stage 2: progressive reduction =====

    async fn reduce_progressively(&self, bundle: &mut ContextBundle, max_tokens: usize) {
        for &(section, keep) in REDUCTIONS {
            if self.estimate(bundle).await <= max_tokens {
                return;
            }
            debug!(section = ?section, keep, "Reducing context section");
            reduce(bundle, section, keep);
        }
    }

    // ===== Stage 4: shorten the largest field =====

    async fn largest_field(&self, bundle: &ContextBundle) -> Option<(Field, usize)> {
        let mut largest: Option<(Field, usize)> = None;
        let mut consider = |field: Field, tokens: usize| {
            if largest.map_or(true, |(_, best)| tokens > best) {
                largest = Some((field, tokens));
            }
        };

        for (index, file) in bundle.files.iter().enumerate() {
            if let Some(patch) = &file.patch {
                consider(Field::Patch(index), self.tokens(patch).await);
            }
        }
        if let Some(pr) = &bundle.pull_request {
            if let Some(body) = &pr.body {
                consider(Field::Body, self.tokens(body).await);
            }
            consider(Field::Title, self.tokens(&pr.title).await);
        }
        largest
    }

    async fn truncate_largest_fields(&self, bundle: &mut ContextBundle, max_tokens: usize) {
        let marker_tokens = self.tokens(FIELD_TRUNCATED).await;

        for _ in 0..MAX_FINAL_PASSES {
            let total = self.estimate(bundle).await;
            if total <= max_tokens {
                return;
            }
            let Some((field, tokens)) = self.largest_field(bundle).await else {
                return;
            };
            if tokens <= marker_tokens {
                return;
            }

            let target = tokens
                .saturating_sub(total - max_tokens + 1)
                .max(marker_tokens);
            let Some(current) = field_mut(bundle, field).map(|text| text.clone()) else {
                return;
            };
            let base = current.strip_suffix(FIELD_TRUNCATED).unwrap_or(&current);
            let mut shortened = self
                .trim_to_budget(base, target.saturating_sub(marker_tokens))
                .await;
            shortened.push_str(FIELD_TRUNCATED);
            if shortened == current {
                return;
            }

            debug!(field = ?field, from = tokens, to = target, "Truncating largest field");
            if let Some(text) = field_mut(bundle, field) {
                *text = shortened;
            }
        }
    }
}

/// Final filter: enforce the bundle's token budget.
pub struct TokenLimitFilter {
    counter: Arc<dyn TokenCounter>,
    max_tokens: usize,
    context: TokenCounterContext,
}

impl TokenLimitFilter {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            max_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            context: TokenCounterContext::estimate(),
        }
    }

    /// Budget used when the bundle carries no `context_token_budget`.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Counting context used when the bundle names no provider or model.
    pub fn with_context(mut self, context: TokenCounterContext) -> Self {
        self.context = context;
        self
    }

    fn max_tokens_for(&self, bundle: &ContextBundle) -> usize {
        let budget = bundle
            .metadata
            .get(metadata_keys::CONTEXT_TOKEN_BUDGET)
            .and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            });

        match budget {
            Some(budget) if budget > 0 => (budget as usize).max(MIN_CONTEXT_TOKENS),
            _ => self.max_tokens,
        }
    }

    fn context_for(&self, bundle: &ContextBundle) -> TokenCounterContext {
        let from_metadata = TokenCounterContext::from_metadata(&bundle.metadata);
        if from_metadata.provider().is_none() && from_metadata.model().is_none() {
            return self.context.clone();
        }
        from_metadata.with_mode(
            self.context.mode(),
            self.context.api_key().map(str::to_string),
        )
    }
}

#[async_trait]
impl ContextFilter for TokenLimitFilter {
    fn name(&self) -> &str {
        "token_limit"
    }

    fn order(&self) -> i32 {
        100
    }

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()> {
        let budgeter = Budgeter {
            counter: self.counter.as_ref(),
            context: self.context_for(bundle),
        };
        let max_tokens = self.max_tokens_for(bundle);
        let breakdown = bundle
            .token_breakdown(budgeter.counter, &budgeter.context)
            .await;
        let initial_tokens = breakdown.total();
        debug!(?breakdown, max_tokens, "Token usage before budgeting");

        budgeter
            .cap_sections(bundle, &SectionBudgets::for_budget(max_tokens))
            .await;

        if budgeter.estimate(bundle).await > max_tokens {
            budgeter.reduce_progressively(bundle, max_tokens).await;
        }
        if budgeter.estimate(bundle).await > max_tokens {
            let omitted = truncate_patches_to_floor(&mut bundle.files);
            if omitted > 0 {
                debug!(omitted, "Dropped patches beyond the floor");
                bundle.set_metadata(metadata_keys::PATCHES_OMITTED, &omitted)?;
            }
        }
        if budgeter.estimate(bundle).await > max_tokens {
            budgeter.truncate_largest_fields(bundle, max_tokens).await;
        }

        let final_tokens = budgeter.estimate(bundle).await;
        if final_tokens != initial_tokens {
            info!(
                initial_tokens,
                final_tokens,
                reduction = initial_tokens.saturating_sub(final_tokens),
                max_tokens,
                "Truncated context to fit token budget"
            );
        }
        if final_tokens > max_tokens {
            warn!(
                final_tokens,
                max_tokens, "Context still exceeds token budget after truncation"
            );
        }
        Ok(())
    }
}
