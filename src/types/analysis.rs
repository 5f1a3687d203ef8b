//! Code analysis types: per-file semantics and impacted files.

use serde::{Deserialize, Serialize};

/// A named symbol and the lines it spans (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSpan {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl SymbolSpan {
    pub fn new(name: impl Into<String>, line_start: u32, line_end: u32) -> Self {
        Self {
            name: name.into(),
            line_start,
            line_end: line_end.max(line_start),
        }
    }

    /// True when any of `lines` falls inside this span.
    pub fn overlaps(&self, lines: &[u32]) -> bool {
        lines
            .iter()
            .any(|line| *line >= self.line_start && *line <= self.line_end)
    }
}

/// A class-like symbol (class, struct, trait, interface) with its methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSpan {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub methods: Vec<SymbolSpan>,
}

impl ClassSpan {
    pub fn span(&self) -> SymbolSpan {
        SymbolSpan::new(self.name.clone(), self.line_start, self.line_end)
    }
}

/// Semantic analysis of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSemantics {
    pub language: String,
    #[serde(default)]
    pub functions: Vec<SymbolSpan>,
    #[serde(default)]
    pub classes: Vec<ClassSpan>,
    #[serde(default)]
    pub imports: Vec<String>,
}

/// How an impacted file references a changed symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    FunctionCall,
    ClassInstantiation,
    MethodCall,
    Extends,
    Implements,
    Reference,
}

impl MatchType {
    /// Human-readable reason for a match against `symbol`.
    pub fn reason(self, symbol: &str) -> String {
        match self {
            Self::FunctionCall => format!("Calls function `{}()`", symbol),
            Self::ClassInstantiation => format!("Instantiates class `{}`", symbol),
            Self::MethodCall => format!("Calls method `{}()`", symbol),
            Self::Extends => format!("Extends class `{}`", symbol),
            Self::Implements => format!("Implements interface `{}`", symbol),
            Self::Reference => format!("References `{}`", symbol),
        }
    }
}

/// A file outside the diff that references a symbol the diff modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactedFile {
    pub file_path: String,
    pub content: String,
    pub matched_symbol: String,
    pub match_type: MatchType,
    /// Search relevance in `0.0..=1.0`
    pub score: f64,
    pub match_count: u32,
    pub reason: String,
}

impl ImpactedFile {
    pub fn new(
        file_path: impl Into<String>,
        content: impl Into<String>,
        matched_symbol: impl Into<String>,
        match_type: MatchType,
        score: f64,
        match_count: u32,
    ) -> Self {
        let matched_symbol = matched_symbol.into();
        Self {
            file_path: file_path.into(),
            content: content.into(),
            reason: match_type.reason(&matched_symbol),
            matched_symbol,
            match_type,
            score,
            match_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_reasons() {
        assert_eq!(
            MatchType::FunctionCall.reason("parse"),
            "Calls function `parse()`"
        );
        assert_eq!(
            MatchType::ClassInstantiation.reason("Cache"),
            "Instantiates class `Cache`"
        );
        assert_eq!(MatchType::MethodCall.reason("get"), "Calls method `get()`");
        assert_eq!(MatchType::Extends.reason("Base"), "Extends class `Base`");
        assert_eq!(
            MatchType::Implements.reason("Store"),
            "Implements interface `Store`"
        );
        assert_eq!(MatchType::Reference.reason("X"), "References `X`");
    }

    #[test]
    fn test_impacted_file_carries_reason() {
        let file = ImpactedFile::new(
            "src/app.rs",
            "fn main() {}",
            "Cache",
            MatchType::ClassInstantiation,
            0.8,
            2,
        );
        assert_eq!(file.reason, "Instantiates class `Cache`");
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["match_type"], "class_instantiation");
    }

    #[test]
    fn test_symbol_span_overlap() {
        let span = SymbolSpan::new("handle", 10, 20);
        assert!(span.overlaps(&[5, 15]));
        assert!(span.overlaps(&[20]));
        assert!(!span.overlaps(&[9, 21]));
        assert!(!span.overlaps(&[]));
    }
}
