//! Line-based symbol detection.
//!
//! Recognizes function and class-like declarations line by line and derives
//! their spans from indentation: a symbol ends just before the next symbol at
//! the same or a shallower indent. Functions nested under a class-like symbol
//! become its methods.

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::SemanticAnalyzer;
use crate::error::Result;
use crate::types::{ClassSpan, FileSemantics, SymbolSpan};

const MAX_IMPORTS: usize = 100;

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "else", "new", "typeof",
];

static JS_METHOD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:public|private|protected|static|async|readonly|override|get|set)\s+)*\*?([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*(?::\s*[^={]+)?\{",
    )
    .ok()
});

static JS_ARROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>")
        .ok()
});

static JAVA_METHOD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:public|private|protected|static|final|abstract|synchronized|default)\s+)+[\w<>\[\],.?\s]*?\s*(\w+)\s*\(",
    )
    .ok()
});

/// Maps an extension to the language name reported in [`FileSemantics`].
pub fn extension_to_language(ext: &str) -> Option<&'static str> {
    match ext {
        "rs" => Some("rust"),
        "py" | "pyi" => Some("python"),
        "ts" | "mts" | "cts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "js" | "mjs" | "cjs" | "jsx" => Some("javascript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "kt" | "kts" => Some("kotlin"),
        "php" => Some("php"),
        "rb" | "rake" => Some("ruby"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Function,
    Container,
}

#[derive(Debug)]
struct LineSymbol {
    name: String,
    kind: SymbolKind,
    line: u32,
    indent: usize,
}

fn leading_ident(text: &str) -> Option<String> {
    let name: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// Extract an identifier following `prefix`.
fn extract_name(line: &str, prefix: &str) -> Option<String> {
    leading_ident(line.split_once(prefix)?.1)
}

fn strip_modifiers<'a>(mut line: &'a str, modifiers: &[&str]) -> &'a str {
    loop {
        let before = line;
        for modifier in modifiers {
            if let Some(rest) = line.strip_prefix(modifier) {
                line = rest.trim_start();
            }
        }
        if line == before {
            return line;
        }
    }
}

fn capture_name(re: &LazyLock<Option<Regex>>, line: &str) -> Option<String> {
    let caps = re.as_ref()?.captures(line)?;
    let name = caps.get(1)?.as_str();
    (!CONTROL_KEYWORDS.contains(&name)).then(|| name.to_string())
}

fn detect_rust(trimmed: &str) -> Option<(String, SymbolKind)> {
    let line = strip_modifiers(
        trimmed,
        &["pub(crate) ", "pub(super) ", "pub ", "async ", "const ", "unsafe ", "extern \"C\" "],
    );
    if line.starts_with("fn ") {
        return extract_name(line, "fn ").map(|n| (n, SymbolKind::Function));
    }
    for keyword in ["struct ", "enum ", "trait ", "union "] {
        if line.starts_with(keyword) {
            return extract_name(line, keyword).map(|n| (n, SymbolKind::Container));
        }
    }
    if line.starts_with("impl ") || line.starts_with("impl<") {
        let target = match line.split_once(" for ") {
            Some((_, after_for)) => after_for,
            None => {
                let rest = line.trim_start_matches("impl");
                match rest.strip_prefix('<') {
                    Some(generic) => generic.split_once('>').map_or("", |(_, after)| after),
                    None => rest,
                }
            }
        };
        return leading_ident(target).map(|n| (n, SymbolKind::Container));
    }
    None
}

fn detect_python(trimmed: &str) -> Option<(String, SymbolKind)> {
    let line = trimmed.strip_prefix("async ").unwrap_or(trimmed);
    if line.starts_with("def ") {
        return extract_name(line, "def ").map(|n| (n, SymbolKind::Function));
    }
    if line.starts_with("class ") {
        return extract_name(line, "class ").map(|n| (n, SymbolKind::Container));
    }
    None
}

fn detect_js(trimmed: &str) -> Option<(String, SymbolKind)> {
    let line = strip_modifiers(
        trimmed,
        &["export ", "default ", "declare ", "abstract ", "async "],
    );
    if line.starts_with("function") {
        let rest = line.trim_start_matches("function").trim_start();
        return leading_ident(rest.trim_start_matches('*')).map(|n| (n, SymbolKind::Function));
    }
    for keyword in ["class ", "interface "] {
        if line.starts_with(keyword) {
            return extract_name(line, keyword).map(|n| (n, SymbolKind::Container));
        }
    }
    if let Some(name) = capture_name(&JS_ARROW, trimmed) {
        return Some((name, SymbolKind::Function));
    }
    capture_name(&JS_METHOD, trimmed).map(|n| (n, SymbolKind::Function))
}

fn detect_go(trimmed: &str) -> Option<(String, SymbolKind)> {
    if let Some(rest) = trimmed.strip_prefix("func ") {
        // Method receivers: func (s *Server) Name(
        let rest = match rest.strip_prefix('(') {
            Some(after) => after.split_once(')')?.1.trim_start(),
            None => rest,
        };
        return leading_ident(rest).map(|n| (n, SymbolKind::Function));
    }
    if trimmed.starts_with("type ")
        && (trimmed.contains(" struct") || trimmed.contains(" interface"))
    {
        return extract_name(trimmed, "type ").map(|n| (n, SymbolKind::Container));
    }
    None
}

fn detect_java(trimmed: &str) -> Option<(String, SymbolKind)> {
    let line = strip_modifiers(
        trimmed,
        &[
            "public ", "private ", "protected ", "static ", "final ", "abstract ", "sealed ",
            "open ", "data ", "internal ",
        ],
    );
    for keyword in ["class ", "interface ", "enum ", "record ", "object "] {
        if line.starts_with(keyword) {
            return extract_name(line, keyword).map(|n| (n, SymbolKind::Container));
        }
    }
    if line.starts_with("fun ") {
        return extract_name(line, "fun ").map(|n| (n, SymbolKind::Function));
    }
    if trimmed.ends_with(';') {
        return None;
    }
    capture_name(&JAVA_METHOD, trimmed).map(|n| (n, SymbolKind::Function))
}

fn detect_php(trimmed: &str) -> Option<(String, SymbolKind)> {
    let line = strip_modifiers(
        trimmed,
        &["public ", "private ", "protected ", "static ", "final ", "abstract ", "readonly "],
    );
    if line.starts_with("function ") {
        return extract_name(line, "function ")
            .or_else(|| extract_name(line, "function &"))
            .map(|n| (n, SymbolKind::Function));
    }
    for keyword in ["class ", "interface ", "trait ", "enum "] {
        if line.starts_with(keyword) {
            return extract_name(line, keyword).map(|n| (n, SymbolKind::Container));
        }
    }
    None
}

fn detect_ruby(trimmed: &str) -> Option<(String, SymbolKind)> {
    if let Some(rest) = trimmed.strip_prefix("def ") {
        let rest = rest.strip_prefix("self.").unwrap_or(rest);
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '?' | '!'))
            .collect();
        return (!name.is_empty()).then_some((name, SymbolKind::Function));
    }
    for keyword in ["class ", "module "] {
        if trimmed.starts_with(keyword) {
            return extract_name(trimmed, keyword).map(|n| (n, SymbolKind::Container));
        }
    }
    None
}

fn detect_symbol(trimmed: &str, ext: &str) -> Option<(String, SymbolKind)> {
    match ext {
        "rs" => detect_rust(trimmed),
        "py" | "pyi" => detect_python(trimmed),
        "ts" | "mts" | "cts" | "tsx" | "js" | "mjs" | "cjs" | "jsx" => detect_js(trimmed),
        "go" => detect_go(trimmed),
        "java" | "kt" | "kts" => detect_java(trimmed),
        "php" => detect_php(trimmed),
        "rb" | "rake" => detect_ruby(trimmed),
        _ => None,
    }
}

fn is_import(trimmed: &str, ext: &str) -> bool {
    match ext {
        "rs" => {
            trimmed.starts_with("use ")
                || trimmed.starts_with("pub use ")
                || trimmed.starts_with("extern crate ")
        }
        "py" | "pyi" => {
            trimmed.starts_with("import ")
                || (trimmed.starts_with("from ") && trimmed.contains(" import "))
        }
        "ts" | "mts" | "cts" | "tsx" | "js" | "mjs" | "cjs" | "jsx" => {
            trimmed.starts_with("import ") || trimmed.contains("require(")
        }
        "go" | "java" | "kt" | "kts" => trimmed.starts_with("import "),
        "php" => {
            trimmed.starts_with("use ")
                || trimmed.starts_with("require")
                || trimmed.starts_with("include")
        }
        "rb" | "rake" => trimmed.starts_with("require"),
        _ => false,
    }
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Last non-blank line before `next_start`, never before `start`.
fn span_end(lines: &[&str], start: u32, next_start: Option<u32>) -> u32 {
    let mut end = next_start.map_or(lines.len() as u32, |next| next.saturating_sub(1));
    while end > start
        && lines
            .get(end as usize - 1)
            .is_some_and(|line| line.trim().is_empty())
    {
        end -= 1;
    }
    end.max(start)
}

/// Analyze `content` as a file with extension `ext`.
pub fn analyze_source(content: &str, ext: &str) -> Option<FileSemantics> {
    let language = extension_to_language(ext)?;
    let lines: Vec<&str> = content.lines().collect();

    let mut symbols = Vec::new();
    let mut imports = Vec::new();
    let mut in_go_import_block = false;

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
            || trimmed.starts_with('#')
        {
            continue;
        }

        if in_go_import_block {
            if trimmed.starts_with(')') {
                in_go_import_block = false;
            } else if imports.len() < MAX_IMPORTS {
                imports.push(trimmed.to_string());
            }
            continue;
        }
        if ext == "go" && trimmed == "import (" {
            in_go_import_block = true;
            continue;
        }

        if is_import(trimmed, ext) {
            if imports.len() < MAX_IMPORTS {
                imports.push(trimmed.to_string());
            }
            continue;
        }

        if let Some((name, kind)) = detect_symbol(trimmed, ext) {
            symbols.push(LineSymbol {
                name,
                kind,
                line: idx as u32 + 1,
                indent: indent_of(line),
            });
        }
    }

    let ends: Vec<u32> = symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| {
            let next = symbols[i + 1..]
                .iter()
                .find(|other| other.indent <= symbol.indent)
                .map(|other| other.line);
            span_end(&lines, symbol.line, next)
        })
        .collect();

    let mut functions = Vec::new();
    let mut classes: Vec<ClassSpan> = Vec::new();
    // Index into `classes` of each open container, with its indent
    let mut open: Vec<(usize, usize)> = Vec::new();

    for (symbol, end) in symbols.iter().zip(ends) {
        while let Some(&(class_idx, indent)) = open.last() {
            if symbol.indent > indent && symbol.line <= classes[class_idx].line_end {
                break;
            }
            open.pop();
        }

        match symbol.kind {
            SymbolKind::Container => {
                classes.push(ClassSpan {
                    name: symbol.name.clone(),
                    line_start: symbol.line,
                    line_end: end,
                    methods: Vec::new(),
                });
                open.push((classes.len() - 1, symbol.indent));
            }
            SymbolKind::Function => {
                let span = SymbolSpan::new(symbol.name.clone(), symbol.line, end);
                match open.last() {
                    Some(&(class_idx, _)) => classes[class_idx].methods.push(span),
                    None => functions.push(span),
                }
            }
        }
    }

    Some(FileSemantics {
        language: language.to_string(),
        functions,
        classes,
        imports,
    })
}

/// [`SemanticAnalyzer`] backed by [`analyze_source`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LineSymbolAnalyzer;

impl LineSymbolAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SemanticAnalyzer for LineSymbolAnalyzer {
    async fn analyze(&self, path: &str, content: &str) -> Result<Option<FileSemantics>> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Ok(analyze_source(content, ext))
    }
}
