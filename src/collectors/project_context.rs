//! Technology stack from package manifests.
//!
//! Each ecosystem lists its manifests in preference order; the first one that
//! exists and parses marks the language as present. Dependencies imported by
//! the analyzed files are listed ahead of the rest before the caps apply.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::pull_request_target;
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;
use crate::types::{Dependency, FileSemantics, Framework, ProjectContext, Runtime};

const MAX_MAIN_DEPENDENCIES: usize = 50;
const MAX_DEV_DEPENDENCIES: usize = 20;

const MANIFEST_FILES: &[(&str, &[&str])] = &[
    ("php", &["composer.json"]),
    ("javascript", &["package.json"]),
    ("python", &["pyproject.toml", "requirements.txt"]),
    ("go", &["go.mod"]),
    ("rust", &["Cargo.toml"]),
    ("ruby", &["Gemfile"]),
];

const KNOWN_FRAMEWORKS: &[(&str, &str, &str)] = &[
    ("php", "laravel/framework", "Laravel"),
    ("php", "symfony/symfony", "Symfony"),
    ("php", "slim/slim", "Slim"),
    ("php", "cakephp/cakephp", "CakePHP"),
    ("php", "yiisoft/yii2", "Yii"),
    ("javascript", "react", "React"),
    ("javascript", "vue", "Vue.js"),
    ("javascript", "next", "Next.js"),
    ("javascript", "nuxt", "Nuxt"),
    ("javascript", "@angular/core", "Angular"),
    ("javascript", "svelte", "Svelte"),
    ("javascript", "express", "Express"),
    ("javascript", "fastify", "Fastify"),
    ("javascript", "@nestjs/core", "NestJS"),
    ("python", "django", "Django"),
    ("python", "flask", "Flask"),
    ("python", "fastapi", "FastAPI"),
    ("python", "tornado", "Tornado"),
    ("ruby", "rails", "Ruby on Rails"),
    ("ruby", "sinatra", "Sinatra"),
    ("ruby", "hanami", "Hanami"),
    ("rust", "actix-web", "Actix Web"),
    ("rust", "rocket", "Rocket"),
    ("rust", "axum", "Axum"),
    ("rust", "warp", "Warp"),
    ("go", "github.com/gin-gonic/gin", "Gin"),
    ("go", "github.com/labstack/echo", "Echo"),
    ("go", "github.com/gofiber/fiber", "Fiber"),
];

const RUST_STD_MODULES: &[&str] = &["std", "core", "alloc", "self", "super", "crate"];

const STD_LIB_ROOTS: &[&str] = &[
    "java", "javax", "sun", "System", "Microsoft", "os", "sys", "io", "re", "json", "typing",
    "collections", "functools", "itertools",
];

static PYTHON_PINNED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_.-]+)(?:\[.*?\])?([<>=!~]+)(.+)$").ok());
static PYTHON_BARE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_.-]+)(?:\[.*?\])?$").ok());
static GO_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^go\s+(\d+\.\d+(?:\.\d+)?)").ok());
static GO_REQUIRE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*require\s+([^\s(]+)\s+(\S+)").ok());
static GO_REQUIRE_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)require\s*\(\s*(.*?)\s*\)").ok());
static GO_BLOCK_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\S+)\s+(\S+)").ok());
static RUBY_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*ruby\s+["']([^"']+)["']"#).ok());
static GEM_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*gem\s+["']([^"']+)["'](?:,\s*["']([^"']+)["'])?"#).ok()
});
static GO_MODULE_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z]+\.[a-z]+/").ok());

/// What one manifest contributed.
#[derive(Debug, Default, PartialEq)]
struct ManifestData {
    runtime: Option<Runtime>,
    frameworks: Vec<Framework>,
    dependencies: Vec<Dependency>,
}

impl ManifestData {
    fn runtime(&mut self, name: &str, version: impl Into<String>) {
        self.runtime = Some(Runtime {
            name: name.to_string(),
            version: version.into(),
        });
    }

    fn add(&mut self, language: &str, name: &str, version: impl Into<String>, dev: bool) {
        let version = version.into();
        if let Some((_, _, framework)) = KNOWN_FRAMEWORKS
            .iter()
            .find(|(lang, package, _)| *lang == language && *package == name)
        {
            self.frameworks.push(Framework {
                name: framework.to_string(),
                version: version.clone(),
            });
        }
        self.dependencies.push(Dependency {
            name: name.to_string(),
            version,
            dev,
        });
    }
}

fn json_version(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

fn parse_composer_json(content: &str) -> Option<ManifestData> {
    let json: Value = serde_json::from_str(content).ok()?;
    let mut data = ManifestData::default();

    if let Some(require) = json.get("require").and_then(Value::as_object) {
        if let Some(php) = require.get("php") {
            data.runtime("PHP", json_version(php));
        }
        for (package, version) in require {
            if package == "php" || package.starts_with("ext-") {
                continue;
            }
            data.add("php", package, json_version(version), false);
        }
    }
    if let Some(dev) = json.get("require-dev").and_then(Value::as_object) {
        for (package, version) in dev {
            data.add("php", package, json_version(version), true);
        }
    }
    Some(data)
}

fn parse_package_json(content: &str) -> Option<ManifestData> {
    let json: Value = serde_json::from_str(content).ok()?;
    let mut data = ManifestData::default();

    if let Some(node) = json.pointer("/engines/node") {
        data.runtime("Node.js", json_version(node));
    }
    for (key, dev) in [("dependencies", false), ("devDependencies", true)] {
        if let Some(deps) = json.get(key).and_then(Value::as_object) {
            for (package, version) in deps {
                data.add("javascript", package, json_version(version), dev);
            }
        }
    }
    Some(data)
}

fn parse_python_dependency(spec: &str) -> Option<(String, String)> {
    let compact: String = spec
        .split(';')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if let Some(caps) = PYTHON_PINNED.as_ref().and_then(|re| re.captures(&compact)) {
        return Some((caps[1].to_string(), format!("{}{}", &caps[2], &caps[3])));
    }
    PYTHON_BARE
        .as_ref()
        .and_then(|re| re.captures(&compact))
        .map(|caps| (caps[1].to_string(), "*".to_string()))
}

fn parse_pyproject_toml(content: &str) -> Option<ManifestData> {
    let doc: toml::Value = toml::from_str(content).ok()?;
    let project = doc.get("project");
    let mut data = ManifestData::default();

    if let Some(version) = project
        .and_then(|p| p.get("requires-python"))
        .and_then(|v| v.as_str())
    {
        data.runtime("Python", version);
    }
    if let Some(deps) = project
        .and_then(|p| p.get("dependencies"))
        .and_then(|v| v.as_array())
    {
        for spec in deps.iter().filter_map(|d| d.as_str()) {
            if let Some((name, version)) = parse_python_dependency(spec) {
                data.add("python", &name, version, false);
            }
        }
    }
    Some(data)
}

fn parse_requirements_txt(content: &str) -> Option<ManifestData> {
    let mut data = ManifestData::default();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        if let Some((name, version)) = parse_python_dependency(line) {
            data.add("python", &name, version, false);
        }
    }
    Some(data)
}

fn parse_go_mod(content: &str) -> Option<ManifestData> {
    let mut data = ManifestData::default();

    if let Some(caps) = GO_VERSION.as_ref().and_then(|re| re.captures(content)) {
        data.runtime("Go", &caps[1]);
    }

    let mut seen = HashSet::new();
    if let Some(re) = GO_REQUIRE.as_ref() {
        for caps in re.captures_iter(content) {
            seen.insert(caps[1].to_string());
            data.add("go", &caps[1], &caps[2], false);
        }
    }
    let block = GO_REQUIRE_BLOCK
        .as_ref()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    if let (Some(block), Some(line_re)) = (block, GO_BLOCK_LINE.as_ref()) {
        for caps in line_re.captures_iter(block) {
            if caps[1].starts_with("//") || !seen.insert(caps[1].to_string()) {
                continue;
            }
            data.add("go", &caps[1], &caps[2], false);
        }
    }
    Some(data)
}

fn cargo_version(value: &toml::Value) -> String {
    match value {
        toml::Value::String(version) => version.clone(),
        toml::Value::Table(table) => table
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("*")
            .to_string(),
        _ => "*".to_string(),
    }
}

fn parse_cargo_toml(content: &str) -> Option<ManifestData> {
    let doc: toml::Value = toml::from_str(content).ok()?;
    let mut data = ManifestData::default();

    if let Some(version) = doc
        .get("package")
        .and_then(|p| p.get("rust-version"))
        .and_then(|v| v.as_str())
    {
        data.runtime("Rust", version);
    }
    for (key, dev) in [("dependencies", false), ("dev-dependencies", true)] {
        if let Some(deps) = doc.get(key).and_then(|v| v.as_table()) {
            for (name, spec) in deps {
                data.add("rust", name, cargo_version(spec), dev);
            }
        }
    }
    Some(data)
}

fn parse_gemfile(content: &str) -> Option<ManifestData> {
    let mut data = ManifestData::default();

    if let Some(caps) = RUBY_VERSION.as_ref().and_then(|re| re.captures(content)) {
        data.runtime("Ruby", &caps[1]);
    }
    if let Some(re) = GEM_LINE.as_ref() {
        for caps in re.captures_iter(content) {
            let version = caps.get(2).map_or("*", |m| m.as_str());
            data.add("ruby", &caps[1], version, false);
        }
    }
    Some(data)
}

fn parse_manifest(filename: &str, content: &str) -> Option<ManifestData> {
    match filename {
        "composer.json" => parse_composer_json(content),
        "package.json" => parse_package_json(content),
        "pyproject.toml" => parse_pyproject_toml(content),
        "requirements.txt" => parse_requirements_txt(content),
        "go.mod" => parse_go_mod(content),
        "Cargo.toml" => parse_cargo_toml(content),
        "Gemfile" => parse_gemfile(content),
        _ => None,
    }
}

/// Module path named by a raw import line.
fn import_target(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(start) = line.find(['"', '\'', '`']) {
        let quote = line[start..].chars().next()?;
        let rest = &line[start + 1..];
        return rest.find(quote).map(|end| &rest[..end]);
    }

    let rest = ["pub use ", "use ", "import ", "from ", "require "]
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))?;
    let token = rest.split_whitespace().next()?;
    Some(token.trim_end_matches([';', ',']).trim_end_matches(['{', ':']))
}

/// Package-level root of an imported module, `None` for local or std modules.
fn normalize_module(module: &str) -> Option<String> {
    if module.is_empty() || module.starts_with('.') || module.starts_with('/') {
        return None;
    }
    if module.starts_with("App\\") || module.starts_with("Tests\\") {
        return None;
    }
    if module.starts_with("Illuminate\\") {
        return Some("laravel/framework".to_string());
    }
    if module.contains('\\') {
        return module.split('\\').next().map(str::to_string);
    }
    if module.contains("::") {
        let root = module.split("::").next()?;
        return (!RUST_STD_MODULES.contains(&root)).then(|| root.to_string());
    }

    let is_go_path = GO_MODULE_PATH.as_ref().is_some_and(|re| re.is_match(module));
    if is_go_path {
        return Some(module.to_string());
    }
    if module.contains('/') {
        return module.split('/').next().map(str::to_string);
    }
    if module.contains('.') {
        let root = module.split('.').next()?;
        return (!STD_LIB_ROOTS.contains(&root)).then(|| root.to_string());
    }
    Some(module.to_string())
}

fn imported_modules<'a>(semantics: impl Iterator<Item = &'a FileSemantics>) -> Vec<String> {
    let mut modules = Vec::new();
    for file in semantics {
        for line in &file.imports {
            if let Some(module) = import_target(line).and_then(normalize_module) {
                if !modules.contains(&module) {
                    modules.push(module);
                }
            }
        }
    }
    modules
}

fn matches_import(dependency: &Dependency, modules: &[String]) -> bool {
    let name = dependency.name.to_lowercase();
    let package = name.rsplit('/').next().unwrap_or(&name).to_string();
    modules.iter().any(|module| {
        let module = module.to_lowercase();
        name.contains(&module) || module.contains(&name) || package == module
    })
}

/// Used dependencies first, then cap main and dev lists separately.
fn limit_dependencies(dependencies: Vec<Dependency>, modules: &[String]) -> Vec<Dependency> {
    let (mut main, mut dev): (Vec<_>, Vec<_>) = dependencies.into_iter().partition(|d| !d.dev);
    if !modules.is_empty() {
        // stable sort keeps manifest order within each group
        main.sort_by_key(|d| !matches_import(d, modules));
        dev.sort_by_key(|d| !matches_import(d, modules));
    }
    main.truncate(MAX_MAIN_DEPENDENCIES);
    dev.truncate(MAX_DEV_DEPENDENCIES);
    main.extend(dev);
    main
}

/// Fills `project_context`.
pub struct ProjectContextCollector {
    source: Arc<dyn RepositorySource>,
}

impl ProjectContextCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Collector for ProjectContextCollector {
    fn name(&self) -> &str {
        "project_context"
    }

    fn priority(&self) -> i32 {
        55
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, _)) = pull_request_target(params) else {
            return Ok(());
        };

        let mut context = ProjectContext::default();
        let mut dependencies = Vec::new();

        for (language, manifests) in MANIFEST_FILES {
            for manifest in *manifests {
                let content = match self.source.file_content(repo, manifest, None).await {
                    Ok(Some(content)) => content,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!(path = %manifest, error = %e, "Failed to fetch manifest");
                        continue;
                    }
                };
                let Some(data) = parse_manifest(manifest, &content) else {
                    debug!(path = %manifest, "Manifest did not parse");
                    continue;
                };

                context.languages.push(language.to_string());
                if data.runtime.is_some() {
                    context.runtime = data.runtime;
                }
                for framework in data.frameworks {
                    if !context.frameworks.iter().any(|f| f.name == framework.name) {
                        context.frameworks.push(framework);
                    }
                }
                dependencies.extend(data.dependencies);
                break;
            }
        }

        let modules = imported_modules(bundle.semantics.values());
        context.dependencies = limit_dependencies(dependencies, &modules);

        if context.languages.is_empty() && context.dependencies.is_empty() {
            return Ok(());
        }

        info!(
            repository = %repo.full_name,
            languages = ?context.languages,
            frameworks_count = context.frameworks.len(),
            dependencies_count = context.dependencies.len(),
            "Collected project context"
        );
        bundle.project_context = context;
        Ok(())
    }
}
