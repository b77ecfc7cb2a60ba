//! Configuration types for `bnd-cppmodel.toml`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub module: ModuleConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Type names mapped directly to a target type; resolution stops at a
    /// typedef with one of these names.
    #[serde(default)]
    pub bindings: Vec<String>,
    #[serde(default)]
    pub include: Vec<IncludeConfig>,
}

/// Input settings.
#[derive(Debug, Deserialize)]
pub struct ModuleConfig {
    /// Name of the produced module.
    pub name: String,
    /// The CastXML document describing the parsed headers.
    pub ast: PathBuf,
    /// Preprocessor output (`castxml -E`) to collect `#define`s from.
    #[serde(default)]
    pub macros: Option<PathBuf>,
    /// Where to write the re-serialized AST for diagnostics.
    #[serde(default)]
    pub dump: Option<PathBuf>,
}

/// Output file settings.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output file path for the JSON model (e.g. `model.json`).
    #[serde(default = "default_output_file")]
    pub file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: default_output_file(),
        }
    }
}

fn default_output_file() -> PathBuf {
    PathBuf::from("model.json")
}

/// A header unit to process.
///
/// ```toml
/// [[include]]
/// id = "d3d11"
/// attach = true
///
/// [[include]]
/// id = "dxgitype"
/// attach_types = ["DXGI_RATIONAL"]
/// ```
#[derive(Debug, Deserialize)]
pub struct IncludeConfig {
    /// Header file name without extension.
    pub id: String,
    /// Attach every top-level declaration of this header.
    #[serde(default)]
    pub attach: Option<bool>,
    /// Attach only these declarations.
    #[serde(default)]
    pub attach_types: Vec<String>,
}

/// How much of a header unit is in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Full,
    Partial(HashSet<String>),
}

/// Read-only inputs the builder takes from the configuration.
///
/// Include ids are compared case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    pub bound_types: HashSet<String>,
    includes: HashSet<String>,
    attached: HashMap<String, Attachment>,
}

impl Scope {
    pub fn from_config(config: &Config) -> Self {
        let mut scope = Scope::default();
        scope.bound_types.extend(config.bindings.iter().cloned());
        for rule in &config.include {
            scope.add_include(
                &rule.id,
                rule.attach.unwrap_or(false),
                rule.attach_types.iter().cloned(),
            );
        }
        scope
    }

    /// Register a header unit. Fully attaching wins over any partial list;
    /// partial lists of the same id are merged.
    pub fn add_include(
        &mut self,
        id: &str,
        fully_attached: bool,
        attach_types: impl IntoIterator<Item = String>,
    ) {
        let key = id.to_ascii_lowercase();
        self.includes.insert(key.clone());

        let attach_types: HashSet<String> = attach_types.into_iter().collect();
        if !fully_attached && attach_types.is_empty() {
            return;
        }
        let entry = self
            .attached
            .entry(key)
            .or_insert_with(|| Attachment::Partial(HashSet::new()));
        if fully_attached {
            *entry = Attachment::Full;
        } else if let Attachment::Partial(types) = entry {
            types.extend(attach_types);
        }
    }

    pub fn is_processed(&self, include_id: &str) -> bool {
        self.includes.contains(&include_id.to_ascii_lowercase())
    }

    pub fn attachment(&self, include_id: &str) -> Option<&Attachment> {
        self.attached.get(&include_id.to_ascii_lowercase())
    }
}

/// Resolve a path from the config relative to the TOML file's directory.
/// Absolute paths are returned as-is.
pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Load a `bnd-cppmodel.toml` file. The module must have a name and an AST
/// document.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading model config {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("parsing model config {}", path.display()))?;
    anyhow::ensure!(
        !config.module.name.is_empty(),
        "model config {} has an empty module name",
        path.display()
    );
    anyhow::ensure!(
        !config.module.ast.as_os_str().is_empty(),
        "model config {} names no AST document",
        path.display()
    );
    Ok(config)
}
