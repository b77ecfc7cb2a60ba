//! bnd-cppmodel — CastXML AST → declaration model builder.
//!
//! Reads the XML document CastXML (or GCC-XML) produces for a set of C/C++
//! headers and builds a language-neutral model of the declarations: structs
//! and unions with flattened anonymous members, COM interfaces with their
//! vtable layout, functions, enums, constants, GUIDs and macros, grouped per
//! header unit.
//!
//! # Quick start
//!
//! Build the model and write it as JSON (suitable for `build.rs`):
//!
//! ```no_run
//! use std::path::Path;
//!
//! // Reads config TOML, parses the AST document, writes model.json.
//! bnd_cppmodel::run(Path::new("bnd-cppmodel.toml"), None, None).unwrap();
//! ```
//!
//! Or get the model without writing to disk:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let module = bnd_cppmodel::generate(Path::new("bnd-cppmodel.toml")).unwrap();
//! for include in &module.includes {
//!     println!("{}: {} declarations", include.name, include.decls.len());
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub mod aggregate;
pub mod annotation;
pub mod ast;
pub mod builder;
pub mod config;
pub mod error;
pub mod interface;
pub mod leaf;
pub mod macros;
pub mod model;
pub mod resolve;
pub mod typedefs;

pub use builder::{ModelBuilder, build_module};
pub use error::ParseError;
pub use model::Module;

/// Run the full pipeline: load config, build the model, and write it as
/// pretty JSON.
///
/// `output` optionally overrides the output file path from the config, and
/// `dump` the diagnostic AST dump path. Returns the path the model was
/// written to.
pub fn run(config_path: &Path, output: Option<&Path>, dump: Option<&Path>) -> Result<PathBuf> {
    let mut cfg = config::load_config(config_path)?;
    if let Some(dump) = dump {
        cfg.module.dump = Some(dump.to_path_buf());
    }

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let module = generate_from_config(&cfg, base_dir)?;
    let json = serde_json::to_string_pretty(&module).context("serializing model")?;

    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => base_dir.join(&cfg.output.file),
    };
    std::fs::write(&output_path, &json)
        .with_context(|| format!("writing output to {}", output_path.display()))?;

    info!(
        path = %output_path.display(),
        size = json.len(),
        "wrote model"
    );

    Ok(output_path)
}

/// Parse a `bnd-cppmodel.toml` config file and return the built model
/// without writing it.
pub fn generate(config_path: &Path) -> Result<Module> {
    let cfg = config::load_config(config_path)?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    generate_from_config(&cfg, base_dir)
}

/// Build the model from an already-loaded [`config::Config`].
///
/// `base_dir` is the directory relative to which paths in the config are
/// resolved (typically the parent directory of the TOML file).
///
/// When a dump path is configured, the processed document is written there
/// even if building the model fails.
pub fn generate_from_config(cfg: &config::Config, base_dir: &Path) -> Result<Module> {
    let scope = config::Scope::from_config(cfg);
    info!(
        module = %cfg.module.name,
        includes = cfg.include.len(),
        bindings = scope.bound_types.len(),
        "loaded configuration"
    );

    let ast_path = config::resolve_path(&cfg.module.ast, base_dir);
    let xml = std::fs::read_to_string(&ast_path)
        .with_context(|| format!("reading AST document {}", ast_path.display()))?;

    let mut index = ast::AstIndex::from_xml(&xml)
        .with_context(|| format!("loading AST document {}", ast_path.display()))?;
    let built = typedefs::normalize_tag_names(&mut index)
        .and_then(|()| build_module(&index, &scope, Module::new(&cfg.module.name)));

    if let Some(dump) = &cfg.module.dump {
        let dump_path = config::resolve_path(dump, base_dir);
        if let Err(e) = write_dump(&index, &dump_path) {
            warn!(path = %dump_path.display(), err = %e, "failed to write AST dump");
        }
    }

    let mut module = built.with_context(|| format!("building model from {}", ast_path.display()))?;

    if let Some(macros) = &cfg.module.macros {
        let macros_path = config::resolve_path(macros, base_dir);
        let text = std::fs::read_to_string(&macros_path)
            .with_context(|| format!("reading preprocessor output {}", macros_path.display()))?;
        let mut collector = macros::MacroCollector::new();
        collector.parse(&text);
        collector.apply(&scope, &mut module);
    }

    info!(
        module = %module.name,
        includes = module.includes.len(),
        decls = module.includes.iter().map(|i| i.decls.len()).sum::<usize>(),
        "model built"
    );

    Ok(module)
}

fn write_dump(index: &ast::AstIndex, path: &Path) -> Result<()> {
    let xml = index.to_xml()?;
    std::fs::write(path, xml).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote AST dump");
    Ok(())
}
