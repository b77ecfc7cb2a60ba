//! `#define` collection from preprocessor output (`castxml -E`).
//!
//! Line markers (`# 12 "C:/sdk/include/sample.h"`) switch the current header
//! unit; each `#define` that follows is recorded under that unit's file stem.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info};

use crate::ast::file_stem;
use crate::config::Scope;
use crate::model::{Decl, Define, Module};

static LINE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*#\s+\d+\s+"([^"]+)""#).expect("valid marker regex"));

static DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#define\s+([a-zA-Z_][\w_]*)\s+(.*)").expect("valid define regex")
});

/// Macros grouped by header unit, in first-seen order.
#[derive(Debug, Default)]
pub struct MacroCollector {
    includes: IndexMap<String, IndexMap<String, String>>,
}

impl MacroCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `#define` of a preprocessed translation unit.
    pub fn parse(&mut self, text: &str) {
        let mut current: Option<String> = None;

        for line in text.lines() {
            if let Some(marker) = LINE_MARKER.captures(line) {
                let file = &marker[1];
                // <built-in>, <command line> and friends
                current = if file.starts_with('<') {
                    None
                } else {
                    Some(file_stem(file).to_ascii_lowercase())
                };
                continue;
            }

            let Some(include) = &current else { continue };
            let Some(define) = DEFINE.captures(line) else {
                continue;
            };
            let value = define[2].trim();
            if value.is_empty() {
                continue;
            }

            let macros = self.includes.entry(include.clone()).or_default();
            // A redefinition moves to the end.
            macros.shift_remove(&define[1]);
            macros.insert(define[1].to_string(), value.to_string());
        }
    }

    /// Macros of one header unit (case-insensitive id).
    pub fn macros(&self, include_id: &str) -> Option<&IndexMap<String, String>> {
        self.includes.get(&include_id.to_ascii_lowercase())
    }

    pub fn include_ids(&self) -> impl Iterator<Item = &str> {
        self.includes.keys().map(String::as_str)
    }

    /// Add the macros of every processed header unit to `module`, creating
    /// includes as needed.
    pub fn apply(&self, scope: &Scope, module: &mut Module) {
        for (include_id, macros) in &self.includes {
            if !scope.is_processed(include_id) {
                debug!(
                    include = %include_id,
                    count = macros.len(),
                    "macros of unprocessed include ignored"
                );
                continue;
            }
            let slot = module.include_index(include_id);
            for (name, value) in macros {
                module.includes[slot].add(Decl::Define(Define {
                    name: name.clone(),
                    value: value.clone(),
                }));
            }
            info!(include = %include_id, count = macros.len(), "macros attached");
        }
    }
}
