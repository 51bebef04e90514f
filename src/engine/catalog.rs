//! Engine catalog
//!
//! Built-in definitions are embedded from `prompts/`. A directory of
//! `.toml` files can override or extend them by id.

use super::{EngineDef, EngineDefError};
use rust_embed::Embed;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Embed)]
#[folder = "prompts/"]
struct PromptAssets;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{source_name}: {error}")]
    Definition {
        source_name: String,
        error: EngineDefError,
    },
    #[error("{source_name}: asset is not UTF-8")]
    Encoding { source_name: String },
    #[error("duplicate engine id {id} in {source_name}")]
    Duplicate { id: String, source_name: String },
    #[error("cannot read {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

/// All engines available to callers, keyed by id
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    engines: BTreeMap<String, Arc<EngineDef>>,
}

impl Catalog {
    /// Engines shipped with the binary
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        let mut names: Vec<_> = PromptAssets::iter().collect();
        names.sort();

        for name in names {
            let Some(file) = PromptAssets::get(&name) else {
                continue;
            };
            let source = std::str::from_utf8(&file.data).map_err(|_| CatalogError::Encoding {
                source_name: name.to_string(),
            })?;
            catalog.insert_new(&name, source)?;
        }

        tracing::debug!(engines = catalog.engines.len(), "Loaded built-in engines");
        Ok(catalog)
    }

    /// Built-in engines, then every `.toml` file in `dir` replacing or
    /// adding engines by id
    pub fn load(dir: Option<&Path>) -> Result<Self, CatalogError> {
        let mut catalog = Self::builtin()?;
        if let Some(dir) = dir {
            catalog.apply_overrides(dir)?;
        }
        Ok(catalog)
    }

    fn apply_overrides(&mut self, dir: &Path) -> Result<(), CatalogError> {
        let io_err = |path: &Path, error| CatalogError::Io {
            path: path.to_path_buf(),
            error,
        };

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| io_err(dir, e))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            let source = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let def = parse(&path.display().to_string(), &source)?;
            let replaced = self.engines.insert(def.id.clone(), Arc::new(def));
            tracing::info!(
                path = %path.display(),
                replaced = replaced.is_some(),
                "Loaded engine override"
            );
        }
        Ok(())
    }

    fn insert_new(&mut self, source_name: &str, source: &str) -> Result<(), CatalogError> {
        let def = parse(source_name, source)?;
        if self.engines.contains_key(&def.id) {
            return Err(CatalogError::Duplicate {
                id: def.id,
                source_name: source_name.to_string(),
            });
        }
        self.engines.insert(def.id.clone(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<EngineDef>> {
        self.engines.get(id).cloned()
    }

    /// Engines in id order
    pub fn list(&self) -> impl Iterator<Item = &Arc<EngineDef>> {
        self.engines.values()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }
}

fn parse(source_name: &str, source: &str) -> Result<EngineDef, CatalogError> {
    EngineDef::from_toml(source).map_err(|error| CatalogError::Definition {
        source_name: source_name.to_string(),
        error,
    })
}
