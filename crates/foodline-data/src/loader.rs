//! Loading pipeline: finds data files, detects their format, and turns them
//! into a factory config plus recipe catalog.
//!
//! A data directory may contain `factory.{ron,toml,json}` and
//! `recipes.{ron,toml,json}`. Both are optional: a missing config falls
//! back to the defaults and a missing catalog to the built-in recipes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use foodline_core::config::{ConfigError, FactoryConfig};
use foodline_core::engine::{Factory, FactoryError};
use foodline_core::recipe::{CatalogError, RecipeBook, standard_catalog};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::schema::{RecipeData, resolve_recipes};

/// Base name of the factory config file.
pub const CONFIG_FILE: &str = "factory";
/// Base name of the recipe catalog file.
pub const RECIPES_FILE: &str = "recipes";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    #[error("invalid recipe catalog in {file}: {source}")]
    Catalog {
        file: PathBuf,
        #[source]
        source: CatalogError,
    },

    #[error("invalid config in {file}: {source}")]
    InvalidConfig {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Format from the file extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Look for `{base_name}.ron`, `.toml` and `.json` in `dir`. More than one
/// match is an error.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read and decode a file in whatever format its extension names.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Decode a list. TOML has no top-level arrays, so there the list is read
/// from the array at `toml_key`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .get(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
        .clone();
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name helpers
// ===========================================================================

pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// A loaded config and the catalog it runs against.
#[derive(Debug, Clone)]
pub struct FactoryData {
    pub config: FactoryConfig,
    pub recipes: RecipeBook,
}

impl FactoryData {
    pub fn build_factory(self) -> Result<Factory, FactoryError> {
        Factory::with_catalog(self.config, self.recipes)
    }
}

/// Load and check a single config file.
pub fn load_config(path: &Path) -> Result<FactoryConfig, DataLoadError> {
    let config: FactoryConfig = deserialize_file(path)?;
    config.check().map_err(|source| DataLoadError::InvalidConfig {
        file: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

/// Load and validate a single recipe catalog file.
pub fn load_recipes(path: &Path) -> Result<RecipeBook, DataLoadError> {
    let data: Vec<RecipeData> = deserialize_list(path, "recipes")?;
    let book = resolve_recipes(&data, path)?;
    for recipe in book.iter() {
        debug!(recipe = %recipe.name, stages = recipe.workflow.len(), "recipe loaded");
    }
    Ok(book)
}

/// Load everything in `dir`. The config's default recipe must exist in the
/// resulting catalog, and its buffers must fit every recipe in it.
pub fn load_factory_data(dir: &Path) -> Result<FactoryData, DataLoadError> {
    let (config, config_file) = match find_data_file(dir, CONFIG_FILE)? {
        Some(path) => (load_config(&path)?, path),
        None => (FactoryConfig::default(), dir.to_path_buf()),
    };
    let (recipes, catalog_file) = match find_data_file(dir, RECIPES_FILE)? {
        Some(path) => (load_recipes(&path)?, path),
        None => {
            let book = standard_catalog().map_err(|source| DataLoadError::Catalog {
                file: dir.to_path_buf(),
                source,
            })?;
            (book, dir.to_path_buf())
        }
    };
    if recipes.by_name(&config.recipe).is_none() {
        return Err(DataLoadError::UnresolvedRef {
            file: catalog_file,
            name: config.recipe.clone(),
            expected_kind: "recipe",
        });
    }
    config
        .check_against(&recipes)
        .map_err(|source| DataLoadError::InvalidConfig {
            file: config_file,
            source,
        })?;
    info!(
        dir = %dir.display(),
        recipe = %config.recipe,
        recipes = recipes.len(),
        "factory data loaded"
    );
    Ok(FactoryData { config, recipes })
}

// ===========================================================================
// Tests
// ===========================================================================
