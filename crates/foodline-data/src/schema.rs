//! On-disk shapes for recipe catalogs.
//!
//! Data files name item kinds and station types with strings. Resolution
//! turns them into core [`RecipeDef`]s and validates the result through
//! [`RecipeBookBuilder`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use foodline_core::item::ItemKind;
use foodline_core::recipe::{RecipeBook, RecipeBookBuilder, RecipeDef};
use foodline_core::station::StationType;
use serde::Deserialize;

use crate::loader::{DataLoadError, check_duplicate};

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe definition in a data file.
///
/// ```ron
/// (
///     name: "caprese",
///     output: "salad",
///     ingredients: ["cherry_tomato", "ricotta"],
///     workflow: ["Storage", "Washer", "Plater", "Inspector", "FinalStorage"],
///     processing_time: {"Washer": 4, "Plater": 2, "Inspector": 1},
///     quality_threshold: 0.8,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    pub output: String,
    pub ingredients: Vec<String>,
    pub workflow: Vec<String>,
    /// Station name to ticks. Omitted stations fall back to their default.
    #[serde(default)]
    pub processing_time: BTreeMap<String, u32>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    pub quality_threshold: f64,
}

fn default_batch_size() -> u32 {
    1
}

/// TOML wrapper: `[[recipes]]` tables.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlRecipes {
    pub recipes: Vec<RecipeData>,
}

fn item_kind(name: &str, file: &Path) -> Result<ItemKind, DataLoadError> {
    ItemKind::from_name(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind: "item",
    })
}

fn station_type(name: &str, file: &Path) -> Result<StationType, DataLoadError> {
    StationType::parse(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind: "station",
    })
}

impl RecipeData {
    /// Resolve names. Stations missing from `processing_time` get their
    /// kind's default so short data files stay valid.
    pub fn resolve(&self, file: &Path) -> Result<RecipeDef, DataLoadError> {
        let output = item_kind(&self.output, file)?;
        let ingredients = self
            .ingredients
            .iter()
            .map(|name| item_kind(name, file))
            .collect::<Result<Vec<_>, _>>()?;
        let workflow = self
            .workflow
            .iter()
            .map(|name| station_type(name, file))
            .collect::<Result<Vec<_>, _>>()?;

        let mut processing_time = BTreeMap::new();
        for (name, ticks) in &self.processing_time {
            processing_time.insert(station_type(name, file)?, *ticks);
        }
        for ty in workflow.iter().filter(|ty| !ty.is_storage()) {
            processing_time
                .entry(*ty)
                .or_insert_with(|| ty.default_processing_time());
        }

        Ok(RecipeDef {
            name: self.name.clone(),
            output,
            ingredients,
            workflow,
            processing_time,
            batch_size: self.batch_size,
            quality_threshold: self.quality_threshold,
        })
    }
}

/// Resolve and validate a whole catalog.
pub fn resolve_recipes(data: &[RecipeData], file: &Path) -> Result<RecipeBook, DataLoadError> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut builder = RecipeBookBuilder::new();
    for recipe in data {
        check_duplicate(&seen, &recipe.name, file)?;
        seen.insert(recipe.name.clone(), ());
        builder.register(recipe.resolve(file)?);
    }
    builder.build().map_err(|source| DataLoadError::Catalog {
        file: file.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodline_core::recipe::CatalogError;
    use std::path::PathBuf;

    fn file() -> PathBuf {
        PathBuf::from("recipes.ron")
    }

    fn caprese() -> RecipeData {
        RecipeData {
            name: "caprese".into(),
            output: "salad".into(),
            ingredients: vec!["cherry_tomato".into(), "ricotta".into()],
            workflow: ["Storage", "Washer", "Plating", "VisionQA", "FinalStorage"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            processing_time: [("Washer".to_string(), 4)].into_iter().collect(),
            batch_size: 2,
            quality_threshold: 0.8,
        }
    }

    #[test]
    fn resolves_names_and_aliases() {
        let def = caprese().resolve(&file()).unwrap();
        assert_eq!(def.output, ItemKind::Salad);
        assert_eq!(def.ingredients, vec![ItemKind::CherryTomato, ItemKind::Ricotta]);
        assert_eq!(def.workflow[2], StationType::Plater);
        assert_eq!(def.workflow[3], StationType::Inspector);
    }

    #[test]
    fn missing_times_take_station_defaults() {
        let def = caprese().resolve(&file()).unwrap();
        assert_eq!(def.processing_time[&StationType::Washer], 4);
        assert_eq!(def.processing_time[&StationType::Plater], 6);
        assert_eq!(def.processing_time[&StationType::Inspector], 3);
        assert!(!def.processing_time.contains_key(&StationType::Storage));
    }

    #[test]
    fn unknown_item_is_unresolved() {
        let mut data = caprese();
        data.ingredients.push("unobtainium".into());
        let err = data.resolve(&file()).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::UnresolvedRef { expected_kind: "item", ref name, .. } if name == "unobtainium"
        ));
    }

    #[test]
    fn unknown_station_is_unresolved() {
        let mut data = caprese();
        data.workflow.insert(1, "Blender".into());
        assert!(matches!(
            data.resolve(&file()),
            Err(DataLoadError::UnresolvedRef { expected_kind: "station", .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = resolve_recipes(&[caprese(), caprese()], &file());
        assert!(matches!(result, Err(DataLoadError::DuplicateName { .. })));
    }

    #[test]
    fn catalog_validation_errors_surface() {
        let mut data = caprese();
        data.workflow.retain(|s| s != "Plating");
        match resolve_recipes(&[data], &file()) {
            Err(DataLoadError::Catalog { source, .. }) => {
                assert_eq!(source, CatalogError::MissingCombiner("caprese".into()));
            }
            other => panic!("expected catalog error, got {other:?}"),
        }
    }

    #[test]
    fn resolved_catalog_is_usable() {
        let book = resolve_recipes(&[caprese()], &file()).unwrap();
        assert_eq!(book.len(), 1);
        let recipe = book.by_name("caprese").unwrap();
        assert!(recipe.is_ingredient(ItemKind::Ricotta));
        assert_eq!(recipe.combiner_stage(), Some(StationType::Plater));
    }
}
