use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::RecipeId;
use crate::item::ItemKind;
use crate::station::StationType;

/// An immutable product recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    /// Item kind a combiner produces from one full ingredient set.
    pub output: ItemKind,
    pub ingredients: BTreeSet<ItemKind>,
    /// Ordered station types, intake storage first, final storage last.
    pub workflow: Vec<StationType>,
    pub processing_time: BTreeMap<StationType, u32>,
    pub batch_size: u32,
    pub quality_threshold: Fixed64,
}

impl Recipe {
    /// Processing time at `stage`, falling back to the station default.
    pub fn stage_time(&self, stage: StationType) -> u32 {
        self.processing_time
            .get(&stage)
            .copied()
            .unwrap_or_else(|| stage.default_processing_time())
    }

    pub fn stage_index(&self, stage: StationType) -> Option<usize> {
        self.workflow.iter().position(|s| *s == stage)
    }

    /// The stage after `current_step`, if any.
    pub fn next_stage(&self, current_step: usize) -> Option<(usize, StationType)> {
        let next = current_step + 1;
        self.workflow.get(next).map(|ty| (next, *ty))
    }

    /// First combiner in the workflow. Only this stage merges ingredients.
    pub fn combiner_stage(&self) -> Option<StationType> {
        self.workflow.iter().copied().find(|s| s.is_combiner())
    }

    pub fn is_ingredient(&self, kind: ItemKind) -> bool {
        self.ingredients.contains(&kind)
    }
}

/// Recipe description before registration.
#[derive(Debug, Clone)]
pub struct RecipeDef {
    pub name: String,
    pub output: ItemKind,
    pub ingredients: Vec<ItemKind>,
    pub workflow: Vec<StationType>,
    pub processing_time: BTreeMap<StationType, u32>,
    pub batch_size: u32,
    pub quality_threshold: f64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("recipe not found: {0}")]
    NotFound(String),
    #[error("duplicate recipe name: {0}")]
    DuplicateName(String),
    #[error("recipe {0} has no ingredients")]
    EmptyIngredients(String),
    #[error("recipe {0} has an empty workflow")]
    EmptyWorkflow(String),
    #[error("recipe {0}: workflow must start at Storage")]
    BadWorkflowStart(String),
    #[error("recipe {0}: workflow must end at FinalStorage")]
    BadWorkflowEnd(String),
    #[error("recipe {0}: workflow has no combiner stage (Cooker or Plater)")]
    MissingCombiner(String),
    #[error("recipe {recipe}: no processing time for {station}")]
    MissingProcessingTime { recipe: String, station: StationType },
    #[error("recipe {recipe}: processing time for {station} must be at least 1")]
    ZeroProcessingTime { recipe: String, station: StationType },
    #[error("recipe {recipe}: quality threshold {value} outside [0, 1]")]
    ThresholdOutOfRange { recipe: String, value: f64 },
}

/// Builder for an immutable [`RecipeBook`].
/// Registration, optional mutation by name, then validated `build()`.
#[derive(Debug, Default)]
pub struct RecipeBookBuilder {
    defs: Vec<RecipeDef>,
}

impl RecipeBookBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipe. Returns the id it will carry once built.
    pub fn register(&mut self, def: RecipeDef) -> RecipeId {
        let id = RecipeId(self.defs.len() as u32);
        self.defs.push(def);
        id
    }

    /// Mutate a registered recipe by name.
    pub fn mutate<F>(&mut self, name: &str, f: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut RecipeDef),
    {
        let def = self
            .defs
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        f(def);
        Ok(())
    }

    pub fn build(self) -> Result<RecipeBook, CatalogError> {
        let mut recipes = Vec::with_capacity(self.defs.len());
        let mut name_to_id = HashMap::new();
        for (index, def) in self.defs.into_iter().enumerate() {
            validate(&def)?;
            let id = RecipeId(index as u32);
            if name_to_id.insert(def.name.clone(), id).is_some() {
                return Err(CatalogError::DuplicateName(def.name));
            }
            recipes.push(Recipe {
                id,
                name: def.name,
                output: def.output,
                ingredients: def.ingredients.into_iter().collect(),
                workflow: def.workflow,
                processing_time: def.processing_time,
                batch_size: def.batch_size,
                quality_threshold: f64_to_fixed64(def.quality_threshold),
            });
        }
        Ok(RecipeBook {
            recipes,
            name_to_id,
        })
    }
}

fn validate(def: &RecipeDef) -> Result<(), CatalogError> {
    let name = || def.name.clone();
    if def.ingredients.is_empty() {
        return Err(CatalogError::EmptyIngredients(name()));
    }
    let (Some(first), Some(last)) = (def.workflow.first(), def.workflow.last()) else {
        return Err(CatalogError::EmptyWorkflow(name()));
    };
    if *first != StationType::Storage {
        return Err(CatalogError::BadWorkflowStart(name()));
    }
    if *last != StationType::FinalStorage {
        return Err(CatalogError::BadWorkflowEnd(name()));
    }
    if !def.workflow.iter().any(|s| s.is_combiner()) {
        return Err(CatalogError::MissingCombiner(name()));
    }
    for station in def.workflow.iter().filter(|s| !s.is_storage()) {
        match def.processing_time.get(station) {
            None => {
                return Err(CatalogError::MissingProcessingTime {
                    recipe: name(),
                    station: *station,
                });
            }
            Some(0) => {
                return Err(CatalogError::ZeroProcessingTime {
                    recipe: name(),
                    station: *station,
                });
            }
            Some(_) => {}
        }
    }
    if !(0.0..=1.0).contains(&def.quality_threshold) {
        return Err(CatalogError::ThresholdOutOfRange {
            recipe: name(),
            value: def.quality_threshold,
        });
    }
    Ok(())
}

/// Immutable recipe catalog. Frozen after `build()`.
#[derive(Debug, Clone)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
    name_to_id: HashMap<String, RecipeId>,
}

impl RecipeBook {
    /// Rebuild from already-validated recipes, e.g. out of a snapshot.
    pub(crate) fn from_recipes(recipes: Vec<Recipe>) -> Self {
        let name_to_id = recipes.iter().map(|r| (r.name.clone(), r.id)).collect();
        Self {
            recipes,
            name_to_id,
        }
    }

    pub(crate) fn as_slice(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn get(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(id.0 as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&Recipe> {
        self.name_to_id.get(name).and_then(|id| self.get(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

fn times(entries: &[(StationType, u32)]) -> BTreeMap<StationType, u32> {
    entries.iter().copied().collect()
}

/// The built-in catalog: ricotta salad, tomato pasta, shrimp fried rice.
pub fn standard_defs() -> Vec<RecipeDef> {
    use StationType::*;
    vec![
        RecipeDef {
            name: "salad".into(),
            output: ItemKind::Salad,
            ingredients: vec![
                ItemKind::Lettuce,
                ItemKind::Romaine,
                ItemKind::Sprouts,
                ItemKind::CherryTomato,
                ItemKind::Ricotta,
                ItemKind::Nuts,
            ],
            workflow: vec![Storage, Washer, Cutter, Plater, Sealer, Inspector, FinalStorage],
            processing_time: times(&[
                (Washer, 10),
                (Cutter, 12),
                (Plater, 6),
                (Sealer, 6),
                (Inspector, 3),
            ]),
            batch_size: 10,
            quality_threshold: 0.75,
        },
        RecipeDef {
            name: "pasta".into(),
            output: ItemKind::PastaDish,
            ingredients: vec![
                ItemKind::Pasta,
                ItemKind::Tomato,
                ItemKind::Onion,
                ItemKind::Garlic,
                ItemKind::OliveOil,
            ],
            workflow: vec![
                Storage,
                Washer,
                Cutter,
                Cooker,
                Plater,
                Sealer,
                Inspector,
                FinalStorage,
            ],
            processing_time: times(&[
                (Washer, 10),
                (Cutter, 12),
                (Cooker, 24),
                (Plater, 6),
                (Sealer, 6),
                (Inspector, 3),
            ]),
            batch_size: 15,
            quality_threshold: 0.7,
        },
        RecipeDef {
            name: "fried_rice".into(),
            output: ItemKind::RiceDish,
            ingredients: vec![
                ItemKind::Rice,
                ItemKind::Shrimp,
                ItemKind::GreenOnion,
                ItemKind::Carrot,
                ItemKind::Onion,
                ItemKind::Oil,
                ItemKind::OysterSauce,
            ],
            workflow: vec![
                Storage,
                Washer,
                Cutter,
                Cooker,
                Plater,
                Sealer,
                Inspector,
                FinalStorage,
            ],
            processing_time: times(&[
                (Washer, 10),
                (Cutter, 12),
                (Cooker, 30),
                (Plater, 6),
                (Sealer, 6),
                (Inspector, 3),
            ]),
            batch_size: 20,
            quality_threshold: 0.7,
        },
    ]
}

/// Build the standard catalog.
pub fn standard_catalog() -> Result<RecipeBook, CatalogError> {
    let mut builder = RecipeBookBuilder::new();
    for def in standard_defs() {
        builder.register(def);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================================================
    // Standard catalog
    // ===========================================================================

    #[test]
    fn standard_catalog_has_three_recipes() {
        let book = standard_catalog().unwrap();
        assert_eq!(book.len(), 3);
        let rice = book.by_name("fried_rice").unwrap();
        assert_eq!(rice.ingredients.len(), 7);
        assert_eq!(rice.stage_time(StationType::Cooker), 30);
        assert_eq!(rice.output, ItemKind::RiceDish);
    }

    #[test]
    fn salad_combines_at_plater() {
        let book = standard_catalog().unwrap();
        let salad = book.by_name("salad").unwrap();
        assert_eq!(salad.combiner_stage(), Some(StationType::Plater));
        assert_eq!(salad.quality_threshold, f64_to_fixed64(0.75));
        let pasta = book.by_name("pasta").unwrap();
        assert_eq!(pasta.combiner_stage(), Some(StationType::Cooker));
    }

    #[test]
    fn next_stage_walks_workflow() {
        let book = standard_catalog().unwrap();
        let pasta = book.by_name("pasta").unwrap();
        assert_eq!(pasta.next_stage(0), Some((1, StationType::Washer)));
        assert_eq!(pasta.next_stage(6), Some((7, StationType::FinalStorage)));
        assert_eq!(pasta.next_stage(7), None);
    }

    #[test]
    fn storage_stage_time_falls_back_to_default() {
        let book = standard_catalog().unwrap();
        let salad = book.by_name("salad").unwrap();
        assert_eq!(salad.stage_time(StationType::Storage), 1);
    }

    // ===========================================================================
    // Builder validation
    // ===========================================================================

    fn valid_def() -> RecipeDef {
        standard_defs().remove(1)
    }

    fn build_one(def: RecipeDef) -> Result<RecipeBook, CatalogError> {
        let mut b = RecipeBookBuilder::new();
        b.register(def);
        b.build()
    }

    #[test]
    fn rejects_workflow_not_starting_at_storage() {
        let mut def = valid_def();
        def.workflow.remove(0);
        assert_eq!(
            build_one(def).unwrap_err(),
            CatalogError::BadWorkflowStart("pasta".into())
        );
    }

    #[test]
    fn rejects_workflow_not_ending_at_final_storage() {
        let mut def = valid_def();
        def.workflow.pop();
        assert!(matches!(build_one(def), Err(CatalogError::BadWorkflowEnd(_))));
    }

    #[test]
    fn rejects_missing_processing_time() {
        let mut def = valid_def();
        def.processing_time.remove(&StationType::Sealer);
        assert_eq!(
            build_one(def).unwrap_err(),
            CatalogError::MissingProcessingTime {
                recipe: "pasta".into(),
                station: StationType::Sealer
            }
        );
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut def = valid_def();
        def.quality_threshold = 1.5;
        assert!(matches!(
            build_one(def),
            Err(CatalogError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_workflow_without_combiner() {
        let mut def = valid_def();
        def.workflow.retain(|s| !s.is_combiner());
        assert!(matches!(build_one(def), Err(CatalogError::MissingCombiner(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut b = RecipeBookBuilder::new();
        b.register(valid_def());
        b.register(valid_def());
        assert_eq!(
            b.build().unwrap_err(),
            CatalogError::DuplicateName("pasta".into())
        );
    }

    #[test]
    fn mutate_by_name() {
        let mut b = RecipeBookBuilder::new();
        b.register(valid_def());
        b.mutate("pasta", |d| d.batch_size = 3).unwrap();
        assert!(b.mutate("soup", |_| {}).is_err());
        let book = b.build().unwrap();
        assert_eq!(book.by_name("pasta").unwrap().batch_size, 3);
    }
}
