//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::action::Action;
use crate::config::FactoryConfig;
use crate::engine::Factory;
use crate::fixed::Fixed64;
use crate::grid::GridPos;
use crate::id::{RecipeId, StationId};
use crate::item::{ItemIdAllocator, ItemKind, WorkItem};
use crate::recipe::{Recipe, RecipeBook, RecipeBookBuilder, RecipeDef};
use crate::station::{Station, StationKind, StationType};

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Stations and items
// ===========================================================================

/// A lone station at the origin of line 0, quality threshold 0.7.
pub fn make_station(ty: StationType, capacity: usize) -> Station {
    Station::new(
        StationId(0),
        StationKind::new(ty, fixed(0.7)),
        0,
        0,
        GridPos::new(0, 0),
        capacity,
    )
}

/// A fresh full-quality item of recipe 0 on line 0.
pub fn make_item(ids: &mut ItemIdAllocator, kind: ItemKind) -> WorkItem {
    WorkItem::new(kind, ids.allocate(), RecipeId(0), 0)
}

// ===========================================================================
// Recipes
// ===========================================================================

/// Tomato + onion, cooked, inspected. Short stage times.
pub fn two_ingredient_def() -> RecipeDef {
    use StationType::*;
    RecipeDef {
        name: "tomato_onion".into(),
        output: ItemKind::PastaDish,
        ingredients: vec![ItemKind::Tomato, ItemKind::Onion],
        workflow: vec![Storage, Washer, Cooker, Inspector, FinalStorage],
        processing_time: [(Washer, 2), (Cooker, 3), (Inspector, 1)]
            .into_iter()
            .collect(),
        batch_size: 1,
        quality_threshold: 0.5,
    }
}

pub fn two_ingredient_recipe() -> Recipe {
    let mut builder = RecipeBookBuilder::new();
    let id = builder.register(two_ingredient_def());
    let book = builder.build().unwrap();
    book.get(id).unwrap().clone()
}

// ===========================================================================
// Factories
// ===========================================================================

/// Default config for `recipe` with malfunctions switched off.
pub fn quiet_config(recipe: &str) -> FactoryConfig {
    FactoryConfig::default()
        .with_recipe(recipe)
        .without_malfunctions()
}

pub fn quiet_factory(recipe: &str) -> Factory {
    Factory::new(quiet_config(recipe)).unwrap()
}

/// A quiet single-line factory whose catalog holds only `recipe`.
pub fn factory_with_recipe(mut recipe: Recipe) -> Factory {
    recipe.id = RecipeId(0);
    let config = FactoryConfig {
        num_lines: 1,
        ..quiet_config(&recipe.name)
    };
    Factory::with_catalog(config, RecipeBook::from_recipes(vec![recipe])).unwrap()
}

/// Run `ticks` idle steps and return the summed reward.
pub fn run_idle(factory: &mut Factory, ticks: u64) -> i64 {
    (0..ticks).map(|_| factory.step(&Action::idle()).reward).sum()
}
