//! Foodline Core -- a deterministic, tick-based food-production line.
//!
//! Raw ingredients enter intake storage, robots carry them through washing,
//! cutting, cooking, plating, sealing and inspection, and finished dishes
//! land in final storage. An external agent drives the factory one tick at
//! a time with either a command string or a map of per-robot task intents.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Factory::step`] advances the factory by one tick:
//!
//! 1. **Action** -- Apply the command or coordinator intents.
//! 2. **Stations** -- Every station processes once, then draws its
//!    malfunction check.
//! 3. **Routing** -- Automatic transport between workflow stages (skipped
//!    on coordinator steps).
//! 4. **Robots** -- Arms, then logistics robots; collisions are counted.
//! 5. **Drain** -- Final storage outputs become completed products.
//! 6. **Bookkeeping** -- Reward, terminal check and state hash.
//!
//! ```rust,ignore
//! let mut factory = Factory::new(FactoryConfig::default())?;
//! let result = factory.step(&Action::command("produce_pasta"));
//! println!("{}", result.observation);
//! ```
//!
//! # Key Types
//!
//! - [`engine::Factory`] -- Owns stations, robots and counters; runs the pipeline.
//! - [`station::Station`] -- Bounded input/output buffers and per-kind processing.
//! - [`robot::Robot`] -- Fixed arms and mobile logistics robots.
//! - [`recipe::RecipeBook`] -- Immutable recipe catalog, frozen at startup.
//! - [`action::Action`] -- Validated external actions.
//! - [`query::Observation`] -- Owned snapshot for agents and dashboards.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`serialize`] -- Versioned snapshots via bitcode.

pub mod action;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod grid;
pub mod id;
pub mod item;
pub mod layout;
pub mod query;
pub mod recipe;
pub mod replay;
pub mod rng;
pub mod robot;
pub mod serialize;
pub mod sim;
pub mod station;
pub mod task;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
