//! The factory: owns every station, robot and counter, and advances them
//! one synchronous tick per [`Factory::step`].
//!
//! # Step order
//!
//! 1. **Action** -- apply the command string or coordinator intent map.
//! 2. **Stations** -- every station processes once, then every station
//!    draws its malfunction check from the factory generator.
//! 3. **Routing** -- automatic transport (direct, segmented or nearest).
//!    Skipped on coordinator steps.
//! 4. **Robots** -- every arm steps, then every logistics robot; then
//!    collisions are counted.
//! 5. **Drain** -- final-storage outputs become completed products.
//! 6. **Reward and terminal check**, then the state hash.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::action::{
    Action, ActionError, AssignmentReport, Command, SkipReason, StationRef, Target, TaskIntent,
};
use crate::config::{ConfigError, FactoryConfig, SpawnPolicy, TransportMode};
use crate::dispatch::{self, Assignment};
use crate::event::{Event, EventLog};
use crate::fixed::{Fixed64, Ticks};
use crate::grid::{GridPos, GridSize};
use crate::id::{ItemId, RecipeId, RobotId, StationId};
use crate::item::{ItemIdAllocator, ItemKind, WorkItem};
use crate::layout::build_floor;
use crate::query::Observation;
use crate::recipe::{CatalogError, Recipe, RecipeBook, standard_catalog};
use crate::rng::SimRng;
use crate::robot::{Robot, RobotStepResult};
use crate::sim::{SimState, StateHash};
use crate::station::{Station, StationOutcome, StationStatus, StationType};
use crate::task::{Task, TaskKind};

/// Reward per product that reaches final storage.
pub const COMPLETION_REWARD: i64 = 10;
/// Penalty per item rejected at inspection.
pub const REJECTION_PENALTY: i64 = 5;

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result of one [`Factory::step`].
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub terminal: bool,
    pub reward: i64,
    /// Always false; episodes end only through the terminal condition.
    pub truncated: bool,
}

/// Lifetime production counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Counters {
    /// Every work item ever created, including combiner products.
    pub spawned: u64,
    /// Ingredient units consumed by combiners.
    pub merged: u64,
    pub completed: u64,
    pub rejected: u64,
    pub total_lead_time: Ticks,
    pub collisions: u64,
}

/// Progress on one production order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderProgress {
    pub recipe: RecipeId,
    pub name: String,
    pub quantity: u32,
    /// Kits spawned for this order, at most `quantity`.
    pub released: u32,
    /// Good products of this recipe credited to this order.
    pub completed: u32,
}

impl OrderProgress {
    pub fn is_complete(&self) -> bool {
        self.completed >= self.quantity
    }
}

fn plan_orders(config: &FactoryConfig, recipes: &RecipeBook) -> Vec<OrderProgress> {
    config
        .orders
        .iter()
        .filter_map(|order| {
            let recipe = recipes.by_name(&order.recipe)?;
            Some(OrderProgress {
                recipe: recipe.id,
                name: recipe.name.clone(),
                quantity: order.quantity,
                released: 0,
                completed: 0,
            })
        })
        .collect()
}

/// A product that reached final storage.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompletedProduct {
    pub item: ItemId,
    pub kind: ItemKind,
    pub recipe: RecipeId,
    pub quality: Fixed64,
    pub lead_time: Ticks,
}

/// Item accounting at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ledger {
    pub spawned: u64,
    pub completed: u64,
    pub rejected: u64,
    pub merged: u64,
    /// Ids tracked as in progress.
    pub in_progress: u64,
    /// Items physically held in station buffers, robot cargo and pick tasks.
    pub held: u64,
}

impl Ledger {
    /// Every created item is accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.spawned == self.completed + self.rejected + self.merged + self.in_progress
            && self.in_progress == self.held
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Factory {
    pub(crate) config: FactoryConfig,
    pub(crate) recipes: RecipeBook,
    /// Default recipe, see [`Factory::default_recipe`].
    pub(crate) recipe: RecipeId,
    pub(crate) size: GridSize,
    pub(crate) stations: Vec<Station>,
    pub(crate) robots: Vec<Robot>,
    pub(crate) rng: SimRng,
    pub(crate) ids: ItemIdAllocator,
    pub(crate) sim: SimState,
    pub(crate) counters: Counters,
    pub(crate) in_progress: BTreeSet<ItemId>,
    pub(crate) completed_products: Vec<CompletedProduct>,
    pub(crate) orders: Vec<OrderProgress>,
    pub(crate) terminal: bool,
    pub(crate) next_spawn_line: u32,
    pub(crate) last_state_hash: u64,
    pub(crate) events: EventLog,
    pub(crate) last_report: Option<AssignmentReport>,
}

impl Factory {
    /// Factory over the built-in recipe catalog, reset to `config.seed`.
    pub fn new(config: FactoryConfig) -> Result<Self, FactoryError> {
        Self::with_catalog(config, standard_catalog()?)
    }

    /// Factory over a custom catalog, reset to `config.seed`.
    pub fn with_catalog(config: FactoryConfig, recipes: RecipeBook) -> Result<Self, FactoryError> {
        config.check_against(&recipes)?;
        let recipe = recipes
            .by_name(&config.recipe)
            .map(|r| r.id)
            .ok_or_else(|| FactoryError::UnknownRecipe(config.recipe.clone()))?;
        let events = EventLog::new(config.event_capacity);
        let mut factory = Self {
            recipes,
            recipe,
            size: GridSize { rows: 0, cols: 0 },
            stations: Vec::new(),
            robots: Vec::new(),
            rng: SimRng::new(config.seed),
            ids: ItemIdAllocator::new(),
            sim: SimState::new(),
            counters: Counters::default(),
            in_progress: BTreeSet::new(),
            completed_products: Vec::new(),
            orders: Vec::new(),
            terminal: false,
            next_spawn_line: 0,
            last_state_hash: 0,
            events,
            last_report: None,
            config,
        };
        let seed = factory.config.seed;
        factory.reset(seed);
        Ok(factory)
    }

    /// Rebuild the floor and zero every counter. Never terminal.
    pub fn reset(&mut self, seed: u64) -> (Observation, bool) {
        self.config.seed = seed;
        let plan = build_floor(&self.config, &self.recipes, self.default_recipe());
        self.size = plan.size;
        self.stations = plan.stations;
        self.robots = plan.robots;
        self.rng.reseed(seed);
        self.ids = ItemIdAllocator::new();
        self.sim = SimState::new();
        self.counters = Counters::default();
        self.in_progress.clear();
        self.completed_products.clear();
        self.orders = plan_orders(&self.config, &self.recipes);
        self.terminal = false;
        self.next_spawn_line = 0;
        self.events.clear();
        self.last_report = None;
        self.last_state_hash = self.compute_state_hash();
        info!(
            seed,
            recipe = %self.default_recipe().name,
            orders = self.orders.len(),
            stations = self.stations.len(),
            robots = self.robots.len(),
            "factory reset"
        );
        (self.observe(), false)
    }

    /// Advance one tick. After the terminal state is reached this is a
    /// no-op returning the current observation and zero reward.
    pub fn step(&mut self, action: &Action) -> StepResult {
        if self.terminal {
            return StepResult {
                observation: self.observe(),
                terminal: true,
                reward: 0,
                truncated: false,
            };
        }

        self.sim.tick += 1;
        let completed_before = self.counters.completed;
        let rejected_before = self.counters.rejected;

        // 1. Action.
        let coordinator = match action {
            Action::Command(s) => {
                self.last_report = None;
                self.apply_command_str(s);
                false
            }
            Action::Assign(intents) => {
                let report = self.assign(intents);
                self.last_report = Some(report);
                true
            }
        };

        // 2. Stations.
        self.process_stations();

        // 3. Routing.
        if !coordinator {
            self.route();
        }

        // 4. Robots.
        self.step_robots();

        // 5. Drain final storage.
        self.drain_final_storage();

        // 6. Reward, terminal, hash.
        let completed = (self.counters.completed - completed_before) as i64;
        let rejected = (self.counters.rejected - rejected_before) as i64;
        let reward = COMPLETION_REWARD * completed - REJECTION_PENALTY * rejected;

        let target_reached =
            self.config.target_products > 0 && self.counters.completed >= self.config.target_products;
        let orders_done =
            !self.orders.is_empty() && self.orders.iter().all(OrderProgress::is_complete);
        self.terminal = self.sim.tick >= self.config.max_ticks || target_reached || orders_done;
        self.last_state_hash = self.compute_state_hash();

        StepResult {
            observation: self.observe(),
            terminal: self.terminal,
            reward,
            truncated: false,
        }
    }

    /// Strictly parse an agent's JSON action and step with it.
    pub fn step_json(&mut self, json: &str) -> Result<StepResult, ActionError> {
        let action = Action::from_json(json)?;
        Ok(self.step(&action))
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    fn process_stations(&mut self) {
        for index in 0..self.stations.len() {
            let outcome = self.stations[index].process(&mut self.ids);
            self.record_outcome(StationId(index as u32), outcome);
        }
        if !self.config.malfunctions {
            return;
        }
        let tick = self.sim.tick;
        for station in &mut self.stations {
            if station.check_malfunction(&mut self.rng) {
                debug!(station = %station.name(), tick, "station malfunction");
                self.events.push(Event::StationMalfunction {
                    station: station.id,
                    tick,
                });
            }
        }
    }

    fn route(&mut self) {
        let tick = self.sim.tick;
        let assignments: Vec<Assignment> = match self.config.transport {
            TransportMode::Direct => {
                dispatch::route_direct(&mut self.stations, &self.robots, &self.recipes);
                return;
            }
            TransportMode::Segmented => {
                dispatch::dispatch_segmented(&mut self.stations, &mut self.robots, &self.recipes)
            }
            TransportMode::Nearest => {
                dispatch::dispatch_nearest(&mut self.stations, &mut self.robots, &self.recipes)
            }
        };
        for a in assignments {
            self.events.push(Event::TaskAssigned {
                robot: a.robot,
                task: "transport",
                tick,
            });
        }
    }

    fn step_robots(&mut self) {
        let order: Vec<usize> = (0..self.robots.len())
            .filter(|&i| self.robots[i].is_arm())
            .chain((0..self.robots.len()).filter(|&i| self.robots[i].is_logistics()))
            .collect();
        for index in order {
            let result = self.robots[index].step(&mut self.stations, &mut self.ids);
            self.record_robot_step(RobotId(index as u32), result);
        }
        self.count_collisions();
    }

    fn record_robot_step(&mut self, robot: RobotId, result: RobotStepResult) {
        if let Some((station, outcome)) = result.operated {
            self.record_outcome(station, outcome);
        }
        if let Some((item, station)) = result.delivered {
            let ty = self.stations[station.index()].station_type();
            if let Some(delivered) = self.stations[station.index()].input_item_mut(item) {
                dispatch::align_to_station(delivered, ty, &self.recipes);
            }
            self.events.push(Event::ItemDelivered {
                robot,
                item,
                station,
                tick: self.sim.tick,
            });
        }
    }

    /// Every cell holding more than one logistics robot adds `count - 1`.
    fn count_collisions(&mut self) {
        let mut occupancy: BTreeMap<GridPos, u64> = BTreeMap::new();
        for robot in self.robots.iter().filter(|r| r.is_logistics()) {
            *occupancy.entry(robot.position).or_default() += 1;
        }
        let collisions: u64 = occupancy.values().map(|n| n.saturating_sub(1)).sum();
        self.counters.collisions += collisions;
    }

    fn drain_final_storage(&mut self) {
        let tick = self.sim.tick;
        for index in 0..self.stations.len() {
            if self.stations[index].station_type() != StationType::FinalStorage {
                continue;
            }
            while let Some(item) = self.stations[index].take_output() {
                self.in_progress.remove(&item.id);
                if item.is_defective {
                    self.counters.rejected += 1;
                    continue;
                }
                self.counters.completed += 1;
                self.counters.total_lead_time += tick;
                if let Some(order) = self
                    .orders
                    .iter_mut()
                    .find(|o| o.recipe == item.recipe && !o.is_complete())
                {
                    order.completed += 1;
                }
                debug!(item = item.id.0, kind = %item.kind, tick, "product completed");
                self.events.push(Event::ProductCompleted {
                    item: item.id,
                    kind: item.kind,
                    lead_time: tick,
                    tick,
                });
                self.completed_products.push(CompletedProduct {
                    item: item.id,
                    kind: item.kind,
                    recipe: item.recipe,
                    quality: item.quality,
                    lead_time: tick,
                });
            }
        }
    }

    fn record_outcome(&mut self, station: StationId, outcome: StationOutcome) {
        let tick = self.sim.tick;
        if outcome.started {
            self.events.push(Event::StationStarted { station, tick });
        }
        if let Some(combination) = outcome.combined {
            for consumed in &combination.consumed {
                self.in_progress.remove(consumed);
            }
            self.counters.merged += combination.consumed.len() as u64;
            self.counters.spawned += 1;
            self.in_progress.insert(combination.product);
            self.events.push(Event::IngredientsCombined {
                station,
                product: combination.product,
                consumed: combination.consumed.len() as u32,
                tick,
            });
        }
        if let Some(item) = outcome.completed {
            self.events.push(Event::StationCompleted {
                station,
                item,
                tick,
            });
        }
        if let Some(item) = outcome.rejected {
            self.in_progress.remove(&item.id);
            self.counters.rejected += 1;
            self.events.push(Event::ItemRejected {
                station,
                item: item.id,
                tick,
            });
        }
        if outcome.went_down {
            self.events.push(Event::StationMalfunction { station, tick });
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn apply_command_str(&mut self, s: &str) {
        match Command::parse(s) {
            Ok(command) => self.apply_command(command),
            Err(e) => warn!(command = %s, error = %e, "command ignored"),
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Continue => {}
            Command::Produce(what) => {
                let line = self.spawn_line();
                let spawned = if let Some(recipe) = self.recipes.by_name(&what).map(|r| r.id) {
                    self.spawn_kit(recipe, line)
                } else {
                    match ItemKind::from_name(&what) {
                        Some(kind) if self.ingredient_owner(kind).is_some() => {
                            self.spawn_ingredient(kind, line)
                        }
                        _ => {
                            warn!(what = %what, "nothing to produce under that name");
                            return;
                        }
                    }
                };
                if !spawned {
                    warn!(what = %what, line, "intake storage full, nothing spawned");
                }
            }
            Command::ProduceNext => {
                let Some(recipe) = self.next_order() else {
                    warn!("no open production order");
                    return;
                };
                let line = self.spawn_line();
                if !self.spawn_kit(recipe, line) {
                    warn!(recipe = recipe.0, line, "intake storage full, order kit not spawned");
                }
            }
            Command::Maintain(r) => self.service_station(r, "maintain", Station::maintain),
            Command::Repair(r) => self.service_station(r, "repair", Station::repair),
            Command::ReplaceBlade { line, index } => {
                let r = StationRef {
                    kind: StationType::Cutter,
                    line,
                    index,
                };
                self.service_station(r, "replace_blade", |s| {
                    s.replace_blade();
                });
            }
        }
    }

    fn service_station(&mut self, r: StationRef, what: &str, f: impl FnOnce(&mut Station)) {
        let Some(id) = self.resolve_station(r) else {
            warn!(station = %r, what, "no such station");
            return;
        };
        f(&mut self.stations[id.index()]);
        self.events.push(Event::StationMaintained {
            station: id,
            tick: self.sim.tick,
        });
    }

    fn spawn_line(&mut self) -> u32 {
        match self.config.spawn {
            SpawnPolicy::FirstLine => 0,
            SpawnPolicy::RoundRobin => {
                let line = self.next_spawn_line;
                self.next_spawn_line = (line + 1) % self.config.num_lines;
                line
            }
        }
    }

    fn intake(&self, line: u32) -> Option<StationId> {
        self.stations
            .iter()
            .find(|s| s.line == line && s.station_type() == StationType::Storage)
            .map(|s| s.id)
    }

    /// One unit of every ingredient of `recipe`, all or nothing. Counts
    /// toward the first production order for that recipe still releasing.
    pub fn spawn_kit(&mut self, recipe: RecipeId, line: u32) -> bool {
        let Some(storage) = self.intake(line) else {
            return false;
        };
        let Some(kinds) = self
            .recipes
            .get(recipe)
            .map(|r| r.ingredients.iter().copied().collect::<Vec<ItemKind>>())
        else {
            return false;
        };
        if self.stations[storage.index()].free_slots() < kinds.len() {
            return false;
        }
        for kind in kinds {
            self.spawn_into(storage, kind, recipe);
        }
        if let Some(order) = self
            .orders
            .iter_mut()
            .find(|o| o.recipe == recipe && o.released < o.quantity)
        {
            order.released += 1;
        }
        true
    }

    /// A single ingredient unit, owned by [`Factory::ingredient_owner`].
    pub fn spawn_ingredient(&mut self, kind: ItemKind, line: u32) -> bool {
        let Some(storage) = self.intake(line) else {
            return false;
        };
        let Some(recipe) = self.ingredient_owner(kind) else {
            return false;
        };
        if !self.stations[storage.index()].can_accept_input() {
            return false;
        }
        self.spawn_into(storage, kind, recipe);
        true
    }

    /// Recipe a bare ingredient joins: the default recipe when it uses the
    /// kind, else the first catalog recipe that does.
    pub fn ingredient_owner(&self, kind: ItemKind) -> Option<RecipeId> {
        std::iter::once(self.default_recipe())
            .chain(self.recipes.iter())
            .find(|r| r.is_ingredient(kind))
            .map(|r| r.id)
    }

    /// Recipe of the first order with kits left to release, else of the
    /// first order still short of good products.
    fn next_order(&self) -> Option<RecipeId> {
        self.orders
            .iter()
            .find(|o| o.released < o.quantity)
            .or_else(|| self.orders.iter().find(|o| !o.is_complete()))
            .map(|o| o.recipe)
    }

    fn spawn_into(&mut self, storage: StationId, kind: ItemKind, recipe: RecipeId) {
        let intake_time = self
            .recipes
            .get(recipe)
            .map_or_else(|| StationType::Storage.default_processing_time(), |r| {
                r.stage_time(StationType::Storage)
            });
        let line = self.stations[storage.index()].line;
        let mut item = WorkItem::new(kind, self.ids.allocate(), recipe, line);
        item.time_remaining = intake_time;
        let id = item.id;
        if self.stations[storage.index()].add_input(item).is_ok() {
            self.counters.spawned += 1;
            self.in_progress.insert(id);
            self.events.push(Event::ItemSpawned {
                item: id,
                kind,
                station: storage,
                tick: self.sim.tick,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Coordinator intents
    // -----------------------------------------------------------------------

    /// Apply a coordinator map. Entries are independent: a bad entry is
    /// logged and skipped, the rest still apply.
    pub fn assign(&mut self, intents: &BTreeMap<String, TaskIntent>) -> AssignmentReport {
        let mut report = AssignmentReport::default();
        for (name, intent) in intents {
            match self.assign_one(name, intent) {
                Ok(()) => report.assigned.push(name.clone()),
                Err(reason) => {
                    warn!(robot = %name, %reason, "intent skipped");
                    report.skipped.push((name.clone(), reason));
                }
            }
        }
        report
    }

    fn assign_one(&mut self, name: &str, intent: &TaskIntent) -> Result<(), SkipReason> {
        let robot = self.robot_by_name(name).ok_or(SkipReason::UnknownRobot)?;
        let r = robot.index();
        if !self.robots[r].is_idle() {
            return Err(SkipReason::RobotBusy);
        }
        let logistics = self.robots[r].is_logistics();
        let carrying = self.robots[r].carrying().is_some();

        let tasks: Vec<Task> = match intent {
            TaskIntent::Wait => Vec::new(),
            TaskIntent::Move { to } => {
                let target = match to {
                    Target::Station(s) => self.service_cell(*s)?,
                    Target::Cell(c) if self.size.contains(*c) => *c,
                    Target::Cell(_) => return Err(SkipReason::UnknownStation),
                };
                vec![Task::new(TaskKind::Move { target })]
            }
            TaskIntent::Operate { station } => {
                let own = self.robots[r]
                    .assigned_station()
                    .ok_or(SkipReason::UnsupportedForRole)?;
                if let Some(s) = station {
                    let wanted = self.resolve_station(*s).ok_or(SkipReason::UnknownStation)?;
                    if wanted != own {
                        return Err(SkipReason::WrongStation);
                    }
                }
                vec![Task::new(TaskKind::Operate { station: own })]
            }
            TaskIntent::Drop { to } => {
                if !logistics {
                    return Err(SkipReason::UnsupportedForRole);
                }
                if !carrying {
                    return Err(SkipReason::NotCarrying);
                }
                vec![self.drop_task(*to)?]
            }
            TaskIntent::Pick { from } => {
                if !logistics {
                    return Err(SkipReason::UnsupportedForRole);
                }
                if carrying {
                    return Err(SkipReason::AlreadyCarrying);
                }
                vec![self.reserve_pick(*from)?]
            }
            TaskIntent::Transport { from, to } => {
                if !logistics {
                    return Err(SkipReason::UnsupportedForRole);
                }
                if carrying {
                    return Err(SkipReason::AlreadyCarrying);
                }
                // Validate the drop first so a failure never strands a reserved item.
                let drop = self.drop_task(*to)?;
                vec![self.reserve_pick(*from)?, drop]
            }
        };

        if self.robots[r].queue().free_slots() < tasks.len() {
            self.return_reserved(tasks);
            return Err(SkipReason::QueueFull);
        }
        let tick = self.sim.tick;
        for task in tasks {
            let label = task.kind.name();
            if let Err(task) = self.robots[r].add_to_queue(task) {
                self.return_reserved(vec![task]);
                return Err(SkipReason::QueueFull);
            }
            self.events.push(Event::TaskAssigned {
                robot,
                task: label,
                tick,
            });
        }
        Ok(())
    }

    fn service_cell(&self, r: StationRef) -> Result<GridPos, SkipReason> {
        self.resolve_station(r)
            .map(|id| self.stations[id.index()].service_cell())
            .ok_or(SkipReason::UnknownStation)
    }

    fn drop_task(&self, to: StationRef) -> Result<Task, SkipReason> {
        let station = self.resolve_station(to).ok_or(SkipReason::UnknownStation)?;
        Ok(Task::new(TaskKind::Drop {
            station,
            target: self.stations[station.index()].service_cell(),
        }))
    }

    fn reserve_pick(&mut self, from: StationRef) -> Result<Task, SkipReason> {
        let station = self.resolve_station(from).ok_or(SkipReason::UnknownStation)?;
        let source = &mut self.stations[station.index()];
        let item = source.take_output().ok_or(SkipReason::NothingToPick)?;
        Ok(Task::new(TaskKind::Pick {
            station,
            target: source.service_cell(),
            item,
        }))
    }

    /// Hand items reserved by dropped tasks back to their source stations.
    fn return_reserved(&mut self, tasks: Vec<Task>) {
        for task in tasks {
            if let TaskKind::Pick { station, item, .. } = task.kind {
                self.stations[station.index()].restore_output(item);
            }
        }
    }

    /// Abandon every task of `robot`. Reserved items go back to the output
    /// buffers they came from. Returns the number of tasks dropped.
    pub fn clear_robot_tasks(&mut self, robot: RobotId) -> usize {
        let Some(r) = self.robots.get_mut(robot.index()) else {
            return 0;
        };
        let tasks = r.clear_tasks();
        let count = tasks.len();
        self.return_reserved(tasks);
        count
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn resolve_station(&self, r: StationRef) -> Option<StationId> {
        self.stations
            .iter()
            .find(|s| s.station_type() == r.kind && s.line == r.line && s.ordinal == r.index)
            .map(|s| s.id)
    }

    pub fn station_by_name(&self, name: &str) -> Option<&Station> {
        let r = StationRef::parse(name).ok()?;
        self.resolve_station(r).map(|id| &self.stations[id.index()])
    }

    pub fn robot_by_name(&self, name: &str) -> Option<RobotId> {
        self.robots.iter().find(|r| r.name() == name).map(|r| r.id)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn recipes(&self) -> &RecipeBook {
        &self.recipes
    }

    /// The configured recipe. It sets baseline stage times and owns bare
    /// ingredients; every catalog recipe can still be produced.
    pub fn default_recipe(&self) -> &Recipe {
        // The id was resolved against this catalog at construction.
        &self.recipes.as_slice()[self.recipe.0 as usize]
    }

    pub fn orders(&self) -> &[OrderProgress] {
        &self.orders
    }

    pub fn tick(&self) -> Ticks {
        self.sim.tick
    }

    pub fn grid_size(&self) -> GridSize {
        self.size
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(id.index())
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(id.index())
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn completed_products(&self) -> &[CompletedProduct] {
        &self.completed_products
    }

    pub fn products_in_progress(&self) -> &BTreeSet<ItemId> {
        &self.in_progress
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Report from the most recent coordinator step, if the last step was one.
    pub fn last_assignment_report(&self) -> Option<&AssignmentReport> {
        self.last_report.as_ref()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn ledger(&self) -> Ledger {
        let held = self
            .stations
            .iter()
            .map(|s| s.held_items().count() as u64)
            .chain(self.robots.iter().map(|r| r.held_items().count() as u64))
            .sum();
        Ledger {
            spawned: self.counters.spawned,
            completed: self.counters.completed,
            rejected: self.counters.rejected,
            merged: self.counters.merged,
            in_progress: self.in_progress.len() as u64,
            held,
        }
    }

    /// Hash of the state after the most recent step.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    fn compute_state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.sim.tick);
        h.write_u64(self.rng.state());
        h.write_u64(self.ids.issued());
        for station in &self.stations {
            h.write_u32(station_status_code(station.status()));
            h.write_u32(station.progress());
            h.write_fixed64(station.wear_level);
            h.write_fixed64(station.malfunction_probability);
            for item in station.held_items() {
                h.write_u64(item.id.0);
                h.write_u64(item.current_step as u64);
                h.write_fixed64(item.quality);
                h.write_bool(item.sealed);
            }
        }
        for robot in &self.robots {
            h.write_i32(robot.position.row);
            h.write_i32(robot.position.col);
            h.write_u32(robot.status() as u32);
            h.write_u64(robot.queue().len() as u64);
            h.write_bool(robot.current_task().is_some());
            h.write_u64(robot.carrying().map_or(u64::MAX, |i| i.id.0));
        }
        h.write_u64(self.counters.spawned);
        h.write_u64(self.counters.merged);
        h.write_u64(self.counters.completed);
        h.write_u64(self.counters.rejected);
        h.write_u64(self.counters.collisions);
        for order in &self.orders {
            h.write_u32(order.released);
            h.write_u32(order.completed);
        }
        h.finish()
    }
}

fn station_status_code(status: StationStatus) -> u32 {
    match status {
        StationStatus::Idle => 0,
        StationStatus::Busy => 1,
        StationStatus::WaitingPickup => 2,
        StationStatus::Error => 3,
        StationStatus::Down => 4,
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Factory {
    /// Direct station access for scenario setup.
    pub fn station_mut(&mut self, id: StationId) -> Option<&mut Station> {
        self.stations.get_mut(id.index())
    }

    /// Direct robot access for scenario setup.
    pub fn robot_mut(&mut self, id: RobotId) -> Option<&mut Robot> {
        self.robots.get_mut(id.index())
    }
}
