//! Buffered processing stations.
//!
//! A [`Station`] is one closed tagged variant ([`StationKind`]) plus the
//! shared buffer/progress bookkeeping. `process()` dispatches over the tag
//! once per tick; there is no per-kind trait object.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fixed::{Fixed64, closeness_factor, f64_to_fixed64};
use crate::grid::GridPos;
use crate::id::{ItemId, RecipeId, StationId};
use crate::item::{ItemIdAllocator, ItemKind, WorkItem};
use crate::recipe::Recipe;
use crate::rng::SimRng;

// ---------------------------------------------------------------------------
// Tuning constants
// ---------------------------------------------------------------------------

/// Generic quality loss per unit of `wear_level`.
const WEAR_PENALTY: f64 = 0.1;
/// Cutter quality loss per unit of blade wear.
const BLADE_WEAR_PENALTY: f64 = 0.2;
/// Blade wear added by each cut.
const BLADE_WEAR_STEP: f64 = 0.001;
/// Plater quality loss per unit of vibration.
const VIBRATION_PENALTY: f64 = 0.15;
const TEMPERATURE_TOLERANCE: f64 = 100.0;
const TEMPERATURE_FLOOR: f64 = 0.5;
const PRESSURE_TOLERANCE: f64 = 50.0;
const PRESSURE_FLOOR: f64 = 0.7;
/// Wear removed by a field repair.
const REPAIR_WEAR_RELIEF: f64 = 0.2;

pub const DEFAULT_TEMPERATURE: f64 = 180.0;
pub const DEFAULT_PRESSURE_KPA: f64 = 100.0;

// ---------------------------------------------------------------------------
// Station type (discriminant)
// ---------------------------------------------------------------------------

/// Field-less station discriminant. Recipes, segments and names refer to
/// stations by type; [`StationKind`] carries the per-kind state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StationType {
    /// Intake storage at the head of a line.
    Storage,
    /// Finished-goods storage at the tail of a line.
    FinalStorage,
    Washer,
    Cutter,
    Cooker,
    Plater,
    Sealer,
    Inspector,
}

impl StationType {
    pub const ALL: [StationType; 8] = [
        StationType::Storage,
        StationType::FinalStorage,
        StationType::Washer,
        StationType::Cutter,
        StationType::Cooker,
        StationType::Plater,
        StationType::Sealer,
        StationType::Inspector,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StationType::Storage => "Storage",
            StationType::FinalStorage => "FinalStorage",
            StationType::Washer => "Washer",
            StationType::Cutter => "Cutter",
            StationType::Cooker => "Cooker",
            StationType::Plater => "Plater",
            StationType::Sealer => "Sealer",
            StationType::Inspector => "Inspector",
        }
    }

    /// Case-insensitive parse. Accepts the alternative names `Plating`,
    /// `Sealing` and `VisionQA`.
    pub fn parse(name: &str) -> Option<StationType> {
        let lower = name.to_ascii_lowercase();
        let ty = match lower.as_str() {
            "storage" => StationType::Storage,
            "finalstorage" | "final_storage" => StationType::FinalStorage,
            "washer" => StationType::Washer,
            "cutter" => StationType::Cutter,
            "cooker" => StationType::Cooker,
            "plater" | "plating" => StationType::Plater,
            "sealer" | "sealing" => StationType::Sealer,
            "inspector" | "visionqa" | "vision_qa" => StationType::Inspector,
            _ => return None,
        };
        Some(ty)
    }

    pub fn default_processing_time(self) -> u32 {
        match self {
            StationType::Storage | StationType::FinalStorage => 1,
            StationType::Washer => 10,
            StationType::Cutter => 12,
            StationType::Cooker => 24,
            StationType::Plater | StationType::Sealer => 6,
            StationType::Inspector => 3,
        }
    }

    pub fn default_malfunction_probability(self) -> Fixed64 {
        let p = match self {
            StationType::Storage | StationType::FinalStorage => 0.0,
            StationType::Washer | StationType::Inspector => 0.001,
            StationType::Cutter => 0.005,
            StationType::Cooker => 0.003,
            StationType::Plater | StationType::Sealer => 0.002,
        };
        f64_to_fixed64(p)
    }

    pub fn is_combiner(self) -> bool {
        matches!(self, StationType::Cooker | StationType::Plater)
    }

    pub fn is_storage(self) -> bool {
        matches!(self, StationType::Storage | StationType::FinalStorage)
    }
}

impl std::fmt::Display for StationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Station kind (tagged variant with per-kind state)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StationKind {
    Storage,
    FinalStorage,
    Washer,
    Cutter {
        blade_wear: Fixed64,
    },
    Cooker {
        temperature: Fixed64,
        optimal_temperature: Fixed64,
    },
    Plater {
        vibration_level: Fixed64,
    },
    Sealer {
        pressure: Fixed64,
        optimal_pressure: Fixed64,
    },
    Inspector {
        quality_threshold: Fixed64,
        rejected_count: u64,
    },
}

impl StationKind {
    /// Fresh per-kind state. `quality_threshold` is only read for inspectors.
    pub fn new(ty: StationType, quality_threshold: Fixed64) -> Self {
        match ty {
            StationType::Storage => StationKind::Storage,
            StationType::FinalStorage => StationKind::FinalStorage,
            StationType::Washer => StationKind::Washer,
            StationType::Cutter => StationKind::Cutter {
                blade_wear: Fixed64::ZERO,
            },
            StationType::Cooker => StationKind::Cooker {
                temperature: f64_to_fixed64(DEFAULT_TEMPERATURE),
                optimal_temperature: f64_to_fixed64(DEFAULT_TEMPERATURE),
            },
            StationType::Plater => StationKind::Plater {
                vibration_level: Fixed64::ZERO,
            },
            StationType::Sealer => StationKind::Sealer {
                pressure: f64_to_fixed64(DEFAULT_PRESSURE_KPA),
                optimal_pressure: f64_to_fixed64(DEFAULT_PRESSURE_KPA),
            },
            StationType::Inspector => StationKind::Inspector {
                quality_threshold,
                rejected_count: 0,
            },
        }
    }

    pub fn station_type(&self) -> StationType {
        match self {
            StationKind::Storage => StationType::Storage,
            StationKind::FinalStorage => StationType::FinalStorage,
            StationKind::Washer => StationType::Washer,
            StationKind::Cutter { .. } => StationType::Cutter,
            StationKind::Cooker { .. } => StationType::Cooker,
            StationKind::Plater { .. } => StationType::Plater,
            StationKind::Sealer { .. } => StationType::Sealer,
            StationKind::Inspector { .. } => StationType::Inspector,
        }
    }

    /// Quality multiplier applied by the combiner kinds, both to combined
    /// products and to items they pass through.
    fn environment_factor(&self) -> Fixed64 {
        match *self {
            StationKind::Cooker {
                temperature,
                optimal_temperature,
            } => closeness_factor(
                temperature,
                optimal_temperature,
                f64_to_fixed64(TEMPERATURE_TOLERANCE),
                f64_to_fixed64(TEMPERATURE_FLOOR),
            ),
            StationKind::Plater { vibration_level } => {
                Fixed64::ONE - vibration_level * f64_to_fixed64(VIBRATION_PENALTY)
            }
            _ => Fixed64::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// Status and per-tick outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationStatus {
    Idle,
    Busy,
    WaitingPickup,
    /// Stochastic malfunction. Cleared by repair or maintenance.
    Error,
    /// Maintenance required (worn-out blade).
    Down,
}

impl StationStatus {
    pub fn name(self) -> &'static str {
        match self {
            StationStatus::Idle => "Idle",
            StationStatus::Busy => "Busy",
            StationStatus::WaitingPickup => "WaitingPickup",
            StationStatus::Error => "Error",
            StationStatus::Down => "Down",
        }
    }

    pub fn is_faulted(self) -> bool {
        matches!(self, StationStatus::Error | StationStatus::Down)
    }
}

/// Ingredient units merged into one product by a combiner.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub product: ItemId,
    pub consumed: Vec<ItemId>,
}

/// What one `process()` call did. The engine turns this into events and
/// counter updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationOutcome {
    /// A unit of work started this tick.
    pub started: bool,
    /// Item placed into the output buffer this tick.
    pub completed: Option<ItemId>,
    pub combined: Option<Combination>,
    /// Item that failed inspection. It is owned by the caller now.
    pub rejected: Option<WorkItem>,
    /// A combiner reached its processing time without a full ingredient set.
    pub held: bool,
    pub went_down: bool,
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub kind: StationKind,
    pub line: u32,
    /// Index among stations of the same type on the same line.
    pub ordinal: u32,
    pub position: GridPos,
    status: StationStatus,
    input: VecDeque<WorkItem>,
    output: VecDeque<WorkItem>,
    pub capacity: usize,
    pub processing_time: u32,
    progress: u32,
    pub wear_level: Fixed64,
    pub malfunction_probability: Fixed64,
    /// Recipes whose rules this station applies: the sets a combiner merges
    /// and the thresholds an inspector grades against.
    pub recipes: Vec<Recipe>,
}

impl Station {
    pub fn new(
        id: StationId,
        kind: StationKind,
        line: u32,
        ordinal: u32,
        position: GridPos,
        capacity: usize,
    ) -> Self {
        let ty = kind.station_type();
        Self {
            id,
            kind,
            line,
            ordinal,
            position,
            status: StationStatus::Idle,
            input: VecDeque::new(),
            output: VecDeque::new(),
            capacity,
            processing_time: ty.default_processing_time(),
            progress: 0,
            wear_level: Fixed64::ZERO,
            malfunction_probability: ty.default_malfunction_probability(),
            recipes: Vec::new(),
        }
    }

    pub fn station_type(&self) -> StationType {
        self.kind.station_type()
    }

    /// `Cutter_0`, `Cutter_0_1`, `FinalStorage_1`.
    pub fn name(&self) -> String {
        if self.ordinal == 0 {
            format!("{}_{}", self.station_type().name(), self.line)
        } else {
            format!("{}_{}_{}", self.station_type().name(), self.line, self.ordinal)
        }
    }

    pub fn status(&self) -> StationStatus {
        self.status
    }

    /// Floor cell a logistics robot stands on to load or unload here.
    pub fn service_cell(&self) -> GridPos {
        GridPos::new(self.position.row + 1, self.position.col)
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn input(&self) -> &VecDeque<WorkItem> {
        &self.input
    }

    pub fn output(&self) -> &VecDeque<WorkItem> {
        &self.output
    }

    /// Items held in either buffer.
    pub fn held_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.input.iter().chain(self.output.iter())
    }

    pub fn can_accept_input(&self) -> bool {
        self.input.len() < self.capacity
    }

    pub fn can_provide_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// Spare input slots.
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.input.len())
    }

    /// Queue `item` for processing. A full buffer, or a combiner whose spare
    /// room is promised to missing ingredients, refuses the item and hands it
    /// back to the caller.
    pub fn add_input(&mut self, item: WorkItem) -> Result<(), WorkItem> {
        let committed = self.committed_slots(self.input.iter().chain(std::iter::once(&item)));
        if committed > self.capacity {
            return Err(item);
        }
        self.input.push_back(item);
        Ok(())
    }

    /// Whether `item` would be accepted once every `inbound` item already on
    /// its way here has been delivered.
    pub fn admits(&self, item: &WorkItem, inbound: &[&WorkItem]) -> bool {
        let items = self
            .input
            .iter()
            .chain(inbound.iter().copied())
            .chain(std::iter::once(item));
        self.committed_slots(items) <= self.capacity
    }

    /// Input slots `items` tie up. Each partial ingredient set a combiner
    /// holds counts at full size, so a buffer at capacity always contains a
    /// complete set and can never wedge on duplicates.
    fn committed_slots<'a>(&self, items: impl Iterator<Item = &'a WorkItem>) -> usize {
        let mut loose = 0;
        let mut counts: BTreeMap<(RecipeId, ItemKind), usize> = BTreeMap::new();
        for item in items {
            if self.combine_rule(item).is_some() {
                *counts.entry((item.recipe, item.kind)).or_default() += 1;
            } else {
                loose += 1;
            }
        }
        let mut depth: BTreeMap<RecipeId, usize> = BTreeMap::new();
        for ((recipe, _), n) in counts {
            let d = depth.entry(recipe).or_default();
            *d = (*d).max(n);
        }
        let sets: usize = depth
            .into_iter()
            .map(|(recipe, sets)| sets * self.set_size(recipe))
            .sum();
        loose + sets
    }

    fn set_size(&self, recipe: RecipeId) -> usize {
        self.recipes
            .iter()
            .find(|r| r.id == recipe)
            .map_or(1, |r| r.ingredients.len())
    }

    /// The recipe this station merges `item` under, if it is a combiner and
    /// `item` is one of that recipe's ingredients.
    fn combine_rule(&self, item: &WorkItem) -> Option<&Recipe> {
        let ty = self.station_type();
        if !ty.is_combiner() {
            return None;
        }
        self.recipes.iter().find(|r| {
            r.id == item.recipe && r.combiner_stage() == Some(ty) && r.is_ingredient(item.kind)
        })
    }

    /// Remove the oldest output item.
    pub fn take_output(&mut self) -> Option<WorkItem> {
        self.take_output_at(0)
    }

    /// Remove the output item at `index`, letting transport reach past an
    /// item nobody downstream can take yet.
    pub fn take_output_at(&mut self, index: usize) -> Option<WorkItem> {
        let item = self.output.remove(index)?;
        if self.status == StationStatus::WaitingPickup {
            self.settle();
        }
        Some(item)
    }

    /// An item waiting in the input buffer.
    pub(crate) fn input_item_mut(&mut self, id: ItemId) -> Option<&mut WorkItem> {
        self.input.iter_mut().find(|item| item.id == id)
    }

    /// Peek the oldest output item.
    pub fn front_output(&self) -> Option<&WorkItem> {
        self.output.front()
    }

    /// Put an item back at the head of the output buffer. Used when a
    /// downstream transfer fails after the item was taken.
    pub fn restore_output(&mut self, item: WorkItem) {
        self.output.push_front(item);
        if self.status == StationStatus::Idle {
            self.status = StationStatus::WaitingPickup;
        }
    }

    /// Recompute the resting status from buffer occupancy.
    fn settle(&mut self) {
        self.progress = 0;
        self.status = if self.output.is_empty() {
            StationStatus::Idle
        } else {
            StationStatus::WaitingPickup
        };
    }

    /// Only input is bounded: a station keeps working while finished items
    /// wait for a destination, so nothing queued behind them is stranded.
    fn can_start(&self) -> bool {
        matches!(self.status, StationStatus::Idle | StationStatus::WaitingPickup)
            && !self.input.is_empty()
    }

    /// Advance one tick.
    pub fn process(&mut self, ids: &mut ItemIdAllocator) -> StationOutcome {
        let mut outcome = StationOutcome::default();
        if self.status.is_faulted() {
            return outcome;
        }

        if self.can_start() {
            // Routed items carry their own recipe's stage time.
            if let Some(ticks) = self.input.front().map(|i| i.time_remaining).filter(|t| *t > 0) {
                self.processing_time = ticks;
            }
            self.status = StationStatus::Busy;
            self.progress = 0;
            outcome.started = true;
        }

        if self.status == StationStatus::Busy {
            self.progress = (self.progress + 1).min(self.processing_time.max(1));
            if self.progress >= self.processing_time {
                self.complete(ids, &mut outcome);
            }
        }
        outcome
    }

    fn complete(&mut self, ids: &mut ItemIdAllocator, outcome: &mut StationOutcome) {
        match self.kind.station_type() {
            StationType::Cooker | StationType::Plater => self.complete_combiner(ids, outcome),
            StationType::Cutter => self.complete_cut(outcome),
            StationType::Sealer => self.complete_seal(outcome),
            StationType::Inspector => self.complete_inspection(outcome),
            StationType::Storage | StationType::FinalStorage | StationType::Washer => {
                self.complete_default(outcome)
            }
        }
        if !outcome.held && self.status == StationStatus::Busy {
            self.settle();
        }
    }

    fn finish(&mut self, item: WorkItem, outcome: &mut StationOutcome) {
        outcome.completed = Some(item.id);
        self.output.push_back(item);
    }

    fn complete_default(&mut self, outcome: &mut StationOutcome) {
        if let Some(mut item) = self.input.pop_front() {
            item.degrade(Fixed64::ONE - self.wear_level * f64_to_fixed64(WEAR_PENALTY));
            self.finish(item, outcome);
        }
    }

    fn complete_cut(&mut self, outcome: &mut StationOutcome) {
        let Some(mut item) = self.input.pop_front() else {
            return;
        };
        let StationKind::Cutter { blade_wear } = &mut self.kind else {
            return;
        };
        item.degrade(Fixed64::ONE - *blade_wear * f64_to_fixed64(BLADE_WEAR_PENALTY));
        *blade_wear = (*blade_wear + f64_to_fixed64(BLADE_WEAR_STEP)).min(Fixed64::ONE);
        let worn_out = *blade_wear >= Fixed64::ONE;
        self.finish(item, outcome);
        if worn_out {
            debug!(station = %self.name(), "blade worn out");
            self.progress = 0;
            self.status = StationStatus::Down;
            outcome.went_down = true;
        }
    }

    fn complete_seal(&mut self, outcome: &mut StationOutcome) {
        let Some(mut item) = self.input.pop_front() else {
            return;
        };
        if let StationKind::Sealer {
            pressure,
            optimal_pressure,
        } = self.kind
        {
            item.degrade(closeness_factor(
                pressure,
                optimal_pressure,
                f64_to_fixed64(PRESSURE_TOLERANCE),
                f64_to_fixed64(PRESSURE_FLOOR),
            ));
        }
        item.sealed = true;
        self.finish(item, outcome);
    }

    fn complete_inspection(&mut self, outcome: &mut StationOutcome) {
        let Some(mut item) = self.input.pop_front() else {
            return;
        };
        let recipe_threshold = self
            .recipes
            .iter()
            .find(|r| r.id == item.recipe)
            .map(|r| r.quality_threshold);
        let StationKind::Inspector {
            quality_threshold,
            rejected_count,
        } = &mut self.kind
        else {
            return;
        };
        if item.quality < recipe_threshold.unwrap_or(*quality_threshold) {
            item.is_defective = true;
            *rejected_count += 1;
            debug!(item = item.id.0, quality = %item.quality, "inspection rejected item");
            outcome.rejected = Some(item);
        } else {
            self.finish(item, outcome);
        }
    }

    /// Combine a full ingredient set, else pass a non-ingredient through,
    /// else hold. Sets are tried in order of their oldest waiting unit.
    fn complete_combiner(&mut self, ids: &mut ItemIdAllocator, outcome: &mut StationOutcome) {
        if self.input.is_empty() {
            return;
        }
        let factor = self.kind.environment_factor();

        let ready = self
            .input
            .iter()
            .filter_map(|item| self.combine_rule(item))
            .find(|recipe| self.has_full_set(recipe))
            .map(|recipe| (recipe.id, recipe.output, recipe.ingredients.clone()));
        if let Some((recipe, output, ingredients)) = ready {
            self.combine(recipe, output, &ingredients, factor, ids, outcome);
            return;
        }

        let loose = self
            .input
            .iter()
            .position(|item| self.combine_rule(item).is_none());
        if let Some(mut item) = loose.and_then(|pos| self.input.remove(pos)) {
            item.degrade(factor);
            self.finish(item, outcome);
            return;
        }
        outcome.held = true;
    }

    fn has_full_set(&self, recipe: &Recipe) -> bool {
        recipe.ingredients.iter().all(|kind| {
            self.input
                .iter()
                .any(|item| item.recipe == recipe.id && item.kind == *kind)
        })
    }

    fn combine(
        &mut self,
        recipe: RecipeId,
        output: ItemKind,
        ingredients: &BTreeSet<ItemKind>,
        factor: Fixed64,
        ids: &mut ItemIdAllocator,
        outcome: &mut StationOutcome,
    ) {
        let mut consumed = Vec::with_capacity(ingredients.len());
        let mut quality_sum = Fixed64::ZERO;
        let mut step = 0;
        for kind in ingredients {
            let pos = self
                .input
                .iter()
                .position(|item| item.recipe == recipe && item.kind == *kind);
            if let Some(item) = pos.and_then(|pos| self.input.remove(pos)) {
                quality_sum += item.quality;
                step = step.max(item.current_step);
                consumed.push(item.id);
            }
        }
        let count = Fixed64::from_num(consumed.len().max(1) as i32);
        let mut product = WorkItem::new(output, ids.allocate(), recipe, self.line);
        product.current_step = step;
        product.quality = crate::fixed::clamp_unit(quality_sum / count * factor);
        debug!(
            station = %self.name(),
            product = product.id.0,
            consumed = consumed.len(),
            "ingredients combined"
        );
        outcome.combined = Some(Combination {
            product: product.id,
            consumed,
        });
        self.finish(product, outcome);
    }

    /// Bernoulli malfunction draw from the environment generator.
    pub fn check_malfunction(&mut self, rng: &mut SimRng) -> bool {
        if self.status.is_faulted() {
            return false;
        }
        if rng.chance(self.malfunction_probability) {
            self.status = StationStatus::Error;
            self.progress = 0;
            return true;
        }
        false
    }

    /// Full maintenance: clears wear, failure probability and any fault.
    pub fn maintain(&mut self) {
        self.wear_level = Fixed64::ZERO;
        self.malfunction_probability = Fixed64::ZERO;
        if let StationKind::Cutter { blade_wear } = &mut self.kind {
            *blade_wear = Fixed64::ZERO;
        }
        self.settle();
    }

    /// Field repair: clears a fault and relieves some wear.
    pub fn repair(&mut self) {
        self.wear_level =
            (self.wear_level - f64_to_fixed64(REPAIR_WEAR_RELIEF)).max(Fixed64::ZERO);
        if self.status.is_faulted() {
            self.settle();
        }
    }

    /// Cutter only. Returns `false` for every other kind.
    pub fn replace_blade(&mut self) -> bool {
        let StationKind::Cutter { blade_wear } = &mut self.kind else {
            return false;
        };
        *blade_wear = Fixed64::ZERO;
        self.wear_level = Fixed64::ZERO;
        if self.status == StationStatus::Down {
            self.settle();
        }
        true
    }

    /// Force a fault. Used by tests and fault-injection scenarios.
    pub fn raise_error(&mut self) {
        self.status = StationStatus::Error;
        self.progress = 0;
    }
}
