//! Floor plan construction: where every station and robot starts.
//!
//! Each line occupies an 8-row band holding one station of every type any
//! catalog recipe visits, so every recipe can run on every line. Stations
//! sit on the band's station row in stage order, arms sit directly above
//! their station, and logistics robots start along the service row below.
//! The second cutter of a line sits two rows under the first so both can be
//! reached from the service rows.

use std::collections::BTreeMap;

use crate::config::FactoryConfig;
use crate::dispatch::Segment;
use crate::grid::{GridPos, GridSize};
use crate::id::{RobotId, StationId};
use crate::recipe::{Recipe, RecipeBook};
use crate::robot::Robot;
use crate::station::{Station, StationKind, StationType};

const BAND_ROWS: i32 = 8;
const FLOOR_COLS: i32 = 30;
/// Parallel cutters per line.
const CUTTERS_PER_LINE: u32 = 2;

fn station_column(ty: StationType) -> i32 {
    match ty {
        StationType::Storage => 1,
        StationType::Washer => 4,
        StationType::Cutter => 7,
        StationType::Cooker => 10,
        StationType::Plater => 13,
        StationType::Sealer => 16,
        StationType::Inspector => 19,
        StationType::FinalStorage => 22,
    }
}

fn station_row(line: u32) -> i32 {
    BAND_ROWS * line as i32 + 2
}

fn copies(ty: StationType) -> u32 {
    if ty == StationType::Cutter {
        CUTTERS_PER_LINE
    } else {
        1
    }
}

/// Stations and robots for a fresh factory.
#[derive(Debug, Clone)]
pub struct FloorPlan {
    pub size: GridSize,
    pub stations: Vec<Station>,
    pub robots: Vec<Robot>,
}

/// Recipes in planning order: the default first, then the catalog.
fn planning_order<'a>(recipes: &'a RecipeBook, default: &'a Recipe) -> Vec<&'a Recipe> {
    std::iter::once(default)
        .chain(recipes.iter().filter(|r| r.id != default.id))
        .collect()
}

/// Every stage type some recipe visits, in floor order.
fn stage_types(order: &[&Recipe]) -> Vec<StationType> {
    let mut types: Vec<StationType> = order
        .iter()
        .flat_map(|r| r.workflow.iter().copied())
        .collect();
    types.sort_by_key(|ty| station_column(*ty));
    types.dedup();
    types
}

/// Distinct consecutive stage pairs, in order of first appearance.
fn segments(order: &[&Recipe]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    for recipe in order {
        for pair in recipe.workflow.windows(2) {
            let segment = Segment::new(pair[0], pair[1]);
            if !out.contains(&segment) {
                out.push(segment);
            }
        }
    }
    out
}

pub fn build_floor(config: &FactoryConfig, recipes: &RecipeBook, default: &Recipe) -> FloorPlan {
    let order = planning_order(recipes, default);
    let types = stage_types(&order);
    let segments = segments(&order);
    let mut stations: Vec<Station> = Vec::new();
    let mut robots: Vec<Robot> = Vec::new();
    let mut arm_ordinal = 0;
    let mut logistics_ordinal = 0;

    for line in 0..config.num_lines {
        let row = station_row(line);

        let mut stage_stations: Vec<(StationType, Vec<StationId>)> = Vec::new();
        for ty in &types {
            // Baseline time from the first recipe that visits this stage;
            // routed items bring their own.
            let time = order
                .iter()
                .find(|r| r.workflow.contains(ty))
                .map_or_else(|| ty.default_processing_time(), |r| r.stage_time(*ty));
            let rules: Vec<Recipe> = if ty.is_combiner() {
                order
                    .iter()
                    .filter(|r| r.combiner_stage() == Some(*ty))
                    .map(|r| (*r).clone())
                    .collect()
            } else if *ty == StationType::Inspector {
                order.iter().map(|r| (*r).clone()).collect()
            } else {
                Vec::new()
            };
            let mut ids = Vec::new();
            for ordinal in 0..copies(*ty) {
                let id = StationId(stations.len() as u32);
                let position = GridPos::new(row + 2 * ordinal as i32, station_column(*ty));
                let capacity = if ty.is_storage() {
                    config.storage_capacity
                } else {
                    config.station_capacity
                };
                let mut station = Station::new(
                    id,
                    StationKind::new(*ty, default.quality_threshold),
                    line,
                    ordinal,
                    position,
                    capacity,
                );
                station.processing_time = time;
                station.recipes = rules.clone();
                stations.push(station);
                ids.push(id);
            }
            stage_stations.push((*ty, ids));
        }

        // One arm per processing station, on the cell above it.
        for (ty, ids) in &stage_stations {
            if ty.is_storage() {
                continue;
            }
            for id in ids {
                let at = stations[id.index()].position;
                let arm_pos = if stations[id.index()].ordinal == 0 {
                    GridPos::new(at.row - 1, at.col)
                } else {
                    GridPos::new(at.row, at.col + 1)
                };
                robots.push(Robot::arm(
                    RobotId(robots.len() as u32),
                    arm_ordinal,
                    line,
                    arm_pos,
                    *id,
                ));
                arm_ordinal += 1;
            }
        }

        // Logistics robots: one per station on the wider side of each
        // segment, parked right of the segment's source column.
        let mut parked: BTreeMap<StationType, i32> = BTreeMap::new();
        for segment in &segments {
            let count = copies(segment.source).max(copies(segment.destination));
            let used = parked.entry(segment.source).or_default();
            for _ in 0..count {
                robots.push(Robot::logistics(
                    RobotId(robots.len() as u32),
                    logistics_ordinal,
                    line,
                    GridPos::new(row + 1, station_column(segment.source) + 1 + *used),
                    Some(*segment),
                    true,
                ));
                *used += 1;
                logistics_ordinal += 1;
            }
        }

        // Reserve robots park on the band's bottom row.
        for i in 0..config.reserve_robots_per_line {
            robots.push(Robot::logistics(
                RobotId(robots.len() as u32),
                logistics_ordinal,
                line,
                GridPos::new(row + 4, 1 + i as i32),
                None,
                false,
            ));
            logistics_ordinal += 1;
        }
    }

    FloorPlan {
        size: GridSize {
            rows: BAND_ROWS * config.num_lines as i32,
            cols: FLOOR_COLS,
        },
        stations,
        robots,
    }
}
