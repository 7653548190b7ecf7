//! Read-only observation API.
//!
//! [`Observation`] is an owned snapshot of the factory for agents,
//! dashboards and renderers. Nothing in it borrows engine storage, and
//! every real value is converted to `f64` here, at the edge.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::Factory;
use crate::fixed::{Ticks, fixed64_to_f64};
use crate::grid::GridPos;
use crate::item::ItemKind;
use crate::robot::RobotStatus;
use crate::station::{StationStatus, StationType};

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationView {
    /// Public name, e.g. `Cutter_0_1`.
    pub name: String,
    pub kind: StationType,
    pub line: u32,
    pub position: GridPos,
    pub status: StationStatus,
    pub input_count: usize,
    pub output_count: usize,
    pub progress: u32,
    pub max_progress: u32,
    pub wear_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotView {
    /// Public id, e.g. `arm_3` or `logistics_0`.
    pub id: String,
    pub kind: String,
    pub position: GridPos,
    pub status: RobotStatus,
    pub has_task: bool,
    pub queue_size: usize,
    pub carrying: Option<ItemKind>,
    pub total_moves: u64,
    pub total_tasks: u64,
    pub idle_steps: u64,
}

/// Aggregate production metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub production: u64,
    pub in_progress: usize,
    pub rejected: u64,
    pub avg_lead_time: f64,
    pub station_idle_ratio: f64,
    pub robot_idle_ratio: f64,
    /// `rejected / (production + rejected)`, 0 before any outcome.
    pub defect_rate: f64,
    pub collision_count: u64,
}

/// One entry of the production schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub recipe: String,
    pub quantity: u32,
    pub released: u32,
    pub completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tick: Ticks,
    pub stations: Vec<StationView>,
    pub robots: Vec<RobotView>,
    pub kpis: Kpis,
    /// Production schedule in work order. Empty when none is configured.
    pub production_queue: Vec<OrderView>,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl Factory {
    pub fn observe(&self) -> Observation {
        let stations: Vec<StationView> = self
            .stations
            .iter()
            .map(|s| StationView {
                name: s.name(),
                kind: s.station_type(),
                line: s.line,
                position: s.position,
                status: s.status(),
                input_count: s.input().len(),
                output_count: s.output().len(),
                progress: s.progress(),
                max_progress: s.processing_time,
                wear_level: fixed64_to_f64(s.wear_level),
            })
            .collect();

        let robots: Vec<RobotView> = self
            .robots
            .iter()
            .map(|r| RobotView {
                id: r.name(),
                kind: r.kind_name().to_string(),
                position: r.position,
                status: r.status(),
                has_task: r.current_task().is_some(),
                queue_size: r.queue().len(),
                carrying: r.carrying().map(|item| item.kind),
                total_moves: r.counters.total_moves,
                total_tasks: r.counters.total_tasks_completed,
                idle_steps: r.counters.idle_steps,
            })
            .collect();

        let counters = &self.counters;
        let idle_stations = stations
            .iter()
            .filter(|s| s.status == StationStatus::Idle)
            .count();
        let idle_robots = robots
            .iter()
            .filter(|r| r.status == RobotStatus::Idle)
            .count();
        let avg_lead_time = if counters.completed == 0 {
            0.0
        } else {
            counters.total_lead_time as f64 / counters.completed as f64
        };
        let outcomes = counters.completed + counters.rejected;
        let defect_rate = if outcomes == 0 {
            0.0
        } else {
            counters.rejected as f64 / outcomes as f64
        };

        let kpis = Kpis {
            production: counters.completed,
            in_progress: self.in_progress.len(),
            rejected: counters.rejected,
            avg_lead_time,
            station_idle_ratio: ratio(idle_stations, stations.len()),
            robot_idle_ratio: ratio(idle_robots, robots.len()),
            defect_rate,
            collision_count: counters.collisions,
        };

        let production_queue = self
            .orders
            .iter()
            .map(|o| OrderView {
                recipe: o.name.clone(),
                quantity: o.quantity,
                released: o.released,
                completed: o.completed,
            })
            .collect();

        Observation {
            tick: self.sim.tick,
            stations,
            robots,
            kpis,
            production_queue,
        }
    }
}

// ---------------------------------------------------------------------------
// Text summary
// ---------------------------------------------------------------------------

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "FACTORY STATE - tick {}", self.tick)?;
        writeln!(f, "{rule}")?;

        let k = &self.kpis;
        writeln!(f, "Production:")?;
        writeln!(f, "  In progress: {}", k.in_progress)?;
        writeln!(f, "  Completed:   {}", k.production)?;
        writeln!(f, "  Rejected:    {}", k.rejected)?;
        writeln!(f, "  Avg lead:    {:.1} ticks", k.avg_lead_time)?;
        writeln!(f, "  Collisions:  {}", k.collision_count)?;

        if !self.production_queue.is_empty() {
            writeln!(f, "Orders:")?;
            for o in &self.production_queue {
                writeln!(
                    f,
                    "  {:16} {:>3}/{:<3} done, {} released",
                    o.recipe, o.completed, o.quantity, o.released
                )?;
            }
        }

        writeln!(f, "Stations:")?;
        for s in &self.stations {
            writeln!(
                f,
                "  {:16} {:14} in:{:2} out:{:2} {:>3}/{:<3} wear {:.2}",
                s.name,
                s.status.name(),
                s.input_count,
                s.output_count,
                s.progress,
                s.max_progress,
                s.wear_level
            )?;
        }

        let (arms, logistics): (Vec<&RobotView>, Vec<&RobotView>) =
            self.robots.iter().partition(|r| r.kind == "arm");
        let idle = |rs: &[&RobotView]| rs.iter().filter(|r| r.status == RobotStatus::Idle).count();
        writeln!(f, "Robots:")?;
        writeln!(f, "  Arms:      {} ({} idle)", arms.len(), idle(&arms))?;
        writeln!(f, "  Logistics: {} ({} idle)", logistics.len(), idle(&logistics))?;
        write!(f, "{rule}")
    }
}
