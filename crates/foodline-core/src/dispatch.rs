//! Moving work-items between workflow stages.
//!
//! Three policies share the destination rule (least-loaded station of the
//! next stage type on the same line that admits the item, counting items
//! already inbound, first on ties). Any output item may move, not only the
//! front one, so an item no station can take yet never blocks the rest:
//!
//! - **Direct**: items jump straight from an output buffer to the next
//!   stage's input buffer, no robots involved.
//! - **Segmented**: each active logistics robot serves one fixed
//!   `(source, destination)` stage pair on its line.
//! - **Nearest**: each eligible source is served by the closest idle active
//!   logistics robot, regardless of segment.
//!
//! Robot policies reserve the item at assignment time by taking it out of
//! the source output buffer into the pick task. Segmented dispatch claims
//! each source at most once per tick.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::id::{ItemId, RobotId, StationId};
use crate::item::WorkItem;
use crate::recipe::RecipeBook;
use crate::robot::Robot;
use crate::station::{Station, StationType};
use crate::task::{Task, TaskKind};

/// A fixed `(source, destination)` stage pair served by one logistics robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub source: StationType,
    pub destination: StationType,
}

impl Segment {
    pub fn new(source: StationType, destination: StationType) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// A transport job handed to a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub robot: RobotId,
    pub source: StationId,
    pub destination: StationId,
    pub item: ItemId,
}

/// A direct buffer-to-buffer move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub source: StationId,
    pub destination: StationId,
    pub item: ItemId,
}

/// Workflow stage after the one currently holding `item`.
pub fn next_stage(item: &WorkItem, recipes: &RecipeBook) -> Option<(usize, StationType)> {
    recipes
        .get(item.recipe)
        .and_then(|recipe| recipe.next_stage(item.current_step))
}

/// Items robots are already carrying, or have reserved, for `station`.
pub fn inbound(robots: &[Robot], station: StationId) -> Vec<&WorkItem> {
    robots
        .iter()
        .flat_map(Robot::deliveries)
        .filter(|(to, _)| *to == station)
        .map(|(_, item)| item)
        .collect()
}

/// Least-loaded station of type `ty` on `line` that admits `item` once its
/// inbound deliveries land. Load counts inbound items too.
pub fn select_destination(
    stations: &[Station],
    robots: &[Robot],
    line: u32,
    ty: StationType,
    item: &WorkItem,
) -> Option<StationId> {
    let mut best: Option<(usize, StationId)> = None;
    for station in stations
        .iter()
        .filter(|s| s.line == line && s.station_type() == ty)
    {
        let incoming = inbound(robots, station.id);
        if !station.admits(item, &incoming) {
            continue;
        }
        let load = station.input().len() + incoming.len();
        if best.is_none_or(|(b, _)| load < b) {
            best = Some((load, station.id));
        }
    }
    best.map(|(_, id)| id)
}

/// Advance `item` to workflow stage `step`.
fn enter_stage(item: &mut WorkItem, step: usize, ty: StationType, recipes: &RecipeBook) {
    item.current_step = step;
    item.time_remaining = recipes
        .get(item.recipe)
        .map_or_else(|| ty.default_processing_time(), |r| r.stage_time(ty));
}

/// Re-align an item with the workflow stage of the station it was just
/// delivered to. Items delivered off-workflow keep their step.
pub fn align_to_station(item: &mut WorkItem, ty: StationType, recipes: &RecipeBook) {
    if let Some(step) = recipes.get(item.recipe).and_then(|r| r.stage_index(ty)) {
        enter_stage(item, step, ty, recipes);
    }
}

/// Where one output item goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Route {
    /// Position in the source output buffer.
    index: usize,
    step: usize,
    ty: StationType,
    destination: StationId,
}

/// First output item of `source` that some next-stage station admits,
/// optionally restricted to stage type `towards`. Final storage is a sink.
fn find_route(
    stations: &[Station],
    robots: &[Robot],
    source: usize,
    towards: Option<StationType>,
    recipes: &RecipeBook,
) -> Option<Route> {
    let station = &stations[source];
    if station.station_type() == StationType::FinalStorage {
        return None;
    }
    station.output().iter().enumerate().find_map(|(index, item)| {
        let (step, ty) = next_stage(item, recipes)?;
        if towards.is_some_and(|t| t != ty) {
            return None;
        }
        let destination = select_destination(stations, robots, station.line, ty, item)?;
        Some(Route {
            index,
            step,
            ty,
            destination,
        })
    })
}

/// Move every routable output item to its next stage on the same line.
pub fn route_direct(
    stations: &mut [Station],
    robots: &[Robot],
    recipes: &RecipeBook,
) -> Vec<Transfer> {
    let mut transfers = Vec::new();
    for source in 0..stations.len() {
        while let Some(route) = find_route(stations, robots, source, None, recipes) {
            let Some(mut item) = stations[source].take_output_at(route.index) else {
                break;
            };
            enter_stage(&mut item, route.step, route.ty, recipes);
            let item_id = item.id;
            if let Err(item) = stations[route.destination.index()].add_input(item) {
                stations[source].restore_output(item);
                break;
            }
            transfers.push(Transfer {
                source: stations[source].id,
                destination: route.destination,
                item: item_id,
            });
        }
    }
    transfers
}

/// Reserve the routed item and queue the pick/drop pair.
fn assign(
    robot: &mut Robot,
    stations: &mut [Station],
    source: StationId,
    route: Route,
    recipes: &RecipeBook,
) -> Option<Assignment> {
    if robot.queue().free_slots() < 2 {
        return None;
    }
    let destination = route.destination;
    let mut item = stations[source.index()].take_output_at(route.index)?;
    enter_stage(&mut item, route.step, route.ty, recipes);
    let item_id = item.id;
    let pick = Task::new(TaskKind::Pick {
        station: source,
        target: stations[source.index()].service_cell(),
        item,
    });
    let drop = Task::new(TaskKind::Drop {
        station: destination,
        target: stations[destination.index()].service_cell(),
    });
    // Two free slots were checked above.
    if let Err(pick) = robot.add_to_queue(pick) {
        if let TaskKind::Pick { item, .. } = pick.kind {
            stations[source.index()].restore_output(item);
        }
        return None;
    }
    if robot.add_to_queue(drop).is_err() {
        return None;
    }
    debug!(
        robot = %robot.name(),
        source = %stations[source.index()].name(),
        destination = %stations[destination.index()].name(),
        item = item_id.0,
        "transport assigned"
    );
    Some(Assignment {
        robot: robot.id,
        source,
        destination,
        item: item_id,
    })
}

fn available(robot: &Robot) -> bool {
    robot.is_dispatchable() && robot.is_idle() && robot.carrying().is_none()
}

/// Segment policy: every idle active robot looks for work on its own
/// stage pair and line.
pub fn dispatch_segmented(
    stations: &mut [Station],
    robots: &mut [Robot],
    recipes: &RecipeBook,
) -> Vec<Assignment> {
    let mut claimed: BTreeSet<StationId> = BTreeSet::new();
    let mut assignments = Vec::new();
    for r in 0..robots.len() {
        if !available(&robots[r]) {
            continue;
        }
        let Some(segment) = robots[r].segment() else {
            continue;
        };
        let line = robots[r].line;
        let found = stations
            .iter()
            .filter(|s| {
                s.line == line && s.station_type() == segment.source && !claimed.contains(&s.id)
            })
            .find_map(|s| {
                find_route(stations, robots, s.id.index(), Some(segment.destination), recipes)
                    .map(|route| (s.id, route))
            });
        let Some((source, route)) = found else {
            continue;
        };
        if let Some(a) = assign(&mut robots[r], stations, source, route, recipes) {
            claimed.insert(source);
            assignments.push(a);
        }
    }
    assignments
}

/// Nearest-robot policy: sources in station order, each served by the
/// closest idle active robot.
pub fn dispatch_nearest(
    stations: &mut [Station],
    robots: &mut [Robot],
    recipes: &RecipeBook,
) -> Vec<Assignment> {
    let mut assignments = Vec::new();
    for index in 0..stations.len() {
        let Some(route) = find_route(stations, robots, index, None, recipes) else {
            continue;
        };
        let source = stations[index].id;
        let origin = stations[index].service_cell();
        let mut nearest: Option<(u32, usize)> = None;
        for (i, robot) in robots.iter().enumerate().filter(|(_, r)| available(r)) {
            let d = robot.position.manhattan_distance(&origin);
            if nearest.is_none_or(|(best, _)| d < best) {
                nearest = Some((d, i));
            }
        }
        let Some((_, robot_index)) = nearest else {
            break;
        };
        if let Some(a) = assign(&mut robots[robot_index], stations, source, route, recipes) {
            assignments.push(a);
        }
    }
    assignments
}
