//! Fixed arms and mobile logistics robots.
//!
//! Both roles share the task state machine: a robot holds at most one
//! current task, pops the next one only when the current one finishes, and
//! never preempts. Robots refer to stations by [`StationId`] and resolve
//! them through the station slice passed to [`Robot::step`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::Segment;
use crate::grid::GridPos;
use crate::id::{ItemId, RobotId, StationId};
use crate::item::{ItemIdAllocator, WorkItem};
use crate::station::{Station, StationOutcome};
use crate::task::{Task, TaskKind, TaskQueue};

/// Ticks an arm spends on one `operate` task before triggering its station.
pub const ARM_OPERATION_TIME: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobotStatus {
    Idle,
    Moving,
    Operating,
    Error,
}

impl RobotStatus {
    pub fn name(self) -> &'static str {
        match self {
            RobotStatus::Idle => "Idle",
            RobotStatus::Moving => "Moving",
            RobotStatus::Operating => "Operating",
            RobotStatus::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotRole {
    Arm {
        station: StationId,
        operation_remaining: u32,
    },
    Logistics {
        carrying: Option<WorkItem>,
        segment: Option<Segment>,
        /// Reserve robots are never dispatched automatically.
        is_active: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotCounters {
    pub total_moves: u64,
    pub total_tasks_completed: u64,
    pub idle_steps: u64,
    pub error_count: u64,
}

/// What one robot tick did.
#[derive(Debug, Default)]
pub struct RobotStepResult {
    /// Station an arm ran this tick and what it produced.
    pub operated: Option<(StationId, StationOutcome)>,
    pub picked: Option<ItemId>,
    pub delivered: Option<(ItemId, StationId)>,
    pub moved: bool,
    pub task_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    pub id: RobotId,
    /// Index among robots of the same role, used in the public name.
    pub ordinal: u32,
    pub line: u32,
    pub position: GridPos,
    status: RobotStatus,
    queue: TaskQueue,
    current_task: Option<Task>,
    pub counters: RobotCounters,
    pub role: RobotRole,
}

impl Robot {
    pub fn arm(id: RobotId, ordinal: u32, line: u32, position: GridPos, station: StationId) -> Self {
        Self::with_role(
            id,
            ordinal,
            line,
            position,
            RobotRole::Arm {
                station,
                operation_remaining: 0,
            },
        )
    }

    pub fn logistics(
        id: RobotId,
        ordinal: u32,
        line: u32,
        position: GridPos,
        segment: Option<Segment>,
        is_active: bool,
    ) -> Self {
        Self::with_role(
            id,
            ordinal,
            line,
            position,
            RobotRole::Logistics {
                carrying: None,
                segment,
                is_active,
            },
        )
    }

    fn with_role(id: RobotId, ordinal: u32, line: u32, position: GridPos, role: RobotRole) -> Self {
        Self {
            id,
            ordinal,
            line,
            position,
            status: RobotStatus::Idle,
            queue: TaskQueue::new(),
            current_task: None,
            counters: RobotCounters::default(),
            role,
        }
    }

    /// `arm_3`, `logistics_0`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.kind_name(), self.ordinal)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.role {
            RobotRole::Arm { .. } => "arm",
            RobotRole::Logistics { .. } => "logistics",
        }
    }

    pub fn is_arm(&self) -> bool {
        matches!(self.role, RobotRole::Arm { .. })
    }

    pub fn is_logistics(&self) -> bool {
        matches!(self.role, RobotRole::Logistics { .. })
    }

    pub fn status(&self) -> RobotStatus {
        self.status
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Idle, no current task, nothing queued.
    pub fn is_idle(&self) -> bool {
        self.status == RobotStatus::Idle && self.current_task.is_none() && self.queue.is_empty()
    }

    pub fn carrying(&self) -> Option<&WorkItem> {
        match &self.role {
            RobotRole::Logistics { carrying, .. } => carrying.as_ref(),
            RobotRole::Arm { .. } => None,
        }
    }

    pub fn assigned_station(&self) -> Option<StationId> {
        match self.role {
            RobotRole::Arm { station, .. } => Some(station),
            RobotRole::Logistics { .. } => None,
        }
    }

    pub fn segment(&self) -> Option<Segment> {
        match self.role {
            RobotRole::Logistics { segment, .. } => segment,
            RobotRole::Arm { .. } => None,
        }
    }

    /// Active logistics robots take part in automatic dispatch.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self.role, RobotRole::Logistics { is_active: true, .. })
    }

    /// Items this robot holds: cargo plus items reserved by pick tasks.
    pub fn held_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.carrying()
            .into_iter()
            .chain(self.current_task.iter().filter_map(Task::reserved_item))
            .chain(self.queue.iter().filter_map(Task::reserved_item))
    }

    /// Items on their way to a station: cargo or a reserved pick, paired
    /// with the drop that follows it.
    pub fn deliveries(&self) -> Vec<(StationId, &WorkItem)> {
        let mut pending = self.carrying();
        let mut out = Vec::new();
        for task in self.current_task.iter().chain(self.queue.iter()) {
            match &task.kind {
                TaskKind::Pick { item, .. } => pending = Some(item),
                TaskKind::Drop { station, .. } => {
                    if let Some(item) = pending.take() {
                        out.push((*station, item));
                    }
                }
                TaskKind::Move { .. } | TaskKind::Operate { .. } => {}
            }
        }
        out
    }

    /// Queue a task. A full queue hands it back.
    pub fn add_to_queue(&mut self, task: Task) -> Result<(), Task> {
        self.queue.push(task)
    }

    /// Drop the current and every queued task. Returns the tasks so the
    /// caller can hand reserved items back to their stations.
    pub fn clear_tasks(&mut self) -> Vec<Task> {
        let mut dropped: Vec<Task> = self.current_task.take().into_iter().collect();
        dropped.extend(self.queue.drain());
        if let RobotRole::Arm {
            operation_remaining,
            ..
        } = &mut self.role
        {
            *operation_remaining = 0;
        }
        if self.status != RobotStatus::Error {
            self.status = RobotStatus::Idle;
        }
        dropped
    }

    pub fn raise_error(&mut self) {
        if self.status != RobotStatus::Error {
            self.status = RobotStatus::Error;
            self.counters.error_count += 1;
        }
    }

    pub fn reset_error(&mut self) {
        if self.status == RobotStatus::Error {
            self.status = if self.current_task.is_some() {
                RobotStatus::Operating
            } else {
                RobotStatus::Idle
            };
        }
    }

    /// Advance one tick.
    pub fn step(&mut self, stations: &mut [Station], ids: &mut ItemIdAllocator) -> RobotStepResult {
        let mut result = RobotStepResult::default();
        if self.status == RobotStatus::Error {
            return result;
        }

        if self.current_task.is_none() {
            match self.queue.pop() {
                Some(task) => self.begin(task),
                None => {
                    self.status = RobotStatus::Idle;
                    self.counters.idle_steps += 1;
                    return result;
                }
            }
        }

        let Some(task) = self.current_task.take() else {
            return result;
        };
        match self.advance(task, stations, ids, &mut result) {
            Some(unfinished) => self.current_task = Some(unfinished),
            None => {
                self.counters.total_tasks_completed += 1;
                result.task_completed = true;
                self.status = RobotStatus::Idle;
            }
        }
        result
    }

    fn begin(&mut self, task: Task) {
        self.status = match task.kind {
            TaskKind::Operate { .. } => {
                if let RobotRole::Arm {
                    operation_remaining,
                    ..
                } = &mut self.role
                {
                    *operation_remaining = ARM_OPERATION_TIME;
                }
                RobotStatus::Operating
            }
            _ => RobotStatus::Moving,
        };
        self.current_task = Some(task);
    }

    /// Take one cell toward `target`. Returns `true` once there.
    fn walk(&mut self, target: GridPos, result: &mut RobotStepResult) -> bool {
        if self.position != target {
            self.position = self.position.step_toward(target);
            self.counters.total_moves += 1;
            result.moved = true;
        }
        self.position == target
    }

    /// Run the current task for one tick. Returns it back if unfinished.
    fn advance(
        &mut self,
        task: Task,
        stations: &mut [Station],
        ids: &mut ItemIdAllocator,
        result: &mut RobotStepResult,
    ) -> Option<Task> {
        match task.kind {
            TaskKind::Move { target } => {
                self.status = RobotStatus::Moving;
                if self.walk(target, result) {
                    None
                } else {
                    Some(Task {
                        kind: TaskKind::Move { target },
                        priority: task.priority,
                    })
                }
            }
            TaskKind::Operate { station } => self.operate(station, task.priority, stations, ids, result),
            TaskKind::Pick {
                station,
                target,
                item,
            } => {
                if !self.walk(target, result) {
                    self.status = RobotStatus::Moving;
                    return Some(Task {
                        kind: TaskKind::Pick {
                            station,
                            target,
                            item,
                        },
                        priority: task.priority,
                    });
                }
                let RobotRole::Logistics { carrying, .. } = &mut self.role else {
                    return None;
                };
                if carrying.is_some() {
                    // Hands full: wait for a drop to be queued ahead.
                    self.status = RobotStatus::Operating;
                    return Some(Task {
                        kind: TaskKind::Pick {
                            station,
                            target,
                            item,
                        },
                        priority: task.priority,
                    });
                }
                result.picked = Some(item.id);
                *carrying = Some(item);
                None
            }
            TaskKind::Drop { station, target } => {
                if !self.walk(target, result) {
                    self.status = RobotStatus::Moving;
                    return Some(Task {
                        kind: TaskKind::Drop { station, target },
                        priority: task.priority,
                    });
                }
                let RobotRole::Logistics { carrying, .. } = &mut self.role else {
                    return None;
                };
                let Some(item) = carrying.take() else {
                    debug!(robot = self.ordinal, "drop with empty hands skipped");
                    return None;
                };
                let Some(dest) = stations.get_mut(station.index()) else {
                    *carrying = Some(item);
                    return None;
                };
                let item_id = item.id;
                match dest.add_input(item) {
                    Ok(()) => {
                        result.delivered = Some((item_id, station));
                        None
                    }
                    Err(item) => {
                        // Destination full: keep the cargo and retry.
                        *carrying = Some(item);
                        self.status = RobotStatus::Operating;
                        Some(Task {
                            kind: TaskKind::Drop { station, target },
                            priority: task.priority,
                        })
                    }
                }
            }
        }
    }

    fn operate(
        &mut self,
        station: StationId,
        priority: u8,
        stations: &mut [Station],
        ids: &mut ItemIdAllocator,
        result: &mut RobotStepResult,
    ) -> Option<Task> {
        let RobotRole::Arm {
            operation_remaining,
            ..
        } = &mut self.role
        else {
            return None;
        };
        self.status = RobotStatus::Operating;
        *operation_remaining = operation_remaining.saturating_sub(1);
        if *operation_remaining > 0 {
            return Some(Task {
                kind: TaskKind::Operate { station },
                priority,
            });
        }
        if let Some(target) = stations.get_mut(station.index()) {
            result.operated = Some((station, target.process(ids)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;
    use crate::station::StationType;
    use crate::test_utils::*;

    fn logistics_at(pos: GridPos) -> Robot {
        Robot::logistics(RobotId(0), 0, 0, pos, None, true)
    }

    #[test]
    fn names_follow_role() {
        let arm = Robot::arm(RobotId(4), 2, 0, GridPos::new(0, 0), StationId(1));
        assert_eq!(arm.name(), "arm_2");
        assert_eq!(logistics_at(GridPos::new(0, 0)).name(), "logistics_0");
    }

    #[test]
    fn idle_robot_counts_idle_steps() {
        let mut r = logistics_at(GridPos::new(0, 0));
        let mut ids = ItemIdAllocator::new();
        for _ in 0..3 {
            r.step(&mut [], &mut ids);
        }
        assert_eq!(r.counters.idle_steps, 3);
        assert!(r.is_idle());
    }

    #[test]
    fn move_resolves_rows_then_columns() {
        let mut r = logistics_at(GridPos::new(0, 0));
        let mut ids = ItemIdAllocator::new();
        r.add_to_queue(Task::new(TaskKind::Move {
            target: GridPos::new(1, 2),
        }))
        .unwrap();
        r.step(&mut [], &mut ids);
        assert_eq!(r.position, GridPos::new(1, 0));
        assert_eq!(r.status(), RobotStatus::Moving);
        r.step(&mut [], &mut ids);
        let last = r.step(&mut [], &mut ids);
        assert_eq!(r.position, GridPos::new(1, 2));
        assert!(last.task_completed);
        assert_eq!(r.counters.total_moves, 3);
        assert_eq!(r.counters.total_tasks_completed, 1);
        assert_eq!(r.status(), RobotStatus::Idle);
    }

    #[test]
    fn pick_then_drop_delivers() {
        let mut stations = vec![make_station(StationType::Washer, 5)];
        let mut ids = ItemIdAllocator::new();
        let item = make_item(&mut ids, ItemKind::Tomato);
        let mut r = logistics_at(GridPos::new(1, 0));
        r.add_to_queue(Task::new(TaskKind::Pick {
            station: StationId(0),
            target: GridPos::new(1, 0),
            item: item.clone(),
        }))
        .unwrap();
        r.add_to_queue(Task::new(TaskKind::Drop {
            station: StationId(0),
            target: GridPos::new(1, 1),
        }))
        .unwrap();
        assert_eq!(r.held_items().count(), 1);

        let picked = r.step(&mut stations, &mut ids);
        assert_eq!(picked.picked, Some(item.id));
        assert_eq!(r.carrying(), Some(&item));

        let walked = r.step(&mut stations, &mut ids);
        assert_eq!(walked.delivered, Some((item.id, StationId(0))));
        assert_eq!(r.carrying(), None);
        assert_eq!(stations[0].input().len(), 1);
        assert_eq!(r.held_items().count(), 0);
    }

    #[test]
    fn deliveries_pair_items_with_their_drops() {
        let mut stations = vec![make_station(StationType::Washer, 5)];
        let mut ids = ItemIdAllocator::new();
        let item = make_item(&mut ids, ItemKind::Tomato);
        let mut r = logistics_at(GridPos::new(1, 0));
        r.add_to_queue(Task::new(TaskKind::Pick {
            station: StationId(0),
            target: GridPos::new(1, 0),
            item: item.clone(),
        }))
        .unwrap();
        r.add_to_queue(Task::new(TaskKind::Drop {
            station: StationId(3),
            target: GridPos::new(1, 4),
        }))
        .unwrap();
        assert_eq!(r.deliveries(), vec![(StationId(3), &item)]);

        // Still inbound while carried.
        r.step(&mut stations, &mut ids);
        assert_eq!(r.deliveries(), vec![(StationId(3), &item)]);
        assert!(logistics_at(GridPos::new(0, 0)).deliveries().is_empty());
    }

    #[test]
    fn drop_into_full_buffer_retries() {
        let mut stations = vec![make_station(StationType::Washer, 1)];
        let mut ids = ItemIdAllocator::new();
        stations[0].add_input(make_item(&mut ids, ItemKind::Onion)).unwrap();
        let mut r = logistics_at(GridPos::new(0, 0));
        if let RobotRole::Logistics { carrying, .. } = &mut r.role {
            *carrying = Some(make_item(&mut ids, ItemKind::Tomato));
        }
        r.add_to_queue(Task::new(TaskKind::Drop {
            station: StationId(0),
            target: GridPos::new(0, 0),
        }))
        .unwrap();

        let blocked = r.step(&mut stations, &mut ids);
        assert!(blocked.delivered.is_none());
        assert_eq!(r.status(), RobotStatus::Operating);
        assert!(r.carrying().is_some());

        stations[0].processing_time = 1;
        stations[0].process(&mut ids);
        let retried = r.step(&mut stations, &mut ids);
        assert!(retried.delivered.is_some());
        assert!(r.carrying().is_none());
        assert_eq!(stations[0].input().len(), 1);
    }

    #[test]
    fn arm_operates_after_fixed_duration() {
        let mut stations = vec![make_station(StationType::Washer, 5)];
        stations[0].processing_time = 1;
        let mut ids = ItemIdAllocator::new();
        stations[0].add_input(make_item(&mut ids, ItemKind::Tomato)).unwrap();
        let mut arm = Robot::arm(RobotId(0), 0, 0, GridPos::new(0, 0), StationId(0));
        arm.add_to_queue(Task::new(TaskKind::Operate {
            station: StationId(0),
        }))
        .unwrap();

        let first = arm.step(&mut stations, &mut ids);
        assert!(first.operated.is_none());
        assert_eq!(arm.status(), RobotStatus::Operating);

        let second = arm.step(&mut stations, &mut ids);
        let (station, outcome) = second.operated.expect("operated");
        assert_eq!(station, StationId(0));
        assert!(outcome.completed.is_some());
        assert!(second.task_completed);
        assert_eq!(arm.status(), RobotStatus::Idle);
    }

    #[test]
    fn error_robot_does_nothing_until_reset() {
        let mut r = logistics_at(GridPos::new(0, 0));
        let mut ids = ItemIdAllocator::new();
        r.add_to_queue(Task::new(TaskKind::Move {
            target: GridPos::new(0, 3),
        }))
        .unwrap();
        r.raise_error();
        r.step(&mut [], &mut ids);
        assert_eq!(r.position, GridPos::new(0, 0));
        assert_eq!(r.counters.error_count, 1);
        r.reset_error();
        r.step(&mut [], &mut ids);
        assert_eq!(r.position, GridPos::new(0, 1));
    }

    #[test]
    fn clear_tasks_returns_reserved_items() {
        let mut ids = ItemIdAllocator::new();
        let mut r = logistics_at(GridPos::new(0, 0));
        r.add_to_queue(Task::new(TaskKind::Pick {
            station: StationId(0),
            target: GridPos::new(0, 5),
            item: make_item(&mut ids, ItemKind::Rice),
        }))
        .unwrap();
        let dropped = r.clear_tasks();
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].reserved_item().is_some());
        assert!(r.is_idle());
    }
}
