//! Robot tasks and the bounded priority-ordered task queue.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::grid::GridPos;
use crate::id::StationId;
use crate::item::WorkItem;

/// Maximum number of queued (not yet current) tasks per robot.
pub const TASK_QUEUE_CAPACITY: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskKind {
    Move {
        target: GridPos,
    },
    /// Walk to `target` and load `item`. The item was reserved out of
    /// `station`'s output buffer when the task was created.
    Pick {
        station: StationId,
        target: GridPos,
        item: WorkItem,
    },
    /// Walk to `target` and unload cargo into `station`'s input buffer.
    Drop {
        station: StationId,
        target: GridPos,
    },
    /// Arm only: run the assigned station once.
    Operate {
        station: StationId,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Move { .. } => "move",
            TaskKind::Pick { .. } => "pick",
            TaskKind::Drop { .. } => "drop",
            TaskKind::Operate { .. } => "operate",
        }
    }

    pub fn target(&self) -> Option<GridPos> {
        match self {
            TaskKind::Move { target }
            | TaskKind::Pick { target, .. }
            | TaskKind::Drop { target, .. } => Some(*target),
            TaskKind::Operate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    /// Higher runs earlier. Only affects insertion order.
    pub priority: u8,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self { kind, priority: 0 }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Item reserved by this task, if any.
    pub fn reserved_item(&self) -> Option<&WorkItem> {
        match &self.kind {
            TaskKind::Pick { item, .. } => Some(item),
            _ => None,
        }
    }
}

/// Bounded FIFO of tasks. A new task is inserted ahead of any queued task
/// with strictly lower priority; equal priorities keep arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the task back when the queue is full.
    pub fn push(&mut self, task: Task) -> Result<(), Task> {
        if self.tasks.len() >= TASK_QUEUE_CAPACITY {
            return Err(task);
        }
        let at = self
            .tasks
            .iter()
            .position(|queued| queued.priority < task.priority)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(at, task);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn free_slots(&self) -> usize {
        TASK_QUEUE_CAPACITY - self.tasks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Remove every queued task.
    pub fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(col: i32) -> Task {
        Task::new(TaskKind::Move {
            target: GridPos::new(0, col),
        })
    }

    #[test]
    fn queue_is_fifo_for_equal_priority() {
        let mut q = TaskQueue::new();
        q.push(mv(1)).unwrap();
        q.push(mv(2)).unwrap();
        assert_eq!(q.pop(), Some(mv(1)));
        assert_eq!(q.pop(), Some(mv(2)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn higher_priority_jumps_ahead() {
        let mut q = TaskQueue::new();
        q.push(mv(1)).unwrap();
        q.push(mv(2).with_priority(1)).unwrap();
        q.push(mv(3).with_priority(1)).unwrap();
        q.push(mv(4)).unwrap();
        let order: Vec<_> = q.iter().map(|t| t.kind.target().unwrap().col).collect();
        assert_eq!(order, vec![2, 3, 1, 4]);
    }

    #[test]
    fn queue_refuses_beyond_capacity() {
        let mut q = TaskQueue::new();
        for i in 0..TASK_QUEUE_CAPACITY {
            assert!(q.push(mv(i as i32)).is_ok());
        }
        assert_eq!(q.free_slots(), 0);
        assert_eq!(q.push(mv(99)), Err(mv(99)));
        assert_eq!(q.len(), TASK_QUEUE_CAPACITY);
    }

    #[test]
    fn drain_empties_queue() {
        let mut q = TaskQueue::new();
        q.push(mv(1)).unwrap();
        q.push(mv(2)).unwrap();
        assert_eq!(q.drain().len(), 2);
        assert!(q.is_empty());
    }
}
