//! Typed simulation events recorded into a bounded ring buffer.
//!
//! The engine pushes events while it steps; callers read or drain them
//! between steps. When the buffer is full the oldest event is overwritten.
//! Suppressed kinds are never recorded.

use crate::fixed::Ticks;
use crate::id::{ItemId, RobotId, StationId};
use crate::item::ItemKind;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ItemSpawned {
        item: ItemId,
        kind: ItemKind,
        station: StationId,
        tick: Ticks,
    },
    StationStarted {
        station: StationId,
        tick: Ticks,
    },
    StationCompleted {
        station: StationId,
        item: ItemId,
        tick: Ticks,
    },
    IngredientsCombined {
        station: StationId,
        product: ItemId,
        consumed: u32,
        tick: Ticks,
    },
    ItemRejected {
        station: StationId,
        item: ItemId,
        tick: Ticks,
    },
    StationMalfunction {
        station: StationId,
        tick: Ticks,
    },
    StationMaintained {
        station: StationId,
        tick: Ticks,
    },
    TaskAssigned {
        robot: RobotId,
        task: &'static str,
        tick: Ticks,
    },
    ItemDelivered {
        robot: RobotId,
        item: ItemId,
        station: StationId,
        tick: Ticks,
    },
    ProductCompleted {
        item: ItemId,
        kind: ItemKind,
        lead_time: Ticks,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemSpawned,
    StationStarted,
    StationCompleted,
    IngredientsCombined,
    ItemRejected,
    StationMalfunction,
    StationMaintained,
    TaskAssigned,
    ItemDelivered,
    ProductCompleted,
}

const EVENT_KIND_COUNT: usize = 10;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ItemSpawned { .. } => EventKind::ItemSpawned,
            Event::StationStarted { .. } => EventKind::StationStarted,
            Event::StationCompleted { .. } => EventKind::StationCompleted,
            Event::IngredientsCombined { .. } => EventKind::IngredientsCombined,
            Event::ItemRejected { .. } => EventKind::ItemRejected,
            Event::StationMalfunction { .. } => EventKind::StationMalfunction,
            Event::StationMaintained { .. } => EventKind::StationMaintained,
            Event::TaskAssigned { .. } => EventKind::TaskAssigned,
            Event::ItemDelivered { .. } => EventKind::ItemDelivered,
            Event::ProductCompleted { .. } => EventKind::ProductCompleted,
        }
    }

    pub fn tick(&self) -> Ticks {
        match self {
            Event::ItemSpawned { tick, .. }
            | Event::StationStarted { tick, .. }
            | Event::StationCompleted { tick, .. }
            | Event::IngredientsCombined { tick, .. }
            | Event::ItemRejected { tick, .. }
            | Event::StationMalfunction { tick, .. }
            | Event::StationMaintained { tick, .. }
            | Event::TaskAssigned { tick, .. }
            | Event::ItemDelivered { tick, .. }
            | Event::ProductCompleted { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog -- ring buffer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Option<Event>>,
    /// Next write position; the oldest entry once the buffer has wrapped.
    head: usize,
    len: usize,
    total_written: u64,
    suppressed: [bool; EVENT_KIND_COUNT],
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            suppressed: [false; EVENT_KIND_COUNT],
        }
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = true;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind as usize]
    }

    pub fn push(&mut self, event: Event) {
        if self.is_suppressed(event.kind()) {
            return;
        }
        let capacity = self.capacity();
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events overwritten before anyone read them.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let capacity = self.capacity();
        let start = if self.len < capacity { 0 } else { self.head };
        (0..self.len).filter_map(move |i| self.events[(start + i) % capacity].as_ref())
    }

    /// Take every stored event, oldest first, leaving the log empty.
    pub fn drain(&mut self) -> Vec<Event> {
        let capacity = self.capacity();
        let start = if self.len < capacity { 0 } else { self.head };
        let mut out = Vec::with_capacity(self.len);
        for i in 0..self.len {
            if let Some(event) = self.events[(start + i) % capacity].take() {
                out.push(event);
            }
        }
        self.head = 0;
        self.len = 0;
        out
    }

    /// Forget stored events and counters. Suppression settings survive.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
        self.total_written = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(tick: Ticks) -> Event {
        Event::StationStarted {
            station: StationId(0),
            tick,
        }
    }

    #[test]
    fn ring_buffer_keeps_newest() {
        let mut log = EventLog::new(3);
        for t in 0..5 {
            log.push(started(t));
        }
        let ticks: Vec<_> = log.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(log.total_written(), 5);
        assert_eq!(log.dropped_count(), 2);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut log = EventLog::new(4);
        for t in 0..6 {
            log.push(started(t));
        }
        let drained: Vec<_> = log.drain().iter().map(Event::tick).collect();
        assert_eq!(drained, vec![2, 3, 4, 5]);
        assert!(log.is_empty());
        log.push(started(9));
        assert_eq!(log.iter().count(), 1);
    }

    #[test]
    fn suppressed_kinds_are_not_recorded() {
        let mut log = EventLog::new(8);
        log.suppress(EventKind::StationStarted);
        log.push(started(1));
        log.push(Event::StationMalfunction {
            station: StationId(2),
            tick: 1,
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.iter().next().map(Event::kind), Some(EventKind::StationMalfunction));
        log.unsuppress(EventKind::StationStarted);
        log.push(started(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut log = EventLog::new(0);
        log.push(started(1));
        log.push(started(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.iter().next().map(Event::tick), Some(2));
    }
}
