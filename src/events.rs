//! The time-ordered event stream that drives the stepper.

use chrono::{DateTime, FixedOffset};

use crate::components::Cost;

/// A single scheduled change to the scenario's components.
///
/// Every variant carries `signal_time` (when it becomes knowable to
/// strategies with look-ahead) and `start_time` (when it actually takes
/// effect); for most variants the two coincide.
#[derive(Debug, Clone)]
pub enum Event {
    Arrival {
        signal_time: DateTime<FixedOffset>,
        start_time: DateTime<FixedOffset>,
        vehicle: String,
        station: String,
        soc_delta: f32,
        estimated_time_of_departure: Option<DateTime<FixedOffset>>,
        desired_soc: Option<f32>,
    },
    Departure {
        signal_time: DateTime<FixedOffset>,
        start_time: DateTime<FixedOffset>,
        vehicle: String,
        estimated_time_of_arrival: Option<DateTime<FixedOffset>>,
    },
    FixedLoadUpdate {
        signal_time: DateTime<FixedOffset>,
        start_time: DateTime<FixedOffset>,
        grid_connector: String,
        name: String,
        power_kw: f32,
    },
    LocalGenerationUpdate {
        signal_time: DateTime<FixedOffset>,
        start_time: DateTime<FixedOffset>,
        grid_connector: String,
        name: String,
        power_kw: f32,
    },
    GridOperatorSignal {
        signal_time: DateTime<FixedOffset>,
        start_time: DateTime<FixedOffset>,
        grid_connector: String,
        max_power: Option<f32>,
        cost: Option<Cost>,
        charging_windows: Option<Vec<bool>>,
    },
    ScheduleUpdate {
        signal_time: DateTime<FixedOffset>,
        start_time: DateTime<FixedOffset>,
        /// Id of the vehicle or grid connector this schedule targets.
        target: String,
        power_kw: f32,
    },
}

impl Event {
    pub fn signal_time(&self) -> DateTime<FixedOffset> {
        match self {
            Event::Arrival { signal_time, .. }
            | Event::Departure { signal_time, .. }
            | Event::FixedLoadUpdate { signal_time, .. }
            | Event::LocalGenerationUpdate { signal_time, .. }
            | Event::GridOperatorSignal { signal_time, .. }
            | Event::ScheduleUpdate { signal_time, .. } => *signal_time,
        }
    }

    pub fn start_time(&self) -> DateTime<FixedOffset> {
        match self {
            Event::Arrival { start_time, .. }
            | Event::Departure { start_time, .. }
            | Event::FixedLoadUpdate { start_time, .. }
            | Event::LocalGenerationUpdate { start_time, .. }
            | Event::GridOperatorSignal { start_time, .. }
            | Event::ScheduleUpdate { start_time, .. } => *start_time,
        }
    }

    /// Rank used to break ties between events sharing a `start_time`:
    /// arrivals sort before departures of the same vehicle, everything
    /// else is stable by insertion order (handled by the queue keeping
    /// `Arrival`/other ahead of `Departure` only, never reordering
    /// otherwise).
    fn departure_rank(&self) -> u8 {
        match self {
            Event::Departure { .. } => 1,
            _ => 0,
        }
    }
}

/// The scenario's time-ordered collection of pending and consumed events.
///
/// Events are kept sorted by `(start_time, departure_rank, insertion
/// index)` so that iteration order is deterministic and arrivals are
/// always applied before a same-instant departure of the same vehicle
/// (preserving vehicle identity across the boundary).
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Vec<Event>,
    consumed: Vec<bool>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `event` keeping the queue's sort order.
    pub fn push(&mut self, event: Event) {
        let key = (event.start_time(), event.departure_rank());
        let pos = self
            .events
            .partition_point(|e| (e.start_time(), e.departure_rank()) <= key);
        self.events.insert(pos, event);
        self.consumed.insert(pos, false);
    }

    /// Events visible to strategies with look-ahead as of `time`
    /// (`signal_time <= time`), regardless of consumption.
    pub fn events_visible_at(&self, time: DateTime<FixedOffset>) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.signal_time() <= time)
    }

    /// Not-yet-consumed events whose effect has started
    /// (`start_time <= time`), in application order.
    pub fn events_active_at(&self, time: DateTime<FixedOffset>) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .zip(self.consumed.iter())
            .filter(move |(e, &consumed)| !consumed && e.start_time() <= time)
            .map(|(e, _)| e)
    }

    /// Marks the event at `index` (its position among [`Self::events_active_at`]'s
    /// underlying storage) as consumed. Callers obtain `index` via
    /// [`Self::active_indices_at`].
    pub fn consume(&mut self, index: usize) {
        if let Some(flag) = self.consumed.get_mut(index) {
            *flag = true;
        }
    }

    /// Indices (stable across `push`es that happen before this call) of
    /// not-yet-consumed events active at `time`, in application order —
    /// the index-returning counterpart to [`Self::events_active_at`] for
    /// callers that need to consume what they iterate.
    pub fn active_indices_at(&self, time: DateTime<FixedOffset>) -> Vec<usize> {
        self.events
            .iter()
            .zip(self.consumed.iter())
            .enumerate()
            .filter(|(_, (e, &consumed))| !consumed && e.start_time() <= time)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, hour, minute, 0)
            .unwrap()
    }

    fn departure(vehicle: &str, start: DateTime<FixedOffset>) -> Event {
        Event::Departure {
            signal_time: start,
            start_time: start,
            vehicle: vehicle.to_string(),
            estimated_time_of_arrival: None,
        }
    }

    fn arrival(vehicle: &str, start: DateTime<FixedOffset>) -> Event {
        Event::Arrival {
            signal_time: start,
            start_time: start,
            vehicle: vehicle.to_string(),
            station: "cs1".to_string(),
            soc_delta: 0.0,
            estimated_time_of_departure: None,
            desired_soc: None,
        }
    }

    #[test]
    fn same_instant_arrival_sorts_before_departure() {
        let mut q = EventQueue::new();
        q.push(departure("v1", t(8, 0)));
        q.push(arrival("v1", t(8, 0)));
        let ordered: Vec<_> = q.events_active_at(t(8, 0)).collect();
        assert!(matches!(ordered[0], Event::Arrival { .. }));
        assert!(matches!(ordered[1], Event::Departure { .. }));
    }

    #[test]
    fn events_visible_at_respects_signal_time() {
        let mut q = EventQueue::new();
        q.push(Event::FixedLoadUpdate {
            signal_time: t(6, 0),
            start_time: t(9, 0),
            grid_connector: "gc1".to_string(),
            name: "base".to_string(),
            power_kw: 3.0,
        });
        assert_eq!(q.events_visible_at(t(5, 0)).count(), 0);
        assert_eq!(q.events_visible_at(t(7, 0)).count(), 1);
    }

    #[test]
    fn events_active_at_respects_start_time_and_consumption() {
        let mut q = EventQueue::new();
        q.push(arrival("v1", t(8, 0)));
        assert_eq!(q.events_active_at(t(7, 0)).count(), 0);
        let idx = q.active_indices_at(t(8, 0));
        assert_eq!(idx.len(), 1);
        q.consume(idx[0]);
        assert_eq!(q.events_active_at(t(8, 0)).count(), 0);
    }

    #[test]
    fn push_keeps_events_sorted_by_start_time() {
        let mut q = EventQueue::new();
        q.push(arrival("v2", t(10, 0)));
        q.push(arrival("v1", t(8, 0)));
        let times: Vec<_> = (0..q.len()).map(|i| q.get(i).unwrap().start_time()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
