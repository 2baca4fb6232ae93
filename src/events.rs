//! The time-ordered set of annotations for the loaded recording.

use std::collections::HashSet;

use crate::{AnnotationEvent, EventId};

#[derive(Debug, Clone)]
struct StoredEvent {
    /// Insertion order, breaks start-time ties.
    seq: u64,
    event: AnnotationEvent,
}

/// Single source of truth for annotations, always sorted by start time.
///
/// Every mutator keeps `0 <= start <= end <= duration` and identifier
/// uniqueness. Mutations naming identifiers that are not stored are no-ops.
#[derive(Debug, Clone)]
pub struct EventStore {
    events: Vec<StoredEvent>,
    duration: f64,
    next_id: u64,
    /// Where recycling starts once `next_id` has reached the end of the id space.
    recycle_from: u64,
    next_seq: u64,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(f64::INFINITY)
    }
}

impl EventStore {
    /// Empty store for a recording lasting `duration` seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            events: Vec::new(),
            duration: duration.max(0.0),
            next_id: 1,
            recycle_from: 1,
            next_seq: 0,
        }
    }

    pub fn with_events(duration: f64, events: impl IntoIterator<Item = AnnotationEvent>) -> Self {
        let mut store = Self::new(duration);
        store.insert(events);
        store
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// A fresh identifier, not currently stored.
    ///
    /// Identifiers are handed out in increasing order. Once the counter reaches
    /// `u64::MAX`, unused low identifiers are recycled instead.
    pub fn allocate_id(&mut self) -> EventId {
        if let Some(after) = self.next_id.checked_add(1) {
            let id = EventId::new(self.next_id);
            self.next_id = after;
            return id;
        }
        let raw = (self.recycle_from..u64::MAX)
            .find(|&raw| !self.contains(EventId::new(raw)))
            .unwrap_or(u64::MAX);
        self.recycle_from = raw.saturating_add(1);
        log::warn!("Event id space exhausted, recycling {raw}");
        EventId::new(raw)
    }

    /// Adds events, reassigning any identifier already in use.
    ///
    /// Returns the stored ids in input order.
    pub fn insert(&mut self, events: impl IntoIterator<Item = AnnotationEvent>) -> Vec<EventId> {
        let mut taken: HashSet<EventId> = self.events.iter().map(|s| s.event.id).collect();
        let mut ids = Vec::new();
        for mut event in events {
            if taken.contains(&event.id) {
                event.id = self.allocate_id();
            }
            self.next_id = self.next_id.max(event.id.raw().saturating_add(1));
            taken.insert(event.id);
            ids.push(event.id);

            self.clamp(&mut event);
            self.events.push(StoredEvent {
                seq: self.next_seq,
                event,
            });
            self.next_seq += 1;
        }
        self.sort();
        ids
    }

    /// Applies `mutator` to every stored event whose id is in `ids`. Returns how many matched.
    ///
    /// The mutator cannot change an event's id; times are re-clamped afterwards.
    pub fn replace(
        &mut self,
        ids: &[EventId],
        mut mutator: impl FnMut(&mut AnnotationEvent),
    ) -> usize {
        let duration = self.duration;
        let mut touched = 0;
        for stored in &mut self.events {
            if !ids.contains(&stored.event.id) {
                continue;
            }
            let id = stored.event.id;
            mutator(&mut stored.event);
            stored.event.id = id;
            clamp_to(&mut stored.event, duration);
            touched += 1;
        }
        if touched < ids.len() {
            log::debug!("Replace matched {touched} of {} ids", ids.len());
        }
        self.sort();
        touched
    }

    /// Removes every event whose id is in `ids`. Returns how many were removed.
    pub fn remove(&mut self, ids: &[EventId]) -> usize {
        let before = self.events.len();
        self.events.retain(|s| !ids.contains(&s.event.id));
        self.sort();
        before - self.events.len()
    }

    pub fn all(&self) -> impl ExactSizeIterator<Item = &AnnotationEvent> + '_ {
        self.events.iter().map(|s| &s.event)
    }

    pub fn by_channel<'a>(
        &'a self,
        label: &'a str,
    ) -> impl Iterator<Item = &'a AnnotationEvent> + 'a {
        self.all().filter(move |e| e.channel == label)
    }

    pub fn get(&self, id: EventId) -> Option<&AnnotationEvent> {
        self.all().find(|e| e.id == id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_vec(&self) -> Vec<AnnotationEvent> {
        self.all().cloned().collect()
    }

    fn clamp(&self, event: &mut AnnotationEvent) {
        clamp_to(event, self.duration);
    }

    fn sort(&mut self) {
        self.events.sort_by(|a, b| {
            a.event
                .start
                .total_cmp(&b.event.start)
                .then(a.seq.cmp(&b.seq))
        });
    }
}

fn clamp_to(event: &mut AnnotationEvent, duration: f64) {
    if event.start.is_nan() {
        event.start = 0.0;
    }
    if event.end.is_nan() {
        event.end = event.start;
    }
    if event.start > event.end {
        std::mem::swap(&mut event.start, &mut event.end);
    }
    event.start = event.start.clamp(0.0, duration);
    event.end = event.end.clamp(event.start, duration);
}
