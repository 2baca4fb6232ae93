//! One interactive edit at a time: drawing a region across lanes, or refining
//! and deleting an existing group of events.
//!
//! All positions are times in seconds plus a lane index. Mapping pixels to time
//! is the renderer's job.

use std::ops::RangeInclusive;

use crate::config::ReviewConfig;
use crate::events::EventStore;
use crate::{AnnotationEvent, EventId};

/// Pointer position over the lane area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanePointer {
    pub lane: usize,
    pub time: f64,
}

impl LanePointer {
    pub fn new(lane: usize, time: f64) -> Self {
        Self { lane, time }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub min_draw_seconds: f64,
    pub min_region_seconds: f64,
    pub refine_padding_seconds: f64,
    pub default_label: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ReviewConfig::default())
    }
}

impl From<&ReviewConfig> for SessionSettings {
    fn from(config: &ReviewConfig) -> Self {
        Self {
            min_draw_seconds: config.min_draw_seconds,
            min_region_seconds: config.min_region_seconds,
            refine_padding_seconds: config.refine_padding_seconds,
            default_label: config.default_label.clone(),
        }
    }
}

/// Candidate rectangle of a draw gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawGesture {
    anchor: LanePointer,
    current: LanePointer,
}

impl DrawGesture {
    pub fn lanes(&self) -> RangeInclusive<usize> {
        self.anchor.lane.min(self.current.lane)..=self.anchor.lane.max(self.current.lane)
    }

    /// `(start, end)` regardless of drag direction.
    pub fn span(&self) -> (f64, f64) {
        let (a, b) = (self.anchor.time, self.current.time);
        (a.min(b), a.max(b))
    }

    pub fn width(&self) -> f64 {
        (self.current.time - self.anchor.time).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrigin {
    /// Drawn in this session; not in the store until confirmed.
    Drawn,
    /// Already stored; refined or deleted in place.
    Existing,
}

/// The active group and its adjustable shared bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    group: Vec<AnnotationEvent>,
    origin: GroupOrigin,
    start: f64,
    end: f64,
    view_start: f64,
    view_end: f64,
    handle: Option<Boundary>,
}

impl Refinement {
    fn new(group: Vec<AnnotationEvent>, origin: GroupOrigin, padding: f64, total: f64) -> Self {
        let start = group.first().map(|e| e.start).unwrap_or(0.0);
        let end = group.first().map(|e| e.end).unwrap_or(start);
        Self {
            group,
            origin,
            start,
            end,
            view_start: (start - padding).max(0.0),
            view_end: (end + padding).min(total),
            handle: None,
        }
    }

    pub fn group(&self) -> &[AnnotationEvent] {
        &self.group
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.group.iter().map(AnnotationEvent::id).collect()
    }

    pub fn origin(&self) -> GroupOrigin {
        self.origin
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Time range shown while refining.
    pub fn view(&self) -> (f64, f64) {
        (self.view_start, self.view_end)
    }

    pub fn handle(&self) -> Option<Boundary> {
        self.handle
    }

    fn move_boundary(&mut self, boundary: Boundary, time: f64, min_gap: f64) {
        let time = time.clamp(self.view_start, self.view_end.max(self.view_start));
        match boundary {
            Boundary::Start => self.start = time.min(self.end - min_gap).max(0.0),
            Boundary::End => self.end = time.max(self.start + min_gap),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Drawing(DrawGesture),
    PendingCommit(DrawGesture),
    Refining(Refinement),
    Confirmed(Vec<EventId>),
    Deleted(Vec<EventId>),
    Cancelled,
}

impl EditState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed(_) | Self::Deleted(_) | Self::Cancelled)
    }
}

/// Governs the single edit that may be in flight against an [`EventStore`].
///
/// While refining, new draw gestures and selections are ignored. Terminal
/// states behave like `Idle` for the next gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEditSession {
    state: EditState,
    lanes: Vec<String>,
    total_duration: f64,
    settings: SessionSettings,
}

impl RegionEditSession {
    pub fn new(lanes: Vec<String>, total_duration: f64, settings: SessionSettings) -> Self {
        Self {
            state: EditState::Idle,
            lanes,
            total_duration: total_duration.max(0.0),
            settings,
        }
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn lanes(&self) -> &[String] {
        &self.lanes
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// True while a gesture or refinement is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            EditState::Drawing(_) | EditState::PendingCommit(_) | EditState::Refining(_)
        )
    }

    pub fn refinement(&self) -> Option<&Refinement> {
        match &self.state {
            EditState::Refining(r) => Some(r),
            _ => None,
        }
    }

    /// Candidate rectangle while drawing.
    pub fn gesture(&self) -> Option<&DrawGesture> {
        match &self.state {
            EditState::Drawing(g) | EditState::PendingCommit(g) => Some(g),
            _ => None,
        }
    }

    /// Starts a draw gesture. Returns `false` when ignored.
    pub fn pointer_down(&mut self, pointer: LanePointer) -> bool {
        if matches!(self.state, EditState::Refining(_)) || pointer.lane >= self.lanes.len() {
            return false;
        }
        self.state = EditState::Drawing(DrawGesture {
            anchor: pointer,
            current: pointer,
        });
        true
    }

    pub fn pointer_move(&mut self, pointer: LanePointer) {
        if let Some(&gesture) = self.gesture() {
            let gesture = DrawGesture {
                current: LanePointer::new(self.clamp_lane(pointer.lane), pointer.time),
                ..gesture
            };
            self.state = if gesture.width() >= self.settings.min_draw_seconds {
                EditState::PendingCommit(gesture)
            } else {
                EditState::Drawing(gesture)
            };
            return;
        }
        let min_gap = self.settings.min_region_seconds;
        if let EditState::Refining(refinement) = &mut self.state {
            if let Some(boundary) = refinement.handle {
                refinement.move_boundary(boundary, pointer.time, min_gap);
            }
        }
    }

    fn clamp_lane(&self, lane: usize) -> usize {
        lane.min(self.lanes.len().saturating_sub(1))
    }

    /// Ends a gesture. A wide enough rectangle becomes a new active group of
    /// one event per lane spanned; anything narrower is a click and is dropped.
    ///
    /// Only identifiers are taken from `store`; nothing is inserted until
    /// [`confirm`](Self::confirm).
    pub fn pointer_up(&mut self, pointer: LanePointer, store: &mut EventStore) {
        match std::mem::take(&mut self.state) {
            EditState::PendingCommit(mut gesture) => {
                gesture.current = LanePointer::new(self.clamp_lane(pointer.lane), pointer.time);
                let (start, end) = gesture.span();
                let start = start.clamp(0.0, self.total_duration);
                let end = end.clamp(0.0, self.total_duration);
                if end - start < self.settings.min_draw_seconds {
                    log::debug!(
                        "Discarding draw gesture narrower than {}s",
                        self.settings.min_draw_seconds
                    );
                    return;
                }
                let group: Vec<AnnotationEvent> = gesture
                    .lanes()
                    .filter_map(|lane| self.lanes.get(lane))
                    .map(|channel| {
                        AnnotationEvent::manual(
                            store.allocate_id(),
                            channel.clone(),
                            start,
                            end,
                            self.settings.default_label.clone(),
                        )
                    })
                    .collect();
                log::debug!("Drew {} events over {start:.3}-{end:.3}s", group.len());
                self.state = EditState::Refining(Refinement::new(
                    group,
                    GroupOrigin::Drawn,
                    self.settings.refine_padding_seconds,
                    self.total_duration,
                ));
            }
            EditState::Drawing(_) => {}
            EditState::Refining(mut refinement) => {
                refinement.handle = None;
                self.state = EditState::Refining(refinement);
            }
            other => self.state = other,
        }
    }

    /// Pointer left the lane area: abandon any draw gesture.
    pub fn pointer_leave(&mut self) {
        if self.gesture().is_some() {
            self.state = EditState::Idle;
        }
    }

    /// Makes a stored event the active group. Ignored while another edit is active.
    pub fn select_event(&mut self, id: EventId, store: &EventStore) -> bool {
        if self.is_active() {
            return false;
        }
        let Some(event) = store.get(id) else {
            return false;
        };
        self.state = EditState::Refining(Refinement::new(
            vec![event.clone()],
            GroupOrigin::Existing,
            self.settings.refine_padding_seconds,
            self.total_duration,
        ));
        true
    }

    pub fn grab(&mut self, boundary: Boundary) {
        if let EditState::Refining(refinement) = &mut self.state {
            refinement.handle = Some(boundary);
        }
    }

    pub fn release(&mut self) {
        if let EditState::Refining(refinement) = &mut self.state {
            refinement.handle = None;
        }
    }

    /// Moves one boundary directly, with the same clamping as a drag.
    pub fn move_boundary(&mut self, boundary: Boundary, time: f64) {
        let min_gap = self.settings.min_region_seconds;
        if let EditState::Refining(refinement) = &mut self.state {
            refinement.move_boundary(boundary, time, min_gap);
        }
    }

    /// Applies `label` and the refined bounds to the whole group.
    pub fn confirm(&mut self, label: &str, store: &mut EventStore) -> Option<Vec<EventId>> {
        self.refinement()?;
        let EditState::Refining(refinement) = std::mem::take(&mut self.state) else {
            return None;
        };
        let label = if label.trim().is_empty() {
            self.settings.default_label.clone()
        } else {
            label.to_owned()
        };
        let (start, end) = (refinement.start, refinement.end);
        let ids = match refinement.origin {
            GroupOrigin::Drawn => store.insert(refinement.group.into_iter().map(|event| {
                AnnotationEvent::manual(event.id, event.channel, start, end, label.clone())
            })),
            GroupOrigin::Existing => {
                let ids = refinement.ids();
                store.replace(&ids, |event| {
                    event.label = label.clone();
                    event.start = start;
                    event.end = end;
                });
                ids
            }
        };
        log::debug!("Confirmed {} events as {label:?}", ids.len());
        self.state = EditState::Confirmed(ids.clone());
        Some(ids)
    }

    /// Drops the active group: stored events are removed, drawn ones discarded.
    pub fn delete(&mut self, store: &mut EventStore) -> Option<Vec<EventId>> {
        self.refinement()?;
        let EditState::Refining(refinement) = std::mem::take(&mut self.state) else {
            return None;
        };
        let ids = refinement.ids();
        if refinement.origin == GroupOrigin::Existing {
            store.remove(&ids);
        }
        self.state = EditState::Deleted(ids.clone());
        Some(ids)
    }

    /// Abandons the edit without touching the store.
    pub fn cancel(&mut self) {
        if self.is_active() {
            self.state = EditState::Cancelled;
        }
    }
}
