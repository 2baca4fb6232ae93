use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::config::{
    MAX_AMPLITUDE_SCALE, MAX_WINDOW_SECONDS, MIN_AMPLITUDE_SCALE, MIN_WINDOW_SECONDS, ReviewConfig,
};
use crate::csvio::{self, ExportError};
use crate::events::EventStore;
use crate::loader::{self, LoadError, LoadedReview};
use crate::reference::{self, DerivedChannel, Montage, MontageError};
use crate::session::{Boundary, LanePointer, RegionEditSession, SessionSettings};
use crate::timecode::format_clock;
use crate::{AnnotationEvent, EventId, ParsedRecording, RecordingMetadata};

/// One row of the detections sidebar.
#[derive(Debug, Clone, PartialEq)]
pub struct EventListEntry {
    pub id: EventId,
    pub title: String,
    pub channel: String,
    /// `HH:MM:SS - HH:MM:SS`, relative to the recording.
    pub span: String,
}

/// All state of a review, advanced by explicit calls rather than globals.
///
/// The caller owns the clock: a playback loop calls [`advance`](Self::advance)
/// with the elapsed time each tick, and pausing stops further movement at once.
#[derive(Debug)]
pub struct ReviewApp {
    config: ReviewConfig,
    recording: Option<ParsedRecording>,
    store: EventStore,
    metadata: RecordingMetadata,
    file_name: String,
    session: RegionEditSession,
    selected: Option<EventId>,
    current_time: f64,
    playing: bool,
    window_seconds: f64,
    amplitude_scale: f64,
    montage: Montage,
    loading_receiver: Option<Receiver<Result<LoadedReview, LoadError>>>,
}

impl Default for ReviewApp {
    fn default() -> Self {
        Self::new(ReviewConfig::default())
    }
}

impl ReviewApp {
    pub fn new(config: ReviewConfig) -> Self {
        let config = config.sanitized();
        Self {
            session: RegionEditSession::new(Vec::new(), 0.0, SessionSettings::from(&config)),
            window_seconds: config.window_seconds,
            amplitude_scale: config.amplitude_scale,
            montage: config.montage,
            config,
            recording: None,
            store: EventStore::default(),
            metadata: RecordingMetadata::default(),
            file_name: String::new(),
            selected: None,
            current_time: 0.0,
            playing: false,
            loading_receiver: None,
        }
    }

    /// Starts reading both files on a worker thread; see [`poll_loading`](Self::poll_loading).
    pub fn begin_load(&mut self, edf_path: PathBuf, csv_path: PathBuf) {
        self.loading_receiver = Some(loader::spawn_load(edf_path, csv_path));
    }

    pub fn is_loading(&self) -> bool {
        self.loading_receiver.is_some()
    }

    /// Installs a finished background load. `None` while still loading or idle.
    pub fn poll_loading(&mut self) -> Option<Result<(), LoadError>> {
        let receiver = self.loading_receiver.as_ref()?;
        let result = match receiver.try_recv() {
            Ok(Ok(review)) => {
                self.load(review);
                Ok(())
            }
            Ok(Err(err)) => {
                log::error!("Error loading review: {err}");
                Err(err)
            }
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                log::error!("Loading thread disconnected");
                Err(LoadError::Disconnected)
            }
        };
        self.loading_receiver = None;
        Some(result)
    }

    /// Replaces the whole review with a freshly loaded one.
    pub fn load(&mut self, review: LoadedReview) {
        let LoadedReview {
            recording,
            events,
            metadata,
            file_name,
        } = review;
        let total = recording.total_duration;
        self.store = EventStore::with_events(total, events);
        self.session = RegionEditSession::new(
            recording.display_labels(),
            total,
            SessionSettings::from(&self.config),
        );
        self.recording = Some(recording);
        self.metadata = metadata;
        self.file_name = file_name;
        self.selected = None;
        self.current_time = 0.0;
        self.playing = false;
    }

    /// Back to the empty state, keeping view settings.
    pub fn reset(&mut self) {
        self.recording = None;
        self.store = EventStore::default();
        self.metadata = RecordingMetadata::default();
        self.file_name.clear();
        self.session = RegionEditSession::new(Vec::new(), 0.0, SessionSettings::from(&self.config));
        self.selected = None;
        self.current_time = 0.0;
        self.playing = false;
        self.loading_receiver = None;
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn recording(&self) -> Option<&ParsedRecording> {
        self.recording.as_ref()
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn session(&self) -> &RegionEditSession {
        &self.session
    }

    pub fn selected(&self) -> Option<EventId> {
        self.selected
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn amplitude_scale(&self) -> f64 {
        self.amplitude_scale
    }

    pub fn montage(&self) -> Montage {
        self.montage
    }

    pub fn total_duration(&self) -> f64 {
        self.recording.as_ref().map_or(0.0, |r| r.total_duration)
    }

    /// Latest view start that still shows a full window.
    pub fn max_start(&self) -> f64 {
        (self.total_duration() - self.window_seconds).max(0.0)
    }

    pub fn view_window(&self) -> (f64, f64) {
        (self.current_time, self.current_time + self.window_seconds)
    }

    // Playback

    pub fn play(&mut self) {
        self.playing = self.recording.is_some();
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle_play(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Moves the cursor by `dt` seconds of playback. Returns whether it moved.
    ///
    /// Stops playback instead of running past the last full window.
    pub fn advance(&mut self, dt: f64) -> bool {
        if !self.playing {
            return false;
        }
        let next = self.current_time + dt.max(0.0);
        if next > self.total_duration() - self.window_seconds {
            self.playing = false;
            return false;
        }
        self.current_time = next;
        true
    }

    pub fn seek(&mut self, time: f64) {
        self.current_time = time.clamp(0.0, self.max_start());
    }

    pub fn skip_back(&mut self) {
        self.seek(self.current_time - self.config.skip_seconds);
    }

    pub fn skip_forward(&mut self) {
        self.seek(self.current_time + self.config.skip_seconds);
    }

    pub fn set_window_seconds(&mut self, seconds: f64) {
        if !seconds.is_nan() {
            self.window_seconds = seconds.clamp(MIN_WINDOW_SECONDS, MAX_WINDOW_SECONDS);
        }
    }

    pub fn set_amplitude_scale(&mut self, scale: f64) {
        if !scale.is_nan() {
            self.amplitude_scale = scale.clamp(MIN_AMPLITUDE_SCALE, MAX_AMPLITUDE_SCALE);
        }
    }

    pub fn set_montage(&mut self, montage: Montage) {
        self.montage = montage;
    }

    // Viewing

    /// Display channels under the current montage.
    pub fn montage_channels(&self) -> Result<Vec<DerivedChannel>, MontageError> {
        match &self.recording {
            Some(recording) => reference::apply_montage(recording, self.montage),
            None => Ok(Vec::new()),
        }
    }

    /// Samples of display lane `lane` inside the current view.
    pub fn lane_samples(&self, lane: usize) -> &[f32] {
        let Some(recording) = &self.recording else {
            return &[];
        };
        let Some(&channel) = recording.display_channels().get(lane) else {
            return &[];
        };
        let (start, end) = self.view_window();
        recording.window(channel, start, end)
    }

    /// Events on `channel` that overlap the current view.
    pub fn events_in_view<'a>(
        &'a self,
        channel: &'a str,
    ) -> impl Iterator<Item = &'a AnnotationEvent> + 'a {
        let (start, end) = self.view_window();
        self.store
            .by_channel(channel)
            .filter(move |e| e.overlaps(start, end))
    }

    pub fn event_list(&self) -> Vec<EventListEntry> {
        self.store
            .all()
            .enumerate()
            .map(|(i, event)| EventListEntry {
                id: event.id(),
                title: if event.label.is_empty() {
                    format!("Event #{}", i + 1)
                } else {
                    event.label.clone()
                },
                channel: event.channel.clone(),
                span: format!("{} - {}", format_clock(event.start), format_clock(event.end)),
            })
            .collect()
    }

    /// Sidebar selection: highlight the event, pause, and jump to just before it.
    pub fn select_event(&mut self, id: EventId) -> bool {
        let Some(event) = self.store.get(id) else {
            return false;
        };
        self.current_time = (event.start - 1.0).max(0.0);
        self.selected = Some(id);
        self.playing = false;
        true
    }

    // Editing

    pub fn pointer_down(&mut self, lane: usize, time: f64) -> bool {
        self.session.pointer_down(LanePointer::new(lane, time))
    }

    pub fn pointer_move(&mut self, lane: usize, time: f64) {
        self.session.pointer_move(LanePointer::new(lane, time));
    }

    pub fn pointer_up(&mut self, lane: usize, time: f64) {
        self.session
            .pointer_up(LanePointer::new(lane, time), &mut self.store);
    }

    pub fn pointer_leave(&mut self) {
        self.session.pointer_leave();
    }

    /// Clicking a drawn event opens it for refinement.
    pub fn click_event(&mut self, id: EventId) -> bool {
        let opened = self.session.select_event(id, &self.store);
        if opened {
            self.selected = Some(id);
        }
        opened
    }

    pub fn grab(&mut self, boundary: Boundary) {
        self.session.grab(boundary);
    }

    pub fn release(&mut self) {
        self.session.release();
    }

    pub fn move_boundary(&mut self, boundary: Boundary, time: f64) {
        self.session.move_boundary(boundary, time);
    }

    pub fn confirm(&mut self, label: &str) -> Option<Vec<EventId>> {
        let ids = self.session.confirm(label, &mut self.store);
        self.selected = None;
        ids
    }

    pub fn delete(&mut self) -> Option<Vec<EventId>> {
        let ids = self.session.delete(&mut self.store);
        self.selected = None;
        ids
    }

    pub fn cancel(&mut self) {
        self.session.cancel();
        self.selected = None;
    }

    // Export

    pub fn export_csv(&self) -> Result<String, ExportError> {
        csvio::export_annotations(self.store.all(), &self.metadata)
    }

    pub fn export_file_name(&self) -> String {
        csvio::export_file_name(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelDescriptor, RecordingHeader};

    fn review(events: Vec<AnnotationEvent>) -> LoadedReview {
        let labels = ["Fp1", "Fp2", "EDF Annotations", "C3"];
        let records = 120;
        LoadedReview {
            recording: ParsedRecording {
                header: RecordingHeader {
                    num_data_records: records,
                    record_duration: 1.0,
                    num_channels: labels.len(),
                    ..Default::default()
                },
                channels: labels
                    .iter()
                    .map(|label| ChannelDescriptor {
                        label: (*label).to_owned(),
                        samples_per_record: 4,
                        digital_min: -1,
                        digital_max: 1,
                        ..Default::default()
                    })
                    .collect(),
                samples: labels
                    .iter()
                    .enumerate()
                    .map(|(i, _)| (0..records * 4).map(|k| (i * 1000 + k) as f32).collect())
                    .collect(),
                total_duration: records as f64,
            },
            events,
            metadata: RecordingMetadata {
                gender: "F".to_owned(),
                age: "40".to_owned(),
                file_start: "09:00:00".to_owned(),
            },
            file_name: "night_01.edf".to_owned(),
        }
    }

    fn artifact() -> AnnotationEvent {
        AnnotationEvent::manual(EventId::new(1), "C3", 1.0, 2.0, "Artifact")
    }

    fn loaded(events: Vec<AnnotationEvent>) -> ReviewApp {
        let mut app = ReviewApp::default();
        app.load(review(events));
        app
    }

    #[test]
    fn playback_stops_before_running_out_of_signal() {
        let mut app = loaded(Vec::new());
        assert!(!app.advance(1.0), "paused app does not move");
        app.play();
        assert!(app.advance(50.0));
        assert!(app.advance(40.0));
        assert_eq!(app.current_time(), 90.0);
        assert!(!app.advance(0.5));
        assert!(!app.is_playing());
        assert_eq!(app.current_time(), 90.0);
    }

    #[test]
    fn pausing_cancels_pending_ticks() {
        let mut app = loaded(Vec::new());
        app.toggle_play();
        app.advance(1.0);
        app.toggle_play();
        assert!(!app.advance(1.0));
        assert_eq!(app.current_time(), 1.0);
    }

    #[test]
    fn play_needs_a_recording() {
        let mut app = ReviewApp::default();
        app.play();
        assert!(!app.is_playing());
    }

    #[test]
    fn navigation_is_clamped() {
        let mut app = loaded(Vec::new());
        app.skip_back();
        assert_eq!(app.current_time(), 0.0);
        app.seek(500.0);
        assert_eq!(app.current_time(), 90.0);
        app.set_window_seconds(0.1);
        assert_eq!(app.window_seconds(), MIN_WINDOW_SECONDS);
        app.set_amplitude_scale(1000.0);
        assert_eq!(app.amplitude_scale(), MAX_AMPLITUDE_SCALE);
    }

    #[test]
    fn lanes_skip_the_annotation_channel() {
        let mut app = loaded(Vec::new());
        assert_eq!(app.session().lanes(), ["Fp1", "Fp2", "C3"]);
        app.set_window_seconds(1.0);
        app.seek(2.0);
        assert_eq!(app.lane_samples(2), &[3008.0, 3009.0, 3010.0, 3011.0]);
        assert!(app.lane_samples(7).is_empty());
    }

    #[test]
    fn selecting_from_the_list_jumps_and_pauses() {
        let mut app = loaded(vec![AnnotationEvent::manual(
            EventId::new(1),
            "Fp2",
            42.5,
            43.0,
            "Spike",
        )]);
        app.play();
        assert!(app.select_event(EventId::new(1)));
        assert_eq!(app.current_time(), 41.5);
        assert!(!app.is_playing());
        assert_eq!(app.selected(), Some(EventId::new(1)));
        assert!(!app.select_event(EventId::new(9)));
    }

    #[test]
    fn view_filters_events_by_channel_and_time() {
        let app = loaded(vec![
            AnnotationEvent::manual(EventId::new(1), "Fp1", 5.0, 6.0, "Spike"),
            AnnotationEvent::manual(EventId::new(2), "Fp1", 70.0, 71.0, "Spike"),
            AnnotationEvent::manual(EventId::new(3), "C3", 5.0, 6.0, "Spike"),
        ]);
        let visible: Vec<_> = app.events_in_view("Fp1").map(|e| e.id()).collect();
        assert_eq!(visible, vec![EventId::new(1)]);
    }

    #[test]
    fn draw_refine_confirm_and_export() {
        let mut app = loaded(vec![artifact()]);
        assert!(app.pointer_down(0, 10.0));
        app.pointer_move(1, 12.0);
        app.pointer_up(1, 12.0);
        assert_eq!(app.store().len(), 1);
        app.grab(Boundary::End);
        app.pointer_move(1, 12.5);
        app.release();
        let ids = app.confirm("Seizure").expect("confirmed");
        assert_eq!(ids.len(), 2);
        assert_eq!(app.store().len(), 3);

        let text = app.export_csv().expect("export");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "F,40,09:00:00,09:00:01:000,09:00:02:000,C3,Artifact");
        assert_eq!(lines[2], ",,,09:00:10:000,09:00:12:500,Fp1,Seizure");
        assert_eq!(lines[3], ",,,09:00:10:000,09:00:12:500,Fp2,Seizure");
        assert_eq!(app.export_file_name(), "refined_night_01.csv");
    }

    #[test]
    fn event_list_reflects_store_order() {
        let app = loaded(vec![
            AnnotationEvent::manual(EventId::new(1), "Fp1", 65.0, 66.0, "Spike"),
            AnnotationEvent::manual(EventId::new(2), "C3", 3.0, 4.0, ""),
        ]);
        let list = app.event_list();
        assert_eq!(list[0].title, "Event #1");
        assert_eq!(list[0].span, "00:00:03 - 00:00:04");
        assert_eq!(list[1].title, "Spike");
        assert_eq!(list[1].span, "00:01:05 - 00:01:06");
    }

    #[test]
    fn reset_clears_everything() {
        let mut app = loaded(vec![artifact()]);
        app.seek(20.0);
        app.reset();
        assert!(app.recording().is_none());
        assert!(app.store().is_empty());
        assert_eq!(app.current_time(), 0.0);
        assert_eq!(app.file_name(), "");
    }
}
