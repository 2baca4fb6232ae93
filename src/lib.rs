#![warn(clippy::all, rust_2018_idioms)]
//! Core of an EEG annotation review tool: EDF decoding, CSV annotation
//! import/export, and the event store plus the interactive edit session
//! that mutates it.

mod app;
pub use app::{EventListEntry, ReviewApp};

pub mod config;
pub mod csvio;
pub mod edfio;
pub mod events;
pub mod loader;
pub mod reference;
pub mod session;
pub mod timecode;

pub use edfio::{FormatError, FormatIssue};
pub use events::EventStore;
pub use session::{EditState, RegionEditSession};

/// Label of the EDF+ pseudo channel carrying TAL annotations. Never drawn.
pub const ANNOTATION_CHANNEL_LABEL: &str = "EDF Annotations";

/// Label given to regions drawn by hand before the reviewer picks one.
pub const UNSPECIFIED_LABEL: &str = "Unspecified";

/// Label used for imported rows whose comment column is empty.
pub const DETECTED_LABEL: &str = "Detected";

/// Classification attached to every imported or drawn event.
pub const ABNORMAL_CLASSIFICATION: &str = "abnormal";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    /// `dd.mm.yy` as written in the file.
    pub start_date: String,
    /// `hh.mm.ss` as written in the file.
    pub start_time: String,
    /// Byte offset where the sample region starts.
    pub header_bytes: usize,
    pub reserved: String,
    pub num_data_records: usize,
    /// Seconds covered by one data record.
    pub record_duration: f64,
    pub num_channels: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub label: String,
    pub transducer: String,
    pub physical_unit: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefiltering: String,
    pub samples_per_record: usize,
}

impl ChannelDescriptor {
    pub fn sample_rate(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }

    /// Digital to physical mapping, `None` when the digital range is empty.
    pub fn calibration(&self) -> Option<Calibration> {
        if self.digital_max == self.digital_min {
            return None;
        }
        let scale = (self.physical_max - self.physical_min)
            / (f64::from(self.digital_max) - f64::from(self.digital_min));
        let bias = self.physical_min - f64::from(self.digital_min) * scale;
        Some(Calibration { scale, bias })
    }

    pub fn is_annotation_channel(&self) -> bool {
        self.label.eq_ignore_ascii_case(ANNOTATION_CHANNEL_LABEL)
    }
}

/// Affine transform `physical = raw * scale + bias`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: f64,
    pub bias: f64,
}

impl Calibration {
    #[inline]
    pub fn apply(&self, raw: i16) -> f32 {
        (f64::from(raw) * self.scale + self.bias) as f32
    }
}

/// A fully decoded recording. Built once per load and never mutated.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedRecording {
    pub header: RecordingHeader,
    pub channels: Vec<ChannelDescriptor>,
    /// Calibrated samples, one vector per entry of `channels`.
    pub samples: Vec<Vec<f32>>,
    pub total_duration: f64,
}

impl ParsedRecording {
    pub fn channel_index(&self, label: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.label == label)
    }

    pub fn sample_rate(&self, channel: usize) -> Option<f64> {
        self.channels
            .get(channel)
            .map(|c| c.sample_rate(self.header.record_duration))
    }

    /// Indices of the channels a reviewer sees as lanes.
    pub fn display_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_annotation_channel())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn display_labels(&self) -> Vec<String> {
        self.display_channels()
            .into_iter()
            .map(|i| self.channels[i].label.clone())
            .collect()
    }

    /// Samples of `channel` covering `[start, end)` seconds, clamped to what was recorded.
    pub fn window(&self, channel: usize, start: f64, end: f64) -> &[f32] {
        let (Some(data), Some(rate)) = (self.samples.get(channel), self.sample_rate(channel)) else {
            return &[];
        };
        let first = ((start.max(0.0) * rate).floor() as usize).min(data.len());
        let last = ((end.max(0.0) * rate).ceil() as usize).min(data.len());
        if first >= last {
            return &[];
        }
        &data[first..last]
    }

    /// Nearest sample at or before `time` seconds.
    pub fn sample_at(&self, channel: usize, time: f64) -> Option<f32> {
        let rate = self.sample_rate(channel)?;
        if time < 0.0 {
            return None;
        }
        let index = (time * rate).floor() as usize;
        self.samples.get(channel)?.get(index).copied()
    }
}

/// Opaque event identifier, unique within one [`EventStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt_{}", self.0)
    }
}

/// Provenance record of an external detector hit (or the manual equivalent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub confidence: f32,
    pub start: f64,
    pub end: f64,
}

/// One annotated interval on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEvent {
    pub(crate) id: EventId,
    pub channel: String,
    /// Seconds from recording start.
    pub start: f64,
    pub end: f64,
    pub classification: String,
    pub label: String,
    pub detections: Vec<Detection>,
}

impl AnnotationEvent {
    /// A manually confirmed event: one detection at full confidence.
    pub fn manual(
        id: EventId,
        channel: impl Into<String>,
        start: f64,
        end: f64,
        label: impl Into<String>,
    ) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            id,
            channel: channel.into(),
            start,
            end,
            classification: ABNORMAL_CLASSIFICATION.to_owned(),
            label: label.into(),
            detections: vec![Detection {
                confidence: 1.0,
                start,
                end,
            }],
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.end >= start && self.start <= end
    }
}

/// Subject information stated once in the annotation table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingMetadata {
    pub gender: String,
    pub age: String,
    /// Wall clock time of recording start, `HH:MM:SS[:mmm]`.
    pub file_start: String,
}

impl RecordingMetadata {
    /// Offset used to move between relative and absolute time. Unparseable means zero.
    pub fn file_start_seconds(&self) -> f64 {
        timecode::parse_clock(&self.file_start).unwrap_or(0.0)
    }
}
