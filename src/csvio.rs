//! Annotation table import and export.
//!
//! Columns are `gender, age, file start, start, end, channels, comment`. Subject
//! columns are only meaningful on the first data row; times are wall clock and
//! get shifted by the file start to line up with the recording's zero.

use std::path::Path;

use crate::timecode::{format_clock_millis, parse_clock};
use crate::{AnnotationEvent, DETECTED_LABEL, EventId, RecordingMetadata};

pub const EXPORT_HEADER: [&str; 7] = [
    "Gender",
    "Age",
    "File Start",
    "Start time",
    "End time",
    "Channel names",
    "Comment",
];

/// Written when an event somehow carries an empty label.
const FALLBACK_EXPORT_LABEL: &str = "Abnormal";

const GENDER: usize = 0;
const AGE: usize = 1;
const FILE_START: usize = 2;
const START: usize = 3;
const END: usize = 4;
const CHANNELS: usize = 5;
const COMMENT: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write annotation row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush annotation table: {0}")]
    Io(#[from] std::io::Error),
    #[error("annotation table is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Parses an annotation table into per-channel events and the file metadata.
///
/// Malformed rows are skipped. The returned events are sorted by start time and
/// numbered from 1 in row order.
pub fn parse_annotations(text: &str) -> (Vec<AnnotationEvent>, RecordingMetadata) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.trim().as_bytes());

    let mut metadata = RecordingMetadata::default();
    let mut file_start = 0.0;
    let mut next_id = 1;
    let mut events = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                log::debug!("Skipping annotation row {row}: {err}");
                continue;
            }
        };

        if index == 0 {
            metadata = metadata_from(&record);
            file_start = metadata.file_start_seconds();
            log::debug!("Annotation metadata: {metadata:?}");
        }

        let Some((start, end, channels)) = row_span(&record, file_start) else {
            log::debug!("Skipping annotation row {row}: missing or invalid time span");
            continue;
        };
        let comment = comment_of(&record);
        let label = if comment.is_empty() {
            DETECTED_LABEL.to_owned()
        } else {
            comment
        };

        for channel in channels.split_whitespace() {
            events.push(AnnotationEvent::manual(
                EventId::new(next_id),
                channel,
                start,
                end,
                label.clone(),
            ));
            next_id += 1;
        }
    }

    events.sort_by(|a, b| a.start.total_cmp(&b.start));
    (events, metadata)
}

fn field<'r>(record: &'r csv::StringRecord, column: usize) -> &'r str {
    record.get(column).unwrap_or("").trim()
}

fn metadata_from(record: &csv::StringRecord) -> RecordingMetadata {
    let or = |column: usize, fallback: &str| {
        let value = field(record, column);
        if value.is_empty() {
            fallback.to_owned()
        } else {
            value.to_owned()
        }
    };
    RecordingMetadata {
        gender: or(GENDER, "Unknown"),
        age: or(AGE, "Unknown"),
        file_start: or(FILE_START, "00:00:00"),
    }
}

fn row_span(record: &csv::StringRecord, file_start: f64) -> Option<(f64, f64, &str)> {
    let channels = field(record, CHANNELS);
    if channels.is_empty() {
        return None;
    }
    let start = parse_clock(field(record, START))? - file_start;
    let end = parse_clock(field(record, END))? - file_start;
    Some((start, end, channels))
}

/// Unquoted commas in a comment spill into extra columns; glue them back
/// untrimmed so the text between them survives.
fn comment_of(record: &csv::StringRecord) -> String {
    record
        .iter()
        .skip(COMMENT)
        .collect::<Vec<_>>()
        .join(",")
        .trim()
        .to_owned()
}

/// Serializes events, in the given order, back to the annotation table format.
pub fn export_annotations<'a>(
    events: impl IntoIterator<Item = &'a AnnotationEvent>,
    metadata: &RecordingMetadata,
) -> Result<String, ExportError> {
    let file_start = metadata.file_start_seconds();
    let mut buffer = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buffer);
        writer.write_record(EXPORT_HEADER)?;

        for (index, event) in events.into_iter().enumerate() {
            let start = format_clock_millis(file_start + event.start);
            let end = format_clock_millis(file_start + event.end);
            let label = if event.label.is_empty() {
                FALLBACK_EXPORT_LABEL
            } else {
                event.label.as_str()
            };
            let (gender, age, file_start_text) = if index == 0 {
                (
                    metadata.gender.as_str(),
                    metadata.age.as_str(),
                    metadata.file_start.as_str(),
                )
            } else {
                ("", "", "")
            };
            writer.write_record([
                gender,
                age,
                file_start_text,
                start.as_str(),
                end.as_str(),
                event.channel.as_str(),
                label,
            ])?;
        }
        writer.flush()?;
    }
    Ok(String::from_utf8(buffer)?)
}

/// `refined_<base>.csv`, where base is the recording's file name up to its first dot.
pub fn export_file_name(recording: &str) -> String {
    let name = Path::new(recording)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = name.split('.').next().unwrap_or_default();
    format!("refined_{base}.csv")
}
