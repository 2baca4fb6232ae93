//! File acquisition. Both inputs are read whole; there is no streaming decode.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use crate::edfio::{self, FormatError};
use crate::{AnnotationEvent, ParsedRecording, RecordingMetadata, csvio};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("loader thread exited without delivering a result")]
    Disconnected,
}

/// Everything one review needs, produced by a single load.
#[derive(Debug, Clone)]
pub struct LoadedReview {
    pub recording: ParsedRecording,
    pub events: Vec<AnnotationEvent>,
    pub metadata: RecordingMetadata,
    /// File name of the recording, used to name the export.
    pub file_name: String,
}

pub fn load_review(edf_path: &Path, csv_path: &Path) -> Result<LoadedReview, LoadError> {
    let recording = edfio::read_recording(edf_path)?;
    let text = std::fs::read_to_string(csv_path).map_err(|source| LoadError::Io {
        path: csv_path.to_path_buf(),
        source,
    })?;
    let (events, metadata) = csvio::parse_annotations(&text);

    let known = events
        .iter()
        .filter(|e| recording.channel_index(&e.channel).is_some())
        .count();
    if known < events.len() {
        log::warn!(
            "{} of {} annotations name channels absent from {}",
            events.len() - known,
            events.len(),
            edf_path.display()
        );
    }

    let file_name = edf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::info!(
        "Loaded {file_name}: {} channels, {} annotations",
        recording.channels.len(),
        events.len()
    );

    Ok(LoadedReview {
        recording,
        events,
        metadata,
        file_name,
    })
}

/// Runs [`load_review`] on a worker thread. The receiver yields exactly one message.
pub fn spawn_load(
    edf_path: PathBuf,
    csv_path: PathBuf,
) -> Receiver<Result<LoadedReview, LoadError>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let result = load_review(&edf_path, &csv_path);
        if sender.send(result).is_err() {
            log::debug!("Load of {} finished after its receiver was dropped", edf_path.display());
        }
    });
    receiver
}
