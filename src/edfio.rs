use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use crate::loader::LoadError;
use crate::{Calibration, ChannelDescriptor, ParsedRecording, RecordingHeader};

const FIXED_HEADER_LEN: usize = 256;
/// Bytes each channel contributes to the header, reserved tail included.
const CHANNEL_HEADER_LEN: usize = 256;
const CHANNEL_RESERVED_LEN: usize = 32;
const SAMPLE_BYTES: usize = 2;

/// Decoding failure. Always fatal to the load; no partial recording is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed recording at byte {offset}: {issue}")]
pub struct FormatError {
    pub offset: usize,
    pub issue: FormatIssue,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatIssue {
    #[error("buffer holds {available} bytes but {needed} are required")]
    Truncated { needed: usize, available: usize },
    #[error("{field} is not numeric: {text:?}")]
    NotNumeric { field: &'static str, text: String },
    #[error("{field} is out of range: {text:?}")]
    InvalidValue { field: &'static str, text: String },
    #[error("channel {channel} ({label}) has equal digital minimum and maximum")]
    DegenerateCalibration { channel: usize, label: String },
    #[error("declared header size {declared} is smaller than the {required} bytes it must hold")]
    HeaderTooShort { declared: usize, required: usize },
}

impl FormatError {
    fn new(offset: usize, issue: FormatIssue) -> Self {
        Self { offset, issue }
    }
}

/// Reads fixed-width, space padded ASCII fields front to back.
struct FieldCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = self.offset + len;
        let Some(field) = self.bytes.get(self.offset..end) else {
            return Err(FormatError::new(
                self.offset,
                FormatIssue::Truncated {
                    needed: end,
                    available: self.bytes.len(),
                },
            ));
        };
        self.offset = end;
        Ok(field)
    }

    fn text(&mut self, len: usize) -> Result<String, FormatError> {
        let field = self.take(len)?;
        Ok(String::from_utf8_lossy(field).trim().to_owned())
    }

    fn number<T: FromStr>(&mut self, len: usize, field: &'static str) -> Result<T, FormatError> {
        let offset = self.offset;
        let text = self.text(len)?;
        text.parse::<T>()
            .map_err(|_| FormatError::new(offset, FormatIssue::NotNumeric { field, text }))
    }

    /// One field for every channel, in channel order.
    fn column<T>(
        &mut self,
        count: usize,
        mut read: impl FnMut(&mut Self) -> Result<T, FormatError>,
    ) -> Result<Vec<T>, FormatError> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read(self)?);
        }
        Ok(out)
    }
}

/// Decodes a complete EDF file held in memory.
///
/// This is a pure function of `bytes`: the same input always yields the same
/// recording, and any defect aborts the whole decode.
pub fn decode(bytes: &[u8]) -> Result<ParsedRecording, FormatError> {
    let mut cursor = FieldCursor::new(bytes);
    let header = parse_header(&mut cursor)?;
    let channels = parse_channels(&mut cursor, header.num_channels)?;

    let required = FIXED_HEADER_LEN + header.num_channels * CHANNEL_HEADER_LEN;
    if header.header_bytes < required {
        return Err(FormatError::new(
            184,
            FormatIssue::HeaderTooShort {
                declared: header.header_bytes,
                required,
            },
        ));
    }

    let calibrations = calibrate(&channels)?;
    let samples = decode_samples(bytes, &header, &channels, &calibrations)?;
    let total_duration = header.num_data_records as f64 * header.record_duration;

    log::info!(
        "Decoded {} channels, {} records of {}s ({}s total)",
        channels.len(),
        header.num_data_records,
        header.record_duration,
        total_duration
    );

    Ok(ParsedRecording {
        header,
        channels,
        samples,
        total_duration,
    })
}

/// Reads and decodes a recording from disk.
pub fn read_recording(path: &Path) -> Result<ParsedRecording, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode(&bytes)?)
}

fn parse_header(cursor: &mut FieldCursor<'_>) -> Result<RecordingHeader, FormatError> {
    let version = cursor.text(8)?;
    let patient_id = cursor.text(80)?;
    let recording_id = cursor.text(80)?;
    let start_date = cursor.text(8)?;
    let start_time = cursor.text(8)?;
    let header_bytes = cursor.number::<usize>(8, "header byte count")?;
    let reserved = cursor.text(44)?;

    let records_offset = cursor.offset;
    let num_data_records = cursor.number::<i64>(8, "data record count")?;
    let num_data_records = usize::try_from(num_data_records).map_err(|_| {
        FormatError::new(
            records_offset,
            FormatIssue::InvalidValue {
                field: "data record count",
                text: num_data_records.to_string(),
            },
        )
    })?;

    let duration_offset = cursor.offset;
    let record_duration = cursor.number::<f64>(8, "data record duration")?;
    if !(record_duration.is_finite() && record_duration > 0.0) {
        return Err(FormatError::new(
            duration_offset,
            FormatIssue::InvalidValue {
                field: "data record duration",
                text: record_duration.to_string(),
            },
        ));
    }

    let num_channels = cursor.number::<usize>(4, "channel count")?;

    log::debug!(
        "EDF header: version={version:?} records={num_data_records} \
         duration={record_duration} channels={num_channels} header_bytes={header_bytes}"
    );

    Ok(RecordingHeader {
        version,
        patient_id,
        recording_id,
        start_date,
        start_time,
        header_bytes,
        reserved,
        num_data_records,
        record_duration,
        num_channels,
    })
}

fn parse_channels(
    cursor: &mut FieldCursor<'_>,
    count: usize,
) -> Result<Vec<ChannelDescriptor>, FormatError> {
    let labels = cursor.column(count, |c| c.text(16))?;
    let transducers = cursor.column(count, |c| c.text(80))?;
    let units = cursor.column(count, |c| c.text(8))?;
    let physical_mins = cursor.column(count, |c| c.number::<f64>(8, "physical minimum"))?;
    let physical_maxs = cursor.column(count, |c| c.number::<f64>(8, "physical maximum"))?;
    let digital_mins = cursor.column(count, |c| digital(c, "digital minimum"))?;
    let digital_maxs = cursor.column(count, |c| digital(c, "digital maximum"))?;
    let prefilterings = cursor.column(count, |c| c.text(80))?;
    let samples_per_record = cursor.column(count, |c| c.number::<usize>(8, "samples per record"))?;
    cursor.take(count * CHANNEL_RESERVED_LEN)?;

    let mut channels = Vec::with_capacity(count);
    for i in 0..count {
        channels.push(ChannelDescriptor {
            label: labels[i].clone(),
            transducer: transducers[i].clone(),
            physical_unit: units[i].clone(),
            physical_min: physical_mins[i],
            physical_max: physical_maxs[i],
            digital_min: digital_mins[i],
            digital_max: digital_maxs[i],
            prefiltering: prefilterings[i].clone(),
            samples_per_record: samples_per_record[i],
        });
        log::debug!("Channel {i}: {:?}", channels[i]);
    }

    let mut seen = HashSet::with_capacity(count);
    for (i, channel) in channels.iter().enumerate() {
        if !seen.insert(channel.label.as_str()) {
            log::warn!(
                "Channel {i} repeats label {:?}; annotations will join the first one",
                channel.label
            );
        }
    }
    Ok(channels)
}

/// Digital limits are integers, but some writers emit `-32768.0`.
fn digital(cursor: &mut FieldCursor<'_>, field: &'static str) -> Result<i32, FormatError> {
    let offset = cursor.offset;
    let text = cursor.text(8)?;
    if let Ok(value) = text.parse::<i32>() {
        return Ok(value);
    }
    match text.parse::<f64>() {
        Ok(value)
            if value.fract() == 0.0
                && value >= f64::from(i32::MIN)
                && value <= f64::from(i32::MAX) =>
        {
            Ok(value as i32)
        }
        _ => Err(FormatError::new(offset, FormatIssue::NotNumeric { field, text })),
    }
}

fn calibrate(channels: &[ChannelDescriptor]) -> Result<Vec<Calibration>, FormatError> {
    // Offset of the digital maximum block, for diagnostics.
    let digital_max_block = FIXED_HEADER_LEN + channels.len() * (16 + 80 + 8 + 8 + 8 + 8);
    channels
        .iter()
        .enumerate()
        .map(|(i, channel)| {
            channel.calibration().ok_or_else(|| {
                FormatError::new(
                    digital_max_block + i * 8,
                    FormatIssue::DegenerateCalibration {
                        channel: i,
                        label: channel.label.clone(),
                    },
                )
            })
        })
        .collect()
}

/// Walks the multiplexed record layout: records outer, channels inner,
/// samples innermost.
fn decode_samples(
    bytes: &[u8],
    header: &RecordingHeader,
    channels: &[ChannelDescriptor],
    calibrations: &[Calibration],
) -> Result<Vec<Vec<f32>>, FormatError> {
    let record_bytes: usize = channels
        .iter()
        .map(|c| c.samples_per_record * SAMPLE_BYTES)
        .sum();
    let needed = record_bytes
        .checked_mul(header.num_data_records)
        .and_then(|n| n.checked_add(header.header_bytes))
        .unwrap_or(usize::MAX);
    if bytes.len() < needed {
        return Err(FormatError::new(
            bytes.len(),
            FormatIssue::Truncated {
                needed,
                available: bytes.len(),
            },
        ));
    }

    let mut samples: Vec<Vec<f32>> = channels
        .iter()
        .map(|c| vec![0.0; header.num_data_records * c.samples_per_record])
        .collect();
    if record_bytes == 0 {
        return Ok(samples);
    }

    let data = &bytes[header.header_bytes..needed];
    for (record, chunk) in data.chunks_exact(record_bytes).enumerate() {
        let mut at = 0;
        for ((dest, channel), calibration) in samples.iter_mut().zip(channels).zip(calibrations) {
            let count = channel.samples_per_record;
            let raw = &chunk[at..at + count * SAMPLE_BYTES];
            let slot = &mut dest[record * count..(record + 1) * count];
            for (value, pair) in slot.iter_mut().zip(raw.chunks_exact(SAMPLE_BYTES)) {
                *value = calibration.apply(i16::from_le_bytes([pair[0], pair[1]]));
            }
            at += count * SAMPLE_BYTES;
        }
    }
    Ok(samples)
}
