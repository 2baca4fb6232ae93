//! Re-referencing of the display channels.

use ndarray::{Array2, Axis};

use crate::ParsedRecording;

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Montage {
    /// Channels as recorded.
    #[default]
    Referential,
    /// Each sample minus the mean over channels at that instant.
    AverageReference,
    /// Longitudinal bipolar ("double banana") chains.
    LongitudinalBipolar,
}

/// Electrode pairs of the longitudinal bipolar montage, anterior to posterior.
pub const BIPOLAR_PAIRS: [(&str, &str); 18] = [
    ("FP1", "F7"),
    ("F7", "T3"),
    ("T3", "T5"),
    ("T5", "O1"),
    ("FP2", "F8"),
    ("F8", "T4"),
    ("T4", "T6"),
    ("T6", "O2"),
    ("FP1", "F3"),
    ("F3", "C3"),
    ("C3", "P3"),
    ("P3", "O1"),
    ("FP2", "F4"),
    ("F4", "C4"),
    ("C4", "P4"),
    ("P4", "O2"),
    ("FZ", "CZ"),
    ("CZ", "PZ"),
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MontageError {
    #[error("average reference needs equal channel lengths, got {shortest} and {longest} samples")]
    UnequalLengths { shortest: usize, longest: usize },
}

/// A channel as displayed under a montage.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedChannel {
    pub label: String,
    /// Index of the recording channel lane events should join against.
    pub source: usize,
    pub samples: Vec<f32>,
}

pub fn apply_montage(
    recording: &ParsedRecording,
    montage: Montage,
) -> Result<Vec<DerivedChannel>, MontageError> {
    let lanes = recording.display_channels();
    match montage {
        Montage::Referential => Ok(lanes
            .into_iter()
            .map(|i| DerivedChannel {
                label: recording.channels[i].label.clone(),
                source: i,
                samples: recording.samples[i].clone(),
            })
            .collect()),
        Montage::AverageReference => {
            let data: Vec<&[f32]> = lanes
                .iter()
                .map(|&i| recording.samples[i].as_slice())
                .collect();
            let referenced = compute_average_reference(&data)?;
            Ok(lanes
                .into_iter()
                .zip(referenced)
                .map(|(i, samples)| DerivedChannel {
                    label: recording.channels[i].label.clone(),
                    source: i,
                    samples,
                })
                .collect())
        }
        Montage::LongitudinalBipolar => Ok(bipolar_chains(recording, &lanes)),
    }
}

/// Subtracts the across-channel mean at every time point.
pub fn compute_average_reference(data: &[&[f32]]) -> Result<Vec<Vec<f32>>, MontageError> {
    let Some(first) = data.first() else {
        return Ok(Vec::new());
    };
    let num_time_points = first.len();
    let shortest = data.iter().map(|ch| ch.len()).min().unwrap_or(0);
    let longest = data.iter().map(|ch| ch.len()).max().unwrap_or(0);
    if shortest != longest {
        return Err(MontageError::UnequalLengths { shortest, longest });
    }

    let mut matrix = Array2::<f32>::zeros((data.len(), num_time_points));
    for (mut row, channel) in matrix.outer_iter_mut().zip(data) {
        row.assign(&ndarray::ArrayView1::from(*channel));
    }
    if let Some(average) = matrix.mean_axis(Axis(0)) {
        matrix -= &average;
    }
    Ok(matrix.outer_iter().map(|row| row.to_vec()).collect())
}

fn bipolar_chains(recording: &ParsedRecording, lanes: &[usize]) -> Vec<DerivedChannel> {
    let find = |electrode: &str| {
        lanes
            .iter()
            .copied()
            .find(|&i| electrode_name(&recording.channels[i].label) == electrode)
    };

    let mut derived = Vec::new();
    for (anode, cathode) in BIPOLAR_PAIRS {
        let (Some(a), Some(b)) = (find(anode), find(cathode)) else {
            log::debug!("Skipping bipolar pair {anode}-{cathode}: electrode not recorded");
            continue;
        };
        let samples = recording.samples[a]
            .iter()
            .zip(&recording.samples[b])
            .map(|(x, y)| x - y)
            .collect();
        derived.push(DerivedChannel {
            label: format!("{}-{}", pretty(anode), pretty(cathode)),
            source: a,
            samples,
        });
    }
    derived
}

/// `"EEG Fp1-REF"` becomes `"FP1"`.
pub fn electrode_name(label: &str) -> String {
    let label = label.trim();
    let label = label
        .strip_prefix("EEG ")
        .or_else(|| label.strip_prefix("eeg "))
        .unwrap_or(label);
    label
        .split('-')
        .next()
        .unwrap_or(label)
        .trim()
        .to_ascii_uppercase()
}

/// Conventional casing for display: `FP1` as `Fp1`, `CZ` as `Cz`.
fn pretty(electrode: &str) -> String {
    let mut chars = electrode.chars();
    match chars.next() {
        Some(first) => first.to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelDescriptor;

    fn recording(channels: &[(&str, Vec<f32>)]) -> ParsedRecording {
        ParsedRecording {
            channels: channels
                .iter()
                .map(|(label, _)| ChannelDescriptor {
                    label: (*label).to_owned(),
                    samples_per_record: 1,
                    ..Default::default()
                })
                .collect(),
            samples: channels.iter().map(|(_, s)| s.clone()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn average_reference_removes_common_mode() {
        let a: [f32; 3] = [1.0, 2.0, 3.0];
        let b: [f32; 3] = [3.0, 2.0, 1.0];
        let out = compute_average_reference(&[&a[..], &b[..]]).expect("equal lengths");
        assert_eq!(out, vec![vec![-1.0, 0.0, 1.0], vec![1.0, 0.0, -1.0]]);
    }

    #[test]
    fn average_reference_rejects_ragged_input() {
        let a: [f32; 2] = [1.0, 2.0];
        let b: [f32; 1] = [1.0];
        assert_eq!(
            compute_average_reference(&[&a[..], &b[..]]),
            Err(MontageError::UnequalLengths {
                shortest: 1,
                longest: 2
            })
        );
    }

    #[test]
    fn annotation_channel_is_not_a_lane() {
        let rec = recording(&[
            ("Fp1", vec![1.0]),
            ("EDF Annotations", vec![0.0]),
            ("Fp2", vec![3.0]),
        ]);
        let out = apply_montage(&rec, Montage::AverageReference).expect("montage");
        let labels: Vec<_> = out.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Fp1", "Fp2"]);
        assert_eq!(out[0].samples, vec![-1.0]);
    }

    #[test]
    fn bipolar_pairs_match_loosely_named_electrodes() {
        let rec = recording(&[
            ("EEG Fp1-REF", vec![5.0, 5.0]),
            ("EEG F7-REF", vec![2.0, 1.0]),
            ("EEG T3-REF", vec![1.0, 1.0]),
        ]);
        let out = apply_montage(&rec, Montage::LongitudinalBipolar).expect("montage");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "Fp1-F7");
        assert_eq!(out[0].samples, vec![3.0, 4.0]);
        assert_eq!(out[0].source, 0);
        assert_eq!(out[1].label, "F7-T3");
    }

    #[test]
    fn electrode_names_are_normalised() {
        assert_eq!(electrode_name("EEG Cz-LE"), "CZ");
        assert_eq!(electrode_name(" o2 "), "O2");
    }
}
