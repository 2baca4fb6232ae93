//! Builds EDF byte streams for tests.

#![allow(dead_code)]

pub struct Channel {
    pub label: &'static str,
    pub physical: (f64, f64),
    pub digital: (i32, i32),
    pub samples_per_record: usize,
    /// Raw samples for the whole recording, record after record.
    pub raw: Vec<i16>,
}

impl Channel {
    pub fn new(label: &'static str, samples_per_record: usize, raw: Vec<i16>) -> Self {
        Self {
            label,
            physical: (-200.0, 200.0),
            digital: (-2048, 2047),
            samples_per_record,
            raw,
        }
    }

    pub fn ranges(mut self, physical: (f64, f64), digital: (i32, i32)) -> Self {
        self.physical = physical;
        self.digital = digital;
        self
    }
}

fn field(out: &mut Vec<u8>, text: &str, len: usize) {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(len, b' ');
    out.extend_from_slice(&bytes[..len]);
}

/// Header bytes only, with one entry per channel.
pub fn header(records: usize, record_duration: f64, channels: &[Channel]) -> Vec<u8> {
    let ns = channels.len();
    let mut out = Vec::new();
    field(&mut out, "0", 8);
    field(&mut out, "X M 01-JAN-1970 Test", 80);
    field(&mut out, "Startdate 01-JAN-2024 test", 80);
    field(&mut out, "01.01.24", 8);
    field(&mut out, "09.00.00", 8);
    field(&mut out, &(256 + ns * 256).to_string(), 8);
    field(&mut out, "", 44);
    field(&mut out, &records.to_string(), 8);
    field(&mut out, &record_duration.to_string(), 8);
    field(&mut out, &ns.to_string(), 4);

    for c in channels {
        field(&mut out, c.label, 16);
    }
    for _ in channels {
        field(&mut out, "AgAgCl electrode", 80);
    }
    for _ in channels {
        field(&mut out, "uV", 8);
    }
    for c in channels {
        field(&mut out, &c.physical.0.to_string(), 8);
    }
    for c in channels {
        field(&mut out, &c.physical.1.to_string(), 8);
    }
    for c in channels {
        field(&mut out, &c.digital.0.to_string(), 8);
    }
    for c in channels {
        field(&mut out, &c.digital.1.to_string(), 8);
    }
    for _ in channels {
        field(&mut out, "HP:0.1Hz LP:75Hz", 80);
    }
    for c in channels {
        field(&mut out, &c.samples_per_record.to_string(), 8);
    }
    for _ in channels {
        field(&mut out, "", 32);
    }
    out
}

/// A complete file: header followed by multiplexed records.
pub fn edf(records: usize, record_duration: f64, channels: &[Channel]) -> Vec<u8> {
    let mut out = header(records, record_duration, channels);
    for record in 0..records {
        for c in channels {
            let n = c.samples_per_record;
            for value in &c.raw[record * n..(record + 1) * n] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    out
}

/// Two EEG channels at different rates plus an annotation channel.
pub fn sample_recording() -> Vec<u8> {
    let records = 10;
    edf(
        records,
        1.0,
        &[
            Channel::new("Fp1", 4, (0..records as i16 * 4).collect()),
            Channel::new("Fp2", 2, (0..records as i16 * 2).map(|v| -v).collect()),
            Channel::new("EDF Annotations", 1, vec![0; records])
                .ranges((-1.0, 1.0), (-32768, 32767)),
            Channel::new("C3", 4, vec![100; records * 4]),
        ],
    )
}

pub const SAMPLE_TABLE: &str = "\
Gender,Age,File Start,Start time,End time,Channel names,Comment
F,29,09:00:00,09:00:02,09:00:03:500,Fp1 Fp2,Spike
,,,09:00:05,09:00:06,C3,
,,,09:00:07,09:00:08,Oz,Artifact
";
