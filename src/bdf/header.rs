//! BDF (BioSemi 24-bit EDF) header.
//!
//! # On-disk layout
//! ```text
//! fixed part (256 bytes, ASCII, space padded)
//!    8  version         0xFF "BIOSEMI"
//!   80  patient id
//!   80  recording id
//!    8  start date      dd.mm.yy
//!    8  start time      hh.mm.ss
//!    8  header bytes    256 × (ns + 1)
//!   44  reserved        "24BIT"
//!    8  n records       -1 if unknown
//!    8  record duration seconds
//!    4  ns              number of signals
//! per-signal part (ns × 256 bytes, field-major)
//!   16 label · 80 transducer · 8 physical dimension · 8 physical min ·
//!    8 physical max · 8 digital min · 8 digital max · 80 prefilter ·
//!    8 samples per record · 32 reserved
//! ```
use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Label of the BioSemi trigger / status channel.
pub const STATUS_LABEL: &str = "Status";

/// Size of the fixed header part and of each signal's header block.
pub const BLOCK_BYTES: usize = 256;

/// Bytes per stored sample.
pub const BYTES_PER_SAMPLE: usize = 3;

/// One signal (channel) header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHeader {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefilter: String,
    pub samples_per_record: usize,
}

impl SignalHeader {
    /// An EEG electrode channel with the usual BioSemi ±262 mV range in µV.
    pub fn electrode(label: &str, samples_per_record: usize) -> Self {
        Self {
            label: label.to_string(),
            transducer: "Active Electrode".to_string(),
            physical_dimension: "uV".to_string(),
            physical_min: -262_144.0,
            physical_max: 262_143.0,
            digital_min: -8_388_608,
            digital_max: 8_388_607,
            prefilter: "HP:DC; LP:417 Hz".to_string(),
            samples_per_record,
        }
    }

    /// The trigger status channel.
    pub fn status(samples_per_record: usize) -> Self {
        Self {
            label: STATUS_LABEL.to_string(),
            transducer: "Triggers and Status".to_string(),
            physical_dimension: "Boolean".to_string(),
            physical_min: -8_388_608.0,
            physical_max: 8_388_607.0,
            digital_min: -8_388_608,
            digital_max: 8_388_607,
            prefilter: "No filtering".to_string(),
            samples_per_record,
        }
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        self.label.eq_ignore_ascii_case(STATUS_LABEL)
    }

    /// Physical units per digital step.
    #[inline]
    pub fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    /// Multiplier taking physical units to SI (volts for EEG channels).
    pub fn unit_scale(&self) -> f64 {
        match self.physical_dimension.trim() {
            "uV" | "µV" => 1e-6,
            "mV" => 1e-3,
            "nV" => 1e-9,
            _ => 1.0,
        }
    }

    /// Digital sample → SI value.
    #[inline]
    pub fn calibrate(&self, digital: i32) -> f64 {
        let physical = (digital - self.digital_min) as f64 * self.gain() + self.physical_min;
        physical * self.unit_scale()
    }

    /// SI value → nearest representable digital sample.
    pub fn digitize(&self, value: f64) -> i32 {
        let physical = value / self.unit_scale();
        let d = ((physical - self.physical_min) / self.gain()).round() + self.digital_min as f64;
        d.clamp(self.digital_min as f64, self.digital_max as f64) as i32
    }
}

/// Parsed BDF header.
#[derive(Debug, Clone, PartialEq)]
pub struct BdfHeader {
    pub patient: String,
    pub recording: String,
    /// Recorder clock time of the first sample.
    pub start: NaiveDateTime,
    pub header_bytes: usize,
    /// `None` when the file says `-1` (recording not closed cleanly).
    pub n_records: Option<usize>,
    /// Seconds per data record.
    pub record_duration: f64,
    pub signals: Vec<SignalHeader>,
}

impl BdfHeader {
    /// Build a header for writing.  `n_records` is filled in by the writer.
    pub fn new(start: NaiveDateTime, record_duration: f64, signals: Vec<SignalHeader>) -> Self {
        Self {
            patient: "X X X X".to_string(),
            recording: "Startdate X X X X".to_string(),
            start,
            header_bytes: BLOCK_BYTES * (signals.len() + 1),
            n_records: None,
            record_duration,
            signals,
        }
    }

    /// Sampling rate, taken from the first signal.
    pub fn sfreq(&self) -> f64 {
        self.signals
            .first()
            .map(|s| s.samples_per_record as f64 / self.record_duration)
            .unwrap_or(0.0)
    }

    /// Samples per record (all signals share it; checked on read).
    pub fn samples_per_record(&self) -> usize {
        self.signals.first().map(|s| s.samples_per_record).unwrap_or(0)
    }

    /// Bytes in one data record.
    pub fn record_bytes(&self) -> usize {
        self.signals
            .iter()
            .map(|s| s.samples_per_record * BYTES_PER_SAMPLE)
            .sum()
    }

    /// Index of the status channel, if any.
    pub fn status_index(&self) -> Option<usize> {
        self.signals.iter().position(SignalHeader::is_status)
    }

    /// Indices of the non-status channels, in file order.
    pub fn data_indices(&self) -> Vec<usize> {
        (0..self.signals.len())
            .filter(|&i| !self.signals[i].is_status())
            .collect()
    }
}

/// Read and validate a BDF header from the start of `r`.
pub fn read_header<R: Read>(r: &mut R) -> Result<BdfHeader> {
    let mut fixed = [0u8; BLOCK_BYTES];
    r.read_exact(&mut fixed).context("reading BDF fixed header")?;

    if fixed[0] != 0xFF || &fixed[1..8] != b"BIOSEMI" {
        bail!("not a BDF file (bad version field)");
    }
    let patient = ascii_field(&fixed[8..88]);
    let recording = ascii_field(&fixed[88..168]);
    let date = ascii_field(&fixed[168..176]);
    let time = ascii_field(&fixed[176..184]);
    let header_bytes: usize = number_field(&fixed[184..192], "header bytes")?;
    let n_records: i64 = number_field(&fixed[236..244], "number of records")?;
    let record_duration: f64 = number_field(&fixed[244..252], "record duration")?;
    let ns: usize = number_field(&fixed[252..256], "number of signals")?;

    if header_bytes != BLOCK_BYTES * (ns + 1) {
        bail!("header size {header_bytes} inconsistent with {ns} signals");
    }
    if record_duration <= 0.0 {
        bail!("record duration must be positive, got {record_duration}");
    }
    let start = parse_start(&date, &time)?;

    let mut block = vec![0u8; BLOCK_BYTES * ns];
    r.read_exact(&mut block).context("reading BDF signal headers")?;

    // Fields are stored field-major: all labels, then all transducers, …
    let mut cursor = 0usize;
    let mut take = |width: usize| -> Vec<String> {
        let out = (0..ns)
            .map(|i| ascii_field(&block[cursor + i * width..cursor + (i + 1) * width]))
            .collect();
        cursor += width * ns;
        out
    };
    let labels = take(16);
    let transducers = take(80);
    let dims = take(8);
    let pmins = take(8);
    let pmaxs = take(8);
    let dmins = take(8);
    let dmaxs = take(8);
    let prefilters = take(80);
    let sprs = take(8);

    let mut signals = Vec::with_capacity(ns);
    for i in 0..ns {
        signals.push(SignalHeader {
            label: labels[i].clone(),
            transducer: transducers[i].clone(),
            physical_dimension: dims[i].clone(),
            physical_min: parse_str(&pmins[i], "physical min")?,
            physical_max: parse_str(&pmaxs[i], "physical max")?,
            digital_min: parse_str(&dmins[i], "digital min")?,
            digital_max: parse_str(&dmaxs[i], "digital max")?,
            prefilter: prefilters[i].clone(),
            samples_per_record: parse_str(&sprs[i], "samples per record")?,
        });
    }

    if let Some(first) = signals.first() {
        if let Some(odd) = signals.iter().find(|s| s.samples_per_record != first.samples_per_record) {
            bail!(
                "mixed sampling rates are not supported ({} has {} samples/record, {} has {})",
                first.label, first.samples_per_record, odd.label, odd.samples_per_record
            );
        }
    }

    Ok(BdfHeader {
        patient,
        recording,
        start,
        header_bytes,
        n_records: usize::try_from(n_records).ok(),
        record_duration,
        signals,
    })
}

/// Serialise `header` (with `n_records` records) into its on-disk bytes.
pub fn encode_header(header: &BdfHeader, n_records: usize) -> Vec<u8> {
    let ns = header.signals.len();
    let mut out = Vec::with_capacity(BLOCK_BYTES * (ns + 1));
    out.push(0xFF);
    out.extend_from_slice(b"BIOSEMI");
    push_field(&mut out, &header.patient, 80);
    push_field(&mut out, &header.recording, 80);
    push_field(&mut out, &header.start.format("%d.%m.%y").to_string(), 8);
    push_field(&mut out, &header.start.format("%H.%M.%S").to_string(), 8);
    push_field(&mut out, &(BLOCK_BYTES * (ns + 1)).to_string(), 8);
    push_field(&mut out, "24BIT", 44);
    push_field(&mut out, &n_records.to_string(), 8);
    push_field(&mut out, &format_number(header.record_duration), 8);
    push_field(&mut out, &ns.to_string(), 4);

    let s = &header.signals;
    s.iter().for_each(|c| push_field(&mut out, &c.label, 16));
    s.iter().for_each(|c| push_field(&mut out, &c.transducer, 80));
    s.iter().for_each(|c| push_field(&mut out, &c.physical_dimension, 8));
    s.iter().for_each(|c| push_field(&mut out, &format_number(c.physical_min), 8));
    s.iter().for_each(|c| push_field(&mut out, &format_number(c.physical_max), 8));
    s.iter().for_each(|c| push_field(&mut out, &c.digital_min.to_string(), 8));
    s.iter().for_each(|c| push_field(&mut out, &c.digital_max.to_string(), 8));
    s.iter().for_each(|c| push_field(&mut out, &c.prefilter, 80));
    s.iter().for_each(|c| push_field(&mut out, &c.samples_per_record.to_string(), 8));
    s.iter().for_each(|_| push_field(&mut out, "", 32));
    out
}

// ── Field helpers ────────────────────────────────────────────────────────

fn ascii_field(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}

fn number_field<T: std::str::FromStr>(raw: &[u8], what: &str) -> Result<T> {
    parse_str(&ascii_field(raw), what)
}

fn parse_str<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {what} field: '{s}'"))
}

/// `dd.mm.yy` + `hh.mm.ss`; two-digit years 85–99 are 19xx, 00–84 are 20xx.
fn parse_start(date: &str, time: &str) -> Result<NaiveDateTime> {
    let d: Vec<u32> = split_triplet(date, "start date")?;
    let t: Vec<u32> = split_triplet(time, "start time")?;
    let year = if d[2] >= 85 { 1900 + d[2] } else { 2000 + d[2] } as i32;
    let date = NaiveDate::from_ymd_opt(year, d[1], d[0])
        .with_context(|| format!("invalid start date {date}"))?;
    let time = NaiveTime::from_hms_opt(t[0], t[1], t[2])
        .with_context(|| format!("invalid start time {time}"))?;
    Ok(NaiveDateTime::new(date, time))
}

fn split_triplet(s: &str, what: &str) -> Result<Vec<u32>> {
    let parts: Vec<u32> = s
        .split(['.', ':'])
        .map(|p| parse_str::<u32>(p, what))
        .collect::<Result<_>>()?;
    if parts.len() != 3 {
        bail!("invalid {what} field: '{s}'");
    }
    Ok(parts)
}

fn push_field(out: &mut Vec<u8>, value: &str, width: usize) {
    let bytes: Vec<u8> = value.bytes().take(width).collect();
    let pad = width - bytes.len();
    out.extend_from_slice(&bytes);
    out.extend(std::iter::repeat(b' ').take(pad));
}

/// Shortest decimal representation that fits the 8-character fields.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v}");
        s.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 6, 2)
            .unwrap()
            .and_hms_opt(9, 41, 7)
            .unwrap()
    }

    #[test]
    fn header_round_trip() {
        let header = BdfHeader::new(
            start(),
            1.0,
            vec![SignalHeader::electrode("EXG1", 2048), SignalHeader::status(2048)],
        );
        let bytes = encode_header(&header, 12);
        assert_eq!(bytes.len(), 3 * BLOCK_BYTES);

        let parsed = read_header(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.start, start());
        assert_eq!(parsed.n_records, Some(12));
        assert_eq!(parsed.signals.len(), 2);
        assert_eq!(parsed.status_index(), Some(1));
        assert_eq!(parsed.data_indices(), vec![0]);
        assert_eq!(parsed.sfreq(), 2048.0);
        assert_eq!(parsed.signals[0], header.signals[0]);
    }

    #[test]
    fn rejects_edf_version() {
        let mut bytes = encode_header(&BdfHeader::new(start(), 1.0, vec![]), 0);
        bytes[0] = b'0';
        assert!(read_header(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn two_digit_year_window() {
        assert_eq!(parse_start("31.12.99", "23.59.59").unwrap().format("%Y").to_string(), "1999");
        assert_eq!(parse_start("01.01.12", "00.00.00").unwrap().format("%Y").to_string(), "2012");
    }

    #[test]
    fn calibration_inverts_digitize() {
        let s = SignalHeader::electrode("Cz", 1);
        let v = 12.5e-6;
        let d = s.digitize(v);
        approx::assert_abs_diff_eq!(s.calibrate(d), v, epsilon = s.gain() * 1e-6);
    }
}
