//! Raw BDF data reader.
//!
//! # Algorithm
//! 1. Parse the header (fixed part + per-signal part).
//! 2. Derive the record count from the file size when the header says `-1`.
//! 3. On demand, seek to the records covering a sample range and decode
//!    little-endian signed 24-bit samples.
//!
//! # Calibration
//! ```text
//! value[ch, t] = ((digital − dig_min) × (phys_max − phys_min) / (dig_max − dig_min) + phys_min) × unit
//! ```
//! where `unit` converts µV to V.  The status channel is returned raw.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use super::header::{encode_header, read_header, BdfHeader, BYTES_PER_SAMPLE};

/// Only the low 24 bits of a status sample are meaningful.
const STATUS_BITS: u32 = 0x00FF_FFFF;

/// An opened (not preloaded) BDF recording.
#[derive(Debug, Clone)]
pub struct RawBdf {
    pub header: BdfHeader,
    /// Complete records present in the file.
    pub n_records: usize,
    /// File this was read from (for lazy re-reads).
    pub path: PathBuf,
}

impl RawBdf {
    #[inline]
    pub fn sfreq(&self) -> f64 {
        self.header.sfreq()
    }

    /// Total number of time points.
    #[inline]
    pub fn n_times(&self) -> usize {
        self.n_records * self.header.samples_per_record()
    }

    /// Total duration in seconds.
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq()
    }

    /// Labels of the data (non-status) channels.
    pub fn ch_names(&self) -> Vec<String> {
        self.header
            .data_indices()
            .into_iter()
            .map(|i| self.header.signals[i].label.clone())
            .collect()
    }

    /// Read **all** data channels into a calibrated `[n_chan, n_times]` array.
    pub fn read_all_data(&self) -> Result<Array2<f64>> {
        self.read_slice(0, self.n_times())
    }

    /// Read the data channels over the half-open sample range `[start, end)`.
    pub fn read_slice(&self, start: usize, end: usize) -> Result<Array2<f64>> {
        let end = end.min(self.n_times());
        if start > end {
            bail!("invalid slice [{start}, {end})");
        }
        let picks = self.header.data_indices();
        let mut out = Array2::<f64>::zeros((picks.len(), end - start));
        self.for_each_record(start, end, |rec_base, samples| {
            for (row, &sig) in picks.iter().enumerate() {
                let chan = &self.header.signals[sig];
                copy_overlap(rec_base, start, end, &samples[sig], |t, d| {
                    out[[row, t]] = chan.calibrate(d);
                });
            }
        })?;
        Ok(out)
    }

    /// Read the status channel (low 24 bits) for the whole file.
    ///
    /// Returns an empty vector when the recording has no status channel.
    pub fn read_status(&self) -> Result<Vec<u32>> {
        let Some(sig) = self.header.status_index() else {
            return Ok(Vec::new());
        };
        let n = self.n_times();
        let mut out = vec![0u32; n];
        self.for_each_record(0, n, |rec_base, samples| {
            copy_overlap(rec_base, 0, n, &samples[sig], |t, d| {
                out[t] = d as u32 & STATUS_BITS;
            });
        })?;
        Ok(out)
    }

    /// Decode every record overlapping `[start, end)` and hand the per-signal
    /// digital samples to `visit` together with the record's first sample.
    fn for_each_record<F>(&self, start: usize, end: usize, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &[Vec<i32>]),
    {
        let spr = self.header.samples_per_record();
        if spr == 0 || start >= end {
            return Ok(());
        }
        let first_rec = start / spr;
        let last_rec = (end - 1) / spr;
        let rec_bytes = self.header.record_bytes();

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(
            (self.header.header_bytes + first_rec * rec_bytes) as u64,
        ))?;

        let mut buf = vec![0u8; rec_bytes];
        let mut samples: Vec<Vec<i32>> = self
            .header
            .signals
            .iter()
            .map(|s| vec![0; s.samples_per_record])
            .collect();

        for rec in first_rec..=last_rec {
            reader
                .read_exact(&mut buf)
                .with_context(|| format!("reading record {rec} of {}", self.path.display()))?;
            let mut off = 0;
            for chan in samples.iter_mut() {
                for v in chan.iter_mut() {
                    *v = decode_i24(&buf[off..off + BYTES_PER_SAMPLE]);
                    off += BYTES_PER_SAMPLE;
                }
            }
            visit(rec * spr, &samples);
        }
        Ok(())
    }
}

/// Open a BDF file and return a `RawBdf` without preloading data.
pub fn open_raw<P: AsRef<Path>>(path: P) -> Result<RawBdf> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let file_len = file.metadata()?.len() as usize;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader)
        .with_context(|| format!("parsing header of {}", path.display()))?;

    let rec_bytes = header.record_bytes();
    let available = if rec_bytes == 0 {
        0
    } else {
        file_len.saturating_sub(header.header_bytes) / rec_bytes
    };
    let n_records = match header.n_records {
        Some(n) if n <= available => n,
        Some(n) => {
            log::warn!(
                "{}: header claims {n} records but only {available} are present",
                path.display()
            );
            available
        }
        None => available,
    };

    Ok(RawBdf { header, n_records, path: path.to_path_buf() })
}

/// Write a BDF file.
///
/// `data` holds the non-status channels in header order (SI units);
/// `status` is the raw trigger word per sample.  The tail of the last record
/// is zero-padded.
pub fn write_raw<P: AsRef<Path>>(
    path: P,
    header: &BdfHeader,
    data: &Array2<f64>,
    status: &[u32],
) -> Result<()> {
    let path = path.as_ref();
    let picks = header.data_indices();
    if picks.len() != data.nrows() {
        bail!("{} data rows for {} data channels", data.nrows(), picks.len());
    }
    let n_t = data.ncols().max(status.len());
    let spr = header.samples_per_record();
    if spr == 0 {
        bail!("samples per record must be positive");
    }
    let n_records = n_t.div_ceil(spr);

    let mut f = std::io::BufWriter::new(
        File::create(path).with_context(|| format!("create {}", path.display()))?,
    );
    f.write_all(&encode_header(header, n_records))?;

    for rec in 0..n_records {
        for (sig, chan) in header.signals.iter().enumerate() {
            for k in 0..spr {
                let t = rec * spr + k;
                let d = if chan.is_status() {
                    status.get(t).map(|&s| (s & STATUS_BITS) as i32).unwrap_or(0)
                } else {
                    let row = picks.iter().position(|&p| p == sig).unwrap_or(0);
                    if t < data.ncols() { chan.digitize(data[[row, t]]) } else { 0 }
                };
                f.write_all(&encode_i24(d))?;
            }
        }
    }
    f.flush()?;
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Call `put(t − start, value)` for every sample of one record that falls
/// inside `[start, end)`.
fn copy_overlap(rec_base: usize, start: usize, end: usize, rec: &[i32], mut put: impl FnMut(usize, i32)) {
    for (k, &d) in rec.iter().enumerate() {
        let t = rec_base + k;
        if t >= start && t < end {
            put(t - start, d);
        }
    }
}

/// Little-endian signed 24-bit.
#[inline]
fn decode_i24(b: &[u8]) -> i32 {
    let v = (b[0] as i32) | ((b[1] as i32) << 8) | ((b[2] as i32) << 16);
    (v << 8) >> 8
}

#[inline]
fn encode_i24(v: i32) -> [u8; 3] {
    let b = v.to_le_bytes();
    [b[0], b[1], b[2]]
}
