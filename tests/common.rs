//! Shared helpers: synthetic BDF recordings, trigger trains and tone logs.
#![allow(unused)]
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use fmed_eeg::bdf::{write_raw, BdfHeader, SignalHeader};
use fmed_eeg::classifier::tone_log_path;
use fmed_eeg::{ProtocolVariant, TriggerEvent};
use ndarray::Array2;

pub const EXG: [&str; 6] = ["EXG1", "EXG2", "EXG3", "EXG4", "EXG5", "EXG6"];

/// Events with trigger code 1 at the given samples.
pub fn at(samples: &[u64]) -> Vec<TriggerEvent> {
    samples.iter().map(|&sample| TriggerEvent { sample, trigger: 1 }).collect()
}

/// `n` onsets starting at `first`, `period` samples apart.
pub fn train(first: u64, period: u64, n: usize) -> Vec<u64> {
    (0..n as u64).map(|k| first + k * period).collect()
}

/// Status trace of `len` samples with a `width`-sample pulse of code 1 at
/// every onset.
pub fn status_from_onsets(onsets: &[u64], width: usize, len: usize) -> Vec<u32> {
    let mut status = vec![0u32; len];
    for &o in onsets {
        let o = o as usize;
        let end = (o + width).min(len);
        status[o..end].fill(1);
    }
    status
}

/// 3 June 2013 (day 154) at `hour:minute`.
pub fn recorded(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 6, 3).unwrap().and_hms_opt(hour, minute, 0).unwrap()
}

/// Write a BioSemi-like file: EXG1–EXG6 plus Status, one-second records.
///
/// Every channel carries a small sine (a few µV) with a 5 µV bump 100 ms
/// after each onset, so epochs have something to average.
pub fn write_bdf(path: &Path, sfreq: usize, start: NaiveDateTime, onsets: &[u64], n_times: usize) {
    let mut signals: Vec<SignalHeader> = EXG.iter().map(|l| SignalHeader::electrode(l, sfreq)).collect();
    signals.push(SignalHeader::status(sfreq));
    let header = BdfHeader::new(start, 1.0, signals);

    let fs = sfreq as f64;
    let mut data = Array2::<f64>::from_shape_fn((EXG.len(), n_times), |(c, t)| {
        let t = t as f64 / fs;
        2e-6 * (2.0 * std::f64::consts::PI * (3.0 + c as f64) * t).sin()
    });
    let bump = (0.1 * fs) as usize;
    for &o in onsets {
        let s = o as usize + bump;
        if s < n_times {
            data.column_mut(s).mapv_inplace(|v| v + 5e-6);
        }
    }
    let status = status_from_onsets(onsets, 3, n_times);
    write_raw(path, &header, &data, &status).unwrap();
}

/// `<root>/study/raw-data/<subject>/<file>`, directories created.
pub fn study_path(root: &Path, subject: &str, file: &str) -> PathBuf {
    let dir = root.join("study").join("raw-data").join(subject);
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(file)
}

/// Write the same tone line into all four sequence files of `variant`.
pub fn write_tone_logs(tone_dir: &Path, variant: ProtocolVariant, tones: &str) {
    for which in 0..4 {
        let path = tone_log_path(tone_dir, variant, which);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{tones}\n")).unwrap();
    }
}

/// `n` tone identifiers alternating in pairs: a,a,b,b,a,a,...
pub fn paired_tones(n: usize) -> String {
    (0..n)
        .map(|i| if (i / 2) % 2 == 0 { "1000" } else { "1200" })
        .collect::<Vec<_>>()
        .join(",")
}

/// Width and height from a PNG's IHDR chunk.
pub fn png_size(path: &Path) -> (u32, u32) {
    let bytes = std::fs::read(path).unwrap();
    let be = |i: usize| u32::from_be_bytes(bytes[i..i + 4].try_into().unwrap());
    (be(16), be(20))
}
