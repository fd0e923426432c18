//! Event-locked epoching.
//!
//! Cuts a `[C, T]` recording into one window `[tmin, tmax]` around each
//! event, drops windows that run past the data or touch a BAD annotation,
//! and subtracts the per-channel mean over `[tmin, 0]` from each kept epoch.
use ndarray::{s, Array2, Array3, Axis};

use crate::annotations::Annotations;
use crate::events::{ClassifiedEvent, EventLabel};
use crate::evoked::Evoked;

/// Epochs of one recording, `[E, C, T]`.
#[derive(Debug, Clone)]
pub struct Epochs {
    pub data: Array3<f64>,
    pub ch_names: Vec<String>,
    pub sfreq: f64,
    /// Epoch time axis in seconds relative to the event.
    pub times: Vec<f64>,
    /// The event of each kept epoch.
    pub events: Vec<ClassifiedEvent>,
    pub n_dropped_bad: usize,
    pub n_dropped_edge: usize,
}

/// Sample offsets covered by `[tmin, tmax]` at `sfreq` (both ends included).
pub fn window_offsets(tmin: f64, tmax: f64, sfreq: f64) -> (i64, i64) {
    ((tmin * sfreq).round() as i64, (tmax * sfreq).round() as i64)
}

/// Cut epochs around `events`.
///
/// `first_samp` is the file sample index of `data[:, 0]`; event samples are
/// in file time.  Annotation onsets are seconds from `data[:, 0]`.
pub fn extract_epochs(
    data: &Array2<f64>,
    ch_names: &[String],
    sfreq: f64,
    first_samp: u64,
    events: &[ClassifiedEvent],
    (tmin, tmax): (f64, f64),
    annotations: &Annotations,
) -> Epochs {
    let (n_ch, n_t) = data.dim();
    let (off_start, off_stop) = window_offsets(tmin, tmax, sfreq);
    let n_s = (off_stop - off_start + 1).max(0) as usize;
    let times: Vec<f64> = (off_start..=off_stop).map(|k| k as f64 / sfreq).collect();
    let n_baseline = times.iter().take_while(|&&t| t <= 0.0).count();

    let mut kept = Vec::new();
    let (mut n_dropped_bad, mut n_dropped_edge) = (0, 0);
    for ev in events {
        let start = ev.sample as i64 - first_samp as i64 + off_start;
        if start < 0 || start as usize + n_s > n_t {
            n_dropped_edge += 1;
            continue;
        }
        let start = start as usize;
        let (t0, t1) = (start as f64 / sfreq, (start + n_s - 1) as f64 / sfreq);
        if annotations.rejects(t0, t1) {
            n_dropped_bad += 1;
            continue;
        }
        kept.push((start, *ev));
    }

    let mut out = Array3::<f64>::zeros((kept.len(), n_ch, n_s));
    for (e, (start, _)) in kept.iter().enumerate() {
        let mut ep = out.index_axis_mut(Axis(0), e);
        ep.assign(&data.slice(s![.., *start..*start + n_s]));
        if n_baseline > 0 {
            for mut row in ep.rows_mut() {
                let mean = row.slice(s![..n_baseline]).sum() / n_baseline as f64;
                row -= mean;
            }
        }
    }

    if n_dropped_bad + n_dropped_edge > 0 {
        log::info!(
            "Dropped {} of {} epochs ({} BAD, {} out of range)",
            n_dropped_bad + n_dropped_edge,
            events.len(),
            n_dropped_bad,
            n_dropped_edge
        );
    }

    Epochs {
        data: out,
        ch_names: ch_names.to_vec(),
        sfreq,
        times,
        events: kept.into_iter().map(|(_, ev)| ev).collect(),
        n_dropped_bad,
        n_dropped_edge,
    }
}

impl Epochs {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Average the epochs whose label is `label` (all epochs for `None`).
    ///
    /// Returns `None` when no epoch matches.
    pub fn average(&self, condition: &str, label: Option<EventLabel>) -> Option<Evoked> {
        let picks: Vec<usize> = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, ev)| label.map_or(true, |l| ev.label == l))
            .map(|(i, _)| i)
            .collect();
        if picks.is_empty() {
            return None;
        }
        let mut sum = Array2::<f64>::zeros((self.data.shape()[1], self.data.shape()[2]));
        for &i in &picks {
            sum += &self.data.index_axis(Axis(0), i);
        }
        sum /= picks.len() as f64;
        Some(Evoked {
            condition: condition.to_string(),
            ch_names: self.ch_names.clone(),
            sfreq: self.sfreq,
            times: self.times.clone(),
            data: sum,
            nave: picks.len(),
        })
    }
}
