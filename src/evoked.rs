//! Evoked responses: per-condition epoch averages.
//!
//! Stored as safetensors:
//!
//! | Tensor  | dtype | shape    |
//! |---------|-------|----------|
//! | `data`  | F64   | `[C, T]` (volts) |
//! | `times` | F64   | `[T]` (seconds)  |
//!
//! with `condition`, `nave`, `sfreq` and the comma-joined `ch_names` in the
//! `__metadata__` map.
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array1, Array2, Axis};

use crate::io::{StFile, StWriter};

#[derive(Debug, Clone, PartialEq)]
pub struct Evoked {
    /// `all`, `standard`, `deviant` or a derived name like `difference`.
    pub condition: String,
    pub ch_names: Vec<String>,
    pub sfreq: f64,
    pub times: Vec<f64>,
    /// `[C, T]` in volts.
    pub data: Array2<f64>,
    /// Number of averaged epochs.
    pub nave: usize,
}

impl Evoked {
    /// Channel row by name, ignoring case (`Cz` finds `cz`).
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.ch_names.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn channel(&self, name: &str) -> Result<Array1<f64>> {
        let idx = self
            .channel_index(name)
            .with_context(|| format!("channel '{name}' not in {:?}", self.ch_names))?;
        Ok(self.data.row(idx).to_owned())
    }

    /// Mean over all channels at each time point.
    pub fn channel_mean(&self) -> Array1<f64> {
        self.data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.times.len()))
    }

    /// Subtract, per channel, the mean over `times <= until` (from the first
    /// sample).  No-op when that range is empty.
    pub fn apply_baseline(&mut self, until: f64) {
        let n = self.times.iter().take_while(|&&t| t <= until + 1e-12).count();
        if n == 0 {
            return;
        }
        for mut row in self.data.rows_mut() {
            let mean = row.iter().take(n).sum::<f64>() / n as f64;
            row -= mean;
        }
    }

    /// Half-open index range `[first t >= start, first t >= stop)` (seconds),
    /// the way the window slices in the group statistics are taken.
    pub fn window(&self, start: f64, stop: f64) -> std::ops::Range<usize> {
        let a = self.times.partition_point(|&t| t < start);
        let b = self.times.partition_point(|&t| t < stop);
        a..b.max(a)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_f64_arr2("data", &self.data);
        w.add_f64("times", &self.times, &[self.times.len()]);
        w.set_metadata("condition", self.condition.as_str());
        w.set_metadata("nave", self.nave.to_string());
        w.set_metadata("sfreq", self.sfreq.to_string());
        w.set_metadata("ch_names", self.ch_names.join(","));
        w.write(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = StFile::load(path)?;
        let meta = |key: &str| {
            f.metadata(key)
                .with_context(|| format!("{}: missing '{key}' metadata", path.display()))
        };
        let data = f.f64_arr2("data")?;
        let times = f.f64s("times")?;
        let ch_names: Vec<String> = meta("ch_names")?.split(',').map(str::to_string).collect();
        ensure!(
            data.dim() == (ch_names.len(), times.len()),
            "{}: data shape {:?} does not match {} channels × {} times",
            path.display(),
            data.dim(),
            ch_names.len(),
            times.len()
        );
        Ok(Self {
            condition: meta("condition")?.to_string(),
            nave: meta("nave")?.parse().context("parsing nave")?,
            sfreq: meta("sfreq")?.parse().context("parsing sfreq")?,
            ch_names,
            times,
            data,
        })
    }
}

fn check_compatible(a: &Evoked, b: &Evoked) -> Result<()> {
    if a.data.dim() != b.data.dim() {
        bail!("cannot combine evoked responses of shape {:?} and {:?}", a.data.dim(), b.data.dim());
    }
    if a.ch_names.len() != b.ch_names.len()
        || a.ch_names.iter().zip(&b.ch_names).any(|(x, y)| !x.eq_ignore_ascii_case(y))
    {
        bail!("channel mismatch: {:?} vs {:?}", a.ch_names, b.ch_names);
    }
    Ok(())
}

/// Weighted sum `Σ wᵢ·eᵢ`, with `nave = 1 / Σ(wᵢ² / naveᵢ)` as MNE does.
pub fn combine_weighted(evokeds: &[&Evoked], weights: &[f64], condition: &str) -> Result<Evoked> {
    let Some(first) = evokeds.first() else {
        bail!("no evoked responses to combine");
    };
    ensure!(evokeds.len() == weights.len(), "{} weights for {} evoked", weights.len(), evokeds.len());

    let mut data = Array2::<f64>::zeros(first.data.dim());
    let mut inv_nave = 0.0;
    for (e, &w) in evokeds.iter().zip(weights) {
        check_compatible(first, e)?;
        data.scaled_add(w, &e.data);
        inv_nave += w * w / e.nave.max(1) as f64;
    }
    Ok(Evoked {
        condition: condition.to_string(),
        ch_names: first.ch_names.clone(),
        sfreq: first.sfreq,
        times: first.times.clone(),
        data,
        nave: if inv_nave > 0.0 { (1.0 / inv_nave).round() as usize } else { 0 },
    })
}

/// Grand average weighted by each response's `nave`.
pub fn grand_average(evokeds: &[&Evoked], condition: &str) -> Result<Evoked> {
    let total: usize = evokeds.iter().map(|e| e.nave).sum();
    ensure!(total > 0, "grand average over responses without epochs");
    let weights: Vec<f64> = evokeds.iter().map(|e| e.nave as f64 / total as f64).collect();
    combine_weighted(evokeds, &weights, condition)
}

/// `minuend − subtrahend` with equal weights.
pub fn difference(minuend: &Evoked, subtrahend: &Evoked) -> Result<Evoked> {
    combine_weighted(&[minuend, subtrahend], &[1.0, -1.0], "difference")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evoked(value: f64, nave: usize) -> Evoked {
        Evoked {
            condition: "all".into(),
            ch_names: vec!["cz".into(), "fz".into()],
            sfreq: 100.0,
            times: vec![-0.02, -0.01, 0.0, 0.01, 0.02],
            data: Array2::from_elem((2, 5), value),
            nave,
        }
    }

    #[test]
    fn nave_weighted_mean() {
        let (a, b) = (evoked(1.0, 30), evoked(4.0, 10));
        let g = grand_average(&[&a, &b], "all").unwrap();
        approx::assert_abs_diff_eq!(g.data[[0, 0]], 1.75);
        // 1 / (0.75²/30 + 0.25²/10) = 40
        assert_eq!(g.nave, 40);
    }

    #[test]
    fn difference_wave() {
        let d = difference(&evoked(3.0, 100), &evoked(1.0, 400)).unwrap();
        approx::assert_abs_diff_eq!(d.data[[1, 4]], 2.0);
        assert_eq!(d.condition, "difference");
        assert_eq!(d.nave, 80);
    }

    #[test]
    fn baseline_until() {
        let mut e = evoked(0.0, 1);
        e.data.row_mut(0).assign(&Array1::from(vec![1.0, 3.0, 5.0, 7.0, 9.0]));
        e.apply_baseline(0.0);
        assert_eq!(e.data.row(0).to_vec(), vec![-2.0, 0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn window_is_half_open() {
        let e = evoked(0.0, 1);
        assert_eq!(e.window(-0.01, 0.02), 1..4);
        assert_eq!(e.window(0.5, 0.6), 5..5);
    }

    #[test]
    fn channel_lookup_ignores_case() {
        let e = evoked(2.0, 1);
        assert_eq!(e.channel_index("Fz"), Some(1));
        assert!(e.channel("T8").is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.all-ave.safetensors");
        let e = evoked(1.5e-6, 42);
        e.save(&path).unwrap();
        assert_eq!(Evoked::load(&path).unwrap(), e);
    }

    #[test]
    fn mismatched_shapes_rejected() {
        let mut b = evoked(1.0, 1);
        b.data = Array2::zeros((2, 4));
        assert!(difference(&evoked(1.0, 1), &b).is_err());
    }
}
