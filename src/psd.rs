//! Welch power spectral density, as used by MNE's `raw.plot_psd`.
//!
//! Non-overlapping Hamming-windowed segments of `n_fft` samples, each
//! mean-removed, averaged as one-sided densities in V²/Hz:
//!
//! ```text
//! P[k] = c_k · mean_s |FFT(w · x_s)[k]|² / (sfreq · Σ w²)      c_k = 2 except DC and Nyquist
//! ```
use anyhow::{ensure, Result};
use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::filter::hamming;

/// Segment length used by `raw.plot_psd`.
pub const DEFAULT_N_FFT: usize = 2048;

/// Spectrum of every channel up to some frequency.
#[derive(Debug, Clone)]
pub struct Psd {
    /// Bin centre frequencies, Hz.
    pub freqs: Vec<f64>,
    /// `[C, F]` densities in V²/Hz.
    pub power: Array2<f64>,
}

impl Psd {
    /// `10·log10` of the density in µV²/Hz, one row per channel.
    pub fn db(&self) -> Array2<f64> {
        self.power.mapv(|p| 10.0 * (p * 1e12).max(1e-30).log10())
    }
}

/// Welch PSD of each row of `data` ([C, T]), bins above `fmax` dropped.
///
/// `n_fft` is shortened to the signal length when the signal is shorter.
pub fn welch(data: &Array2<f64>, sfreq: f64, n_fft: usize, fmax: f64) -> Result<Psd> {
    let n_times = data.ncols();
    ensure!(n_times >= 2, "need at least 2 samples for a spectrum, got {n_times}");
    ensure!(fmax > 0.0, "fmax must be positive, got {fmax}");
    let n = n_fft.min(n_times).max(2);

    let window = hamming(n);
    let scale = 1.0 / (sfreq * window.iter().map(|w| w * w).sum::<f64>());
    let n_bins = n / 2 + 1;
    let keep = (0..n_bins)
        .take_while(|&k| k as f64 * sfreq / n as f64 <= fmax)
        .count();
    let freqs: Vec<f64> = (0..keep).map(|k| k as f64 * sfreq / n as f64).collect();

    let fft = FftPlanner::<f64>::new().plan_fft_forward(n);
    let mut power = Array2::<f64>::zeros((data.nrows(), keep));
    let mut buf = vec![Complex::default(); n];

    for (row, mut out) in data.rows().into_iter().zip(power.rows_mut()) {
        let x: Vec<f64> = row.to_vec();
        let segments: Vec<&[f64]> = x.chunks_exact(n).collect();
        for seg in &segments {
            let mean = seg.iter().sum::<f64>() / n as f64;
            for ((b, &v), &w) in buf.iter_mut().zip(seg.iter()).zip(&window) {
                *b = Complex::new((v - mean) * w, 0.0);
            }
            fft.process(&mut buf);
            for (k, p) in out.iter_mut().enumerate() {
                let onesided = if k == 0 || (n % 2 == 0 && k == n / 2) { 1.0 } else { 2.0 };
                *p += onesided * buf[k].norm_sqr() * scale;
            }
        }
        out.mapv_inplace(|p| p / segments.len() as f64);
    }

    Ok(Psd { freqs, power })
}
