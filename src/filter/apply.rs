//! Overlap-add zero-phase FIR convolution.
//!
//! Matches MNE's `_overlap_add_filter`: the output is advanced by `(N-1)/2`
//! samples instead of running the filter twice, and both ends are extended
//! by `N-1` samples of odd reflection before filtering.
use std::sync::Arc;

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// A linear-phase FIR kernel prepared for repeated zero-phase application.
///
/// The FFT block size depends on the signal length, so one instance serves
/// every channel of one recording.
pub struct ZeroPhaseFir {
    n_taps: usize,
    n_fft: usize,
    spectrum: Vec<Complex<f64>>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl ZeroPhaseFir {
    /// Prepare `h` for signals of `n_times` samples.
    pub fn new(h: &[f64], n_times: usize) -> Result<Self> {
        ensure!(h.len() % 2 == 1, "zero-phase FIR needs an odd number of taps, got {}", h.len());
        let n_taps = h.len();
        let n_fft = choose_fft_len(n_taps, n_times + 2 * (n_taps - 1));

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        let mut spectrum = to_complex(h, n_fft);
        forward.process(&mut spectrum);

        Ok(Self { n_taps, n_fft, spectrum, forward, inverse })
    }

    pub fn n_taps(&self) -> usize {
        self.n_taps
    }

    /// Filter one signal.  The result has the length of `x`.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        if x.is_empty() {
            return Vec::new();
        }
        let edge = self.n_taps - 1;
        let shift = edge / 2;
        let padded = odd_reflect_pad(x, edge);
        let n_ext = padded.len();

        let step = self.n_fft - self.n_taps + 1;
        let scale = 1.0 / self.n_fft as f64;
        let mut acc = vec![0.0; n_ext];

        for start in (0..n_ext).step_by(step) {
            let stop = (start + step).min(n_ext);
            let mut block = to_complex(&padded[start..stop], self.n_fft);
            self.forward.process(&mut block);
            block.iter_mut().zip(&self.spectrum).for_each(|(b, h)| *b *= h);
            self.inverse.process(&mut block);

            // Output index o receives product index o + shift - start.
            let first_out = start.saturating_sub(shift);
            let skip = shift.saturating_sub(start);
            for (o, b) in (first_out..n_ext).zip(block.iter().skip(skip)) {
                acc[o] += b.re * scale;
            }
        }
        acc[edge..edge + x.len()].to_vec()
    }

    /// Filter every row of a `[C, T]` array in place.
    pub fn apply_rows(&self, data: &mut Array2<f64>) {
        for mut row in data.rows_mut() {
            let filtered = self.apply(&row.to_vec());
            row.assign(&ArrayView1::from(&filtered));
        }
    }
}

/// Apply `h` to each channel of `data` ([C, T]) in place.
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) -> Result<()> {
    ZeroPhaseFir::new(h, data.ncols())?.apply_rows(data);
    Ok(())
}

/// Filter a single signal.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    Ok(ZeroPhaseFir::new(h, x.len())?.apply(x))
}

fn to_complex(x: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut buf = vec![Complex::default(); n];
    buf.iter_mut().zip(x).for_each(|(b, &v)| b.re = v);
    buf
}

/// Odd reflection about the end samples (MNE's `_smart_pad`), zero-filled
/// where the signal is shorter than the requested pad.
fn odd_reflect_pad(x: &[f64], n_pad: usize) -> Vec<f64> {
    let n = x.len();
    let avail = n_pad.min(n - 1);
    let (first, last) = (x[0], x[n - 1]);

    let mut out = Vec::with_capacity(n + 2 * n_pad);
    out.resize(n_pad - avail, 0.0);
    out.extend((1..=avail).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=avail).map(|i| 2.0 * last - x[n - 1 - i]));
    out.resize(n + 2 * n_pad, 0.0);
    out
}

/// Power-of-two block size minimising MNE's cost estimate
/// `ceil(n_x / (N − n_h + 1)) · N · (log2 N + 1) + 4e-5 · N · n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_pow = ((2 * n_h - 1) as f64).log2().ceil() as u32;
    let max_pow = ((n_x as f64).log2().ceil() as u32 + 1).max(min_pow);

    (min_pow..=max_pow)
        .map(|pow| {
            let n = 1usize << pow;
            let blocks = (n_x as f64 / (n - n_h + 1) as f64).ceil();
            let cost = blocks * n as f64 * (pow as f64 + 1.0) + 4e-5 * n as f64 * n_x as f64;
            (n, cost)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(1 << min_pow, |(n, _)| n)
}
