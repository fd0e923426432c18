//! FFT resampler matching MNE's `resample(..., method='fft')`.
//!
//! Per signal:
//!   1. extend both ends by odd reflection to the next power of two
//!      (`auto_npad`),
//!   2. forward FFT, keep the half spectrum,
//!   3. double (downsampling) or halve (upsampling) the Nyquist bin,
//!   4. scale by `new_len / old_len`, inverse FFT at the new length,
//!   5. strip the resampled padding.
//!
//! Used to bring evoked responses recorded at a different rate onto the
//! reference time axis of a group analysis.
use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

/// MNE's automatic padding: up to the next power of two, with at least
/// `min(n / 8, 100)` samples on each side.
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let total = (n + min_add).next_power_of_two() - n;
    (total / 2, total - total / 2)
}

/// Output length for `n` samples resampled by `ratio`.
pub fn final_length(n: usize, ratio: f64) -> usize {
    (ratio * n as f64).round() as usize
}

/// Resample every row of `data` ([C, T]) from `src_sfreq` to `dst_sfreq`.
pub fn resample(data: &Array2<f64>, src_sfreq: f64, dst_sfreq: f64) -> Result<Array2<f64>> {
    ensure!(src_sfreq > 0.0 && dst_sfreq > 0.0, "sampling rates must be positive");
    if (src_sfreq - dst_sfreq).abs() < 1e-9 {
        return Ok(data.clone());
    }
    let ratio = dst_sfreq / src_sfreq;
    let mut out = Array2::<f64>::zeros((data.nrows(), final_length(data.ncols(), ratio)));
    for (src, mut dst) in data.rows().into_iter().zip(out.rows_mut()) {
        let resampled = resample_1d(&src.to_vec(), ratio);
        dst.assign(&ArrayView1::from(&resampled));
    }
    Ok(out)
}

/// Resample one signal by `ratio = dst / src`.
pub fn resample_1d(x: &[f64], ratio: f64) -> Vec<f64> {
    let n_in = x.len();
    let final_len = final_length(n_in, ratio);
    if n_in == 0 || final_len == 0 {
        return vec![0.0; final_len];
    }

    let (npad_l, npad_r) = auto_npad(n_in);
    let padded = reflect_pad(x, npad_l.min(n_in - 1), npad_r.min(n_in - 1));
    let old_len = padded.len();
    let new_len = final_length(old_len, ratio);
    let shorter = new_len < old_len;

    let mut planner = FftPlanner::<f64>::new();
    let mut buf: Vec<Complex<f64>> = padded.iter().map(|&v| Complex::new(v, 0.0)).collect();
    planner.plan_fft_forward(old_len).process(&mut buf);

    let mut half: Vec<Complex<f64>> = buf[..old_len / 2 + 1].to_vec();
    let use_len = if shorter { new_len } else { old_len };
    if use_len % 2 == 0 {
        if let Some(bin) = half.get_mut(use_len / 2) {
            *bin *= if shorter { 2.0 } else { 0.5 };
        }
    }
    let scale = new_len as f64 / old_len as f64;

    // Rebuild a Hermitian spectrum at the new length (irfft semantics).
    let new_half = new_len / 2 + 1;
    let mut spec = vec![Complex::<f64>::default(); new_len];
    for (dst, src) in spec.iter_mut().zip(half.iter().take(new_half)) {
        *dst = *src * scale;
    }
    for i in 1..new_half {
        if new_len - i >= new_half {
            spec[new_len - i] = spec[i].conj();
        }
    }
    planner.plan_fft_inverse(new_len).process(&mut spec);

    let inv = 1.0 / new_len as f64;
    let skip = final_length(npad_l, ratio).min(new_len);
    let mut out: Vec<f64> = spec.iter().skip(skip).take(final_len).map(|c| c.re * inv).collect();
    out.resize(final_len, 0.0);
    out
}

fn reflect_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let (first, last) = (x[0], x[n - 1]);
    let mut out = Vec::with_capacity(n_l + n + n_r);
    out.extend((1..=n_l).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=n_r).map(|i| 2.0 * last - x[n - 1 - i]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_passthrough() {
        let data = Array2::from_shape_fn((2, 512), |(_, t)| t as f64 / 512.0);
        assert_eq!(resample(&data, 256.0, 256.0).unwrap(), data);
    }

    #[test]
    fn output_lengths() {
        let data = Array2::zeros((1, 1024));
        assert_eq!(resample(&data, 512.0, 256.0).unwrap().ncols(), 512);
        assert_eq!(resample(&data, 256.0, 512.0).unwrap().ncols(), 2048);
    }

    #[test]
    fn preserves_dc() {
        let data = Array2::from_elem((1, 1000), 3.25);
        for &v in resample(&data, 2048.0, 2000.0).unwrap().iter() {
            approx::assert_abs_diff_eq!(v, 3.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn low_frequency_sine_survives() {
        let (src, dst) = (1000.0, 500.0);
        let x: Vec<f64> = (0..2000).map(|i| (2.0 * std::f64::consts::PI * 5.0 * i as f64 / src).sin()).collect();
        let y = resample_1d(&x, dst / src);
        assert_eq!(y.len(), 1000);
        for (i, &v) in y.iter().enumerate().skip(100).take(800) {
            let expected = (2.0 * std::f64::consts::PI * 5.0 * i as f64 / dst).sin();
            approx::assert_abs_diff_eq!(v, expected, epsilon = 5e-3);
        }
    }

    #[test]
    fn auto_npad_matches_mne() {
        assert_eq!(auto_npad(15360), (512, 512));
        assert_eq!(auto_npad(30720), (1024, 1024));
    }
}
