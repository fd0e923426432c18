//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! For a band `[l_freq, h_freq]` Hz at sampling rate `sfreq`:
//!   • low transition  = min(max(0.25 · l_freq, 2.0), l_freq)
//!   • high transition = min(max(0.25 · h_freq, 2.0), sfreq/2 − h_freq)
//!   • filter length N = ceil(3.3 / narrowest transition · sfreq), rounded to odd
//!   • Hamming-windowed sinc, cutoffs at the transition-band midpoints
use std::f64::consts::PI;

use crate::config::FilterBand;

/// MNE's automatic transition bandwidth below the passband.
pub fn auto_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// MNE's automatic transition bandwidth above the passband.
pub fn auto_trans_bandwidth_high(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of FIR taps for a given transition bandwidth.
/// Returns an odd integer (required for zero-phase linear-phase FIR).
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Zero-phase highpass at `l_freq`.
pub fn design_highpass(l_freq: f64, sfreq: f64) -> Vec<f64> {
    let trans_bw = auto_trans_bandwidth(l_freq);
    let n = auto_filter_length(trans_bw, sfreq);
    firwin(n, l_freq - trans_bw / 2.0, sfreq, false)
}

/// Zero-phase lowpass at `h_freq`.
pub fn design_lowpass(h_freq: f64, sfreq: f64) -> Vec<f64> {
    let trans_bw = auto_trans_bandwidth_high(h_freq, sfreq);
    let n = auto_filter_length(trans_bw, sfreq);
    firwin(n, h_freq + trans_bw / 2.0, sfreq, true)
}

/// Zero-phase bandpass: difference of two equal-length lowpasses.
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Vec<f64> {
    let l_bw = auto_trans_bandwidth(l_freq);
    let h_bw = auto_trans_bandwidth_high(h_freq, sfreq);
    let n = auto_filter_length(l_bw.min(h_bw), sfreq);

    let upper = firwin(n, h_freq + h_bw / 2.0, sfreq, true);
    let lower = firwin(n, l_freq - l_bw / 2.0, sfreq, true);
    upper.iter().zip(&lower).map(|(u, l)| u - l).collect()
}

/// Kernel for `band`, or `None` when both sides are disabled.
pub fn design_fir(band: FilterBand, sfreq: f64) -> Option<Vec<f64>> {
    match (band.highpass, band.lowpass) {
        (Some(l), Some(h)) => Some(design_bandpass(l, h, sfreq)),
        (Some(l), None) => Some(design_highpass(l, sfreq)),
        (None, Some(h)) => Some(design_lowpass(h, sfreq)),
        (None, None) => None,
    }
}

/// Hamming-windowed sinc.
///
/// `pass_zero=true` gives a lowpass with unit DC gain; `false` its spectral
/// inverse.  `cutoff_hz` is the −6 dB point.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    debug_assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0);

    let win = hamming(n);
    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // lim_{x→0} sin(π·fc·x) / (π·x) = fc
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_length_is_odd() {
        for l_freq in [0.5, 1.0, 2.0, 5.0, 100.0] {
            let n = auto_filter_length(auto_trans_bandwidth(l_freq), 2048.0);
            assert!(n % 2 == 1, "N={n} is even for l_freq={l_freq}");
        }
    }

    #[test]
    fn highpass_known_length_256hz() {
        // At 256 Hz / 0.5 Hz: MNE produces 1691 taps.
        assert_eq!(design_highpass(0.5, 256.0).len(), 1691);
    }

    #[test]
    fn high_transition_capped_by_nyquist() {
        // 3000 Hz at 8192 Hz: 750 Hz wanted, 1096 Hz available.
        approx::assert_abs_diff_eq!(auto_trans_bandwidth_high(3000.0, 8192.0), 750.0);
        approx::assert_abs_diff_eq!(auto_trans_bandwidth_high(3000.0, 6400.0), 200.0);
    }

    #[test]
    fn bandpass_blocks_dc_and_is_symmetric() {
        let h = design_bandpass(1.0, 35.0, 512.0);
        let s: f64 = h.iter().sum();
        assert!(s.abs() < 1e-9, "bandpass sum = {s}");
        let n = h.len();
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-12);
        }
        // Narrowest transition is the 1 Hz one.
        assert_eq!(n, auto_filter_length(1.0, 512.0));
    }

    #[test]
    fn lowpass_dc_gain_unity() {
        let dc: f64 = design_lowpass(35.0, 512.0).iter().sum();
        approx::assert_abs_diff_eq!(dc, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn no_band_no_kernel() {
        assert!(design_fir(FilterBand::default(), 512.0).is_none());
    }
}
