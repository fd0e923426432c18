//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc band/high/lowpass design, matching
//!   `mne.filter.create_filter(fir_window='hamming', phase='zero')`.
//! - [`apply`]: Overlap-add zero-phase convolution, matching MNE's
//!   `_overlap_add_filter`.

pub mod apply;
pub mod design;

use anyhow::Result;
use ndarray::Array2;

use crate::config::FilterBand;

pub use apply::{apply_fir_zero_phase, filter_1d, ZeroPhaseFir};
pub use design::{
    auto_filter_length, auto_trans_bandwidth, auto_trans_bandwidth_high, design_bandpass,
    design_fir, design_highpass, design_lowpass, firwin, hamming,
};

/// Drop band edges that cannot be realised at `sfreq`.
///
/// A lowpass at or above Nyquist, or a non-positive highpass, is skipped with
/// a warning.
pub fn effective_band(band: FilterBand, sfreq: f64) -> FilterBand {
    let nyquist = sfreq / 2.0;
    let lowpass = band.lowpass.filter(|&h| {
        let ok = h < nyquist;
        if !ok {
            log::warn!("Lowpass {h} Hz is at or above Nyquist ({nyquist} Hz); skipping it");
        }
        ok
    });
    let highpass = band.highpass.filter(|&l| {
        let ok = l > 0.0 && lowpass.map_or(true, |h| l < h) && l < nyquist;
        if !ok {
            log::warn!("Highpass {l} Hz cannot be applied at {sfreq} Hz; skipping it");
        }
        ok
    });
    FilterBand { highpass, lowpass }
}

/// Band-pass `data` ([C, T]) in place and return the band actually applied.
pub fn filter_band(data: &mut Array2<f64>, band: FilterBand, sfreq: f64) -> Result<FilterBand> {
    let band = effective_band(band, sfreq);
    if let Some(h) = design_fir(band, sfreq) {
        log::debug!(
            "Filtering {:?}–{:?} Hz with {} taps",
            band.highpass,
            band.lowpass,
            h.len()
        );
        apply_fir_zero_phase(data, &h)?;
    }
    Ok(band)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_above_nyquist_is_skipped() {
        let band = effective_band(FilterBand { highpass: Some(100.0), lowpass: Some(3000.0) }, 2048.0);
        assert_eq!(band, FilterBand { highpass: Some(100.0), lowpass: None });
    }

    #[test]
    fn realisable_band_unchanged() {
        let b = FilterBand { highpass: Some(1.0), lowpass: Some(35.0) };
        assert_eq!(effective_band(b, 2048.0), b);
    }
}
