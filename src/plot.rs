//! PNG figures: recording overview, artifact-review traces, evoked curves
//! and spectra.
//!
//! Figures carry no text (no font stack is linked); panel order and colours
//! are fixed and documented on each function instead.
use std::path::Path;

use anyhow::{anyhow, Result};
use ndarray::Array2;
use plotters::prelude::*;

use crate::events::{ClassifiedEvent, EventLabel, TriggerEvent};

/// Points kept per trace after min/max decimation.
const MAX_POINTS: usize = 4000;

pub fn label_color(label: EventLabel) -> RGBColor {
    match label {
        EventLabel::Unknown => BLUE,
        EventLabel::Standard => GREEN,
        EventLabel::Deviant => RED,
    }
}

fn draw_err(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("drawing failed: {e}")
}

/// Reduce `y` to at most `MAX_POINTS` `(x, y)` pairs, keeping each bucket's
/// minimum and maximum so spikes stay visible.
fn decimate(y: &[f64], x0: f64, dx: f64) -> Vec<(f64, f64)> {
    if y.len() <= MAX_POINTS {
        return y.iter().enumerate().map(|(i, &v)| (x0 + i as f64 * dx, v)).collect();
    }
    let bucket = y.len().div_ceil(MAX_POINTS / 2);
    let mut out = Vec::with_capacity(MAX_POINTS);
    for (b, chunk) in y.chunks(bucket).enumerate() {
        let base = b * bucket;
        let (mut lo, mut hi) = (0, 0);
        for (i, &v) in chunk.iter().enumerate() {
            if v < chunk[lo] {
                lo = i;
            }
            if v > chunk[hi] {
                hi = i;
            }
        }
        let (first, second) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        out.push((x0 + (base + first) as f64 * dx, chunk[first]));
        out.push((x0 + (base + second) as f64 * dx, chunk[second]));
    }
    out
}

fn y_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || (hi - lo).abs() < 1e-12 {
        let c = if lo.is_finite() { lo } else { 0.0 };
        return (c - 1.0, c + 1.0);
    }
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}

/// Height in pixels of each panel of [`plot_recording_overview`].
pub const OVERVIEW_PANEL_HEIGHT: u32 = 200;

/// Distinct trace colours for per-channel figures, cycled.
pub const CHANNEL_COLORS: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

pub fn channel_color(index: usize) -> RGBColor {
    CHANNEL_COLORS[index % CHANNEL_COLORS.len()]
}

/// Whole-file overview: one panel per row of `data` (decimated), then a
/// trigger panel with one tick per event, height proportional to its code.
/// Every panel carries the trigger times as faint blue lines.
pub fn plot_recording_overview(path: &Path, data: &Array2<f64>, sfreq: f64, events: &[TriggerEvent]) -> Result<()> {
    let n_panels = data.nrows() + 1;
    let duration = (data.ncols() as f64 / sfreq).max(1.0);
    let root = BitMapBackend::new(path, (2400, OVERVIEW_PANEL_HEIGHT * n_panels as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let panels = root.split_evenly((n_panels, 1));
    let times: Vec<f64> = events.iter().map(|e| e.sample as f64 / sfreq).collect();

    for (row, panel) in data.rows().into_iter().zip(panels.iter()) {
        let points = decimate(&row.to_vec(), 0.0, 1.0 / sfreq);
        let (lo, hi) = y_range(points.iter().map(|p| p.1));
        let mut chart = ChartBuilder::on(panel)
            .margin(5)
            .build_cartesian_2d(0.0..duration, lo..hi)
            .map_err(draw_err)?;
        chart
            .draw_series(times.iter().map(|&t| PathElement::new(vec![(t, lo), (t, hi)], BLUE.mix(0.15))))
            .map_err(draw_err)?;
        chart.draw_series(LineSeries::new(points, &BLACK)).map_err(draw_err)?;
    }

    let top = events.iter().map(|e| e.trigger).max().unwrap_or(1).max(1) as f64;
    let mut chart = ChartBuilder::on(&panels[n_panels - 1])
        .margin(5)
        .build_cartesian_2d(0.0..duration, 0.0..top * 1.1)
        .map_err(draw_err)?;
    chart
        .draw_series(events.iter().zip(&times).map(|(e, &t)| {
            PathElement::new(vec![(t, 0.0), (t, e.trigger as f64)], BLUE.mix(0.6))
        }))
        .map_err(draw_err)?;
    root.present().map_err(draw_err)?;
    Ok(())
}

/// Spectra in dB, one line per row of `db`, coloured by [`channel_color`].
pub fn plot_psd(path: &Path, freqs: &[f64], db: &Array2<f64>) -> Result<()> {
    let f1 = freqs.last().copied().filter(|&f| f > 0.0).unwrap_or(1.0);
    let (lo, hi) = y_range(db.iter().copied());
    let root = BitMapBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0..f1, lo..hi)
        .map_err(draw_err)?;
    for (i, row) in db.rows().into_iter().enumerate() {
        let pts: Vec<(f64, f64)> = freqs.iter().copied().zip(row.iter().copied()).collect();
        chart
            .draw_series(LineSeries::new(pts, channel_color(i).stroke_width(2)))
            .map_err(draw_err)?;
    }
    root.present().map_err(draw_err)?;
    Ok(())
}

/// Stacked channel traces (one panel per row of `data`, top to bottom) with
/// event lines coloured by label and BAD spans shaded grey.
///
/// `first_samp` is the file sample of column 0; `bad_spans` are seconds
/// from column 0.
pub fn plot_review(
    path: &Path,
    data: &Array2<f64>,
    sfreq: f64,
    first_samp: u64,
    events: &[ClassifiedEvent],
    bad_spans: &[(f64, f64)],
) -> Result<()> {
    let n_rows = data.nrows().max(1);
    let duration = (data.ncols() as f64 / sfreq).max(1.0 / sfreq);
    let root = BitMapBackend::new(path, (2400, 300 * n_rows as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let panels = root.split_evenly((n_rows, 1));

    for (row, panel) in data.rows().into_iter().zip(panels.iter()) {
        let y: Vec<f64> = row.to_vec();
        let points = decimate(&y, 0.0, 1.0 / sfreq);
        let (lo, hi) = y_range(points.iter().map(|p| p.1));

        let mut chart = ChartBuilder::on(panel)
            .margin(5)
            .build_cartesian_2d(0.0..duration, lo..hi)
            .map_err(draw_err)?;
        chart
            .draw_series(bad_spans.iter().map(|&(a, b)| {
                Rectangle::new([(a, lo), (b, hi)], BLACK.mix(0.12).filled())
            }))
            .map_err(draw_err)?;
        chart
            .draw_series(events.iter().filter_map(|e| {
                let t = (e.sample as f64 - first_samp as f64) / sfreq;
                (0.0..=duration)
                    .contains(&t)
                    .then(|| PathElement::new(vec![(t, lo), (t, hi)], label_color(e.label).mix(0.35)))
            }))
            .map_err(draw_err)?;
        chart.draw_series(LineSeries::new(points, &BLACK)).map_err(draw_err)?;
    }
    root.present().map_err(draw_err)?;
    Ok(())
}

/// Evoked curves over `times` (seconds), values in volts drawn in µV.
///
/// `ylim` is the symmetric µV limit; `None` scales to the data.  Black axes
/// mark t = 0 and 0 µV.
pub fn plot_evoked(path: &Path, times: &[f64], traces: &[(Vec<f64>, RGBColor)], ylim: Option<f64>) -> Result<()> {
    let (t0, t1) = match (times.first(), times.last()) {
        (Some(&a), Some(&b)) if b > a => (a, b),
        _ => (0.0, 1.0),
    };
    let to_uv = |v: &f64| v * 1e6;
    let (lo, hi) = match ylim {
        Some(lim) => (-lim, lim),
        None => y_range(traces.iter().flat_map(|(v, _)| v.iter().map(to_uv))),
    };

    let root = BitMapBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(t0..t1, lo..hi)
        .map_err(draw_err)?;

    chart
        .draw_series([
            PathElement::new(vec![(t0, 0.0), (t1, 0.0)], BLACK),
            PathElement::new(vec![(0.0, lo), (0.0, hi)], BLACK),
        ])
        .map_err(draw_err)?;
    for (values, color) in traces {
        let pts = times.iter().zip(values).map(|(&t, v)| (t, to_uv(v).clamp(lo, hi)));
        chart
            .draw_series(LineSeries::new(pts, color.stroke_width(2)))
            .map_err(draw_err)?;
    }
    root.present().map_err(draw_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_keeps_extremes() {
        let mut y = vec![0.0; 100_000];
        y[12_345] = 9.0;
        y[77_777] = -4.0;
        let pts = decimate(&y, 0.0, 1.0);
        assert!(pts.len() <= MAX_POINTS);
        assert!(pts.iter().any(|p| p.1 == 9.0 && p.0 == 12_345.0));
        assert!(pts.iter().any(|p| p.1 == -4.0));
    }

    #[test]
    fn flat_signal_gets_a_range() {
        assert_eq!(y_range([2.0, 2.0].into_iter()), (1.0, 3.0));
        assert_eq!(y_range(std::iter::empty()), (-1.0, 1.0));
    }

    #[test]
    fn writes_png_files() {
        let dir = tempfile::tempdir().unwrap();
        let times: Vec<f64> = (0..61).map(|i| -0.1 + i as f64 * 0.01).collect();
        let wave: Vec<f64> = times.iter().map(|t| (t * 20.0).sin() * 2e-6).collect();
        let p = dir.path().join("ev.png");
        plot_evoked(&p, &times, &[(wave, GREEN)], Some(2.5)).unwrap();
        assert!(p.exists());

        let data = Array2::from_shape_fn((2, 500), |(c, t)| (c + t) as f64);
        let events = [ClassifiedEvent { sample: 1100, trigger: 1, label: EventLabel::Deviant }];
        let r = dir.path().join("review.png");
        plot_review(&r, &data, 100.0, 1000, &events, &[(1.0, 1.5)]).unwrap();
        assert!(r.exists());

        let psd = dir.path().join("psd.png");
        let freqs: Vec<f64> = (0..50).map(f64::from).collect();
        plot_psd(&psd, &freqs, &Array2::from_shape_fn((3, 50), |(c, f)| -(c as f64) - f as f64)).unwrap();
        assert!(psd.exists());
    }

    #[test]
    fn overview_has_a_panel_per_channel_plus_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array2::from_shape_fn((3, 20_000), |(c, t)| ((t + c) as f64 * 0.01).sin());
        let events: Vec<TriggerEvent> = (1..10)
            .map(|i| TriggerEvent { sample: i * 2000, trigger: 1 })
            .collect();
        let p = dir.path().join("overview.png");
        plot_recording_overview(&p, &data, 1000.0, &events).unwrap();
        assert_eq!(png_size(&p), (2400, 4 * OVERVIEW_PANEL_HEIGHT));
    }

    /// Width and height from the PNG IHDR chunk.
    fn png_size(path: &Path) -> (u32, u32) {
        let bytes = std::fs::read(path).unwrap();
        let be = |i: usize| u32::from_be_bytes(bytes[i..i + 4].try_into().unwrap());
        (be(16), be(20))
    }
}
