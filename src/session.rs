//! One recording, from raw BDF to evoked responses.
//!
//! ```text
//! Session::open
//!   │
//!   ├─ CacheLocation::derive        fatal outside raw-data/ without override
//!   ├─ open_raw + read_status
//!   ├─ cache::load
//!   │    ├─ Present  → cached bounds + events (band refreshed)
//!   │    └─ Absent   → find_events → locate
//!   │                    ├─ Found
//!   │                    └─ NeedsManualInput → whole-file PNG → ManualEntry
//!   │                  → classify (MMN) → cache::save
//!   ├─ read_slice (crop), rename EXG1–6, mastoid reference, band-pass
//!   └─ artifact mask (if present)
//! ```
//!
//! After [`Session::open`], [`Session::render_review`] and
//! [`Session::reload_annotations`] bracket the operator's artifact review,
//! and [`Session::write_evoked`] produces the per-condition averages.
//! The `plot_*` methods write optional per-recording figures next to the
//! cache.
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ndarray::Array2;
use plotters::prelude::{RGBColor, BLACK, GREEN, RED};

use crate::annotations::Annotations;
use crate::bdf::{open_raw, RawBdf};
use crate::cache::{self, CacheLocation, CacheRecord, CacheState, CachedSegment};
use crate::classifier;
use crate::config::{FilterBand, SessionConfig, HIGHPASS_ARTIFACT_VIEW};
use crate::epoch::{extract_epochs, Epochs};
use crate::error::{Error, Result};
use crate::events::{find_events, ClassifiedEvent, EventLabel, TriggerEvent};
use crate::evoked::{difference, Evoked};
use crate::filter;
use crate::locator::{locate, Located, LocatorParams, ManualRequest, Segment};
use crate::plot;
use crate::psd;
use crate::reference::{reference_by_name, MASTOID_CHANNELS};

/// BioSemi external inputs and the electrodes wired to them.
pub const EXG_RENAMES: [(&str, &str); 6] = [
    ("EXG1", "cz"),
    ("EXG2", "mr"),
    ("EXG3", "ml"),
    ("EXG4", "fz"),
    ("EXG5", "pz"),
    ("EXG6", "t8"),
];

/// Channels shown in the artifact-review figure, top to bottom.
pub const REVIEW_CHANNELS: [&str; 4] = ["cz", "fz", "pz", "t8"];

/// Supplies segment boundaries when the automatic scan finds none.
pub trait ManualEntry {
    /// Return `(start_seconds, stop_seconds)` in file time.
    ///
    /// `overview` is the whole-file figure (every channel, then the
    /// triggers) written just before the call.
    fn segment_bounds(&mut self, request: &ManualRequest, overview: &Path) -> anyhow::Result<(f64, f64)>;
}

/// The cropped, referenced and filtered recording.
#[derive(Debug, Clone)]
pub struct Recording {
    /// `[C, T]` in volts.
    pub data: Array2<f64>,
    pub ch_names: Vec<String>,
    pub sfreq: f64,
    /// File sample index of `data[:, 0]`.
    pub first_samp: u64,
    pub meas_date: NaiveDateTime,
    /// Band actually applied.
    pub band: FilterBand,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub config: SessionConfig,
    pub source: PathBuf,
    pub location: CacheLocation,
    pub record: CacheRecord,
    pub events: Vec<ClassifiedEvent>,
    pub recording: Recording,
    pub annotations: Annotations,
    /// Segment and events came from an existing cache.
    pub from_cache: bool,
}

impl Session {
    pub fn open(path: &Path, config: &SessionConfig, manual: &mut dyn ManualEntry) -> Result<Self> {
        let location = CacheLocation::derive(path, config.kind, &config.cache_policy)?;
        log::info!("Opening {} ({})", path.display(), config.kind);
        let raw = open_raw(path)?;
        log::debug!(
            "{} channels, {} samples at {} Hz ({:.1} s)",
            raw.header.signals.len(),
            raw.n_times(),
            raw.sfreq(),
            raw.duration_secs()
        );

        let (cached, from_cache) = match cache::load(&location)? {
            CacheState::Present(mut cached) => {
                log::info!(
                    "Using cached segment {:.3}–{:.3} s from {}",
                    cached.record.start_seconds,
                    cached.record.stop_seconds,
                    location.metadata().display()
                );
                if cached.refresh_band(config.band) {
                    log::info!("Filter band changed, updating {}", location.metadata().display());
                    cache::save_metadata(&location, &cached.record)?;
                }
                (cached, true)
            }
            CacheState::Absent => (first_run(path, &raw, config, &location, manual)?, false),
        };

        let recording = load_recording(&raw, &cached.record, config.band)?;
        let annotations = Annotations::load_or_empty(&location.artifact_mask())?;
        if !annotations.is_empty() {
            log::info!(
                "Loaded {} annotations ({} BAD) from {}",
                annotations.items.len(),
                annotations.n_bad(),
                location.artifact_mask().display()
            );
        }

        Ok(Self {
            config: config.clone(),
            source: path.to_path_buf(),
            location,
            record: cached.record,
            events: cached.events,
            recording,
            annotations,
            from_cache,
        })
    }

    /// `(start, stop)` seconds from the crop start of every BAD annotation.
    pub fn bad_spans(&self) -> Vec<(f64, f64)> {
        self.annotations
            .items
            .iter()
            .filter(|a| a.is_bad())
            .map(|a| (a.onset, a.onset + a.duration))
            .collect()
    }

    /// Write the artifact-review figure and make sure a mask file exists for
    /// the operator to edit.  Returns the figure path.
    pub fn render_review(&self) -> Result<PathBuf> {
        let view = self.review_view()?;
        let png = self.location.review_png();
        plot::plot_review(&png, &view, self.recording.sfreq, self.recording.first_samp, &self.events, &self.bad_spans())?;

        let mask = self.location.artifact_mask();
        if !mask.exists() {
            self.annotations.save(&mask)?;
            log::info!("Created empty artifact mask {}", mask.display());
        }
        Ok(png)
    }

    /// Re-read the artifact mask after the operator edited it.
    pub fn reload_annotations(&mut self) -> Result<()> {
        self.annotations = Annotations::load_or_empty(&self.location.artifact_mask())?;
        log::info!("Artifact mask has {} BAD spans", self.annotations.n_bad());
        Ok(())
    }

    /// Display channels with a gentle high-pass on top of the analysis band.
    fn review_view(&self) -> Result<Array2<f64>> {
        let rows: Vec<usize> = REVIEW_CHANNELS
            .iter()
            .filter_map(|name| {
                self.recording.ch_names.iter().position(|c| c.eq_ignore_ascii_case(name))
            })
            .collect();
        let mut view = self.recording.data.select(ndarray::Axis(0), &rows);
        let band = FilterBand { highpass: Some(HIGHPASS_ARTIFACT_VIEW), lowpass: None };
        filter::filter_band(&mut view, band, self.recording.sfreq)?;
        Ok(view)
    }

    pub fn epochs(&self) -> Epochs {
        let params = &self.config.params;
        extract_epochs(
            &self.recording.data,
            &self.recording.ch_names,
            self.recording.sfreq,
            self.recording.first_samp,
            &self.events,
            (params.tmin, params.tmax),
            &self.annotations,
        )
    }

    /// Average per condition of this kind and write each evoked file.
    ///
    /// Conditions without a single kept epoch are skipped with a warning.
    pub fn write_evoked(&self) -> Result<Vec<(Evoked, PathBuf)>> {
        let epochs = self.epochs();
        log::info!("{} epochs kept", epochs.len());
        let mut written = Vec::new();
        for &condition in self.config.kind.conditions() {
            let label = match condition {
                "standard" => Some(EventLabel::Standard),
                "deviant" => Some(EventLabel::Deviant),
                _ => None,
            };
            let Some(evoked) = epochs.average(condition, label) else {
                log::warn!("No epochs for condition '{condition}', nothing written");
                continue;
            };
            let path = self.location.evoked(condition);
            evoked.save(&path)?;
            log::info!("Wrote {condition} (nave = {}) to {}", evoked.nave, path.display());
            written.push((evoked, path));
        }
        Ok(written)
    }
}

impl Session {
    /// Standard (green), deviant (red) and deviant − standard (black) on one
    /// electrode, or on the mean of [`REVIEW_CHANNELS`] for `None`.
    pub fn plot_standard_deviant(&self, electrode: Option<&str>) -> Result<PathBuf> {
        let epochs = self.epochs();
        let (Some(standard), Some(deviant)) = (
            epochs.average("standard", Some(EventLabel::Standard)),
            epochs.average("deviant", Some(EventLabel::Deviant)),
        ) else {
            return Err(anyhow::anyhow!("standard/deviant figure needs both conditions; {} epochs kept", epochs.len()).into());
        };
        let diff = difference(&deviant, &standard)?;
        let traces = [(&standard, GREEN), (&deviant, RED), (&diff, BLACK)]
            .into_iter()
            .map(|(e, color)| Ok((electrode_trace(e, electrode)?, color)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let name = format!("sminusd_{}", electrode.unwrap_or("mean").to_ascii_lowercase());
        let png = self.figure_path(&name)?;
        plot::plot_evoked(&png, &standard.times, &traces, None)?;
        log::info!("Wrote standard/deviant figure {}", png.display());
        Ok(png)
    }

    /// Average of all kept epochs, one coloured trace per channel.
    pub fn plot_epoch_average(&self) -> Result<PathBuf> {
        let epochs = self.epochs();
        let evoked = epochs
            .average("all", None)
            .ok_or_else(|| anyhow::anyhow!("no epochs kept, nothing to average"))?;
        let traces: Vec<(Vec<f64>, RGBColor)> = evoked
            .data
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| (row.to_vec(), plot::channel_color(i)))
            .collect();
        let png = self.figure_path("epoch_average")?;
        plot::plot_evoked(&png, &evoked.times, &traces, None)?;
        log::info!("Wrote epoch average (nave = {}) to {}", evoked.nave, png.display());
        Ok(png)
    }

    /// Welch spectrum of the filtered recording up to `fmax` Hz.
    pub fn plot_psd(&self, fmax: f64) -> Result<PathBuf> {
        let spectrum = psd::welch(&self.recording.data, self.recording.sfreq, psd::DEFAULT_N_FFT, fmax)?;
        let png = self.figure_path("psd")?;
        plot::plot_psd(&png, &spectrum.freqs, &spectrum.db())?;
        log::info!("Wrote spectrum up to {fmax} Hz to {}", png.display());
        Ok(png)
    }

    fn figure_path(&self, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.location.dir)
            .map_err(|e| Error::io(format!("creating {}", self.location.dir.display()), e))?;
        Ok(self.location.figure(name))
    }
}

fn electrode_trace(evoked: &Evoked, electrode: Option<&str>) -> anyhow::Result<Vec<f64>> {
    if let Some(name) = electrode {
        return Ok(evoked.channel(name)?.to_vec());
    }
    let mut sum = vec![0.0; evoked.times.len()];
    for name in REVIEW_CHANNELS {
        let row = evoked.channel(name)?;
        sum.iter_mut().zip(row.iter()).for_each(|(s, v)| *s += v);
    }
    Ok(sum.into_iter().map(|v| v / REVIEW_CHANNELS.len() as f64).collect())
}

/// Locate, classify and cache a recording seen for the first time.
fn first_run(
    path: &Path,
    raw: &RawBdf,
    config: &SessionConfig,
    location: &CacheLocation,
    manual: &mut dyn ManualEntry,
) -> Result<CachedSegment> {
    let sfreq = raw.sfreq();
    let status = raw.read_status()?;
    let triggers = find_events(&status, 0, config.min_event_samples);
    log::info!("Found {} trigger events", triggers.len());

    let params = LocatorParams {
        expected_count: config.params.expected_count,
        expected_duration: config.params.expected_duration,
        buffer_seconds: config.buffer_seconds,
        kind: config.kind.as_str(),
    };
    let segment = match locate(&triggers, sfreq, &params)? {
        Located::Found(segment) => segment,
        Located::NeedsManualInput(mut request) => {
            request.recording_seconds = Some(raw.duration_secs());
            manual_segment(raw, &triggers, sfreq, &params, request, location, manual)?
        }
    };
    log::info!(
        "Segment {:.3}–{:.3} s ({:.3} s, {} events)",
        segment.start_seconds,
        segment.stop_seconds,
        segment.duration(),
        segment.events.len()
    );

    let events = if config.params.classify {
        classifier::classify(
            &segment.events,
            raw.header.start,
            segment.start_seconds,
            config.variant,
            &config.tone_dir,
        )?
        .events
    } else {
        segment.events.iter().copied().map(ClassifiedEvent::from).collect()
    };

    let record = CacheRecord {
        source_path: path.to_path_buf(),
        kind: config.kind,
        start_seconds: segment.start_seconds,
        stop_seconds: segment.stop_seconds,
        highpass: config.band.highpass,
        lowpass: config.band.lowpass,
        manual: segment.is_manual(),
    };
    cache::save(location, &record, &events)?;
    log::info!("Saved segment metadata to {}", location.metadata().display());
    Ok(CachedSegment { record, events })
}

fn manual_segment(
    raw: &RawBdf,
    triggers: &[TriggerEvent],
    sfreq: f64,
    params: &LocatorParams,
    request: ManualRequest,
    location: &CacheLocation,
    manual: &mut dyn ManualEntry,
) -> Result<Segment> {
    log::warn!(
        "Could not find {} {} events spanning {:.1}–{:.1} s ({} windows checked); manual entry required",
        request.expected_count,
        request.kind,
        request.tolerance.0,
        request.tolerance.1,
        request.windows_checked
    );
    std::fs::create_dir_all(&location.dir)
        .map_err(|e| Error::io(format!("creating {}", location.dir.display()), e))?;
    let overview = location.overview_png();
    let data = raw.read_all_data()?;
    plot::plot_recording_overview(&overview, &data, sfreq, triggers)?;

    let (start, stop) = manual.segment_bounds(&request, &overview)?;
    log::info!("Manual segment {start:.3}–{stop:.3} s");
    Ok(Segment::manual(triggers, sfreq, start, stop, params.expected_count))
}

/// Crop, rename, reference and filter the EEG channels of `raw`.
fn load_recording(raw: &RawBdf, record: &CacheRecord, band: FilterBand) -> Result<Recording> {
    let sfreq = raw.sfreq();
    let start = (record.start_seconds * sfreq).round().max(0.0) as usize;
    let stop = ((record.stop_seconds * sfreq).round().max(0.0) as usize).min(raw.n_times());
    if record.start_seconds < 0.0 {
        log::debug!("Segment starts {:.3} s before the file; cropping from 0", -record.start_seconds);
    }
    let mut data = raw.read_slice(start, stop)?;
    let ch_names = rename_exg(raw.ch_names());

    reference_by_name(&mut data, &ch_names, &MASTOID_CHANNELS)?;
    let band = filter::filter_band(&mut data, band, sfreq)?;

    Ok(Recording {
        data,
        ch_names,
        sfreq,
        first_samp: start as u64,
        meas_date: raw.header.start,
        band,
    })
}

/// Apply [`EXG_RENAMES`]; other labels pass through.
pub fn rename_exg(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .map(|n| match EXG_RENAMES.iter().find(|(from, _)| n.eq_ignore_ascii_case(from)) {
            Some((_, to)) => to.to_string(),
            None => n,
        })
        .collect()
}
