//! Subject cohorts and batch loading of evoked responses.
//!
//! Per-subject evoked files live under `<input_dir>/<subject>/` and are found
//! by suffix (`*<condition>-ave.safetensors`).  All responses of one batch
//! are put on a single time axis through [`TimeAxis`].
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Kind;
use crate::evoked::{self, Evoked};
use crate::resample;

/// A named list of subject IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub name: String,
    pub subjects: Vec<String>,
}

/// The study's two groups.
pub fn default_cohorts() -> Vec<Cohort> {
    let owned = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect();
    vec![
        Cohort {
            name: "living".into(),
            subjects: owned(&["FM1192", "FM1618", "FM7780", "FM2004_0717", "FM7779"]),
        },
        Cohort {
            name: "postmortem".into(),
            subjects: owned(&[
                "FM0505_0115",
                "FM1001_0313",
                "FM1002_1018",
                "FM2000_1117",
                "FM2001_0413",
                "FM2001_0518",
                "FM5001_0518",
            ]),
        },
    ]
}

/// Read cohorts from a JSON array of `{"name": ..., "subjects": [...]}`.
pub fn load_cohorts(path: &Path) -> Result<Vec<Cohort>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cohorts: Vec<Cohort> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    ensure!(cohorts.len() == 2, "{}: expected two cohorts, found {}", path.display(), cohorts.len());
    Ok(cohorts)
}

/// Baseline end (s) re-applied when reading evoked files for group work.
pub fn reading_baseline(kind: Kind) -> f64 {
    match kind {
        Kind::Mmn => 0.1,
        Kind::Abr => 0.0,
    }
}

/// Locate `<input_dir>/<subject>/*<condition>-ave.safetensors`.
///
/// Several matches are tolerated with a warning; the first by name is used.
pub fn find_evoked(input_dir: &Path, subject: &str, condition: &str) -> Result<PathBuf> {
    let dir = input_dir.join(subject);
    let suffix = format!("{condition}-ave.safetensors");
    let mut found: Vec<PathBuf> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().is_some_and(|n| n.to_string_lossy().ends_with(&suffix)))
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    found.sort();
    match found.len() {
        0 => bail!("No {condition} summary file found for {subject} in {}", dir.display()),
        1 => {}
        n => log::warn!("{n} {condition} summary files found for {subject}, picking {}", found[0].display()),
    }
    Ok(found.swap_remove(0))
}

/// Shared time axis of one batch.
///
/// The first response seen defines the reference.  A later response with a
/// different length or rate is FFT-resampled to the reference length and
/// then takes the reference times.
#[derive(Debug, Clone, Default)]
pub struct TimeAxis {
    reference: Option<(Vec<f64>, f64)>,
}

impl TimeAxis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn times(&self) -> Option<&[f64]> {
        self.reference.as_ref().map(|(t, _)| t.as_slice())
    }

    pub fn conform(&mut self, mut evoked: Evoked, source: &Path) -> Result<Evoked> {
        let Some((times, sfreq)) = &self.reference else {
            self.reference = Some((evoked.times.clone(), evoked.sfreq));
            return Ok(evoked);
        };
        let n_ref = times.len();
        let n = evoked.times.len();
        if n == n_ref && (evoked.sfreq - sfreq).abs() < 1e-6 {
            return Ok(evoked);
        }
        ensure!(n > 0, "{}: empty evoked response", source.display());
        log::warn!(
            "Resampling {}: {n} samples at {} Hz, reference has {n_ref} at {sfreq} Hz",
            source.display(),
            evoked.sfreq
        );
        let target = evoked.sfreq * n_ref as f64 / n as f64;
        let mut data = resample::resample(&evoked.data, evoked.sfreq, target)?;
        if data.ncols() != n_ref {
            // Rounding can leave the length one sample off.
            let mut fitted = ndarray::Array2::<f64>::zeros((data.nrows(), n_ref));
            let keep = data.ncols().min(n_ref);
            fitted.slice_mut(ndarray::s![.., ..keep]).assign(&data.slice(ndarray::s![.., ..keep]));
            data = fitted;
        }
        evoked.data = data;
        evoked.times = times.clone();
        evoked.sfreq = *sfreq;
        Ok(evoked)
    }
}

/// Read one evoked file, re-baseline it and put it on `axis`.
pub fn read_evoked(path: &Path, kind: Kind, axis: &mut TimeAxis) -> Result<Evoked> {
    let mut e = Evoked::load(path)?;
    e.apply_baseline(reading_baseline(kind));
    axis.conform(e, path)
}

/// All conditions of one subject.
#[derive(Debug, Clone)]
pub struct SubjectEvoked {
    pub subject: String,
    pub total: Evoked,
    pub standard: Option<Evoked>,
    pub deviant: Option<Evoked>,
}

impl SubjectEvoked {
    pub fn load(input_dir: &Path, subject: &str, kind: Kind, axis: &mut TimeAxis) -> Result<Self> {
        let mut read = |condition: &str| -> Result<Evoked> {
            let path = find_evoked(input_dir, subject, condition)?;
            log::debug!("Reading {}", path.display());
            read_evoked(&path, kind, axis)
        };
        let total = read("all")?;
        let (standard, deviant) = match kind {
            Kind::Mmn => (Some(read("standard")?), Some(read("deviant")?)),
            Kind::Abr => (None, None),
        };
        Ok(Self { subject: subject.to_string(), total, standard, deviant })
    }

    /// Deviant − Standard, when both exist.
    pub fn difference(&self) -> Result<Option<Evoked>> {
        match (&self.deviant, &self.standard) {
            (Some(d), Some(s)) => evoked::difference(d, s).map(Some),
            _ => Ok(None),
        }
    }
}

/// One cohort's loaded responses.
#[derive(Debug, Clone)]
pub struct GroupData {
    pub cohort: Cohort,
    pub subjects: Vec<SubjectEvoked>,
}

impl GroupData {
    pub fn load(cohort: &Cohort, input_dir: &Path, kind: Kind, axis: &mut TimeAxis) -> Result<Self> {
        let subjects = cohort
            .subjects
            .iter()
            .map(|sid| SubjectEvoked::load(input_dir, sid, kind, axis))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { cohort: cohort.clone(), subjects })
    }

    /// `naveᵢ / Σ nave · n`: weights averaging to one.
    pub fn nave_weights(&self) -> Vec<f64> {
        let naves: Vec<f64> = self.subjects.iter().map(|s| s.total.nave as f64).collect();
        let total: f64 = naves.iter().sum();
        let n = naves.len() as f64;
        naves.iter().map(|&v| if total > 0.0 { v / total * n } else { 1.0 }).collect()
    }
}
