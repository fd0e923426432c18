//! Metadata cache: crop boundaries, filter band and classified events.
//!
//! Locating and classifying a recording happens once per (recording, kind).
//! The result is kept next to the other analysis outputs in two files:
//!
//! ```text
//! <stem>.metadata.json         {source_path, kind, start/stop seconds, band, manual}
//! <stem>.events.safetensors    events: I32 [N, 3] = (sample, trigger, label id)
//! ```
//!
//! Only both files together form a valid cache.  `save` renames the event
//! file into place before the metadata file, so an interrupted run leaves at
//! most a lone event file, which `load` reports as absent.
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{CachePolicy, FilterBand, Kind};
use crate::error::{Error, Result};
use crate::events::{ClassifiedEvent, EventLabel};
use crate::io::{StFile, StWriter};

/// Directory component marking the read-only study data tree.
pub const RAW_DATA_DIR: &str = "raw-data";

/// Replaces [`RAW_DATA_DIR`] in derived output paths.
pub const ANALYSES_SUBPATH: [&str; 2] = ["analyses", "eeg_artifacts"];

/// Output paths for one (source file, kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheLocation {
    pub dir: PathBuf,
    /// File-name prefix shared by every output.
    pub stem: String,
}

impl CacheLocation {
    /// Map a source path and kind to their output namespace.
    ///
    /// * [`CachePolicy::Override`]: the override directory, wherever the
    ///   source lives, with a hash of the full source path and the kind in
    ///   the file names.
    /// * Under a `raw-data` directory: the last `raw-data` component becomes
    ///   `analyses/eeg_artifacts/<kind>`; everything else is kept.
    /// * Otherwise, with [`CachePolicy::Fallback`]: as for `Override`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingDirectoryStructure`] when the source is outside
    /// `raw-data` and the policy is [`CachePolicy::StudyTree`].
    pub fn derive(source: &Path, kind: Kind, policy: &CachePolicy) -> Result<Self> {
        let file_name = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .ok_or_else(|| missing_structure(source))?;

        if let CachePolicy::Override(dir) = policy {
            return Ok(Self::keyed(dir, source, &file_name, kind));
        }

        let comps: Vec<Component> = source.components().collect();
        let raw_idx = comps
            .iter()
            .rposition(|c| matches!(c, Component::Normal(n) if *n == RAW_DATA_DIR));

        match (raw_idx, policy) {
            (Some(idx), _) if idx + 1 < comps.len() => {
                let mut dir: PathBuf = comps[..idx].iter().collect();
                ANALYSES_SUBPATH.iter().for_each(|p| dir.push(p));
                dir.push(kind.as_str());
                for c in &comps[idx + 1..comps.len() - 1] {
                    dir.push(c.as_os_str());
                }
                Ok(Self { dir, stem: file_name })
            }
            (_, CachePolicy::Fallback(dir)) => Ok(Self::keyed(dir, source, &file_name, kind)),
            _ => Err(missing_structure(source)),
        }
    }

    /// Outputs in a flat directory, keyed on the full source path bytes.
    fn keyed(dir: &Path, source: &Path, file_name: &str, kind: Kind) -> Self {
        let digest = Sha256::digest(source.as_os_str().as_encoded_bytes());
        let hash = hex::encode(&digest[..8]);
        Self {
            dir: dir.to_path_buf(),
            stem: format!("{file_name}.{hash}.{kind}"),
        }
    }

    /// Named figure of this recording, e.g. `epoch_average`.
    pub fn figure(&self, name: &str) -> PathBuf {
        self.file(&format!("{name}.png"))
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{suffix}", self.stem))
    }

    pub fn metadata(&self) -> PathBuf {
        self.file("metadata.json")
    }

    pub fn events(&self) -> PathBuf {
        self.file("events.safetensors")
    }

    pub fn artifact_mask(&self) -> PathBuf {
        self.file("artifact_mask.csv")
    }

    /// Full-recording figure shown before manual segment entry.
    pub fn overview_png(&self) -> PathBuf {
        self.file("overview.png")
    }

    /// Cropped-recording figure used for artifact review.
    pub fn review_png(&self) -> PathBuf {
        self.file("review.png")
    }

    /// Evoked response of one condition (`all`, `standard`, `deviant`).
    pub fn evoked(&self, condition: &str) -> PathBuf {
        self.file(&format!("{condition}-ave.safetensors"))
    }
}

fn missing_structure(source: &Path) -> Error {
    Error::MissingDirectoryStructure {
        source_path: source.to_path_buf(),
        fallback: PathBuf::from("."),
    }
}

/// The persisted key/value record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub source_path: PathBuf,
    pub kind: Kind,
    pub start_seconds: f64,
    pub stop_seconds: f64,
    #[serde(default)]
    pub highpass: Option<f64>,
    #[serde(default)]
    pub lowpass: Option<f64>,
    /// Boundaries were typed in by the operator.
    #[serde(default)]
    pub manual: bool,
}

impl CacheRecord {
    pub fn band(&self) -> FilterBand {
        FilterBand { highpass: self.highpass, lowpass: self.lowpass }
    }
}

/// A valid cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSegment {
    pub record: CacheRecord,
    pub events: Vec<ClassifiedEvent>,
}

impl CachedSegment {
    /// Adopt `band` if it differs from the cached one.  Boundaries and events
    /// are kept.  Returns whether anything changed.
    pub fn refresh_band(&mut self, band: FilterBand) -> bool {
        if self.record.band() == band {
            return false;
        }
        self.record.highpass = band.highpass;
        self.record.lowpass = band.lowpass;
        true
    }
}

/// Outcome of [`load`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    Present(CachedSegment),
    Absent,
}

/// Read the cache for `loc`.
///
/// A missing cache, or one where only one of the two files survived, is
/// [`CacheState::Absent`].  A cache that exists but cannot be parsed is an
/// error.
pub fn load(loc: &CacheLocation) -> Result<CacheState> {
    let meta_path = loc.metadata();
    let events_path = loc.events();
    match (meta_path.exists(), events_path.exists()) {
        (true, true) => {}
        (false, false) => return Ok(CacheState::Absent),
        (has_meta, _) => {
            let lone = if has_meta { &meta_path } else { &events_path };
            log::warn!("Ignoring partial cache: only {} exists", lone.display());
            return Ok(CacheState::Absent);
        }
    }

    let text = fs::read_to_string(&meta_path)
        .map_err(|e| Error::io(format!("reading {}", meta_path.display()), e))?;
    let record: CacheRecord = serde_json::from_str(&text)
        .map_err(|e| Error::json(format!("parsing {}", meta_path.display()), e))?;
    let events = read_events(&events_path)?;
    log::debug!(
        "Loaded cache {} ({} events, {:.3}–{:.3} s)",
        meta_path.display(),
        events.len(),
        record.start_seconds,
        record.stop_seconds
    );
    Ok(CacheState::Present(CachedSegment { record, events }))
}

/// Persist `record` and `events`, events first.
pub fn save(loc: &CacheLocation, record: &CacheRecord, events: &[ClassifiedEvent]) -> Result<()> {
    fs::create_dir_all(&loc.dir)
        .map_err(|e| Error::io(format!("creating {}", loc.dir.display()), e))?;
    write_atomic(&loc.events(), &encode_events(events)?)?;
    save_metadata(loc, record)
}

/// Rewrite only the metadata document (used after a band refresh).
pub fn save_metadata(loc: &CacheLocation, record: &CacheRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .map_err(|e| Error::json("serialising cache record", e))?;
    write_atomic(&loc.metadata(), &json)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| Error::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(format!("renaming to {}", path.display()), e))
}

fn encode_events(events: &[ClassifiedEvent]) -> Result<Vec<u8>> {
    let mut flat = Vec::with_capacity(events.len() * 3);
    for e in events {
        let sample = i32::try_from(e.sample)
            .map_err(|_| anyhow::anyhow!("event sample {} does not fit the event array", e.sample))?;
        let trigger = i32::try_from(e.trigger)
            .map_err(|_| anyhow::anyhow!("trigger code {} does not fit the event array", e.trigger))?;
        flat.extend_from_slice(&[sample, trigger, e.label.id()]);
    }
    let mut w = StWriter::new();
    w.add_i32("events", &flat, &[events.len(), 3]);
    Ok(w.to_bytes()?)
}

fn read_events(path: &Path) -> Result<Vec<ClassifiedEvent>> {
    let f = StFile::load(path)?;
    let shape = f.shape("events")?;
    if shape.len() != 2 || shape[1] != 3 {
        return Err(anyhow::anyhow!("{}: event array has shape {shape:?}", path.display()).into());
    }
    f.i32s("events")?
        .chunks_exact(3)
        .map(|row| -> Result<ClassifiedEvent> {
            let label = EventLabel::from_id(row[2])
                .ok_or_else(|| anyhow::anyhow!("{}: unknown event id {}", path.display(), row[2]))?;
            Ok(ClassifiedEvent {
                sample: u64::try_from(row[0]).map_err(|_| anyhow::anyhow!("negative sample"))?,
                trigger: u32::try_from(row[1]).map_err(|_| anyhow::anyhow!("negative trigger"))?,
                label,
            })
        })
        .collect()
}
