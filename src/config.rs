//! Session configuration.
//!
//! [`SessionConfig`] holds every tunable parameter for processing one
//! recording.  All fields have defaults matching the study protocol; the
//! per-kind constants (event counts, durations, filter band, epoch window)
//! live in [`KindParams`].
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How wide a buffer (seconds) is kept around the located segment.
pub const BUFFER_SECONDS: f64 = 2.0;

/// High-pass cutoff used when displaying raw data for artifact review.
pub const HIGHPASS_ARTIFACT_VIEW: f64 = 0.5;

/// Environment variable naming the tone-sequence directory.
pub const TONE_DIR_ENV: &str = "FMED_TONE_DIR";

/// The two recording kinds in the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Mismatch negativity: roving oddball, Standard / Deviant tones.
    Mmn,
    /// Auditory brainstem response: click train, one condition.
    Abr,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Mmn => "mmn",
            Kind::Abr => "abr",
        }
    }

    /// Evoked conditions written per recording and read by the group tools.
    pub fn conditions(self) -> &'static [&'static str] {
        match self {
            Kind::Mmn => &["all", "standard", "deviant"],
            Kind::Abr => &["all"],
        }
    }

    /// Protocol constants for this kind.
    pub fn params(self) -> KindParams {
        match self {
            Kind::Mmn => KindParams {
                expected_count: 2000,
                expected_duration: 1000.0,
                band: FilterBand { highpass: Some(1.0), lowpass: Some(35.0) },
                tmin: -0.1,
                tmax: 0.5,
                classify: true,
            },
            Kind::Abr => KindParams {
                expected_count: 4000,
                expected_duration: 200.0,
                band: FilterBand { highpass: Some(100.0), lowpass: Some(3000.0) },
                tmin: -0.002,
                tmax: 0.012,
                classify: false,
            },
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mmn" => Ok(Kind::Mmn),
            "abr" => Ok(Kind::Abr),
            other => Err(format!("unknown recording kind '{other}' (expected mmn or abr)")),
        }
    }
}

/// Per-kind protocol constants.
#[derive(Debug, Clone, PartialEq)]
pub struct KindParams {
    /// Number of stimulus triggers in one complete run.
    pub expected_count: usize,
    /// Nominal run length in seconds, buffers included.
    pub expected_duration: f64,
    /// Default analysis band.
    pub band: FilterBand,
    /// Epoch window start relative to the event (s).
    pub tmin: f64,
    /// Epoch window end relative to the event (s).
    pub tmax: f64,
    /// Whether events are relabelled Standard / Deviant from a tone log.
    pub classify: bool,
}

/// Band-pass corner frequencies in Hz.  `None` disables that side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterBand {
    pub highpass: Option<f64>,
    pub lowpass: Option<f64>,
}

/// Which of the two field deployments produced the recording.
///
/// Each deployment played the stimulus through a different script, so the
/// delay from script start to the first tone and the tone-log files differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVariant {
    /// 2012 deployment.
    #[default]
    North,
    /// Initial 2013 deployment.
    South,
}

impl ProtocolVariant {
    /// Seconds from the stimulus script starting to the first tone.
    pub fn seconds_to_first_tone(self) -> f64 {
        match self {
            // accept prompt + 300 s silence + lead-in
            ProtocolVariant::North => (2 + 300 + 10) as f64,
            // accept prompt + 303 s silence file + 1 s gap + lead-in
            ProtocolVariant::South => (2 + 303 + 1 + 12) as f64,
        }
    }

    pub fn subdir(self) -> &'static str {
        match self {
            ProtocolVariant::North => "north",
            ProtocolVariant::South => "south",
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            ProtocolVariant::North => "MMN_roving_with_trigger_dpdb01_seed_10",
            ProtocolVariant::South => "MMN_roving_with_trigger_dpdb02_seed_10",
        }
    }

    pub fn file_suffix(self) -> &'static str {
        match self {
            ProtocolVariant::North => "_21-Dec-2012_tone_sequence.txt",
            ProtocolVariant::South => "_31-May-2014_tone_sequence.txt",
        }
    }
}

/// Where cache and analysis outputs go for a source file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Require the source to live under a `raw-data` directory.
    #[default]
    StudyTree,
    /// Study tree when the source is under `raw-data`, else this directory.
    Fallback(PathBuf),
    /// Always write into this directory, even for study-tree sources.
    Override(PathBuf),
}

/// Configuration for processing one recording.
///
/// ```
/// use fmed_eeg::{Kind, SessionConfig};
///
/// let cfg = SessionConfig {
///     buffer_seconds: 1.0,
///     ..SessionConfig::new(Kind::Abr)
/// };
/// assert_eq!(cfg.params.expected_count, 4000);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub kind: Kind,
    /// Protocol constants, normally `kind.params()`.
    pub params: KindParams,
    pub variant: ProtocolVariant,
    /// Root of the tone-sequence logs (`<dir>/<north|south>/<file>`).
    pub tone_dir: PathBuf,
    pub buffer_seconds: f64,
    /// Requested analysis band; overrides what a cache holds.
    pub band: FilterBand,
    pub cache_policy: CachePolicy,
    /// Trigger pulses shorter than this many samples are discarded.
    /// `0` keeps every pulse.
    pub min_event_samples: usize,
}

impl SessionConfig {
    pub fn new(kind: Kind) -> Self {
        let params = kind.params();
        Self {
            kind,
            band: params.band,
            params,
            variant: ProtocolVariant::default(),
            tone_dir: default_tone_dir(),
            buffer_seconds: BUFFER_SECONDS,
            cache_policy: CachePolicy::default(),
            min_event_samples: 0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Kind::Mmn)
    }
}

/// `$FMED_TONE_DIR`, falling back to `./MMN_tone_sequences`.
pub fn default_tone_dir() -> PathBuf {
    std::env::var_os(TONE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("MMN_tone_sequences"))
}
