//! Standard / Deviant labelling from the stimulus tone logs.
//!
//! The stimulus PC played one of four pre-generated roving-oddball tone
//! sequences, chosen by day-of-year parity and morning / afternoon.  The
//! triggers only mark tone onsets, so the sequence actually played is
//! recovered from the recording's start time:
//!
//! ```text
//! actual_start   = recorded_time + (segment.start − seconds_to_first_tone)
//! day_segment    = 1 if actual_start.hour >= 12 else 0
//! day_parity     = day_of_year(actual_start) mod 2
//! which_sequence = 2 · day_parity + day_segment          ∈ {0, 1, 2, 3}
//! ```
//!
//! Event `i ≥ 1` is Standard when tone `i` repeats tone `i − 1`, otherwise
//! Deviant; event 0 stays Unknown.
//!
//! The AM/PM split is known to be unreliable for runs started close to noon.
//! That case is reported, not corrected.
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::config::ProtocolVariant;
use crate::error::{Error, Result};
use crate::events::{ClassifiedEvent, EventLabel, TriggerEvent};

/// Half-width of the window around noon in which the selector is suspect.
pub const NOON_AMBIGUITY_SECONDS: i64 = 600;

pub const NEAR_NOON_WARNING: &str =
    "Script start is within 10 minutes of noon; the AM/PM tone sequence selection may be wrong";

/// One tone-sequence log: ordered tone identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneSequenceLog {
    pub path: PathBuf,
    pub tones: Vec<String>,
}

impl ToneSequenceLog {
    /// Read a log file.  Only the first line is used; the files carry more
    /// tones than any run needs.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ToneLogNotFound { path: path.to_path_buf() });
            }
            Err(e) => return Err(Error::io(format!("reading {}", path.display()), e)),
        };
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let line = text.lines().find(|l| !l.trim().is_empty()).ok_or_else(|| {
            Error::MalformedToneLog { path: path.to_path_buf(), message: "file is empty".into() }
        })?;
        let tones: Vec<String> = line.split(',').map(|t| t.trim().to_string()).collect();
        if tones.iter().any(String::is_empty) {
            return Err(Error::MalformedToneLog {
                path: path.to_path_buf(),
                message: "empty tone identifier".into(),
            });
        }
        Ok(Self { path: path.to_path_buf(), tones })
    }
}

/// Result of labelling one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub events: Vec<ClassifiedEvent>,
    pub actual_start: NaiveDateTime,
    pub which_sequence: u8,
    pub tone_log: PathBuf,
    /// `actual_start` fell within ±10 minutes of noon.
    pub near_noon: bool,
}

impl Classification {
    pub fn count(&self, label: EventLabel) -> usize {
        self.events.iter().filter(|e| e.label == label).count()
    }
}

/// Wall-clock time the stimulus script was started.
pub fn actual_start(
    recorded: NaiveDateTime,
    segment_start_seconds: f64,
    variant: ProtocolVariant,
) -> NaiveDateTime {
    let offset = segment_start_seconds - variant.seconds_to_first_tone();
    recorded + Duration::milliseconds((offset * 1000.0).round() as i64)
}

/// `2 · (day_of_year mod 2) + (hour >= 12)`.
pub fn sequence_index(day_of_year: u32, hour: u32) -> u8 {
    let day_segment = u8::from(hour >= 12);
    let day_parity = (day_of_year % 2) as u8;
    2 * day_parity + day_segment
}

pub fn which_sequence(actual_start: NaiveDateTime) -> u8 {
    sequence_index(actual_start.ordinal(), actual_start.hour())
}

/// `true` when `t` is within ±[`NOON_AMBIGUITY_SECONDS`] of that day's noon.
pub fn near_noon(t: NaiveDateTime) -> bool {
    let noon = t.date().and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default());
    (t - noon).num_seconds().abs() <= NOON_AMBIGUITY_SECONDS
}

/// `<tone_dir>/<subdir>/<prefix><which><suffix>`.
pub fn tone_log_path(tone_dir: &Path, variant: ProtocolVariant, which: u8) -> PathBuf {
    tone_dir.join(variant.subdir()).join(format!(
        "{}{}{}",
        variant.file_prefix(),
        which,
        variant.file_suffix()
    ))
}

/// Label `events` against `tones` by comparing neighbouring tones.
///
/// Pure: the same inputs always give the same labels.  `tones` must hold at
/// least `events.len()` entries.
pub fn label_events(events: &[TriggerEvent], tones: &[String]) -> Vec<ClassifiedEvent> {
    let mut out: Vec<ClassifiedEvent> = events.iter().copied().map(ClassifiedEvent::from).collect();
    for i in 1..out.len() {
        out[i].label = if tones[i] == tones[i - 1] {
            EventLabel::Standard
        } else {
            EventLabel::Deviant
        };
    }
    out
}

/// Select the tone log for this recording and label the segment's events.
///
/// # Errors
///
/// * [`Error::ToneLogNotFound`]: the selected log does not exist.
/// * [`Error::ToneLogTooShort`]: fewer tones than events.
pub fn classify(
    events: &[TriggerEvent],
    recorded: NaiveDateTime,
    segment_start_seconds: f64,
    variant: ProtocolVariant,
    tone_dir: &Path,
) -> Result<Classification> {
    let start = actual_start(recorded, segment_start_seconds, variant);
    log::info!("Script start day of year = {}", start.ordinal());

    let near = near_noon(start);
    if near {
        log::warn!("{NEAR_NOON_WARNING}");
    }

    let which = which_sequence(start);
    let path = tone_log_path(tone_dir, variant, which);
    log::info!("Loading tone sequence from {}", path.display());
    let log = ToneSequenceLog::load(&path)?;
    if log.tones.len() < events.len() {
        return Err(Error::ToneLogTooShort {
            path,
            tones: log.tones.len(),
            events: events.len(),
        });
    }

    let classification = Classification {
        events: label_events(events, &log.tones),
        actual_start: start,
        which_sequence: which,
        tone_log: path,
        near_noon: near,
    };
    log::info!(
        "Determined {} standard events and {} deviant events",
        classification.count(EventLabel::Standard),
        classification.count(EventLabel::Deviant)
    );
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    fn ev(n: usize) -> Vec<TriggerEvent> {
        (0..n as u64).map(|i| TriggerEvent { sample: i * 100, trigger: 1 }).collect()
    }

    fn tones(s: &str) -> Vec<String> {
        s.split(',').map(str::to_string).collect()
    }

    #[test]
    fn selector_formula() {
        assert_eq!(sequence_index(2, 9), 0);
        assert_eq!(sequence_index(2, 12), 1);
        assert_eq!(sequence_index(3, 11), 2);
        assert_eq!(sequence_index(3, 23), 3);
    }

    #[test]
    fn actual_start_subtracts_script_lead_in() {
        let recorded = dt(2012, 12, 21, 10, 0, 0);
        let start = actual_start(recorded, 400.0, ProtocolVariant::North);
        // 400 − 312 = 88 s after the recording started.
        assert_eq!(start, dt(2012, 12, 21, 10, 1, 28));
        let south = actual_start(recorded, 400.0, ProtocolVariant::South);
        assert_eq!(south, dt(2012, 12, 21, 10, 1, 22));
    }

    #[test]
    fn actual_start_can_cross_midnight() {
        // Segment starts before the lead-in elapsed: previous day.
        let recorded = dt(2013, 3, 2, 0, 1, 0);
        let start = actual_start(recorded, 12.0, ProtocolVariant::North);
        assert_eq!(start, dt(2013, 3, 1, 23, 56, 0));
        assert_eq!(which_sequence(start), 1); // day 60 (even), PM
    }

    #[test]
    fn near_noon_window() {
        assert!(near_noon(dt(2013, 1, 1, 11, 50, 0)));
        assert!(near_noon(dt(2013, 1, 1, 12, 10, 0)));
        assert!(!near_noon(dt(2013, 1, 1, 12, 10, 1)));
        assert!(!near_noon(dt(2013, 1, 1, 11, 49, 59)));
    }

    #[test]
    fn first_event_stays_unknown() {
        let labelled = label_events(&ev(5), &tones("a,a,b,b,a,c"));
        let labels: Vec<EventLabel> = labelled.iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            vec![
                EventLabel::Unknown,
                EventLabel::Standard,
                EventLabel::Deviant,
                EventLabel::Standard,
                EventLabel::Deviant,
            ]
        );
    }

    #[test]
    fn tone_log_path_layout() {
        let p = tone_log_path(Path::new("/tones"), ProtocolVariant::North, 2);
        assert_eq!(
            p,
            Path::new("/tones/north/MMN_roving_with_trigger_dpdb01_seed_102_21-Dec-2012_tone_sequence.txt")
        );
    }

    #[test]
    fn parse_trims_and_rejects_empty() {
        let log = ToneSequenceLog::parse(Path::new("x"), " 1, 2 ,3\n").unwrap();
        assert_eq!(log.tones, vec!["1", "2", "3"]);
        assert!(ToneSequenceLog::parse(Path::new("x"), "\n\n").is_err());
        assert!(ToneSequenceLog::parse(Path::new("x"), "1,,2").is_err());
    }

    #[test]
    fn missing_log_is_reported() {
        let err = classify(
            &ev(3),
            dt(2013, 1, 1, 9, 0, 0),
            500.0,
            ProtocolVariant::North,
            Path::new("/nonexistent/tones"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ToneLogNotFound { .. }));
    }
}
