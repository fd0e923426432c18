//! Trigger decoding and event labels.
//!
//! `find_events` turns a status-channel trace into onset events the way
//! `mne.find_events(raw, consecutive='increasing')` does: an event is emitted
//! wherever the masked trigger word steps up to a new non-zero value.
use serde::{Deserialize, Serialize};

/// Trigger bits wired to the stimulus PC (low 16 bits of the status word).
pub const TRIGGER_MASK: u32 = 0xFFFF;

/// A stimulus onset on the trigger channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Absolute sample index (file time).
    pub sample: u64,
    /// Trigger code after masking.
    pub trigger: u32,
}

/// Condition label of a stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventLabel {
    #[default]
    Unknown,
    Standard,
    Deviant,
}

impl EventLabel {
    /// Numeric event id used in the persisted event array.
    pub fn id(self) -> i32 {
        match self {
            EventLabel::Unknown => 1,
            EventLabel::Standard => 2,
            EventLabel::Deviant => 3,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(EventLabel::Unknown),
            2 => Some(EventLabel::Standard),
            3 => Some(EventLabel::Deviant),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventLabel::Unknown => "Unknown",
            EventLabel::Standard => "Standard",
            EventLabel::Deviant => "Deviant",
        }
    }
}

/// A trigger event with its condition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub sample: u64,
    pub trigger: u32,
    pub label: EventLabel,
}

impl From<TriggerEvent> for ClassifiedEvent {
    fn from(e: TriggerEvent) -> Self {
        Self { sample: e.sample, trigger: e.trigger, label: EventLabel::Unknown }
    }
}

/// Extract onset events from a status trace.
///
/// * `first_samp` is added to every index so events stay in file time.
/// * Pulses that stay high for fewer than `min_samples` samples are dropped
///   (flaky audio-trigger cabling produces 2–3 sample glitches); `0` keeps all.
/// * A pulse already high at the first sample has no onset in the trace and
///   is not reported.
pub fn find_events(status: &[u32], first_samp: u64, min_samples: usize) -> Vec<TriggerEvent> {
    let mut events = Vec::new();
    let mut prev = status.first().map_or(0, |&v| v & TRIGGER_MASK);
    let mut open: Option<(usize, u32)> = None;

    let close = |open: &mut Option<(usize, u32)>, end: usize, events: &mut Vec<TriggerEvent>| {
        if let Some((onset, trigger)) = open.take() {
            if end - onset >= min_samples {
                events.push(TriggerEvent { sample: first_samp + onset as u64, trigger });
            }
        }
    };

    for (t, &raw) in status.iter().enumerate() {
        let v = raw & TRIGGER_MASK;
        if v != prev {
            if v > prev {
                // step up: a new event starts here (ends the previous one)
                close(&mut open, t, &mut events);
                open = Some((t, v));
            } else if v == 0 {
                close(&mut open, t, &mut events);
            }
            prev = v;
        }
    }
    close(&mut open, status.len(), &mut events);
    events
}
