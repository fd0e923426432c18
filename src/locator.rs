//! Event-segment locator.
//!
//! A continuous recording holds many trigger pulses: test tones, aborted
//! runs, cable glitches.  The experiment proper is the first run of exactly
//! `expected_count` consecutive events whose span, padded by
//! `buffer_seconds` on each side, lasts `expected_duration ± 2·buffer`
//! seconds.
//!
//! ```text
//! events   ─┬──┬─────┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬┬──┬───
//!           0  1     2 ·  ·  ·  ·  ·  ·  ·  ·  ·  ·  ·  ·  · K+1
//! window i=2         [buffer|◄──── K events ────►|buffer]
//!                    start                            stop
//! ```
//!
//! The scan is first-fit: the smallest accepted window start wins, even if a
//! later window is closer to the nominal duration.  When no window fits the
//! locator does not prompt anybody; it returns
//! [`Located::NeedsManualInput`] and the caller obtains the boundaries.
use crate::error::{Error, Result};
use crate::events::TriggerEvent;

/// Slack for float rounding at the tolerance edges (seconds).
const EDGE_EPS: f64 = 1e-9;

/// What a complete run of one recording kind looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorParams {
    pub expected_count: usize,
    /// Nominal duration in seconds including both buffers.
    pub expected_duration: f64,
    pub buffer_seconds: f64,
    /// Human-readable kind label for messages.
    pub kind: &'static str,
}

impl LocatorParams {
    /// Accepted duration range `[expected − 2·buffer, expected + 2·buffer]`.
    pub fn tolerance(&self) -> (f64, f64) {
        let slack = 2.0 * self.buffer_seconds;
        (self.expected_duration - slack, self.expected_duration + slack)
    }

    fn accepts(&self, duration: f64) -> bool {
        let (lo, hi) = self.tolerance();
        duration >= lo - EDGE_EPS && duration <= hi + EDGE_EPS
    }
}

/// How a segment's boundaries were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOrigin {
    /// Found by the scan; `start_index` is the accepted window start.
    Automatic { start_index: usize },
    /// Typed in by the operator; not checked against the tolerance.
    Manual,
}

/// The experiment window of a recording and the events inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Crop start in file seconds.  May be negative when the first event
    /// sits closer than one buffer to the start of the file.
    pub start_seconds: f64,
    pub stop_seconds: f64,
    pub events: Vec<TriggerEvent>,
    pub origin: SegmentOrigin,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.stop_seconds - self.start_seconds
    }

    pub fn is_manual(&self) -> bool {
        self.origin == SegmentOrigin::Manual
    }

    /// Build a segment from operator-supplied boundaries.
    ///
    /// The values are trusted as given.  Events are taken from the first one
    /// at or after `start_seconds`, up to `max_events`, stopping at
    /// `stop_seconds`.
    pub fn manual(
        events: &[TriggerEvent],
        sfreq: f64,
        start_seconds: f64,
        stop_seconds: f64,
        max_events: usize,
    ) -> Self {
        let first = first_at_or_after(events, start_seconds * sfreq);
        let stop_sample = stop_seconds * sfreq;
        let events = events[first..]
            .iter()
            .take(max_events)
            .take_while(|e| e.sample as f64 <= stop_sample)
            .copied()
            .collect();
        Self { start_seconds, stop_seconds, events, origin: SegmentOrigin::Manual }
    }
}

/// Why the automatic scan gave up; handed to whoever collects manual input.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualRequest {
    pub kind: &'static str,
    pub expected_count: usize,
    pub expected_duration: f64,
    pub tolerance: (f64, f64),
    /// Number of window starts examined.
    pub windows_checked: usize,
    /// Duration of the examined window closest to `expected_duration`.
    pub closest_duration: Option<f64>,
    /// Length of the whole recording in seconds, when known.
    pub recording_seconds: Option<f64>,
}

/// Outcome of [`locate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    Found(Segment),
    NeedsManualInput(ManualRequest),
}

/// Padded duration of the window `[start, start + count)`, in seconds.
pub fn window_duration(
    events: &[TriggerEvent],
    start: usize,
    count: usize,
    sfreq: f64,
    buffer_seconds: f64,
) -> f64 {
    let first = events[start].sample;
    let last = events[start + count - 1].sample;
    (last - first) as f64 / sfreq + 2.0 * buffer_seconds
}

/// Find the first window of `params.expected_count` events whose padded span
/// is in tolerance.
///
/// # Errors
///
/// [`Error::InsufficientEvents`] when fewer than `expected_count` events
/// exist at all.  Not finding a window is *not* an error.
pub fn locate(events: &[TriggerEvent], sfreq: f64, params: &LocatorParams) -> Result<Located> {
    let count = params.expected_count;
    if count == 0 || events.len() < count {
        return Err(Error::InsufficientEvents {
            kind: params.kind,
            found: events.len(),
            expected: count,
        });
    }

    let n_windows = events.len() - count + 1;
    let mut closest: Option<f64> = None;
    for i in 0..n_windows {
        let duration = window_duration(events, i, count, sfreq, params.buffer_seconds);
        if params.accepts(duration) {
            log::debug!(
                "{} segment: window at event {i} spans {duration:.3} s",
                params.kind
            );
            return Ok(Located::Found(automatic_segment(events, i, sfreq, params)));
        }
        let better = closest.map_or(true, |c| {
            (duration - params.expected_duration).abs() < (c - params.expected_duration).abs()
        });
        if better {
            closest = Some(duration);
        }
    }

    Ok(Located::NeedsManualInput(ManualRequest {
        kind: params.kind,
        expected_count: count,
        expected_duration: params.expected_duration,
        tolerance: params.tolerance(),
        windows_checked: n_windows,
        closest_duration: closest,
        recording_seconds: None,
    }))
}

fn automatic_segment(
    events: &[TriggerEvent],
    i: usize,
    sfreq: f64,
    params: &LocatorParams,
) -> Segment {
    let count = params.expected_count;
    let buffer_samples = params.buffer_seconds * sfreq;
    let start_sample = events[i].sample as f64 - buffer_samples;
    let stop_sample = events[i + count - 1].sample as f64 + buffer_samples;

    // Events are re-selected from the computed start sample, so a stray pulse
    // inside the leading buffer becomes part of the segment.
    let first = first_at_or_after(events, start_sample);
    let last = (first + count).min(events.len());

    Segment {
        start_seconds: start_sample / sfreq,
        stop_seconds: stop_sample / sfreq,
        events: events[first..last].to_vec(),
        origin: SegmentOrigin::Automatic { start_index: i },
    }
}

/// Index of the first event whose sample is `>= sample`.
fn first_at_or_after(events: &[TriggerEvent], sample: f64) -> usize {
    events.partition_point(|e| (e.sample as f64) < sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(samples: &[u64]) -> Vec<TriggerEvent> {
        samples.iter().map(|&sample| TriggerEvent { sample, trigger: 1 }).collect()
    }

    fn params(count: usize, duration: f64, buffer: f64) -> LocatorParams {
        LocatorParams {
            expected_count: count,
            expected_duration: duration,
            buffer_seconds: buffer,
            kind: "test",
        }
    }

    #[test]
    fn too_few_events_is_fatal() {
        let err = locate(&at(&[1, 2]), 1.0, &params(3, 10.0, 1.0)).unwrap_err();
        assert!(matches!(err, Error::InsufficientEvents { found: 2, expected: 3, .. }));
    }

    #[test]
    fn exact_count_single_window() {
        // 3 events over 8 s + 2×1 s buffer = 10 s.
        let ev = at(&[100, 500, 900]);
        let Located::Found(seg) = locate(&ev, 100.0, &params(3, 10.0, 1.0)).unwrap() else {
            panic!("expected a segment");
        };
        approx::assert_abs_diff_eq!(seg.start_seconds, 0.0);
        approx::assert_abs_diff_eq!(seg.stop_seconds, 10.0);
        assert_eq!(seg.events, ev);
        assert_eq!(seg.origin, SegmentOrigin::Automatic { start_index: 0 });
    }

    #[test]
    fn skips_leading_spurious_pulses() {
        // Two early glitches far before the run.
        let ev = at(&[0, 50, 2000, 2400, 2800]);
        let Located::Found(seg) = locate(&ev, 100.0, &params(3, 10.0, 1.0)).unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(seg.origin, SegmentOrigin::Automatic { start_index: 2 });
        assert_eq!(seg.events, at(&[2000, 2400, 2800]));
    }

    #[test]
    fn pulse_inside_leading_buffer_is_included() {
        // Event at 950 lies within 1 s (100 samples) before the accepted window;
        // window [950, 1000, 1400] spans 4.5 s + 2 s and is rejected.
        let ev = at(&[950, 1000, 1400, 1800]);
        let Located::Found(seg) = locate(&ev, 100.0, &params(3, 10.0, 1.0)).unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(seg.origin, SegmentOrigin::Automatic { start_index: 1 });
        assert_eq!(seg.events, at(&[950, 1000, 1400]));
    }

    #[test]
    fn no_window_requests_manual_input() {
        let ev = at(&[0, 100, 200, 300]);
        match locate(&ev, 100.0, &params(3, 10.0, 1.0)).unwrap() {
            Located::NeedsManualInput(req) => {
                assert_eq!(req.windows_checked, 2);
                assert_eq!(req.tolerance, (8.0, 12.0));
                approx::assert_abs_diff_eq!(req.closest_duration.unwrap(), 4.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn input_is_not_mutated() {
        let ev = at(&[0, 100, 200, 1000]);
        let copy = ev.clone();
        let _ = locate(&ev, 100.0, &params(2, 10.0, 1.0)).unwrap();
        assert_eq!(ev, copy);
    }

    #[test]
    fn manual_segment_takes_events_in_range() {
        let ev = at(&[0, 100, 200, 300, 400, 500]);
        let seg = Segment::manual(&ev, 100.0, 0.5, 4.2, 10);
        assert!(seg.is_manual());
        assert_eq!(seg.events, at(&[100, 200, 300, 400]));
        let capped = Segment::manual(&ev, 100.0, 0.5, 4.2, 2);
        assert_eq!(capped.events, at(&[100, 200]));
    }
}
