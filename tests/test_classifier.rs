mod common;
use std::collections::HashSet;

use chrono::NaiveDate;
use common::{at, paired_tones, train, write_tone_logs};
use fmed_eeg::classifier::{classify, label_events, tone_log_path, which_sequence};
use fmed_eeg::{EventLabel, Error, ProtocolVariant};

#[test]
fn same_inputs_same_labels() {
    let events = at(&train(0, 256, 40));
    let tones: Vec<String> = paired_tones(60).split(',').map(str::to_string).collect();
    let a = label_events(&events, &tones);
    let b = label_events(&events, &tones);
    assert_eq!(a, b);
    assert_eq!(a[0].label, EventLabel::Unknown);
    assert_eq!(a.iter().filter(|e| e.label == EventLabel::Standard).count(), 20);
    assert_eq!(a.iter().filter(|e| e.label == EventLabel::Deviant).count(), 19);
    // Samples and trigger codes are untouched.
    assert!(a.iter().zip(&events).all(|(l, e)| l.sample == e.sample && l.trigger == e.trigger));
}

#[test]
fn selector_covers_parity_and_half_day() {
    // Day 154 (even) and 155 (odd), 09:00 and 15:00.
    let day = |d: u32, h: u32| NaiveDate::from_ymd_opt(2013, 6, d).unwrap().and_hms_opt(h, 0, 0).unwrap();
    let picks = [
        (which_sequence(day(3, 9)), 0),
        (which_sequence(day(3, 15)), 1),
        (which_sequence(day(4, 9)), 2),
        (which_sequence(day(4, 15)), 3),
    ];
    for (got, want) in picks {
        assert_eq!(got, want);
    }
    let paths: HashSet<_> = (0..4)
        .map(|w| tone_log_path(std::path::Path::new("t"), ProtocolVariant::North, w))
        .collect();
    assert_eq!(paths.len(), 4);
}

#[test]
fn classify_reads_the_selected_log() {
    let dir = tempfile::tempdir().unwrap();
    let variant = ProtocolVariant::South;
    // Distinct logs: only sequence 1 repeats every tone.
    for which in 0..4u8 {
        let path = tone_log_path(dir.path(), variant, which);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let line = if which == 1 {
            vec!["7"; 10].join(",")
        } else {
            (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join(",")
        };
        std::fs::write(&path, line).unwrap();
    }

    // Recorded 14:00 on day 154; segment at 318 s → script started 14:00.
    let recorded = NaiveDate::from_ymd_opt(2013, 6, 3).unwrap().and_hms_opt(14, 0, 0).unwrap();
    let events = at(&train(0, 100, 8));
    let c = classify(&events, recorded, 318.0, variant, dir.path()).unwrap();
    assert_eq!(c.which_sequence, 1);
    assert_eq!(c.tone_log, tone_log_path(dir.path(), variant, 1));
    assert!(!c.near_noon);
    assert_eq!(c.count(EventLabel::Standard), 7);
    assert_eq!(c.count(EventLabel::Deviant), 0);
}

#[test]
fn near_noon_is_flagged_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_tone_logs(dir.path(), ProtocolVariant::North, &paired_tones(10));
    let recorded = NaiveDate::from_ymd_opt(2013, 6, 3).unwrap().and_hms_opt(11, 55, 0).unwrap();
    let c = classify(&at(&train(0, 100, 5)), recorded, 312.0, ProtocolVariant::North, dir.path()).unwrap();
    assert!(c.near_noon);
    assert_eq!(c.which_sequence, 0);
}

#[test]
fn short_tone_log_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_tone_logs(dir.path(), ProtocolVariant::North, &paired_tones(4));
    let recorded = common::recorded(9, 0);
    let err = classify(&at(&train(0, 100, 5)), recorded, 400.0, ProtocolVariant::North, dir.path()).unwrap_err();
    assert!(matches!(err, Error::ToneLogTooShort { tones: 4, events: 5, .. }));
}
