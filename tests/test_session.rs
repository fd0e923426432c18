mod common;
use std::path::Path;

use common::{paired_tones, png_size, recorded, study_path, train, write_bdf, write_tone_logs};
use fmed_eeg::{
    Annotations, CachePolicy, Error, EventLabel, Evoked, Kind, ManualEntry, ManualRequest,
    ProtocolVariant, Session, SessionConfig,
};

const SFREQ: usize = 256;

/// Returns fixed boundaries and counts how often it was asked.
struct Scripted {
    bounds: (f64, f64),
    calls: usize,
}

impl ManualEntry for Scripted {
    fn segment_bounds(&mut self, request: &ManualRequest, overview: &Path) -> anyhow::Result<(f64, f64)> {
        assert!(overview.exists(), "overview figure written before asking");
        assert!(request.closest_duration.is_some());
        self.calls += 1;
        Ok(self.bounds)
    }
}

/// Fails the test if the locator ever falls back to manual entry.
struct NoOperator;

impl ManualEntry for NoOperator {
    fn segment_bounds(&mut self, request: &ManualRequest, _: &Path) -> anyhow::Result<(f64, f64)> {
        panic!("unexpected manual entry: {request:?}");
    }
}

/// Small MMN protocol: 20 tones one second apart, 2 s buffers.
fn mmn_config(tone_dir: &Path) -> SessionConfig {
    let mut cfg = SessionConfig {
        tone_dir: tone_dir.to_path_buf(),
        ..SessionConfig::new(Kind::Mmn)
    };
    cfg.params.expected_count = 20;
    cfg.params.expected_duration = 23.0;
    cfg
}

/// Two stray pulses, then the 20-tone run starting at 10 s.
fn mmn_recording(root: &Path) -> std::path::PathBuf {
    let path = study_path(root, "FM1192", "FM1192_mmn.bdf");
    let mut onsets = vec![SFREQ as u64, 3 * SFREQ as u64];
    onsets.extend(train(10 * SFREQ as u64, SFREQ as u64, 20));
    write_bdf(&path, SFREQ, recorded(9, 0), &onsets, 40 * SFREQ);
    path
}

#[test]
fn mmn_first_run_locates_classifies_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let tones = dir.path().join("tones");
    write_tone_logs(&tones, ProtocolVariant::North, &paired_tones(30));
    let path = mmn_recording(dir.path());
    let cfg = mmn_config(&tones);

    let session = Session::open(&path, &cfg, &mut NoOperator).unwrap();
    assert!(!session.from_cache);
    approx::assert_abs_diff_eq!(session.record.start_seconds, 8.0, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(session.record.stop_seconds, 31.0, epsilon = 1e-9);
    assert!(!session.record.manual);
    assert_eq!(session.events.len(), 20);
    assert_eq!(session.events[0].sample, 10 * SFREQ as u64);

    let count = |l: EventLabel| session.events.iter().filter(|e| e.label == l).count();
    assert_eq!(count(EventLabel::Unknown), 1);
    assert_eq!(count(EventLabel::Standard), 10);
    assert_eq!(count(EventLabel::Deviant), 9);

    assert!(session.location.metadata().exists());
    assert!(session.location.events().exists());
    assert_eq!(session.recording.first_samp, 8 * SFREQ as u64);
    assert_eq!(session.recording.ch_names, ["cz", "mr", "ml", "fz", "pz", "t8"]);
    assert_eq!(session.recording.data.ncols(), 23 * SFREQ);
}

#[test]
fn second_run_uses_cache_and_refreshes_band() {
    let dir = tempfile::tempdir().unwrap();
    let tones = dir.path().join("tones");
    write_tone_logs(&tones, ProtocolVariant::North, &paired_tones(30));
    let path = mmn_recording(dir.path());
    let cfg = mmn_config(&tones);
    let first = Session::open(&path, &cfg, &mut NoOperator).unwrap();

    // Tone logs gone: a second run must not need them.
    std::fs::remove_dir_all(&tones).unwrap();
    let mut narrower = cfg.clone();
    narrower.band.lowpass = Some(30.0);
    let second = Session::open(&path, &narrower, &mut NoOperator).unwrap();
    assert!(second.from_cache);
    assert_eq!(second.events, first.events);
    assert_eq!(second.record.start_seconds, first.record.start_seconds);
    assert_eq!(second.record.lowpass, Some(30.0));
    assert_eq!(second.recording.band.lowpass, Some(30.0));

    let text = std::fs::read_to_string(second.location.metadata()).unwrap();
    assert!(text.contains("\"lowpass\": 30.0"), "{text}");
}

#[test]
fn bad_spans_drop_epochs_before_averaging() {
    let dir = tempfile::tempdir().unwrap();
    let tones = dir.path().join("tones");
    write_tone_logs(&tones, ProtocolVariant::North, &paired_tones(30));
    let path = mmn_recording(dir.path());
    let cfg = mmn_config(&tones);

    let mut session = Session::open(&path, &cfg, &mut NoOperator).unwrap();
    let review = session.render_review().unwrap();
    assert!(review.exists());
    let mask = session.location.artifact_mask();
    assert_eq!(Annotations::load(&mask).unwrap(), Annotations::default());

    // First tone sits 2 s into the crop; mark it bad.
    std::fs::write(&mask, "onset,duration,description\n1.9,0.3,BAD_blink\n5.0,1.0,note\n").unwrap();
    session.reload_annotations().unwrap();
    assert_eq!(session.bad_spans().len(), 1);

    let written = session.write_evoked().unwrap();
    let naves: Vec<(String, usize)> = written.iter().map(|(e, _)| (e.condition.clone(), e.nave)).collect();
    assert_eq!(
        naves,
        [("all".to_string(), 19), ("standard".to_string(), 10), ("deviant".to_string(), 9)]
    );
    for (evoked, path) in &written {
        let back = Evoked::load(path).unwrap();
        assert_eq!(back.nave, evoked.nave);
        assert_eq!(back.times.len(), 155);
    }
}

#[test]
fn manual_entry_when_no_window_fits() {
    let dir = tempfile::tempdir().unwrap();
    let path = study_path(dir.path(), "FM7779", "FM7779_abr.bdf");
    let onsets = train(4 * SFREQ as u64, SFREQ as u64 / 2, 12);
    write_bdf(&path, SFREQ, recorded(15, 30), &onsets, 20 * SFREQ);

    let mut cfg = SessionConfig::new(Kind::Abr);
    cfg.params.expected_count = 10;
    cfg.params.expected_duration = 100.0;

    let mut operator = Scripted { bounds: (3.0, 12.0), calls: 0 };
    let session = Session::open(&path, &cfg, &mut operator).unwrap();
    assert_eq!(operator.calls, 1);
    assert!(session.record.manual);
    // Six electrode panels above the trigger panel.
    let (_, height) = png_size(&session.location.overview_png());
    assert_eq!(height, 7 * fmed_eeg::plot::OVERVIEW_PANEL_HEIGHT);
    assert_eq!(session.events.len(), 10);
    assert!(session.events.iter().all(|e| e.label == EventLabel::Unknown));
    assert_eq!(session.events[9].sample, (8.5 * SFREQ as f64) as u64);

    // Manual boundaries are cached like automatic ones.
    let again = Session::open(&path, &cfg, &mut NoOperator).unwrap();
    assert!(again.from_cache);
    assert!(again.record.manual);
    assert_eq!(again.events, session.events);

    let written = again.write_evoked().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0.condition, "all");
    assert_eq!(written[0].0.nave, 10);
}

#[test]
fn outside_study_tree_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loose.bdf");
    write_bdf(&path, SFREQ, recorded(9, 0), &train(SFREQ as u64, SFREQ as u64, 3), 5 * SFREQ);

    let cfg = SessionConfig::new(Kind::Abr);
    let err = Session::open(&path, &cfg, &mut NoOperator).unwrap_err();
    assert!(matches!(err, Error::MissingDirectoryStructure { .. }));

    let out = dir.path().join("out");
    let cfg = SessionConfig { cache_policy: CachePolicy::Override(out.clone()), ..cfg };
    let err = Session::open(&path, &cfg, &mut NoOperator).unwrap_err();
    assert!(matches!(err, Error::InsufficientEvents { found: 3, .. }));
    assert!(!out.exists());
}

#[test]
fn explicit_output_dir_wins_over_study_tree() {
    let dir = tempfile::tempdir().unwrap();
    let tones = dir.path().join("tones");
    write_tone_logs(&tones, ProtocolVariant::North, &paired_tones(30));
    let path = mmn_recording(dir.path());
    let out = dir.path().join("elsewhere");
    let cfg = SessionConfig {
        cache_policy: CachePolicy::Override(out.clone()),
        ..mmn_config(&tones)
    };

    let session = Session::open(&path, &cfg, &mut NoOperator).unwrap();
    assert_eq!(session.location.dir, out);
    assert!(session.location.metadata().exists());
    assert!(!dir.path().join("study/analyses").exists());
}

#[test]
fn per_recording_figures() {
    let dir = tempfile::tempdir().unwrap();
    let tones = dir.path().join("tones");
    write_tone_logs(&tones, ProtocolVariant::North, &paired_tones(30));
    let path = mmn_recording(dir.path());
    let session = Session::open(&path, &mmn_config(&tones), &mut NoOperator).unwrap();

    let cz = session.plot_standard_deviant(Some("Cz")).unwrap();
    assert_eq!(cz, session.location.figure("sminusd_cz"));
    let mean = session.plot_standard_deviant(None).unwrap();
    assert_eq!(mean, session.location.figure("sminusd_mean"));
    let average = session.plot_epoch_average().unwrap();
    let psd = session.plot_psd(40.0).unwrap();
    for png in [&cz, &mean, &average, &psd] {
        assert!(png.exists(), "{} missing", png.display());
    }
    assert!(session.plot_standard_deviant(Some("oz")).is_err());
}

#[test]
fn standard_deviant_figure_needs_classified_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = study_path(dir.path(), "FM7779", "FM7779_abr.bdf");
    write_bdf(&path, SFREQ, recorded(15, 30), &train(4 * SFREQ as u64, SFREQ as u64 / 2, 10), 20 * SFREQ);
    let mut cfg = SessionConfig::new(Kind::Abr);
    cfg.params.expected_count = 10;
    cfg.params.expected_duration = 8.5;

    let session = Session::open(&path, &cfg, &mut NoOperator).unwrap();
    assert!(session.plot_standard_deviant(None).is_err());
    assert!(session.plot_epoch_average().unwrap().exists());
}
