//! # fmed_eeg: auditory ERP processing for BioSemi recordings
//!
//! Takes long field recordings (BDF, EXG1–EXG6 plus `Status`) from a
//! mismatch-negativity (MMN) or auditory-brainstem-response (ABR) protocol
//! and turns them into per-condition evoked responses and group statistics.
//! The DSP steps follow MNE-Python's defaults.
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.bdf
//!   │
//!   ├─ bdf::open_raw()          native 24-bit BDF reader
//!   ├─ events::find_events()    Status channel → trigger onsets
//!   ├─ locator::locate()        first window of K events with the right span
//!   │     └─ NeedsManualInput   operator types the boundaries
//!   ├─ classifier::classify()   tone log → Standard / Deviant  (MMN only)
//!   ├─ cache::save()            JSON record + safetensors event array
//!   ├─ crop, EXG rename, mastoid reference, FIR band-pass
//!   ├─ annotations              BAD spans from the artifact mask
//!   ├─ epoch::extract_epochs()  [tmin, tmax] windows, baseline ≤ 0
//!   └─ evoked                   per-condition averages (.safetensors)
//!        │
//!        ├─→ grand_average      nave-weighted averages + figures
//!        └─→ group_stats        areas / peak-to-peak, cohort t-tests
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use fmed_eeg::{Kind, ManualEntry, ManualRequest, Session, SessionConfig};
//!
//! struct Refuse;
//! impl ManualEntry for Refuse {
//!     fn segment_bounds(&mut self, _: &ManualRequest, _: &Path) -> anyhow::Result<(f64, f64)> {
//!         anyhow::bail!("no operator available")
//!     }
//! }
//!
//! let cfg = SessionConfig::new(Kind::Mmn);
//! let session = Session::open(
//!     Path::new("study/raw-data/FM1192/FM1192_MMN.bdf"),
//!     &cfg,
//!     &mut Refuse,
//! )?;
//! for (evoked, path) in session.write_evoked()? {
//!     println!("{}: nave {} → {}", evoked.condition, evoked.nave, path.display());
//! }
//! # Ok::<(), fmed_eeg::Error>(())
//! ```

pub mod annotations;
pub mod bdf;
pub mod cache;
pub mod classifier;
pub mod cohort;
pub mod config;
pub mod epoch;
pub mod error;
pub mod events;
pub mod evoked;
pub mod filter;
pub mod io;
pub mod locator;
pub mod plot;
pub mod psd;
pub mod reference;
pub mod resample;
pub mod session;
pub mod stats;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{CachePolicy, FilterBand, Kind, KindParams, ProtocolVariant, SessionConfig};

// error
pub use error::{Error, Result};

// events + segment location
pub use events::{find_events, ClassifiedEvent, EventLabel, TriggerEvent};
pub use locator::{locate, Located, LocatorParams, ManualRequest, Segment, SegmentOrigin};

// classification
pub use classifier::{classify, Classification, ToneSequenceLog};

// cache
pub use cache::{CacheLocation, CacheRecord, CacheState, CachedSegment};

// session
pub use session::{ManualEntry, Recording, Session};

// epochs + evoked
pub use annotations::{Annotation, Annotations};
pub use epoch::{extract_epochs, Epochs};
pub use evoked::{combine_weighted, difference, grand_average, Evoked};

// group analysis
pub use cohort::{Cohort, GroupData, SubjectEvoked, TimeAxis};
pub use stats::{peak_to_peak, simpson, ttest_ind, ttest_welch_weighted, TTest};
