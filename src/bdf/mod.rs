//! BioSemi BDF file format.
//!
//! BDF is EDF with 24-bit samples and a dedicated `Status` channel carrying
//! the trigger word.
//!
//! # Quick start
//! ```no_run
//! use fmed_eeg::bdf::open_raw;
//!
//! let raw = open_raw("subject_mmn.bdf").unwrap();
//! println!("{} channels @ {} Hz", raw.ch_names().len(), raw.sfreq());
//! let data = raw.read_all_data().unwrap();  // [n_chan, n_times] f64, volts
//! let status = raw.read_status().unwrap();  // trigger word per sample
//! ```
pub mod header;
pub mod raw;

pub use header::{read_header, BdfHeader, SignalHeader, STATUS_LABEL};
pub use raw::{open_raw, write_raw, RawBdf};
