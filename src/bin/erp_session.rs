//! erp_session: locate, classify and epoch one MMN or ABR recording.
//!
//! First run on a file: finds the experiment segment, labels the events,
//! caches both next to the study tree, then shows the artifact-review figure
//! and waits for the operator to edit the artifact mask.  Later runs reuse
//! the cache.  Ends by writing one evoked file per condition, plus any
//! figures asked for on the command line.
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use fmed_eeg::{
    config::default_tone_dir, CachePolicy, FilterBand, Kind, ManualEntry, ManualRequest,
    ProtocolVariant, Session, SessionConfig,
};

#[derive(Parser, Debug)]
#[command(name = "erp_session", about = "Artifact rejection and averaging of one MMN / ABR recording")]
struct Args {
    /// Recording kind: mmn or abr.
    kind: Kind,

    /// Input BDF file.
    input: PathBuf,

    /// Skip the artifact-review step.
    #[arg(long)]
    skip_view: bool,

    /// Highpass cutoff in Hz (default: per kind).
    #[arg(long)]
    highpass: Option<f64>,

    /// Lowpass cutoff in Hz (default: per kind).
    #[arg(long)]
    lowpass: Option<f64>,

    /// Recording is from the initial 2013 south deployment.
    #[arg(long)]
    south: bool,

    /// Tone-sequence directory.
    #[arg(long, env = "FMED_TONE_DIR")]
    tone_dir: Option<PathBuf>,

    /// Write outputs to the current directory when the input is not inside
    /// a raw-data tree.
    #[arg(long)]
    force: bool,

    /// Write outputs to this directory, even for inputs inside a raw-data
    /// tree.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Plot standard, deviant and their difference on ELECTRODE (MMN).
    #[arg(long, value_name = "ELECTRODE")]
    sminusd: Option<String>,

    /// Plot standard, deviant and their difference averaged over cz, fz, pz
    /// and t8 (MMN).
    #[arg(long)]
    sminusd_mean: bool,

    /// Plot the average of all kept epochs, one trace per channel.
    #[arg(long)]
    epoch_average: bool,

    /// Plot the power spectral density up to HZ.
    #[arg(long, value_name = "HZ")]
    psd: Option<f64>,

    /// Discard trigger pulses shorter than N samples.
    #[arg(long, default_value_t = 0)]
    drop_short_events: usize,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

/// Asks for the segment boundaries on the terminal.
struct StdinEntry;

impl ManualEntry for StdinEntry {
    fn segment_bounds(&mut self, request: &ManualRequest, overview: &Path) -> Result<(f64, f64)> {
        println!(
            "Could not find {} {} events lasting {:.0}–{:.0} s.",
            request.expected_count, request.kind, request.tolerance.0, request.tolerance.1
        );
        if let Some(closest) = request.closest_duration {
            println!("Closest window lasted {closest:.1} s.");
        }
        println!("Trigger overview written to {}", overview.display());
        let start = prompt_seconds("Segment start (s): ")?;
        let stop = prompt_seconds("Segment stop (s): ")?;
        anyhow::ensure!(stop > start, "stop ({stop}) must come after start ({start})");
        Ok((start, stop))
    }
}

fn prompt_seconds(prompt: &str) -> Result<f64> {
    let stdin = std::io::stdin();
    loop {
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            anyhow::bail!("no input for segment boundary");
        }
        match line.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => return Ok(v),
            _ => println!("Not a number: '{}'", line.trim()),
        }
    }
}

fn wait_for_enter(message: &str) -> Result<()> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&args) {
        log::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let defaults = SessionConfig::new(args.kind);
    let cache_policy = match (&args.output_dir, args.force) {
        (Some(dir), _) => CachePolicy::Override(dir.clone()),
        (None, true) => CachePolicy::Fallback(PathBuf::from(".")),
        (None, false) => CachePolicy::StudyTree,
    };
    let cfg = SessionConfig {
        band: FilterBand {
            highpass: args.highpass.or(defaults.band.highpass),
            lowpass: args.lowpass.or(defaults.band.lowpass),
        },
        variant: if args.south { ProtocolVariant::South } else { ProtocolVariant::North },
        tone_dir: args.tone_dir.clone().unwrap_or_else(default_tone_dir),
        cache_policy,
        min_event_samples: args.drop_short_events,
        ..defaults
    };

    let mut session = Session::open(&args.input, &cfg, &mut StdinEntry)
        .with_context(|| format!("processing {}", args.input.display()))?;

    if !args.skip_view {
        let png = session.render_review()?;
        println!("Review figure: {}", png.display());
        println!("Artifact mask: {}", session.location.artifact_mask().display());
        println!("Add rows 'onset,duration,BAD_reason' (seconds from the segment start).");
        wait_for_enter("Press Enter when done editing... ")?;
        session.reload_annotations()?;
    }

    let written = session.write_evoked()?;
    for (evoked, path) in &written {
        println!("{:>8}: nave {:>5} → {}", evoked.condition, evoked.nave, path.display());
    }

    let mut figures = Vec::new();
    if let Some(hz) = args.psd {
        figures.push(session.plot_psd(hz)?);
    }
    if let Some(electrode) = &args.sminusd {
        figures.push(session.plot_standard_deviant(Some(electrode.as_str()))?);
    }
    if args.sminusd_mean {
        figures.push(session.plot_standard_deviant(None)?);
    }
    if args.epoch_average {
        figures.push(session.plot_epoch_average()?);
    }
    for png in figures {
        println!("  figure: {}", png.display());
    }
    Ok(())
}
