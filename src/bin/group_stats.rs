//! group_stats: per-subject ERP measures and a between-cohort t-test.
//!
//! MMN: area under the Deviant − Standard curve, 90–180 ms, on Fz and Cz;
//! Student t-test.
//!
//! ABR: area 4–8 ms and peak-to-peak (minimum in 4–7 ms, maximum in
//! 7–10 ms) on Fz and Cz; Welch t-test weighted by each subject's share of
//! kept epochs.
//!
//! Writes `<output-dir>/<cohort>.csv` for each cohort and prints the tests.
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use fmed_eeg::{
    cohort::{default_cohorts, load_cohorts},
    stats, Evoked, GroupData, Kind, TimeAxis,
};

const STAT_ELECTRODES: [&str; 2] = ["Fz", "Cz"];

/// Analysis windows in milliseconds.
const MMN_AREA_MS: (f64, f64) = (90.0, 180.0);
const ABR_AREA_MS: (f64, f64) = (4.0, 8.0);
const ABR_MIN_WINDOW_MS: (f64, f64) = (4.0, 7.0);
const ABR_MAX_WINDOW_MS: (f64, f64) = (7.0, 10.0);

#[derive(Parser, Debug)]
#[command(name = "group_stats", about = "Cohort statistics on MMN / ABR evoked responses")]
struct Args {
    /// Recording kind: mmn or abr.
    kind: Kind,

    /// Directory holding one subdirectory of evoked files per subject.
    #[arg(long)]
    input_dir: PathBuf,

    /// Where the per-cohort CSV files go.
    #[arg(long)]
    output_dir: PathBuf,

    /// JSON file with the two cohorts (default: the study's living and
    /// postmortem groups).
    #[arg(long)]
    cohorts: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

/// One named per-subject measure with its values for each cohort.
struct Measure {
    name: String,
    values: Vec<Vec<f64>>,
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
    let cohorts = match &args.cohorts {
        Some(path) => load_cohorts(path)?,
        None => default_cohorts(),
    };
    log::info!(
        "Reading {} from {}",
        cohorts.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(" and "),
        args.input_dir.display()
    );

    let mut axis = TimeAxis::new();
    let groups = cohorts
        .iter()
        .map(|c| GroupData::load(c, &args.input_dir, args.kind, &mut axis))
        .collect::<Result<Vec<_>>>()?;

    let measures = match args.kind {
        Kind::Mmn => mmn_measures(&groups)?,
        Kind::Abr => abr_measures(&groups)?,
    };
    let weights: Option<Vec<Vec<f64>>> =
        (args.kind == Kind::Abr).then(|| groups.iter().map(GroupData::nave_weights).collect());

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    for (g, group) in groups.iter().enumerate() {
        let path = args.output_dir.join(format!("{}.csv", group.cohort.name));
        write_csv(&path, group, &measures, g, weights.as_ref().map(|w| w[g].as_slice()))?;
        log::info!("Wrote {}", path.display());
    }

    for m in &measures {
        let test = match &weights {
            Some(w) => stats::ttest_welch_weighted(&m.values[0], &w[0], &m.values[1], &w[1])?,
            None => stats::ttest_ind(&m.values[0], &m.values[1])?,
        };
        let label = if weights.is_some() { "Welch's T test" } else { "Group difference T test" };
        println!("{label} on {}: {test}\n", m.name);
    }
    Ok(())
}

/// Samples of `electrode` in `[start_ms, stop_ms)` and their times.
fn crop<'a>(evoked: &'a Evoked, electrode: &str, (start_ms, stop_ms): (f64, f64)) -> Result<(Vec<f64>, &'a [f64])> {
    let row = evoked.channel(electrode)?;
    let range = evoked.window(start_ms / 1000.0, stop_ms / 1000.0);
    let values = row.iter().skip(range.start).take(range.len()).copied().collect();
    Ok((values, &evoked.times[range]))
}

fn area(evoked: &Evoked, electrode: &str, window_ms: (f64, f64)) -> Result<f64> {
    let (y, x) = crop(evoked, electrode, window_ms)?;
    Ok(stats::simpson(&y, x))
}

fn mmn_measures(groups: &[GroupData]) -> Result<Vec<Measure>> {
    let differences = groups
        .iter()
        .map(|g| {
            g.subjects
                .iter()
                .map(|s| s.difference()?.with_context(|| format!("{}: no standard/deviant pair", s.subject)))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    STAT_ELECTRODES
        .iter()
        .map(|&electrode| {
            let values = differences
                .iter()
                .map(|group| group.iter().map(|e| area(e, electrode, MMN_AREA_MS)).collect::<Result<Vec<f64>>>())
                .collect::<Result<Vec<Vec<f64>>>>()?;
            Ok(Measure { name: format!("{electrode} area amplitude"), values })
        })
        .collect()
}

fn per_subject(groups: &[GroupData], f: impl Fn(&Evoked) -> Result<f64>) -> Result<Vec<Vec<f64>>> {
    groups
        .iter()
        .map(|g| g.subjects.iter().map(|s| f(&s.total)).collect::<Result<Vec<f64>>>())
        .collect()
}

fn abr_measures(groups: &[GroupData]) -> Result<Vec<Measure>> {
    let mut measures = Vec::new();
    for electrode in STAT_ELECTRODES {
        measures.push(Measure {
            name: format!("{electrode} area amplitude"),
            values: per_subject(groups, |e| area(e, electrode, ABR_AREA_MS))?,
        });
    }
    for electrode in STAT_ELECTRODES {
        measures.push(Measure {
            name: format!("{electrode} peak to peak"),
            values: per_subject(groups, |e| {
                let (lows, _) = crop(e, electrode, ABR_MIN_WINDOW_MS)?;
                let (highs, _) = crop(e, electrode, ABR_MAX_WINDOW_MS)?;
                Ok(stats::peak_to_peak(&lows, &highs))
            })?,
        });
    }
    Ok(measures)
}

fn write_csv(path: &Path, group: &GroupData, measures: &[Measure], g: usize, weights: Option<&[f64]>) -> Result<()> {
    let mut text = String::from("ID");
    for m in measures {
        write!(text, ",{}", m.name)?;
    }
    if weights.is_some() {
        text.push_str(",Weight");
    }
    text.push('\n');
    for (i, subject) in group.subjects.iter().enumerate() {
        text.push_str(&subject.subject);
        for m in measures {
            write!(text, ",{}", m.values[g][i])?;
        }
        if let Some(w) = weights {
            write!(text, ",{}", w[i])?;
        }
        text.push('\n');
    }
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
