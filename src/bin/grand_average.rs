//! grand_average: nave-weighted average of per-subject evoked responses.
//!
//! Reads `<input-dir>/<subject>/*<condition>-ave.safetensors` for every
//! subject, averages each condition and writes one PNG per electrode and
//! y-scale to `<output-dir>/<name>/`, plus a README.txt recording how the
//! figures were produced.
//!
//! Figure colours: Standard green, Deviant red, Deviant − Standard black
//! (MMN); the total average black (ABR).
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use plotters::style::{RGBColor, BLACK, GREEN, RED};

use fmed_eeg::{evoked, plot::plot_evoked, Evoked, Kind, SubjectEvoked, TimeAxis};

const ELECTRODES: [&str; 4] = ["Cz", "Fz", "Pz", "T8"];

#[derive(Parser, Debug)]
#[command(name = "grand_average", about = "Grand-average MMN / ABR evoked responses")]
struct Args {
    /// Recording kind: mmn or abr.
    kind: Kind,

    /// Name of this batch (output subdirectory and file prefix).
    /// Defaults to the current timestamp.
    #[arg(short, long)]
    name: Option<String>,

    /// Directory holding one subdirectory of evoked files per subject.
    #[arg(long)]
    input_dir: PathBuf,

    /// Plots go to `<output-dir>/<name>/`.
    #[arg(long)]
    output_dir: PathBuf,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Subject IDs.
    #[arg(required = true)]
    subjects: Vec<String>,
}

/// What gets drawn: per-condition averages in a fixed order.
struct Figure {
    traces: Vec<(Evoked, RGBColor)>,
}

impl Figure {
    fn times(&self) -> &[f64] {
        self.traces.first().map(|(e, _)| e.times.as_slice()).unwrap_or_default()
    }

    /// Curves for one electrode, or the mean over all channels for `None`.
    fn curves(&self, electrode: Option<&str>) -> Result<Vec<(Vec<f64>, RGBColor)>> {
        self.traces
            .iter()
            .map(|(e, color)| -> Result<(Vec<f64>, RGBColor)> {
                let values = match electrode {
                    Some(name) => e.channel(name)?,
                    None => e.channel_mean(),
                };
                Ok((values.to_vec(), *color))
            })
            .collect()
    }
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
    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let name = args.name.clone().unwrap_or_else(|| timestamp.replace(':', "."));
    let out_dir = args.output_dir.join(&name);
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    write_readme(&out_dir, &name, &timestamp, &args.subjects)?;

    log::info!(
        "Reading {:?} from {} and writing to {}",
        args.subjects,
        args.input_dir.display(),
        out_dir.display()
    );
    let mut axis = TimeAxis::new();
    let subjects = args
        .subjects
        .iter()
        .map(|sid| SubjectEvoked::load(&args.input_dir, sid, args.kind, &mut axis))
        .collect::<Result<Vec<_>>>()?;

    let figure = build_figure(args.kind, &subjects)?;
    let prefix = out_dir.join(&name);
    match args.kind {
        Kind::Mmn => {
            for scale in [None, Some(2.5), Some(5.0)] {
                for electrode in ELECTRODES {
                    save_plot(&figure, &prefix, Some(electrode), scale)?;
                }
            }
            for scale in [None, Some(2.5), Some(5.0)] {
                save_plot(&figure, &prefix, None, scale)?;
            }
        }
        Kind::Abr => {
            for electrode in ELECTRODES {
                save_plot(&figure, &prefix, Some(electrode), Some(1.0))?;
            }
        }
    }
    Ok(())
}

fn build_figure(kind: Kind, subjects: &[SubjectEvoked]) -> Result<Figure> {
    let traces = match kind {
        Kind::Mmn => {
            let standard = average(subjects, |s| s.standard.as_ref(), "standard")?;
            let deviant = average(subjects, |s| s.deviant.as_ref(), "deviant")?;
            let difference = evoked::difference(&deviant, &standard)?;
            vec![(standard, GREEN), (deviant, RED), (difference, BLACK)]
        }
        Kind::Abr => vec![(average(subjects, |s| Some(&s.total), "all")?, BLACK)],
    };
    Ok(Figure { traces })
}

fn average<'a>(
    subjects: &'a [SubjectEvoked],
    pick: impl Fn(&'a SubjectEvoked) -> Option<&'a Evoked>,
    condition: &str,
) -> Result<Evoked> {
    let evokeds: Vec<&Evoked> = subjects.iter().filter_map(pick).collect();
    evoked::grand_average(&evokeds, condition)
}

/// `<prefix>_<scale>_<electrode>.png`, scale `auto` when unbounded.
fn save_plot(figure: &Figure, prefix: &Path, electrode: Option<&str>, scale: Option<f64>) -> Result<()> {
    let scale_name = scale.map_or_else(|| "auto".to_string(), |s| format!("{s:.1}"));
    let electrode_name = electrode.unwrap_or("all");
    let mut file = prefix.as_os_str().to_owned();
    file.push(format!("_{scale_name}_{electrode_name}.png"));
    let path = PathBuf::from(file);

    plot_evoked(&path, figure.times(), &figure.curves(electrode)?, scale)?;
    log::info!("Grand average on {electrode_name} saved to {}", path.display());
    Ok(())
}

fn write_readme(dir: &Path, name: &str, timestamp: &str, subjects: &[String]) -> Result<()> {
    let mut text = std::env::args().collect::<Vec<_>>().join(" ");
    text.push_str("\n\n");
    writeln!(text, "Generated on {timestamp} and written to {name} from the following subjects:")?;
    for sid in subjects {
        writeln!(text, "{sid}")?;
    }
    let path = dir.join("README.txt");
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}
