use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rolling_stats::Stats;
use serde::{Deserialize, Serialize};

use filterfit::FilterFit;
use filterfit::config::{Energy, FilterKind, FitConfig};
use filterfit::element::{Element, LineTable};
use filterfit::fit::FitStatus;
use filterfit::output::{KRatioOutput, OutputFormat, create_formatter};
use filterfit::spectrum::{DetectorProfile, EnergyCalibration, Spectrum};

#[derive(Parser, Debug)]
#[command(name = "filterfit")]
#[command(about = "Filter-fit k-ratio quantification of EDS spectra", long_about = None)]
struct Args {
    /// Job file (TOML or JSON) listing the line table, references and unknowns
    job: PathBuf,

    /// Fit configuration TOML; defaults apply to anything it omits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: text, json, csv
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Filter kernel (overrides the configuration file)
    #[arg(long, value_enum)]
    filter: Option<FilterKind>,

    /// Exclude elements without a matching peak before fitting
    #[arg(long)]
    strip_unlikely: bool,

    /// Residual background threshold (e.g., "1.5keV", "1500eV")
    #[arg(long)]
    residual_threshold: Option<Energy>,

    /// Write residual spectra as JSON into this directory
    #[arg(long)]
    residual_dir: Option<PathBuf>,

    /// Print k-ratio statistics across all unknowns
    #[arg(long)]
    summary: bool,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Deserialize)]
struct Job {
    calibration: EnergyCalibration,
    #[serde(default)]
    detector: DetectorProfile,
    /// Line table TOML, relative to the job file
    lines: PathBuf,
    #[serde(default, rename = "reference")]
    references: Vec<ReferenceJob>,
    #[serde(default, rename = "unknown")]
    unknowns: Vec<UnknownJob>,
    #[serde(default)]
    force_zero: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct ReferenceJob {
    element: Element,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct UnknownJob {
    label: Option<String>,
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
struct StatsSummary {
    transitions: String,
    count: usize,
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

impl StatsSummary {
    fn from_stats(transitions: &str, stats: &Stats<f64>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            transitions: transitions.to_string(),
            count: stats.count,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &args.config {
        Some(path) => FitConfig::from_toml_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => FitConfig::default(),
    };
    if let Some(kind) = args.filter {
        config.filter.kind = kind;
    }
    if args.strip_unlikely {
        config.strip_unlikely = true;
    }
    if let Some(threshold) = args.residual_threshold {
        config.residual_threshold_ev = threshold.as_ev();
    }

    let job = load_job(&args.job)?;
    let base = args.job.parent().unwrap_or(Path::new("."));
    if job.references.is_empty() {
        bail!("job {} lists no references", args.job.display());
    }

    let lines_path = base.join(&job.lines);
    let lines = fs::read_to_string(&lines_path)
        .with_context(|| format!("reading line table {}", lines_path.display()))?;
    let lines = LineTable::from_toml_str(&lines)
        .with_context(|| format!("parsing line table {}", lines_path.display()))?;

    let mut fit = FilterFit::new(job.calibration, job.detector, Arc::new(lines), config)?;
    for reference in &job.references {
        let spectrum = load_spectrum(&base.join(&reference.path))?;
        fit.add_reference(reference.element, spectrum)
            .with_context(|| format!("adding {} reference", reference.element))?;
    }
    fit.force_zero(job.force_zero.iter().copied());
    log::info!(
        "{} references over {} elements",
        fit.entries().len(),
        fit.elements().len()
    );

    if let Some(dir) = &args.residual_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let formatter = create_formatter(args.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let mut stats: BTreeMap<String, Stats<f64>> = BTreeMap::new();
    for (i, unknown) in job.unknowns.iter().enumerate() {
        let label = unknown.label.clone().unwrap_or_else(|| {
            unknown
                .path
                .file_stem()
                .map_or_else(|| format!("unknown{}", i), |s| s.to_string_lossy().into_owned())
        });
        let spectrum = load_spectrum(&base.join(&unknown.path))?;

        let metric = fit
            .fit_metric(&spectrum)
            .with_context(|| format!("fitting {}", label))?;
        let outcome = fit.outcome().context("fit produced no outcome")?;
        if outcome.status == FitStatus::Exhausted {
            log::warn!("{}: every reference was excluded", label);
        }

        for row in KRatioOutput::from_outcome(&label, outcome, metric) {
            println!("{}", formatter.format(&row));
            stats
                .entry(row.transitions.clone())
                .or_insert_with(Stats::new)
                .update(row.kratio);
        }

        if let Some(dir) = &args.residual_dir {
            let residual = fit.residual_spectrum(&spectrum, None)?;
            let path = dir.join(format!("{}.residual.json", label));
            fs::write(&path, serde_json::to_string_pretty(&residual)?)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }

    if args.summary {
        let summaries: Vec<StatsSummary> = stats
            .iter()
            .filter_map(|(transitions, s)| StatsSummary::from_stats(transitions, s))
            .collect();
        print_summary(&summaries, args.format)?;
    }

    Ok(())
}

fn load_job(path: &Path) -> Result<Job> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading job {}", path.display()))?;
    let job = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(job)
}

fn load_spectrum(path: &Path) -> Result<Spectrum> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading spectrum {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing spectrum {}", path.display()))
}

fn print_summary(summaries: &[StatsSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summaries)?),
        OutputFormat::Csv => {
            println!("transitions,count,mean,std_dev,min,max");
            for s in summaries {
                println!(
                    "{},{},{:.6},{:.6},{:.6},{:.6}",
                    s.transitions.replace(',', ";"),
                    s.count,
                    s.mean,
                    s.std_dev,
                    s.min,
                    s.max
                );
            }
        }
        OutputFormat::Text => {
            println!();
            println!("=== Summary ===");
            for s in summaries {
                println!(
                    "{:<24} {:.5} ± {:.5} (min {:.5}, max {:.5}, n = {})",
                    s.transitions, s.mean, s.std_dev, s.min, s.max, s.count
                );
            }
        }
    }
    Ok(())
}
