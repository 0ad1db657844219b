use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use filterfit::config::Energy;
use filterfit::element::{Element, LineTable};
use filterfit::simulation::{ContinuumConfig, NoiseConfig, SpectrumModel};
use filterfit::spectrum::{DetectorProfile, EnergyCalibration, SpectrumProperties};

#[derive(Parser, Debug)]
#[command(name = "generate_spectrum")]
#[command(about = "Generate synthetic EDS spectra for filter-fit testing")]
struct Args {
    /// Line table TOML
    #[arg(short, long)]
    lines: PathBuf,

    /// Element and line intensity in counts per nA·s (e.g., "Fe:2000"); repeatable
    #[arg(short, long = "element", value_parser = parse_element_intensity)]
    elements: Vec<(Element, f64)>,

    /// Output JSON file
    #[arg(short, long)]
    output: PathBuf,

    /// Number of channels
    #[arg(long, default_value_t = 2048)]
    channels: usize,

    /// Channel width in eV
    #[arg(long, default_value_t = 10.0)]
    channel_width: f64,

    /// Energy of the lower edge of channel 0 in eV
    #[arg(long, default_value_t = 0.0)]
    zero_offset: f64,

    /// Detector FWHM at Mn Ka in eV
    #[arg(long, default_value_t = 130.0)]
    fwhm: f64,

    /// Beam energy (e.g., "20keV")
    #[arg(long, default_value = "20keV")]
    beam_energy: Energy,

    /// Live time in seconds
    #[arg(long, default_value_t = 60.0)]
    live_time: f64,

    /// Probe current in nA
    #[arg(long, default_value_t = 1.0)]
    probe_current: f64,

    /// Bremsstrahlung amplitude; 0 disables the continuum
    #[arg(long, default_value_t = 0.05)]
    continuum: f64,

    /// Seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write expected counts without counting noise
    #[arg(long)]
    no_noise: bool,
}

fn parse_element_intensity(s: &str) -> Result<(Element, f64), String> {
    let (symbol, intensity) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SYMBOL:INTENSITY, got {}", s))?;
    let element: Element = symbol.trim().parse().map_err(|e| format!("{}", e))?;
    let intensity: f64 = intensity
        .trim()
        .parse()
        .map_err(|_| format!("invalid intensity: {}", intensity))?;
    if intensity < 0.0 {
        return Err("intensity must not be negative".to_string());
    }
    Ok((element, intensity))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let lines = fs::read_to_string(&args.lines)
        .with_context(|| format!("reading line table {}", args.lines.display()))?;
    let lines = LineTable::from_toml_str(&lines)?;

    let properties = SpectrumProperties {
        live_time_s: args.live_time,
        probe_current_na: args.probe_current,
        beam_energy_kev: args.beam_energy.as_kev(),
    };
    let mut model = SpectrumModel::new(
        EnergyCalibration::new(args.zero_offset, args.channel_width),
        DetectorProfile::new(args.fwhm),
        properties,
        args.channels,
    );
    if args.continuum > 0.0 {
        model = model.with_continuum(ContinuumConfig {
            amplitude: args.continuum,
            ..ContinuumConfig::default()
        });
    }
    for &(element, intensity) in &args.elements {
        if lines.transitions(element).is_empty() {
            log::warn!("No lines for {} in {}", element, args.lines.display());
        }
        model = model.with_element(&lines, element, intensity);
    }

    let noise = NoiseConfig {
        seed: args.seed,
        disabled: args.no_noise,
    };
    let spectrum = model.generate(&noise);
    log::info!(
        "{} channels, {:.0} total counts",
        spectrum.channel_count(),
        spectrum.total_counts()
    );

    fs::write(&args.output, serde_json::to_string(&spectrum)?)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}
