use axcal_core::*;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "axcal")]
#[command(about = "Axis calibration for multidimensional data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the calibration of every axis in an axes file
    Show {
        /// Axes file (JSON array of axis descriptors)
        axes: PathBuf,

        /// Print calibration records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the calibration string for a single axis
    Encode {
        /// Axis key (t), type name (Time) or type bits (8)
        #[arg(long = "type")]
        axis: String,

        /// Axis name
        #[arg(long)]
        name: String,

        /// Unit symbol or name (ms, millivolt, a.u.)
        #[arg(long)]
        units: String,

        #[arg(long, allow_negative_numbers = true)]
        origin: f64,

        #[arg(long, allow_negative_numbers = true)]
        resolution: f64,

        /// Channel index (turns an unknown axis into a channel axis)
        #[arg(long)]
        channel: Option<usize>,

        #[arg(long)]
        channel_name: Option<String>,
    },

    /// Decode calibration text and print the record as JSON
    Decode {
        /// Text containing a calibration block
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the text from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Embed calibration text into every descriptor of an axes file
    Calibrate {
        axes: PathBuf,

        /// Write here instead of overwriting the input
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare the calibration of one axis in two axes files
    Compare {
        a: PathBuf,
        b: PathBuf,

        /// Axis key to compare
        #[arg(long)]
        key: String,

        /// Comma-separated properties to skip (units,origin,resolution)
        #[arg(long, default_value = "")]
        ignore: String,

        /// Relative tolerance (overrides config)
        #[arg(long)]
        rtol: Option<f64>,

        /// Absolute tolerance (overrides config)
        #[arg(long)]
        atol: Option<f64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        axcal_core::logging::init_with_level("debug");
    } else {
        axcal_core::logging::init();
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Exit status 1 means "different" for `compare`; errors exit with 2.
fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Show { axes, json } => cmd_show(&axes, json, &config)?,
        Commands::Encode {
            axis,
            name,
            units,
            origin,
            resolution,
            channel,
            channel_name,
        } => {
            let mut params = CalibrationParams::new(axis)
                .with_axis_name(name)
                .with_units(units.parse()?)
                .with_origin(origin)
                .with_resolution(resolution);
            if let Some(channel) = channel {
                params = params.with_channel(channel);
            }
            if let Some(channel_name) = channel_name {
                params = params.with_channel_name(channel_name);
            }
            cmd_encode(params)?
        }
        Commands::Decode { text, file } => cmd_decode(text, file, &config)?,
        Commands::Calibrate { axes, output } => cmd_calibrate(&axes, output.as_deref(), &config)?,
        Commands::Compare {
            a,
            b,
            key,
            ignore,
            rtol,
            atol,
        } => {
            let mut tolerance = config.tolerance();
            if let Some(rtol) = rtol {
                tolerance.rtol = rtol;
            }
            if let Some(atol) = atol {
                tolerance.atol = atol;
            }
            if !cmd_compare(&a, &b, &key, ignore.parse()?, tolerance)? {
                return Ok(ExitCode::from(1));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_calibration(path: &Path) -> Result<AxisCalibration> {
    let axes = AxisTags::load(path)?;
    AxisCalibration::from_axes(axes.into_shared())
}

fn print_json(value: &serde_json::Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn cmd_show(path: &Path, json: bool, config: &Config) -> Result<()> {
    let calibration = load_calibration(path)?;
    if !json {
        print!("{}", calibration);
        return Ok(());
    }

    let records = calibration
        .axis_keys()
        .iter()
        .map(|key| calibration.record(key))
        .collect::<Result<Vec<_>>>()?;
    print_json(&serde_json::to_value(&records)?, config.output.pretty_json)
}

fn cmd_encode(params: CalibrationParams) -> Result<()> {
    let calibration = AxisCalibration::from_params(params)?;
    for key in calibration.axis_keys() {
        println!("{}", calibration.calibration_string(&key)?);
    }
    Ok(())
}

fn cmd_decode(text: Option<String>, file: Option<PathBuf>, config: &Config) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)?,
        (None, None) => {
            return Err(Error::InvalidArgument(
                "either calibration text or --file is required".into(),
            ))
        }
    };

    let (record, notices) = decode_with_notices(&text)?;
    if !notices.is_empty() {
        tracing::debug!("{} decode notice(s)", notices.len());
    }
    print_json(&serde_json::to_value(&record)?, config.output.pretty_json)
}

fn cmd_calibrate(path: &Path, output: Option<&Path>, config: &Config) -> Result<()> {
    let calibration = load_calibration(path)?;
    let target = output.unwrap_or(path);
    let axes = calibration.axes();
    let tags = axes.borrow();
    tags.save(target, config.output.pretty_json)?;
    println!("Calibrated {} axes -> {}", tags.len(), target.display());
    Ok(())
}

fn cmd_compare(a: &Path, b: &Path, key: &str, ignore: Ignore, tolerance: Tolerance) -> Result<bool> {
    let first = load_calibration(a)?;
    let second = load_calibration(b)?;
    let same = first.is_same_as(&second, key, ignore, tolerance)?;
    println!("{}", if same { "same" } else { "different" });
    Ok(same)
}
