//! # mzexport
//!
//! Convert mass spectrometry acquisitions to MGF, mzML or indexed mzML, and
//! extract selected scans as PROXI JSON.
//!
//! ```bash
//! # Indexed mzML next to the input, MS1 scans only
//! mzexport convert run01.raw --ms-level 1
//!
//! # Gzipped MGF of a scan range
//! mzexport convert run01.raw -f mgf --scans 100-250 -o out/run01 --gzip
//!
//! # PROXI spectra for a handful of scans on stdout
//! mzexport query run01.raw -n 1,5-7 --stdout
//! ```
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use mzexport::io::{
    convert, convert_directory, run_query, AcquisitionSource, ConversionConfig, ConversionError,
    MemoryAcquisition, OutputFormat, OutputTarget, QueryConfig,
};
use mzexport::selection::{FilterConfig, ScanSet};
use mzexport::spectrum::BinaryCompressionType;

/// Extensions of the acquisition files this build can open
#[cfg(feature = "thermo")]
const INPUT_EXTENSIONS: &[&str] = &["json", "raw"];
#[cfg(not(feature = "thermo"))]
const INPUT_EXTENSIONS: &[&str] = &["json"];

#[derive(Parser)]
#[command(name = "mzexport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Mgf,
    Mzml,
    IndexedMzml,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Mgf => OutputFormat::MGF,
            FormatArg::Mzml => OutputFormat::MzML,
            FormatArg::IndexedMzml => OutputFormat::IndexedMzML,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an acquisition, or every acquisition in a directory
    Convert {
        /// Input acquisition file or directory
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file. The format extension is added when missing
        #[arg(short = 'o', long, conflicts_with_all = ["output_directory", "stdout"])]
        output_file: Option<PathBuf>,

        /// Output directory, defaults to the input's directory
        #[arg(short = 'd', long, conflicts_with = "stdout")]
        output_directory: Option<PathBuf>,

        /// Write to standard output
        #[arg(long)]
        stdout: bool,

        #[arg(short = 'f', long, value_enum, default_value = "indexed-mzml")]
        format: FormatArg,

        /// Gzip compress the output file
        #[arg(short = 'g', long)]
        gzip: bool,

        /// Only write scans of these MS levels
        #[arg(short = 'l', long, value_delimiter = ',')]
        ms_level: Option<Vec<u8>>,

        /// Only write these scans, e.g. `1-100,250`
        #[arg(short = 's', long)]
        scans: Option<String>,

        /// Keep these scans in profile mode
        #[arg(long)]
        no_peak_picking_scans: Option<String>,

        /// Keep scans of these MS levels in profile mode
        #[arg(long, value_delimiter = ',')]
        no_peak_picking_levels: Option<Vec<u8>>,

        /// Do not zlib compress mzML binary arrays
        #[arg(long)]
        no_zlib: bool,

        /// Serialize on a separate thread with this many spectra buffered
        #[arg(long, default_value = "0")]
        read_ahead: usize,
    },

    /// Extract scans as a JSON array of PROXI spectra
    Query {
        /// Input acquisition file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// The scans to extract, e.g. `1,5-7`
        #[arg(short = 'n', long)]
        scans: String,

        /// Output file, whose directory and stem name the `.JSON` file
        #[arg(short = 'o', long, conflicts_with = "stdout")]
        output_file: Option<PathBuf>,

        /// Write to standard output
        #[arg(long)]
        stdout: bool,
    },
}

fn open_source(path: &Path) -> Result<Box<dyn AcquisitionSource>, ConversionError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "json" => Ok(Box::new(MemoryAcquisition::open_path(path)?)),
        #[cfg(feature = "thermo")]
        "raw" => Ok(Box::new(mzexport::io::ThermoRawFile::open_path(path)?)),
        _ => Err(ConversionError::UnsupportedConfiguration(format!(
            "Cannot read {}, supported inputs are {}",
            path.display(),
            INPUT_EXTENSIONS.join(", ")
        ))),
    }
}

fn parse_scans(spec: Option<String>) -> Result<Option<ScanSet>, ConversionError> {
    Ok(spec.as_deref().map(ScanSet::parse).transpose()?)
}

#[allow(clippy::too_many_arguments)]
fn run_convert(
    input: PathBuf,
    output_file: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    stdout: bool,
    format: FormatArg,
    gzip: bool,
    ms_level: Option<Vec<u8>>,
    scans: Option<String>,
    no_peak_picking_scans: Option<String>,
    no_peak_picking_levels: Option<Vec<u8>>,
    no_zlib: bool,
    read_ahead: usize,
) -> Result<(), ConversionError> {
    let filters = FilterConfig {
        ms_levels: ms_level.map(|levels| levels.into_iter().collect()),
        scans: parse_scans(scans)?,
        no_peak_picking_scans: parse_scans(no_peak_picking_scans)?,
        no_peak_picking_levels: no_peak_picking_levels.map(|levels| levels.into_iter().collect()),
    };

    let output = if stdout {
        OutputTarget::Stdout
    } else if let Some(path) = output_file {
        OutputTarget::File(path)
    } else if let Some(dir) = output_directory {
        OutputTarget::Directory(dir)
    } else if input.is_dir() {
        OutputTarget::Directory(input.clone())
    } else {
        let parent = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        OutputTarget::Directory(parent.to_path_buf())
    };

    let config = ConversionConfig {
        format: format.into(),
        gzip,
        output,
        filters,
        data_compression: if no_zlib {
            BinaryCompressionType::NoCompression
        } else {
            BinaryCompressionType::Zlib
        },
        read_ahead,
    };
    config.validate()?;

    if input.is_dir() {
        let summaries = convert_directory(&input, INPUT_EXTENSIONS, &config, open_source)?;
        log::info!("Converted {} files from {}", summaries.len(), input.display());
    } else {
        let mut source = open_source(&input)?;
        let summary = convert(&mut source, &config)?;
        if let Some(path) = summary.output {
            log::info!("Wrote {} spectra to {}", summary.spectra_written, path.display());
        }
    }
    Ok(())
}

fn run_query_command(
    input: PathBuf,
    scans: String,
    output_file: Option<PathBuf>,
    stdout: bool,
) -> Result<(), ConversionError> {
    let config = QueryConfig {
        raw_path: input,
        scans,
        output_file,
        stdout,
    };
    // Surface a malformed scan list before touching the input
    ScanSet::parse(&config.scans)?;
    let mut source = open_source(&config.raw_path)?;
    run_query(&config, &mut source)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Convert {
            input,
            output_file,
            output_directory,
            stdout,
            format,
            gzip,
            ms_level,
            scans,
            no_peak_picking_scans,
            no_peak_picking_levels,
            no_zlib,
            read_ahead,
        } => run_convert(
            input,
            output_file,
            output_directory,
            stdout,
            format,
            gzip,
            ms_level,
            scans,
            no_peak_picking_scans,
            no_peak_picking_levels,
            no_zlib,
            read_ahead,
        ),
        Commands::Query {
            input,
            scans,
            output_file,
            stdout,
        } => run_query_command(input, scans, output_file, stdout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
