use clap::{ArgAction, Parser};
use guardniff::analyser::core::{analyse, AnalysisOptions, CaseReport};
use guardniff::analyser::utils::load_file;
use guardniff::config::Config;
use guardniff::inference::relay::RelayCatalog;
use guardniff::ui::output;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::fs;
use std::path::{Path, PathBuf};

/// guardniff ranks likely TOR entry relays from capture metadata
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// pcap file to analyze
    #[arg(short = 'f', long, value_parser)]
    file: PathBuf,

    /// Relay catalog (JSON array of relay records)
    #[arg(short = 'c', long, value_parser)]
    catalog: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_parser)]
    config: Option<PathBuf>,

    /// Perform inference only on flow n
    #[arg(short = 'n', long, value_parser)]
    nflow: Option<usize>,

    /// Display capture and flow metadata only
    #[arg(short = 'm', long, action = ArgAction::SetTrue)]
    metaonly: bool,

    /// Display output as formatted JSON
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    json: bool,

    /// Directory to write the case report to
    #[arg(short = 'o', long, value_parser)]
    output_dir: Option<PathBuf>,

    /// Number of ranked entries and paths to report
    #[arg(short = 'k', long, default_value_t = 5, value_parser)]
    top_k: usize,

    /// Stop after this many packet records
    #[arg(long, value_parser)]
    max_packets: Option<usize>,

    /// Candidate relays per role when generating paths
    #[arg(long, default_value_t = 6, value_parser)]
    pool: usize,

    /// Debug logging
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    if let Err(e) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("Failed to initialise logger: {e}");
    }

    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> guardniff::Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let catalog = match args.catalog.as_deref() {
        Some(path) => Some(RelayCatalog::from_file(path)?),
        None => None,
    };

    if let Some(out_dir) = args.output_dir.as_deref() {
        log::info!("Output directory {}", out_dir.display());
        fs::create_dir_all(out_dir)?;
    }

    let options = AnalysisOptions {
        max_packets: args.max_packets,
        flow: args.nflow,
        metaonly: args.metaonly,
        top_k: args.top_k,
        pool: args.pool,
    };
    let buf = load_file(&args.file)?;
    let report = analyse(&buf, catalog.as_ref(), &config, &options)?;

    emit(&report, args.json, args.output_dir.as_deref())
}

fn emit(report: &CaseReport, json: bool, out_dir: Option<&Path>) -> guardniff::Result<()> {
    if json {
        let json = output::data_as_json(report)?;
        match out_dir {
            Some(dir) => output::data_to_file(&json, &dir.join("case_report.json"))?,
            None => println!("{json}"),
        }
    } else {
        output::print_banner();
        output::print_results(report);
        if let Some(dir) = out_dir {
            let json = output::data_as_json(report)?;
            output::data_to_file(&json, &dir.join("case_report.json"))?;
        }
    }
    Ok(())
}
