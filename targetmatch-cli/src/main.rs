use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use targetmatch::image::io::{load_image, FileLoader};
use targetmatch::{
    BenchmarkEntry, BestConfidence, Calibration, CalibrationCase, Calibrator, Candidate,
    Equalizer, Finder, Image, ImageCache, ImageSource, Objective, PeakDiscrimination,
    Performance, Sampling, SearchOptions,
};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "TargetMatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Locate the needle in the haystack (default).
    Find,
    /// Tune the profile parameters on the configured images.
    Calibrate,
    /// Score every algorithm combination on the configured images.
    Benchmark,
    /// Print the effective match profile.
    PrintProfile,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
enum ObjectiveConfig {
    #[default]
    BestConfidence,
    PeakDiscrimination,
    Performance,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CalibrationConfig {
    max_attempts: usize,
    objective: ObjectiveConfig,
    peak: Option<(usize, usize)>,
    max_exec_time: f64,
    random_starts: usize,
    uniform: bool,
    seed: u64,
    profile_out: Option<String>,
    calibrate_each: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: Calibrator::default().max_attempts,
            objective: ObjectiveConfig::BestConfidence,
            peak: None,
            max_exec_time: 1.0,
            random_starts: 0,
            uniform: false,
            seed: 0,
            profile_out: None,
            calibrate_each: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    needle_path: String,
    haystack_path: String,
    profile_path: Option<String>,
    output_path: Option<String>,
    similarity: f64,
    target_offset: (i32, i32),
    calibration: CalibrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            needle_path: String::new(),
            haystack_path: String::new(),
            profile_path: None,
            output_path: None,
            similarity: 0.8,
            target_offset: (0, 0),
            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CandidateRecord {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    confidence: f64,
    target: (i64, i64),
}

impl CandidateRecord {
    fn new(candidate: &Candidate, offset: (i32, i32)) -> Self {
        Self {
            x: candidate.x,
            y: candidate.y,
            width: candidate.width,
            height: candidate.height,
            confidence: candidate.confidence,
            target: candidate.target(offset),
        }
    }
}

#[derive(Debug, Serialize)]
struct FindOutput {
    strategy: &'static str,
    best: Option<CandidateRecord>,
    candidates: Vec<CandidateRecord>,
}

#[derive(Debug, Serialize)]
struct CalibrateOutput {
    score: f64,
    evaluations: usize,
    profile: String,
}

#[derive(Debug, Serialize)]
struct BenchmarkRecord {
    method: String,
    score: f64,
}

impl From<BenchmarkEntry> for BenchmarkRecord {
    fn from(value: BenchmarkEntry) -> Self {
        Self {
            method: value.method,
            score: value.score,
        }
    }
}

enum AnyObjective {
    Best(BestConfidence),
    Peak(PeakDiscrimination),
    Timed(Performance),
}

impl Objective for AnyObjective {
    fn score(&self, candidates: &[Candidate]) -> f64 {
        match self {
            AnyObjective::Best(o) => o.score(candidates),
            AnyObjective::Peak(o) => o.score(candidates),
            AnyObjective::Timed(o) => o.score(candidates),
        }
    }

    fn similarity(&self) -> f64 {
        match self {
            AnyObjective::Best(o) => o.similarity(),
            AnyObjective::Peak(o) => o.similarity(),
            AnyObjective::Timed(o) => o.similarity(),
        }
    }

    fn time_penalty(&self, elapsed: Duration) -> f64 {
        match self {
            AnyObjective::Best(o) => o.time_penalty(elapsed),
            AnyObjective::Peak(o) => o.time_penalty(elapsed),
            AnyObjective::Timed(o) => o.time_penalty(elapsed),
        }
    }
}

fn objective(config: &CalibrationConfig) -> Result<AnyObjective, Box<dyn std::error::Error>> {
    match config.objective {
        ObjectiveConfig::BestConfidence => Ok(AnyObjective::Best(BestConfidence)),
        ObjectiveConfig::PeakDiscrimination => {
            let peak = config
                .peak
                .ok_or("calibration.peak must be set for peak_discrimination")?;
            Ok(AnyObjective::Peak(PeakDiscrimination::new(peak)))
        }
        ObjectiveConfig::Performance => {
            let budget = Duration::try_from_secs_f64(config.max_exec_time)?;
            Ok(AnyObjective::Timed(Performance::new(BestConfidence, budget)))
        }
    }
}

fn load_equalizer(config: &Config) -> Result<Equalizer, Box<dyn std::error::Error>> {
    match &config.profile_path {
        Some(path) => {
            tracing::info!(path = %path, "loading match profile");
            Ok(Equalizer::from_profile(&fs::read_to_string(path)?)?)
        }
        None => Ok(Equalizer::new()),
    }
}

fn emit<T: Serialize>(output: &T, path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(output)?;
    match path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("targetmatch=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    let equalizer = load_equalizer(&config)?;
    let command = cli.command.unwrap_or(Command::Find);
    if let Command::PrintProfile = command {
        print!("{}", equalizer.to_profile());
        return Ok(());
    }

    if config.needle_path.is_empty() || config.haystack_path.is_empty() {
        return Err("needle_path and haystack_path must be set in the config".into());
    }
    let cache = ImageCache::new(FileLoader);
    let source = ImageSource::File(PathBuf::from(&config.needle_path));
    let haystack = load_image(&config.haystack_path)?;
    let output_path = config.output_path.as_deref();

    match command {
        Command::Find | Command::PrintProfile => {
            let finder = Finder::from_equalizer(&equalizer)?;
            let needle = source
                .resolve(&cache)?
                .with_similarity(config.similarity)?
                .with_target_offset(config.target_offset.0, config.target_offset.1);
            let found = finder.find(&needle, &haystack)?;
            let offset = needle.target_offset();
            let output = FindOutput {
                strategy: targetmatch::Strategy::name(&finder),
                best: found.first().map(|c| CandidateRecord::new(c, offset)),
                candidates: found.iter().map(|c| CandidateRecord::new(c, offset)).collect(),
            };
            emit(&output, output_path)
        }
        Command::Calibrate => {
            let needle: Image = source.resolve(&cache)?;
            let cases = [CalibrationCase::positive(needle, haystack)];
            let calibrator = Calibrator::new(config.calibration.max_attempts);
            let objective = objective(&config.calibration)?;
            let restarts = config.calibration.random_starts;
            let Calibration {
                score,
                equalizer: tuned,
                evaluations,
            } = if restarts > 0 {
                let options = SearchOptions {
                    random_starts: restarts,
                    sampling: if config.calibration.uniform {
                        Sampling::Uniform
                    } else {
                        Sampling::Normal
                    },
                    seed: config.calibration.seed,
                };
                calibrator.search_finder(&equalizer, &cases, &objective, &options)?
            } else {
                calibrator.calibrate_finder(&equalizer, &cases, &objective)?
            };
            let profile = tuned.to_profile();
            if let Some(path) = &config.calibration.profile_out {
                fs::write(path, &profile)?;
            }
            emit(
                &CalibrateOutput {
                    score,
                    evaluations,
                    profile,
                },
                output_path,
            )
        }
        Command::Benchmark => {
            let needle: Image = source.resolve(&cache)?;
            let cases = [CalibrationCase::positive(needle, haystack)];
            let calibrator = Calibrator::new(config.calibration.max_attempts);
            let objective = objective(&config.calibration)?;
            let entries = calibrator.benchmark(
                &equalizer,
                &cases,
                &objective,
                config.calibration.calibrate_each,
            )?;
            let records: Vec<BenchmarkRecord> =
                entries.into_iter().map(BenchmarkRecord::from).collect();
            emit(&records, output_path)
        }
    }
}
