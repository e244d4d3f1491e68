use clap::{Parser, Subcommand};
use ridgegate::{
    Deployment, EnvironmentSensor, EnvironmentalConditions, FixedConditions,
    InMemoryEnrollmentStore, RawSample, ServiceConfig, SimulatedScanner, UserId,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file; defaults plus environment overrides when absent
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Log file path
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<String>,

    /// Ambient temperature in Celsius
    #[arg(long)]
    temperature: Option<f64>,

    /// Ambient relative humidity in percent
    #[arg(long)]
    humidity: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enroll a user, then verify a genuine and an impostor sample
    Demo {
        /// User identifier
        #[arg(short = 'u', long, default_value_t = 1)]
        user: u64,
    },
    /// Supervised calibration run over a batch of labelled samples
    Calibrate {
        /// Number of genuine/impostor pairs
        #[arg(short = 'n', long, default_value_t = 20)]
        rounds: usize,
    },
}

fn initialize_logging(log_file: Option<String>) {
    let console_writer = std::io::stdout.with_max_level(tracing::Level::INFO);

    let file_appender = if let Some(log_file) = log_file {
        RollingFileAppender::new(Rotation::NEVER, ".", log_file)
            .with_max_level(tracing::Level::INFO)
    } else {
        RollingFileAppender::new(Rotation::NEVER, ".", "ridgegate.log")
            .with_max_level(tracing::Level::INFO)
    };

    let writer = console_writer.and(file_appender);

    let subscriber = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {e}");
        std::process::exit(1);
    }
}

const GENUINE: &str = "m01 m02 m03 m04 m05 m06 m07 m08 m09 m10";
const PARTIAL: &str = "m01 m02 m03 m04 m05 m06 x01 x02 x03";
const IMPOSTOR: &str = "m01 m02 y01 y02 y03 y04 y05 y06";

fn main() {
    let args = Args::parse();
    initialize_logging(args.log_file);

    let config = match args.config {
        Some(path) => ServiceConfig::load(path),
        None => ServiceConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let sensor: Option<Arc<dyn EnvironmentSensor>> = match (args.temperature, args.humidity) {
        (None, None) => None,
        (temperature, humidity) => Some(Arc::new(FixedConditions(EnvironmentalConditions {
            temperature_c: temperature.unwrap_or(EnvironmentalConditions::NEUTRAL.temperature_c),
            humidity_percent: humidity
                .unwrap_or(EnvironmentalConditions::NEUTRAL.humidity_percent),
        }))),
    };

    let samples = vec![RawSample::new(GENUINE).with_quality(90), RawSample::new(GENUINE)];
    let store = Arc::new(InMemoryEnrollmentStore::new());
    let deployment = match Deployment::new(&config, SimulatedScanner::new(samples), store, sensor) {
        Ok(deployment) => deployment,
        Err(e) => {
            error!("Failed to start deployment: {}", e);
            return;
        }
    };

    match args.command {
        Commands::Demo { user } => run_demo(&deployment, UserId(user)),
        Commands::Calibrate { rounds } => run_calibration(&deployment, rounds),
    }

    println!("{}", deployment.calculator().snapshot());
    println!("{}", deployment.scanner().stats());
}

fn run_demo(deployment: &Deployment, user_id: UserId) {
    let service = deployment.service();

    if let Err(e) = service.enroll(user_id) {
        error!("Enrollment failed: {}", e);
        return;
    }

    match service.verify(user_id, None) {
        Ok(attempt) => info!("Genuine capture: {}", attempt),
        Err(e) => warn!("Genuine capture rejected: {}", e.public_message()),
    }

    for (label, sample) in [("partial", PARTIAL), ("impostor", IMPOSTOR)] {
        match deployment.service().verify(user_id, Some(RawSample::new(sample))) {
            Ok(attempt) => info!("{} sample accepted: {}", label, attempt),
            Err(e) => info!("{} sample rejected ({}): {}", label, e.public_message(), e),
        }
    }
}

fn run_calibration(deployment: &Deployment, rounds: usize) {
    let user_id = UserId(1);
    if let Err(e) = deployment.service().enroll(user_id) {
        error!("Enrollment failed: {}", e);
        return;
    }

    for round in 0..rounds {
        for (sample, expected) in [(PARTIAL, true), (IMPOSTOR, false)] {
            match deployment.service().calibrate(user_id, Some(RawSample::new(sample)), expected) {
                Ok(attempt) => info!("round {}: {}", round, attempt),
                Err(e) => error!("round {}: calibration failed: {}", round, e),
            }
        }
    }
}
