use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};
use weightocr::train::{self, TrainConfig};
use weightocr::{open_image, report, ScanOptions, WeightReaderBuilder};

/// Finds printed weight labels in a photograph and parses the digits.
#[derive(Parser, Debug)]
#[command(name = "weightocr")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect labels in one image and print a DATA line per detection
    Detect(DetectArgs),
    /// Run the external trainer with the fixed run configuration
    Train(TrainArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Path to input image
    #[arg(long)]
    source: PathBuf,

    /// Path to label-detector weights
    #[arg(long)]
    weights: PathBuf,

    /// Confidence threshold
    #[arg(long, default_value_t = 0.25)]
    conf: f32,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Dataset configuration yaml
    #[arg(long, default_value = "data.yaml")]
    data: String,

    /// Base checkpoint to fine-tune from
    #[arg(long, default_value = "yolov8s.pt")]
    weights: String,

    /// Device handed through to the trainer
    #[arg(long, default_value = "0")]
    device: String,
}

fn main() {
    // stdout carries only the DATA lines; everything human-readable goes to
    // stderr through the subscriber.
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Detect(args) => detect(args),
        Command::Train(args) => {
            let config = TrainConfig {
                data: args.data,
                weights: args.weights,
                device: args.device,
                ..TrainConfig::default()
            };
            train::run(&config).map_err(Into::into)
        }
    }
}

fn detect(args: DetectArgs) -> anyhow::Result<()> {
    info!("reading image {}", args.source.display());
    let image = open_image(&args.source)?;
    info!("image loaded: {}x{}", image.width(), image.height());

    let engine = WeightReaderBuilder::new()
        .label_model(&args.weights)
        .build()
        .context("failed to build detection engine")?;

    let options = ScanOptions {
        confidence_threshold: args.conf,
        ..ScanOptions::default()
    };
    let readings = engine.read(&image, options)?;

    if readings.is_empty() {
        info!("no labels detected");
    } else {
        info!("{} detections", readings.len());
    }

    for (index, reading) in readings.iter().enumerate() {
        let detection = &reading.detection;
        let rect = &detection.rect;
        info!(
            "detection #{}: class {} confidence {:.2}% box [{:.1}, {:.1}, {:.1}, {:.1}] size {:.1}x{:.1}",
            index + 1,
            detection.class_id,
            detection.confidence * 100.0,
            rect.x1,
            rect.y1,
            rect.x2,
            rect.y2,
            rect.width(),
            rect.height()
        );
        match &reading.digits {
            Some(digits) => info!("validated reading: {digits}"),
            None => info!("no valid reading inside this box"),
        }
        println!("{}", report::data_line(reading));
    }

    let annotated = report::save_outputs(&image, &readings, &args.source)?;
    info!("annotated image saved to {}", annotated.display());

    Ok(())
}
