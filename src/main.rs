//! Command line analysis of a single proctoring frame.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use proctor_vision::{
    analyzer::Analyzer,
    classifier::load_classifier,
    config::{Config, EXAMPLE_CONFIG},
    detection::{LandmarkDetector, NoLandmarks, ObjectDetector},
    signals::RecordedSignals,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file to analyze
    #[arg(short, long, required_unless_present = "example_config")]
    image: Option<PathBuf>,

    /// Recorded detector output (JSON) for the image
    #[arg(short, long)]
    signals: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Violation classifier artifact, overrides the configured path
    #[arg(long)]
    classifier: Option<PathBuf>,

    /// YOLOv8 ONNX model, overrides the configured path
    #[cfg(feature = "onnx")]
    #[arg(long)]
    yolo_model: Option<PathBuf>,

    /// SCRFD face detector ONNX model, overrides the configured path
    #[cfg(feature = "onnx")]
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// 68-point facial landmark ONNX model, overrides the configured path
    #[cfg(feature = "onnx")]
    #[arg(long)]
    landmark_model: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.example_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    config.validate()?;

    let (object_detector, landmark_detector) = build_detectors(&args, &config)?;

    let classifier_path = args.classifier.clone().or_else(|| config.models.classifier.clone());
    let analyzer = Analyzer::from_config(&config, object_detector, landmark_detector)
        .with_classifier(load_classifier(classifier_path.as_deref()));
    info!(
        "Analyzer ready (classifier fusion {})",
        if analyzer.classifier_enabled() { "enabled" } else { "disabled" }
    );

    let Some(image_path) = &args.image else {
        bail!("no image given");
    };
    let bytes = std::fs::read(image_path).with_context(|| format!("reading {}", image_path.display()))?;
    let events = analyzer
        .analyze(&bytes)
        .with_context(|| format!("analyzing {}", image_path.display()))?;

    info!("{} violation event(s) detected", events.len());
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "events": events }))?);

    Ok(())
}

/// Pick the detector collaborators from the command line and configuration
fn build_detectors(args: &Args, config: &Config) -> Result<(Box<dyn ObjectDetector>, Box<dyn LandmarkDetector>)> {
    let signals = args
        .signals
        .as_ref()
        .map(RecordedSignals::from_file)
        .transpose()?;

    let landmark_detector = build_landmark_detector(args, config, signals.as_ref())?;

    #[cfg(feature = "onnx")]
    {
        let model = args
            .yolo_model
            .clone()
            .unwrap_or_else(|| config.models.object_detector.clone());
        if args.yolo_model.is_some() || (signals.is_none() && model.exists()) {
            let detector = proctor_vision::yolo::YoloDetector::new(
                &model,
                config.detection.confidence_threshold,
                config.detection.iou_threshold,
            )?;
            return Ok((Box::new(detector), landmark_detector));
        }
    }

    match signals {
        Some(recorded) => Ok((Box::new(recorded), landmark_detector)),
        None => bail!(
            "no object detector available: pass --signals (object detector model {} not used)",
            config.models.object_detector.display()
        ),
    }
}

/// Recorded landmarks when given, otherwise the ONNX face and mark models when available
#[cfg_attr(not(feature = "onnx"), allow(unused_variables))]
fn build_landmark_detector(
    args: &Args,
    config: &Config,
    signals: Option<&RecordedSignals>,
) -> Result<Box<dyn LandmarkDetector>> {
    if let Some(recorded) = signals {
        return Ok(Box::new(recorded.clone()));
    }

    #[cfg(feature = "onnx")]
    {
        let face_model = args
            .face_model
            .clone()
            .unwrap_or_else(|| config.models.face_detector.clone());
        let landmark_model = args
            .landmark_model
            .clone()
            .unwrap_or_else(|| config.models.landmark_detector.clone());
        let requested = args.face_model.is_some() || args.landmark_model.is_some();
        if requested || (face_model.exists() && landmark_model.exists()) {
            let detector = proctor_vision::face_landmarks::OnnxLandmarkDetector::new(
                &face_model,
                &landmark_model,
                config.detection.face_confidence_threshold,
                config.detection.max_faces,
            )?;
            return Ok(Box::new(detector));
        }
    }

    log::warn!("No landmark source available, head pose will not be estimated");
    Ok(Box::new(NoLandmarks))
}
