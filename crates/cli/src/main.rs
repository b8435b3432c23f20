use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use headup_core::detection::domain::object_detector::DetectorGeneration;
use headup_core::pipeline::analyze_video_use_case::VideoSource;
use headup_core::pipeline::frame_analyzer::FrameResult;
use headup_core::pipeline::head_up_service::HeadUpService;
use headup_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use headup_core::pipeline::session_summary::{SampleOutcome, SessionSummary};
use headup_core::pipeline::stream_session::SessionHandle;
use headup_core::shared::constants::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use headup_core::shared::error::AnalysisError;
use headup_core::shared::settings::AnalyzerSettings;

/// Head-up rate analysis for images, videos and frame streams.
#[derive(Parser)]
#[command(name = "headup", version)]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a single image and print the frame result.
    Image { input: PathBuf },
    /// Sample one frame per second of a video and print the summary.
    Video { input: PathBuf },
    /// Feed image files through a stream session, one update per line.
    Stream {
        #[arg(required = true)]
        frames: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct Options {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// ONNX model file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Detector generation: yolov5 or yolov8.
    #[arg(long, global = true)]
    generation: Option<DetectorGeneration>,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// NMS IoU threshold (0.0-1.0).
    #[arg(long, global = true)]
    iou: Option<f64>,

    /// Class id counted as head-up.
    #[arg(long, global = true)]
    head_up_class: Option<u32>,

    /// Skip overlay rendering.
    #[arg(long, global = true)]
    no_visualize: bool,

    /// TrueType font for overlay labels.
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    /// Write overlay JPEGs here instead of embedding them in the JSON.
    #[arg(long, global = true)]
    visualize_dir: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli.options)?;
    if let Some(dir) = &cli.options.visualize_dir {
        fs::create_dir_all(dir)?;
    }

    let service = HeadUpService::from_settings(&settings);
    let visualize_dir = cli.options.visualize_dir.as_deref();

    match cli.command {
        Command::Image { input } => run_image(&service, &input, visualize_dir),
        Command::Video { input } => run_video(&service, &input, visualize_dir),
        Command::Stream { frames } => {
            run_stream(&service, &frames, visualize_dir, &mut io::stdout().lock())
        }
    }
}

fn load_settings(options: &Options) -> Result<AnalyzerSettings, Box<dyn Error>> {
    let mut settings = match &options.config {
        Some(path) => AnalyzerSettings::load(path)?,
        None => AnalyzerSettings::load_or_default(),
    };

    if let Some(model) = &options.model {
        settings.model_path = Some(model.clone());
    }
    if options.generation.is_some() {
        settings.generation = options.generation;
    }
    if let Some(confidence) = options.confidence {
        settings.confidence_threshold = confidence;
    }
    if let Some(iou) = options.iou {
        settings.iou_threshold = iou;
    }
    if let Some(class_id) = options.head_up_class {
        settings.head_up_class_id = class_id;
    }
    if options.no_visualize {
        settings.visualize = false;
    }
    if let Some(font) = &options.font {
        settings.overlay_font = Some(font.clone());
    }

    settings.validate()?;
    Ok(settings)
}

fn run_image(
    service: &HeadUpService,
    input: &Path,
    visualize_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    if has_extension(input, VIDEO_EXTENSIONS) {
        return Err(format!("{} looks like a video; use `headup video`", input.display()).into());
    }
    let bytes = fs::read(input)?;
    let mut result = service.analyze_image(&bytes)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    export_visualization(&mut result, visualize_dir, &format!("{stem}.jpg"))?;

    println!("{}", serde_json::to_string_pretty(&frame_json(&result)?)?);
    Ok(())
}

fn run_video(
    service: &HeadUpService,
    input: &Path,
    visualize_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    if has_extension(input, IMAGE_EXTENSIONS) {
        return Err(format!("{} looks like an image; use `headup image`", input.display()).into());
    }

    let progress: Box<dyn Fn(usize, usize) -> bool + Send> = Box::new(|current, total| {
        eprint!("\rDecoding frame {current}/{total}");
        true
    });
    let mut use_case = service
        .video_use_case()
        .with_logger(Box::new(StdoutPipelineLogger::default()))
        .with_progress(progress);
    let mut summary = use_case.execute(&VideoSource::Path(input.to_path_buf()))?;
    eprintln!();

    export_summary_visualizations(&mut summary, visualize_dir)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Streams one JSON update per frame to `out`, then the session summary.
///
/// The session is closed on every path, including output failures.
fn run_stream(
    service: &HeadUpService,
    frames: &[PathBuf],
    visualize_dir: Option<&Path>,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    let handle = service.open_session();
    log::info!("Opened stream session {handle}");

    let failure = submit_all(service, handle, frames, visualize_dir, out).err();

    // Finalize on every path so partial sessions still report
    let summary = service.close(handle)?;
    let reported = write_summary(out, &summary);

    match failure {
        Some(e) => Err(e),
        None => reported,
    }
}

fn submit_all(
    service: &HeadUpService,
    handle: SessionHandle,
    frames: &[PathBuf],
    visualize_dir: Option<&Path>,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    for path in frames {
        let bytes = fs::read(path).map_err(|e| {
            log::error!("Cannot read {}: {e}", path.display());
            AnalysisError::Io(format!("{}: {e}", path.display()))
        })?;
        match service.submit(handle, &bytes) {
            Ok(mut update) => {
                let name = format!("stream_{:06}.jpg", update.frame_index);
                if let Err(e) = export_visualization(&mut update.result, visualize_dir, &name) {
                    log::warn!("Cannot write overlay {name}: {e}");
                }
                serde_json::to_writer(&mut *out, &update)?;
                writeln!(out)?;
            }
            Err(e @ AnalysisError::Inference(_)) => {
                log::warn!("{}: {e}", path.display());
            }
            Err(e) => {
                log::error!("{}: {e}", path.display());
                return Err(e.into());
            }
        }
    }
    Ok(())
}

fn write_summary(out: &mut dyn Write, summary: &SessionSummary) -> Result<(), Box<dyn Error>> {
    serde_json::to_writer(&mut *out, summary)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Frame result plus the attentiveness fields stored for image uploads.
fn frame_json(result: &FrameResult) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(result)?;
    value["is_attentive"] = json!(result.is_attentive());
    value["confidence"] = json!(result.max_confidence());
    Ok(value)
}

/// Moves the overlay out of `result` into `dir/name` when a directory is set.
fn export_visualization(
    result: &mut FrameResult,
    dir: Option<&Path>,
    name: &str,
) -> Result<(), Box<dyn Error>> {
    let Some(dir) = dir else {
        return Ok(());
    };
    if let Some(jpeg) = result.visualization.take() {
        let path = dir.join(name);
        fs::write(&path, jpeg)?;
        log::debug!("Wrote overlay {}", path.display());
    }
    Ok(())
}

fn export_summary_visualizations(
    summary: &mut SessionSummary,
    dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    for entry in &mut summary.entries {
        if let SampleOutcome::Analyzed(result) = &mut entry.outcome {
            let name = format!("frame_{:06}.jpg", entry.frame_index);
            export_visualization(result, dir, &name)?;
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
