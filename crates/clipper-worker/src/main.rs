//! `clipper <source> [clip_count] [horizontal|vertical]`

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipper_media::{FaceDetector, NullFaceDetector};
use clipper_ml_client::{FaceServiceClient, FaceServiceConfig};
use clipper_models::{ClipFormat, ProgressEvent};
use clipper_worker::{
    AnalysisConfig, ClipPipeline, FfmpegToolkit, GeminiClient, PipelineConfig, ProgressSink,
    DEFAULT_CLIP_COUNT,
};

const USAGE: &str = "usage: clipper <source> [clip_count] [horizontal|vertical]";

struct Args {
    source: String,
    clip_count: usize,
    format: ClipFormat,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let Some(source) = args.next().filter(|s| !s.starts_with('-')) else {
        bail!(USAGE);
    };
    let clip_count = match args.next() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid clip count '{}'\n{}", raw, USAGE))?,
        None => DEFAULT_CLIP_COUNT,
    };
    let format = match args.next() {
        Some(raw) => raw.parse().with_context(|| USAGE)?,
        None => ClipFormat::default(),
    };
    if args.next().is_some() {
        bail!(USAGE);
    }
    Ok(Args {
        source,
        clip_count,
        format,
    })
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("clipper=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn face_detector() -> anyhow::Result<Arc<dyn FaceDetector>> {
    match FaceServiceConfig::from_env() {
        Some(config) => Ok(Arc::new(
            FaceServiceClient::new(config).context("failed to create face service client")?,
        )),
        None => Ok(Arc::new(NullFaceDetector)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let args = parse_args()?;
    info!("Starting clipper");
    clipper_worker::metrics::init_from_env();

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);
    let analysis_config = AnalysisConfig::from_env()?;
    let analysis = GeminiClient::new(analysis_config).context("failed to create Gemini client")?;

    let detector = face_detector()?;
    if args.format == ClipFormat::Vertical && detector.name() == NullFaceDetector.name() {
        warn!("CLIPPER_FACE_SERVICE_URL not set; vertical clips will use a centered crop");
    }
    let toolkit = FfmpegToolkit::new(config.clone(), detector);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let (progress, mut events) = ProgressSink::channel();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::Stage { stage, status, .. } => {
                    info!(stage = %stage, "Stage {:?}", status)
                }
                ProgressEvent::Segment { segment, stage, status, .. } => {
                    tracing::debug!(segment, stage = %stage, "Segment {:?}", status)
                }
                ProgressEvent::Log { message, .. } => info!("{}", message),
            }
        }
    });

    let pipeline = ClipPipeline::new(config, Arc::new(analysis), Arc::new(toolkit))
        .with_progress(progress)
        .with_cancel(cancel_rx);

    let result = pipeline
        .run(&args.source, args.clip_count, args.format)
        .await;
    drop(pipeline);
    progress_task.await.ok();

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}
