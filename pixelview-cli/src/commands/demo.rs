//! Demo command - pan a viewport over a synthetic image with the overlay on.
//!
//! Simulates a viewer: every frame paints the overlay for the current
//! viewport, then drains the UI queue the way an event loop would. At the
//! end the command waits for outstanding tiles, renders the last viewport
//! once more and optionally writes it as a PNG.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use pixelview::config::{format_size, ConfigFile, OverlayConfig};
use pixelview::executor::{build_runtime, QueuedUiScheduler, UiScheduler};
use pixelview::overlay::{OverlayEvent, OverlayRenderer, RasterCanvas};
use pixelview::region::{ImageContext, ImageRegion};
use pixelview::source::{SourceParams, TileSourceRegistry};
use tracing::{info, warn};

use crate::error::CliError;

/// Canvas size of the simulated viewer window, in screen pixels.
const VIEW_WIDTH: u32 = 1024;
const VIEW_HEIGHT: u32 = 768;

/// Longest wait for outstanding tiles after the last frame.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Arguments for the demo command.
pub struct DemoArgs {
    pub source: String,
    pub params: Vec<String>,
    pub threads: Option<usize>,
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    pub frame_ms: u64,
    pub downsample: f64,
    pub no_live: bool,
    pub opacity: Option<f32>,
    pub complete: bool,
    pub output: Option<PathBuf>,
}

/// Run the demo command.
pub fn run(args: DemoArgs, config: &ConfigFile) -> Result<(), CliError> {
    if !args.downsample.is_finite() || args.downsample <= 0.0 {
        return Err(CliError::Config(format!(
            "Downsample must be a positive number, got {}",
            args.downsample
        )));
    }
    if args.width == 0 || args.height == 0 {
        return Err(CliError::Config("Image size must be non-zero".to_string()));
    }

    let overlay_config = resolve_config(&args, config);
    let params = parse_params(&args.params)?;
    let source = TileSourceRegistry::with_builtin().build(&args.source, &params)?;

    let runtime = build_runtime(overlay_config.threads).map_err(CliError::Runtime)?;
    let scheduler = Arc::new(QueuedUiScheduler::new());
    let renderer = OverlayRenderer::new(
        &overlay_config,
        runtime.handle().clone(),
        scheduler.clone() as Arc<dyn UiScheduler>,
    );

    let ready = Arc::new(AtomicUsize::new(0));
    let ready_count = Arc::clone(&ready);
    renderer.add_listener(move |event| {
        if matches!(event, OverlayEvent::TileReady(_)) {
            ready_count.fetch_add(1, Ordering::Relaxed);
        }
    });
    renderer.set_tile_source(Some(source));

    let image = ImageContext::new("demo", args.width, args.height);
    info!(
        source = %args.source,
        threads = overlay_config.threads,
        width = args.width,
        height = args.height,
        frames = args.frames,
        "Starting overlay demo"
    );

    let progress = ProgressBar::new(args.frames as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} frames {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let frame_interval = Duration::from_millis(args.frame_ms);
    let mut viewport = viewport_at(&args, 0);
    for frame in 0..args.frames {
        viewport = viewport_at(&args, frame);
        let mut canvas = RasterCanvas::new(viewport, args.downsample);
        let report =
            renderer.paint_overlay(&mut canvas, &viewport, args.downsample, &image, args.complete);

        std::thread::sleep(frame_interval);
        scheduler.run_pending();

        progress.set_message(format!(
            "drawn {} missing {} pending {}",
            report.drawn,
            report.missing,
            renderer.pending_count()
        ));
        progress.inc(1);
    }
    progress.finish_with_message("done");

    if !settle(&renderer, &scheduler) {
        warn!(
            pending = renderer.pending_count(),
            "Timed out waiting for outstanding tiles"
        );
    }

    let mut canvas = RasterCanvas::new(viewport, args.downsample);
    let report =
        renderer.paint_overlay(&mut canvas, &viewport, args.downsample, &image, args.complete);

    if let Some(path) = &args.output {
        canvas
            .save_png(path)
            .map_err(|e| CliError::Image(format!("{}: {}", path.display(), e)))?;
        println!("Wrote {}", path.display());
    }

    let stats = renderer.cache_stats();
    println!();
    println!("Overlay demo ({} frames, source '{}')", args.frames, args.source);
    println!("{}", renderer.telemetry());
    println!(
        "Final frame: {} drawn, {} missing, {} painted pixels",
        report.drawn,
        report.missing,
        canvas.painted_pixels()
    );
    println!("Tile-ready events: {}", ready.load(Ordering::Relaxed));
    println!(
        "Tile cache: {} entries, {} ({:.1}% hit rate)",
        stats.entry_count,
        format_size(stats.size_bytes),
        stats.hit_rate() * 100.0
    );

    renderer.stop();
    Ok(())
}

/// Overlay configuration from the config file, with CLI overrides applied.
fn resolve_config(args: &DemoArgs, config: &ConfigFile) -> OverlayConfig {
    let mut overlay = OverlayConfig::from(config);
    if let Some(threads) = args.threads {
        overlay = overlay.with_threads(threads);
    }
    if let Some(opacity) = args.opacity {
        overlay = overlay.with_opacity(opacity);
    }
    if args.no_live {
        overlay = overlay.with_live_prediction(false);
    }
    overlay
}

fn parse_params(pairs: &[String]) -> Result<SourceParams, CliError> {
    let mut params = SourceParams::new();
    for pair in pairs {
        let (name, value) = SourceParams::parse_pair(pair)?;
        params.insert(name, value);
    }
    Ok(params)
}

/// Viewport for `frame`, panning diagonally from the top-left corner to the
/// bottom-right one.
fn viewport_at(args: &DemoArgs, frame: usize) -> ImageRegion {
    let width = ((VIEW_WIDTH as f64 * args.downsample) as u32).clamp(1, args.width);
    let height = ((VIEW_HEIGHT as f64 * args.downsample) as u32).clamp(1, args.height);

    let t = if args.frames > 1 {
        frame as f64 / (args.frames - 1) as f64
    } else {
        0.0
    };
    let x = ((args.width - width) as f64 * t) as i32;
    let y = ((args.height - height) as f64 * t) as i32;
    ImageRegion::new(x, y, width as i32, height as i32)
}

/// Keep draining the UI queue until no work is left. Returns `false` on
/// timeout.
fn settle(renderer: &OverlayRenderer, scheduler: &QueuedUiScheduler) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        scheduler.run_pending();
        if renderer.pending_count() == 0 && renderer.in_flight() == 0 {
            scheduler.run_pending();
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
