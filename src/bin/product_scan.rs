//! product_scan - scan the camera until a product is captured

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use product_scanner::frame::{encode_rgb_jpeg, SNAPSHOT_JPEG_QUALITY};
use product_scanner::overlay::paint;
use product_scanner::ui::Ui;
use product_scanner::{
    build_adapter, open_camera, CaptureResult, OverlayRenderer, OverlayStyle, ProductContext,
    Scanner, ScannerConfig, ScannerRunner, ScannerState,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SCANNER_CONFIG")]
    config: Option<PathBuf>,
    /// Camera URL (`stub://name` or a V4L2 device path).
    #[arg(long)]
    camera: Option<String>,
    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Delay between capture attempts.
    #[arg(long, default_value_t = 500)]
    capture_every_ms: u64,
    /// Give up after this many rejected captures.
    #[arg(long, default_value_t = 20)]
    max_attempts: u32,
    /// Output directory for snapshot.jpg, annotated.jpg and product.json.
    #[arg(long, default_value = "scan_out")]
    out: PathBuf,
    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.max_attempts == 0 {
        return Err(anyhow!("max-attempts must be >= 1"));
    }
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };

    let scanner = {
        let _stage = ui.stage("Prepare detector and camera");
        let detector = build_adapter(&cfg.detector, cfg.camera.width, cfg.camera.height)
            .context("build detector")?;
        let camera = open_camera(&cfg.camera).context("open camera")?;
        log::info!(
            "detector {} on camera {} at {} fps",
            detector.name(),
            camera.name(),
            cfg.camera.target_fps
        );
        Scanner::new(detector, camera, cfg.scanner_settings())
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    let (capture_tx, capture_rx) = mpsc::channel();
    let mut handle = ScannerRunner::spawn(scanner, move |capture: CaptureResult| {
        let _ = capture_tx.send(capture);
    })
    .context("spawn scanner thread")?;

    let capture_every = Duration::from_millis(args.capture_every_ms);
    let mut next_attempt = Instant::now() + capture_every;
    let mut attempts = 0u32;
    {
        let _stage = ui.stage("Scan");
        let mut status = ui.status_line();
        loop {
            status.update(&handle.status());
            if interrupted.load(Ordering::SeqCst) {
                log::info!("interrupted, stopping scanner");
                handle.stop();
                break;
            }
            let state = handle.state();
            if state.is_terminal() {
                break;
            }
            if state == ScannerState::Scanning && Instant::now() >= next_attempt {
                attempts += 1;
                match handle.request_capture() {
                    Ok(()) => break,
                    Err(err) if err.is_recoverable() => {
                        log::info!("capture attempt {}/{}: {}", attempts, args.max_attempts, err);
                    }
                    Err(err) => log::warn!("capture attempt {}: {}", attempts, err),
                }
                if attempts >= args.max_attempts {
                    handle.stop();
                    break;
                }
                next_attempt = Instant::now() + capture_every;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        status.update(&handle.status());
    }

    let board = handle.wait();
    let capture = match capture_rx.try_recv() {
        Ok(capture) => capture,
        Err(_) => {
            if let ScannerState::Error(reason) = &board.state {
                return Err(anyhow!("scanner failed: {}", reason));
            }
            if interrupted.load(Ordering::SeqCst) {
                log::info!("no product captured");
                return Ok(());
            }
            return Err(anyhow!(
                "no product captured after {} attempts ({})",
                attempts,
                board.status
            ));
        }
    };

    let _stage = ui.stage("Write capture");
    let product = write_outputs(&args.out, &capture, cfg.overlay)?;
    log::info!(
        "captured {} ({}%), written to {}",
        product.name,
        product.confidence_pct,
        args.out.display()
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<ScannerConfig> {
    let mut cfg = match &args.config {
        Some(path) => ScannerConfig::load_from(path)?,
        None => ScannerConfig::load()?,
    };
    if let Some(url) = &args.camera {
        cfg.camera.url = url.clone();
    }
    if let Some(fps) = args.fps {
        cfg.camera.target_fps = fps;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn write_outputs(
    out_dir: &Path,
    capture: &CaptureResult,
    style: OverlayStyle,
) -> Result<ProductContext> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir {}", out_dir.display()))?;

    let snapshot = capture.snapshot.encode_jpeg(SNAPSHOT_JPEG_QUALITY)?;
    fs::write(out_dir.join("snapshot.jpg"), snapshot).context("write snapshot.jpg")?;

    let commands = OverlayRenderer::new(style)
        .render(capture.snapshot.size(), &capture.all_detections)?;
    let mut annotated = capture.snapshot.to_rgb_image()?;
    paint(&mut annotated, &commands);
    let annotated = encode_rgb_jpeg(
        annotated.as_raw(),
        annotated.width(),
        annotated.height(),
        SNAPSHOT_JPEG_QUALITY,
    )?;
    fs::write(out_dir.join("annotated.jpg"), annotated).context("write annotated.jpg")?;

    let product = ProductContext::from_capture(capture);
    fs::write(out_dir.join("product.json"), product.to_json()?).context("write product.json")?;
    Ok(product)
}
