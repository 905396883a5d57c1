use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{ScanStats, Scanner, ScannerState};
use crate::capture::LeaseStats;
use crate::detect::DetectionSet;
use crate::error::CaptureError;
use crate::overlay::DrawCommand;
use crate::policy::CaptureResult;

/// Snapshot of scanner state published after every tick and command.
#[derive(Clone, Debug)]
pub struct ScannerBoard {
    pub state: ScannerState,
    pub status: String,
    pub detections: Arc<DetectionSet>,
    pub overlay: Arc<Vec<DrawCommand>>,
    pub stats: ScanStats,
    pub camera: LeaseStats,
}

impl ScannerBoard {
    fn from_scanner(scanner: &Scanner) -> Self {
        Self {
            state: scanner.state().clone(),
            status: scanner.status().to_string(),
            detections: scanner.current_detections(),
            overlay: scanner.overlay_commands(),
            stats: scanner.stats(),
            camera: scanner.camera_stats(),
        }
    }
}

enum Command {
    Capture(Sender<Result<(), CaptureError>>),
    Stop,
}

/// Runs a `Scanner` on a dedicated thread.
///
/// One tick per frame interval; commands are handled between ticks, so a
/// detection cycle always completes before anything else touches the scanner.
pub struct ScannerRunner;

impl ScannerRunner {
    /// Start `scanner` on a new thread. `on_capture` receives the accepted
    /// capture, at most once.
    pub fn spawn<F>(scanner: Scanner, on_capture: F) -> std::io::Result<ScannerHandle>
    where
        F: FnOnce(CaptureResult) + Send + 'static,
    {
        let fps = scanner.settings().constraints.target_fps.max(1);
        let interval = Duration::from_secs_f64(1.0 / fps as f64);
        let board = Arc::new(Mutex::new(ScannerBoard::from_scanner(&scanner)));
        let (tx, rx) = mpsc::channel();

        let thread_board = Arc::clone(&board);
        let join = std::thread::Builder::new()
            .name("scanner".to_string())
            .spawn(move || run_loop(scanner, rx, thread_board, interval, on_capture))?;

        Ok(ScannerHandle {
            commands: tx,
            board,
            join: Some(join),
        })
    }
}

fn run_loop<F>(
    mut scanner: Scanner,
    commands: Receiver<Command>,
    board: Arc<Mutex<ScannerBoard>>,
    interval: Duration,
    on_capture: F,
) where
    F: FnOnce(CaptureResult),
{
    let mut on_capture = Some(on_capture);
    let publish = |scanner: &Scanner| {
        *lock(&board) = ScannerBoard::from_scanner(scanner);
    };

    if let Err(err) = scanner.start() {
        log::error!("scanner failed to start: {}", err);
        publish(&scanner);
        return;
    }
    publish(&scanner);

    let mut next_tick = Instant::now();
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match commands.recv_timeout(wait) {
            Ok(Command::Capture(reply)) => {
                let verdict = match scanner.request_capture() {
                    Ok(result) => {
                        if let Some(callback) = on_capture.take() {
                            callback(result);
                        }
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                publish(&scanner);
                // The requester may have given up waiting.
                let _ = reply.send(verdict);
                if scanner.state().is_terminal() {
                    break;
                }
            }
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                scanner.stop();
                publish(&scanner);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let outcome = scanner.tick();
                publish(&scanner);
                if outcome == super::TickOutcome::Halted {
                    break;
                }
                next_tick += interval;
                let now = Instant::now();
                if next_tick < now {
                    // Fell behind (slow detector); do not burst to catch up.
                    next_tick = now;
                }
            }
        }
    }
    log::debug!("scanner thread exiting ({})", scanner.state());
}

fn lock(board: &Mutex<ScannerBoard>) -> MutexGuard<'_, ScannerBoard> {
    // A panicked tick leaves the last published board, which is still coherent.
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Caller-side handle to a running scanner.
pub struct ScannerHandle {
    commands: Sender<Command>,
    board: Arc<Mutex<ScannerBoard>>,
    join: Option<JoinHandle<()>>,
}

impl ScannerHandle {
    pub fn board(&self) -> ScannerBoard {
        lock(&self.board).clone()
    }

    pub fn state(&self) -> ScannerState {
        lock(&self.board).state.clone()
    }

    /// Current user-visible status line.
    pub fn status(&self) -> String {
        lock(&self.board).status.clone()
    }

    pub fn detections(&self) -> Arc<DetectionSet> {
        Arc::clone(&lock(&self.board).detections)
    }

    pub fn overlay(&self) -> Arc<Vec<DrawCommand>> {
        Arc::clone(&lock(&self.board).overlay)
    }

    /// Ask for a capture and wait for the verdict.
    ///
    /// `Ok(())` means the capture was accepted and handed to the callback.
    pub fn request_capture(&self) -> Result<(), CaptureError> {
        let (tx, rx) = mpsc::channel();
        self.commands
            .send(Command::Capture(tx))
            .map_err(|_| CaptureError::RunnerGone)?;
        rx.recv().map_err(|_| CaptureError::RunnerGone)?
    }

    /// True while the scanner thread is running.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Stop the scanner and wait for its thread. Idempotent.
    pub fn stop(&mut self) {
        // The thread may already have exited after a capture or error.
        let _ = self.commands.send(Command::Stop);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("scanner thread panicked");
            }
        }
    }

    /// Wait until the scanner thread exits on its own.
    pub fn wait(mut self) -> ScannerBoard {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("scanner thread panicked");
            }
        }
        self.board()
    }
}

impl Drop for ScannerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
