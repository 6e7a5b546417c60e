// Gaze marker presentation
//
// `MarkerPresenter` drives a `MarkerDisplay` backend: it either moves the
// overlay marker (the real pointer is untouched) or, in cursor-capture mode,
// warps the OS pointer. Rendering failures are logged and never reach the
// ingestion loop.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// Off-screen position used to hide the marker
pub const PARKED_POSITION: (i32, i32) = (-100, -100);

/// Backend that renders the marker or moves the pointer
pub trait MarkerDisplay: Send {
    /// Move the overlay marker without touching the OS pointer
    fn move_marker(&mut self, x_px: i32, y_px: i32) -> Result<()>;

    /// Move the OS pointer
    fn warp_pointer(&mut self, x_px: i32, y_px: i32) -> Result<()>;

    /// Hide the marker
    fn park(&mut self) -> Result<()> {
        self.move_marker(PARKED_POSITION.0, PARKED_POSITION.1)
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    marker: Option<(i32, i32)>,
    pointer: Option<(i32, i32)>,
    moves: u64,
    warps: u64,
}

/// Display that only records positions.
///
/// Clones share state, so a clone kept by the caller observes what the
/// presenter did.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDisplay {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_marker(&self) -> Option<(i32, i32)> {
        self.state.lock().marker
    }

    pub fn last_pointer(&self) -> Option<(i32, i32)> {
        self.state.lock().pointer
    }

    pub fn marker_moves(&self) -> u64 {
        self.state.lock().moves
    }

    pub fn pointer_warps(&self) -> u64 {
        self.state.lock().warps
    }
}

impl MarkerDisplay for HeadlessDisplay {
    fn move_marker(&mut self, x_px: i32, y_px: i32) -> Result<()> {
        log::trace!("Marker at ({}, {})", x_px, y_px);
        let mut state = self.state.lock();
        state.marker = Some((x_px, y_px));
        state.moves += 1;
        Ok(())
    }

    fn warp_pointer(&mut self, x_px: i32, y_px: i32) -> Result<()> {
        log::trace!("Pointer at ({}, {})", x_px, y_px);
        let mut state = self.state.lock();
        state.pointer = Some((x_px, y_px));
        state.warps += 1;
        Ok(())
    }
}

#[cfg(feature = "pointer")]
pub use pointer::PointerDisplay;

#[cfg(feature = "pointer")]
mod pointer {
    use crossbeam::channel::{self, Sender};
    use enigo::{Coordinate, Enigo, Mouse, Settings};
    use std::thread::JoinHandle;

    use super::MarkerDisplay;
    use crate::error::{GazeError, Result};

    enum PointerCommand {
        Warp(i32, i32),
    }

    /// Moves the real OS pointer through `enigo`.
    ///
    /// The input connection lives on its own thread; `warp_pointer` only
    /// queues the position. There is no overlay, so `move_marker` does
    /// nothing.
    pub struct PointerDisplay {
        tx: Option<Sender<PointerCommand>>,
        handle: Option<JoinHandle<()>>,
    }

    impl PointerDisplay {
        pub fn new() -> Result<Self> {
            let (tx, rx) = channel::unbounded::<PointerCommand>();
            let (ready_tx, ready_rx) = channel::bounded::<std::result::Result<(), String>>(1);

            let handle = std::thread::Builder::new()
                .name("aeye-pointer".to_string())
                .spawn(move || {
                    let mut enigo = match Enigo::new(&Settings::default()) {
                        Ok(enigo) => {
                            let _ = ready_tx.send(Ok(()));
                            enigo
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };

                    for command in rx.iter() {
                        match command {
                            PointerCommand::Warp(x, y) => {
                                if let Err(e) = enigo.move_mouse(x, y, Coordinate::Abs) {
                                    log::debug!("Pointer move failed: {}", e);
                                }
                            }
                        }
                    }
                })
                .map_err(|e| GazeError::Display(format!("Failed to spawn pointer thread: {}", e)))?;

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self {
                    tx: Some(tx),
                    handle: Some(handle),
                }),
                Ok(Err(e)) => Err(GazeError::Display(format!("Pointer control unavailable: {}", e))),
                Err(_) => Err(GazeError::Display("Pointer thread exited early".to_string())),
            }
        }
    }

    impl MarkerDisplay for PointerDisplay {
        fn move_marker(&mut self, _x_px: i32, _y_px: i32) -> Result<()> {
            Ok(())
        }

        fn warp_pointer(&mut self, x_px: i32, y_px: i32) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| GazeError::Display("Pointer thread stopped".to_string()))?;
            tx.send(PointerCommand::Warp(x_px, y_px))
                .map_err(|_| GazeError::Display("Pointer thread stopped".to_string()))
        }
    }

    impl Drop for PointerDisplay {
        fn drop(&mut self) {
            self.tx.take();
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Places the gaze marker, throttling is up to the caller
pub struct MarkerPresenter {
    display: Mutex<Box<dyn MarkerDisplay>>,
    cursor_capture: AtomicBool,
    placed: AtomicU64,
    failure_warned: AtomicBool,
}

impl MarkerPresenter {
    pub fn new(display: Box<dyn MarkerDisplay>) -> Self {
        Self {
            display: Mutex::new(display),
            cursor_capture: AtomicBool::new(false),
            placed: AtomicU64::new(0),
            failure_warned: AtomicBool::new(false),
        }
    }

    pub fn headless() -> Self {
        Self::new(Box::new(HeadlessDisplay::new()))
    }

    /// Show the gaze point at `(x_px, y_px)`
    pub fn place(&self, x_px: i32, y_px: i32) {
        let result = {
            let mut display = self.display.lock();
            if self.cursor_capture.load(Ordering::Relaxed) {
                display.warp_pointer(x_px, y_px)
            } else {
                display.move_marker(x_px, y_px)
            }
        };

        self.placed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = result {
            self.report(e);
        }
    }

    /// Switch between overlay and pointer mode; the marker is parked either way
    pub fn set_cursor_capture(&self, enabled: bool) {
        let previous = self.cursor_capture.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            log::info!("Cursor capture {}", if enabled { "enabled" } else { "disabled" });
        }
        self.park();
    }

    pub fn cursor_capture(&self) -> bool {
        self.cursor_capture.load(Ordering::Relaxed)
    }

    /// Hide the marker off-screen
    pub fn park(&self) {
        let result = self.display.lock().park();
        if let Err(e) = result {
            self.report(e);
        }
    }

    /// Number of `place` calls so far
    pub fn placed(&self) -> u64 {
        self.placed.load(Ordering::Relaxed)
    }

    fn report(&self, e: crate::error::GazeError) {
        if !self.failure_warned.swap(true, Ordering::Relaxed) {
            log::warn!("Marker update failed: {}", e);
        } else {
            log::debug!("Marker update failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GazeError;

    struct Broken;

    impl MarkerDisplay for Broken {
        fn move_marker(&mut self, _x: i32, _y: i32) -> Result<()> {
            Err(GazeError::Display("no overlay".into()))
        }

        fn warp_pointer(&mut self, _x: i32, _y: i32) -> Result<()> {
            Err(GazeError::Display("no pointer".into()))
        }
    }

    #[test]
    fn test_overlay_mode_moves_marker_only() {
        let display = HeadlessDisplay::new();
        let presenter = MarkerPresenter::new(Box::new(display.clone()));

        presenter.place(10, 20);
        presenter.place(30, 40);

        assert_eq!(display.last_marker(), Some((30, 40)));
        assert_eq!(display.last_pointer(), None);
        assert_eq!(presenter.placed(), 2);
    }

    #[test]
    fn test_cursor_capture_parks_and_warps() {
        let display = HeadlessDisplay::new();
        let presenter = MarkerPresenter::new(Box::new(display.clone()));
        presenter.place(10, 20);

        presenter.set_cursor_capture(true);
        assert!(presenter.cursor_capture());
        assert_eq!(display.last_marker(), Some(PARKED_POSITION));

        presenter.place(500, 600);
        assert_eq!(display.last_pointer(), Some((500, 600)));
        assert_eq!(display.last_marker(), Some(PARKED_POSITION));
        assert_eq!(display.pointer_warps(), 1);
    }

    #[test]
    fn test_display_failures_are_swallowed() {
        let presenter = MarkerPresenter::new(Box::new(Broken));
        presenter.place(1, 2);
        presenter.set_cursor_capture(true);
        presenter.place(3, 4);
        assert_eq!(presenter.placed(), 2);
    }
}
