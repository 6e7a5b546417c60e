// Gaze streamer - owns the device subscription and the ingestion worker
//
// The streamer manages:
// - Clock synchronization at start, plus the optional refresh thread
// - A worker thread that subscribes, then loops wait -> process -> yield
//   until the stop flag is raised, and unsubscribes on the way out
// - Per-sample processing through `GazePipeline` on that worker thread
// - Snapshot exports and their writer thread
//
// Every method takes `&self`, so a streamer can sit in an `Arc` shared with
// an event logger or a signal handler.

use crossbeam::channel;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::correction::CoordCorrector;
use crate::device::{DeviceError, DeviceGazeSample, DeviceSession, WaitOutcome};
use crate::error::{GazeError, Result, StartupStage};
use crate::streaming::buffer::GazeSampleBuffer;
use crate::streaming::clock::{host_now_us, ClockSync};
use crate::streaming::exporter::SnapshotExporter;
use crate::streaming::mapper::CoordinateMapper;
use crate::streaming::marker::{HeadlessDisplay, MarkerDisplay, MarkerPresenter};
use crate::streaming::types::{StreamState, StreamStats};
use crate::types::{DisplaySize, SmoothedGazePoint};

/// Pause between delivery rounds of the ingestion loop
const YIELD_INTERVAL: Duration = Duration::from_micros(500);

/// Streamer configuration
#[derive(Debug, Clone)]
pub struct GazeStreamerConfig {
    pub stream_id: String,
    pub display: DisplaySize,
    pub buffer_capacity: usize,
    /// Place the marker on every Nth valid sample
    pub mark_freq: u32,
    pub smoothing_window: usize,
    /// Upper bound on one wait for device data, and so on stop latency
    pub wait_timeout: Duration,
    pub clock_refresh: Option<Duration>,
    pub clock_refresh_resyncs: bool,
}

impl Default for GazeStreamerConfig {
    fn default() -> Self {
        Self {
            stream_id: uuid::Uuid::new_v4().to_string(),
            display: DisplaySize::new(1920, 1080),
            buffer_capacity: 450_000,
            mark_freq: 10,
            smoothing_window: 5,
            wait_timeout: Duration::from_millis(100),
            clock_refresh: Some(Duration::from_secs(10)),
            clock_refresh_resyncs: false,
        }
    }
}

/// Per-sample processing shared between the streamer and the device callback
pub struct GazePipeline {
    buffer: GazeSampleBuffer,
    mapper: CoordinateMapper,
    presenter: MarkerPresenter,
    clock: ClockSync,
    mark_freq: u32,
    smoothing_window: usize,

    mark_counter: AtomicU32,
    last_valid: AtomicBool,
    callbacks_received: AtomicU64,
    samples_enqueued: AtomicU64,
    invalid_dropped: AtomicU64,
    marks_placed: AtomicU64,
}

impl GazePipeline {
    pub fn new(
        config: &GazeStreamerConfig,
        clock: ClockSync,
        mapper: CoordinateMapper,
        presenter: MarkerPresenter,
    ) -> Self {
        Self {
            buffer: GazeSampleBuffer::new(config.buffer_capacity),
            mapper,
            presenter,
            clock,
            mark_freq: config.mark_freq.max(1),
            smoothing_window: config.smoothing_window,
            mark_counter: AtomicU32::new(0),
            last_valid: AtomicBool::new(false),
            callbacks_received: AtomicU64::new(0),
            samples_enqueued: AtomicU64::new(0),
            invalid_dropped: AtomicU64::new(0),
            marks_placed: AtomicU64::new(0),
        }
    }

    /// Process one device sample.
    ///
    /// Samples without a valid gaze point for both eyes are dropped and
    /// restart the mark countdown. Valid samples are mapped, stamped with
    /// host time and buffered; every `mark_freq`th one moves the marker to
    /// the freshly smoothed point.
    pub fn handle_sample(&self, raw: &DeviceGazeSample) {
        self.callbacks_received.fetch_add(1, Ordering::Relaxed);

        let valid = raw.both_eyes_valid();
        self.last_valid.store(valid, Ordering::Relaxed);
        if !valid {
            self.mark_counter.store(0, Ordering::Relaxed);
            self.invalid_dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("Dropped gaze sample at {} us: eye not tracked", raw.device_timestamp_us);
            return;
        }

        let timestamp_us = self.clock.device_to_system(raw.device_timestamp_us);
        let sample = self
            .mapper
            .build_sample(timestamp_us, raw.left.sample, raw.right.sample);
        self.buffer.push(sample);
        self.samples_enqueued.fetch_add(1, Ordering::Relaxed);

        let count = self.mark_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.mark_freq {
            self.mark_counter.store(0, Ordering::Relaxed);
            if let Some((x, y)) = self.smoothed(self.smoothing_window).point() {
                self.presenter.place(x, y);
                self.marks_placed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn smoothed(&self, n: usize) -> SmoothedGazePoint {
        self.mapper.smoothed(&self.buffer, n)
    }

    pub fn buffer(&self) -> &GazeSampleBuffer {
        &self.buffer
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    pub fn presenter(&self) -> &MarkerPresenter {
        &self.presenter
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    /// Whether the most recent callback carried a valid gaze point
    pub fn is_gaze_valid(&self) -> bool {
        self.last_valid.load(Ordering::Relaxed)
    }

    pub fn marks_placed(&self) -> u64 {
        self.marks_placed.load(Ordering::Relaxed)
    }

    /// Rate measured over the buffered samples
    pub fn sample_rate(&self) -> Option<f64> {
        let len = self.buffer.len();
        let (first, last) = self.buffer.time_span_us()?;
        if len < 2 || last <= first {
            return None;
        }
        Some((len - 1) as f64 * 1_000_000.0 / (last - first) as f64)
    }
}

/// Builder for `GazeStreamer`
pub struct GazeStreamerBuilder {
    device: Arc<dyn DeviceSession>,
    config: GazeStreamerConfig,
    display: Option<Box<dyn MarkerDisplay>>,
    corrector: Option<Box<dyn CoordCorrector>>,
    cursor_capture: bool,
}

impl GazeStreamerBuilder {
    pub fn display(mut self, display: Box<dyn MarkerDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn corrector(mut self, corrector: Box<dyn CoordCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    pub fn cursor_capture(mut self, enabled: bool) -> Self {
        self.cursor_capture = enabled;
        self
    }

    pub fn build(self) -> GazeStreamer {
        let display = self
            .display
            .unwrap_or_else(|| Box::new(HeadlessDisplay::new()));
        let presenter = MarkerPresenter::new(display);
        if self.cursor_capture {
            presenter.set_cursor_capture(true);
        }

        let mut mapper = CoordinateMapper::new(self.config.display);
        if let Some(corrector) = self.corrector {
            mapper = mapper.with_corrector(corrector);
        }

        let clock = ClockSync::new(Arc::clone(&self.device));
        let pipeline = GazePipeline::new(&self.config, clock, mapper, presenter);

        GazeStreamer {
            id: self.config.stream_id.clone(),
            device: self.device,
            pipeline: Arc::new(pipeline),
            exporter: SnapshotExporter::new(),
            state: Arc::new(RwLock::new(StreamState::Idle)),
            stop_signal: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            config: self.config,
        }
    }
}

/// Streams gaze data from one device into a buffer
pub struct GazeStreamer {
    pub id: String,
    config: GazeStreamerConfig,
    device: Arc<dyn DeviceSession>,
    pipeline: Arc<GazePipeline>,
    exporter: SnapshotExporter,

    state: Arc<RwLock<StreamState>>,
    stop_signal: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl GazeStreamer {
    pub fn builder(device: Arc<dyn DeviceSession>, config: GazeStreamerConfig) -> GazeStreamerBuilder {
        GazeStreamerBuilder {
            device,
            config,
            display: None,
            corrector: None,
            cursor_capture: false,
        }
    }

    /// Streamer with a headless marker and no correction
    pub fn new(device: Arc<dyn DeviceSession>, config: GazeStreamerConfig) -> Self {
        Self::builder(device, config).build()
    }

    /// Synchronize clocks, subscribe and start ingesting.
    ///
    /// Calling this while streaming only logs a warning.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::warn!("Stream {} already started", self.id);
            return Ok(());
        }

        self.pipeline
            .clock()
            .sync()
            .map_err(|e| Self::stage_error(StartupStage::ClockSync, e))?;

        if let Some(interval) = self.config.clock_refresh {
            self.pipeline
                .clock()
                .start_refresh(interval, self.config.clock_refresh_resyncs)?;
        }

        self.stop_signal.store(false, Ordering::Release);
        *self.state.write() = StreamState::Idle;
        let (ready_tx, ready_rx) = channel::bounded::<std::result::Result<(), DeviceError>>(1);

        let device = Arc::clone(&self.device);
        let pipeline = Arc::clone(&self.pipeline);
        let stop_signal = Arc::clone(&self.stop_signal);
        let state = Arc::clone(&self.state);
        let wait_timeout = self.config.wait_timeout;

        let spawned = std::thread::Builder::new()
            .name(format!("aeye-ingest-{}", self.id))
            .spawn(move || {
                let result = ingest(device, pipeline, stop_signal, wait_timeout, ready_tx);
                if let Err(e) = &result {
                    log::error!("Gaze ingestion stopped: {}", e);
                    *state.write() = StreamState::Error {
                        message: e.to_string(),
                    };
                }
                result
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.pipeline.clock().stop_refresh();
                return Err(GazeError::Worker(format!("Failed to spawn ingestion worker: {}", e)));
            }
        };

        let ready = ready_rx.recv();
        match ready {
            Ok(Ok(())) => {
                {
                    // the worker may already have failed and recorded why
                    let mut state = self.state.write();
                    if *state == StreamState::Idle {
                        *state = StreamState::Streaming {
                            started_at_us: host_now_us(),
                        };
                    }
                }
                *worker = Some(handle);
                log::info!(
                    "Stream {} started at {} Hz",
                    self.id,
                    self.device.output_frequency()
                );
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.pipeline.clock().stop_refresh();
                let error = GazeError::startup(StartupStage::Subscribe, e);
                *self.state.write() = StreamState::Error {
                    message: error.to_string(),
                };
                Err(error)
            }
            Err(_) => {
                let _ = handle.join();
                self.pipeline.clock().stop_refresh();
                Err(GazeError::Worker(
                    "Ingestion worker exited before subscribing".to_string(),
                ))
            }
        }
    }

    /// Stop ingesting and wait for the worker and any export in flight.
    ///
    /// Returns the worker's failure, if it stopped on one.
    pub fn stop(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        let result = match handle {
            Some(handle) => {
                self.stop_signal.store(true, Ordering::Release);
                handle
                    .join()
                    .unwrap_or_else(|_| Err(GazeError::Worker("Ingestion worker panicked".into())))
            }
            None => {
                log::debug!("Stream {} not running", self.id);
                Ok(())
            }
        };

        self.pipeline.clock().stop_refresh();
        self.exporter.wait();

        if result.is_ok() {
            *self.state.write() = StreamState::Idle;
            log::info!("Stream {} stopped", self.id);
        }
        result
    }

    pub fn state(&self) -> StreamState {
        self.state.read().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.read().is_streaming()
    }

    /// Snapshot the buffer and write its newest `n` samples to `path`.
    ///
    /// Returns the number of samples captured; see `SnapshotExporter`.
    pub fn export(&self, path: &Path, n: usize, label: Option<&str>) -> Result<usize> {
        self.exporter.export(self.pipeline.buffer(), path, n, label)
    }

    /// Wait for the export in flight, returning rows written
    pub fn wait_for_export(&self) -> Option<std::io::Result<usize>> {
        self.exporter.wait()
    }

    /// Smoothed point over the last `n` samples
    pub fn smoothed(&self, n: usize) -> SmoothedGazePoint {
        self.pipeline.smoothed(n)
    }

    pub fn set_cursor_capture(&self, enabled: bool) {
        self.pipeline.presenter().set_cursor_capture(enabled);
    }

    pub fn is_gaze_valid(&self) -> bool {
        self.pipeline.is_gaze_valid()
    }

    /// Rate measured from buffered timestamps
    pub fn sample_rate(&self) -> Option<f64> {
        self.pipeline.sample_rate()
    }

    /// Nominal device rate
    pub fn output_frequency(&self) -> f32 {
        self.device.output_frequency()
    }

    pub fn config(&self) -> &GazeStreamerConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn DeviceSession> {
        &self.device
    }

    pub fn pipeline(&self) -> &Arc<GazePipeline> {
        &self.pipeline
    }

    pub fn buffer(&self) -> &GazeSampleBuffer {
        self.pipeline.buffer()
    }

    pub fn clock(&self) -> &ClockSync {
        self.pipeline.clock()
    }

    pub fn stats(&self) -> StreamStats {
        let p = &self.pipeline;
        StreamStats {
            callbacks_received: p.callbacks_received.load(Ordering::Relaxed),
            samples_enqueued: p.samples_enqueued.load(Ordering::Relaxed),
            invalid_dropped: p.invalid_dropped.load(Ordering::Relaxed),
            marks_placed: p.marks_placed.load(Ordering::Relaxed),
            exports_started: self.exporter.exports_started(),
            sample_rate_hz: p.sample_rate(),
            buffer: p.buffer().metrics(),
        }
    }

    fn stage_error(stage: StartupStage, error: GazeError) -> GazeError {
        match error {
            GazeError::Device(source) => GazeError::startup(stage, source),
            other => other,
        }
    }
}

impl Drop for GazeStreamer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Stream {} stopped with error: {}", self.id, e);
        }
        self.pipeline.presenter().park();
    }
}

/// Body of the ingestion worker
fn ingest(
    device: Arc<dyn DeviceSession>,
    pipeline: Arc<GazePipeline>,
    stop_signal: Arc<AtomicBool>,
    wait_timeout: Duration,
    ready_tx: channel::Sender<std::result::Result<(), DeviceError>>,
) -> Result<()> {
    let callback_pipeline = Arc::clone(&pipeline);
    let callback = Box::new(move |sample: &DeviceGazeSample| {
        callback_pipeline.handle_sample(sample);
    });

    let subscription = match device.subscribe(callback) {
        Ok(handle) => {
            let _ = ready_tx.send(Ok(()));
            handle
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return Ok(());
        }
    };

    let mut outcome = Ok(());
    while !stop_signal.load(Ordering::Acquire) {
        match device.wait_for_callbacks(wait_timeout) {
            Ok(WaitOutcome::Ready) => {
                if let Err(e) = device.process_callbacks() {
                    outcome = Err(GazeError::Device(e));
                    break;
                }
            }
            Ok(WaitOutcome::TimedOut) => {
                log::trace!("No gaze data within {:?}", wait_timeout);
                continue;
            }
            Err(e) => {
                outcome = Err(GazeError::Device(e));
                break;
            }
        }
        std::thread::sleep(YIELD_INTERVAL);
    }

    if let Err(e) = device.unsubscribe(subscription) {
        if outcome.is_ok() {
            outcome = Err(GazeError::Device(e));
        } else {
            log::warn!("Unsubscribe after failure also failed: {}", e);
        }
    }

    outcome
}
