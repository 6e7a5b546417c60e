// Real-time gaze streaming
//
// Architecture:
// - `clock`: device/host clock offset and its refresh thread
// - `buffer`: fixed-capacity sample ring with take-and-replace snapshots
// - `mapper`: normalized-to-pixel mapping, binocular averaging, smoothing
// - `marker`: marker/pointer presentation backends
// - `exporter`: background CSV export of buffer snapshots
// - `streamer`: subscription lifecycle and the ingestion worker
// - `event_logger`: gaze logging around user-signalled events

pub mod buffer;
pub mod clock;
pub mod event_logger;
pub mod exporter;
pub mod mapper;
pub mod marker;
pub mod streamer;
pub mod types;

pub use buffer::{BufferMetrics, GazeSampleBuffer};
pub use clock::ClockSync;
pub use event_logger::{EventLogConfig, GazeEventLogger};
pub use exporter::SnapshotExporter;
pub use mapper::CoordinateMapper;
pub use marker::{HeadlessDisplay, MarkerDisplay, MarkerPresenter};
#[cfg(feature = "pointer")]
pub use marker::PointerDisplay;
pub use streamer::{GazePipeline, GazeStreamer, GazeStreamerBuilder, GazeStreamerConfig};
pub use types::{StreamState, StreamStats};
