//! Storage-independent domain types: validated telemetry rows, window
//! arithmetic and the statistics used for aggregation and anomaly detection.

pub mod stats;
pub mod telemetry;
pub mod window;

pub use stats::{two_sigma_outliers, Outlier, PowerStats};
pub use telemetry::{preprocess, PreprocessedBatch, RowError, TelemetryReading, TelemetryRow};
pub use window::{next_window, WindowAnchor, WindowBounds, WindowSchedule};
