pub mod config;
pub mod error;
pub mod types;

pub use config::{CompareConfig, RefreshConfig, SeriesConfig, Settings};
pub use error::{BenchtrackError, EntityKind, Result};
pub use types::{BenchmarkResult, Context, Hardware, Run};
