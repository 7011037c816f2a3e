pub mod calibration;
pub mod config;
pub mod drill;
pub mod error;
pub mod geometry;
pub mod kinematics;
pub mod pose;
pub mod session;
pub mod timebase;
pub mod tracking;
pub mod units;
pub mod video;

pub use error::{PipelineError, Result};
pub use session::AnalysisSession;
