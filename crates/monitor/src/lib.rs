//! Driver Monitoring Sessions
//!
//! Runs one [`dms::DriverPipeline`] per driver on its own task:
//! - Frames arrive through a single-slot channel; a busy session drops the newest frame
//! - Each frame is timed against a processing budget
//! - Alerts are handed to the shared [`alerting::AlertDispatcher`] without blocking the frame loop
//! - Stopping a session resolves its open episode and waits for in-flight dispatches

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{spawn_session, SessionConfig, SessionHandle, SessionSummary, SubmitOutcome};

use dms::DmsError;
use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No session for driver {0}")]
    NotFound(String),

    #[error("Session already running for driver {0}")]
    AlreadyRunning(String),

    #[error("Session for driver {0} has shut down")]
    SessionClosed(String),

    #[error("Session for driver {0} has too many pending commands")]
    Busy(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] DmsError),

    #[error("Session registry lock poisoned")]
    LockPoisoned,
}
