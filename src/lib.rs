#![allow(clippy::missing_errors_doc)]

pub mod acquire;
pub mod api;
pub mod common;
pub mod present;
pub mod session;

pub use acquire::camera::{CameraBackend, CameraError, CameraSession, FfmpegCamera};
pub use acquire::payload::{ImagePayload, PayloadError};
pub use api::match_api::MatchRequestFlow;
pub use api::match_structs::{FailureKind, MatchFailure, MatchResult, RequestOutcome};
pub use common::settings::{Settings, SettingsOverrides, load_settings};
pub use session::state::{Session, SessionState, TransitionError};
