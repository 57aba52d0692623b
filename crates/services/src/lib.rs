#![forbid(unsafe_code)]

pub mod ai;
pub mod app_services;
pub mod config;
pub mod error;
pub mod sessions;

pub use assess_core::Clock;

pub use app_services::AppServices;
pub use config::EngineConfig;
pub use error::{
    AdvisorError, AppServicesError, AssessmentError, ConfigError, Missing, ValidationError,
};

pub use sessions::{
    AnswerStore, SessionDetail, SessionLocks, SessionManager, StartOptions, StartedSession,
    SubmitOutcome,
};
