#![forbid(unsafe_code)]

pub mod aggregation;
pub mod app_services;
pub mod attempt_recorder;
pub mod error;
pub mod identity;
pub mod progress_service;
pub mod resume_tracker;

pub use practice_core::Clock;

pub use aggregation::{AdminOverview, AggregationEngine, Dashboard};
pub use app_services::AppServices;
pub use attempt_recorder::AttemptRecorder;
pub use error::{AppServicesError, ProgressError};
pub use identity::IdentityResolver;
pub use progress_service::{AnswerSubmission, OnboardingForm, ProgressService};
pub use resume_tracker::{ResumeTracker, SessionKind};
