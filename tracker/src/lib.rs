//! Progress tracking services on top of SQLite.
//!
//! Persistence comes in two backends behind one set of repository traits,
//! routed per request by [`persistence::RepositoryFactory`]. The
//! [`migration`] job moves legacy comment records into the progress tables;
//! [`grading`], [`tracker`] and [`admin`] are the services built on top.

pub mod access;
pub mod admin;
pub mod config;
pub mod grading;
pub mod migration;
pub mod persistence;
pub mod tracker;

pub use access::{AccessMode, EnrolmentCheck};
pub use grading::{GradingError, GradingService, Quiz};
pub use migration::{MigrationJob, MigrationReport};
pub use tracker::{CourseStructure, ProgressTracker};
