//! Lexforge amendment pipeline
//!
//! The stages, in data-flow order:
//! - [`import`]: raw document text → persisted unit tree
//! - [`resolve`]: submission text → deduplicated edit targets
//! - [`apply`]: confirmed targets → before/after fragments
//! - [`snapshot`]: fragments → an immutable document version
//!
//! [`job`] wraps the two slow stages (resolution and application call out to
//! oracles) as pollable background jobs. [`registry`] holds the two
//! addressing modes used to bind amendment addresses to units.

pub mod apply;
pub mod error;
pub mod import;
pub mod job;
pub mod registry;
pub mod resolve;
pub mod snapshot;

pub use apply::{ApplyReport, EditApplier, TargetOutcome};
pub use error::{PipelineError, PipelineResult};
pub use import::import_document;
pub use job::{JobManager, JobReport, JobStatus};
pub use registry::{registry_for, BreadcrumbRegistry, FlatRegistry, UnitRegistry};
pub use resolve::{ResolveReport, TargetResolver};
pub use snapshot::SnapshotManager;
