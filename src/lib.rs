//! `wow-relay`: uploads local weather sensor readings to the WOW observation
//! service on a fixed schedule.
//!
//! Pipeline per cycle: [`snapshot`] reads the mapped sensors from a
//! [`registry::SensorRegistry`], [`units`] converts them to the imperial units
//! the API expects, [`payload`] builds the query parameters and [`client`]
//! sends them. [`coordinator`] schedules cycles and owns the [`UploadStatus`]
//! that [`routes`] exposes to the host.
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): modules talk
//! to each other through the types re-exported here.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod payload;
pub mod registry;
pub mod routes;
pub mod snapshot;
pub mod units;

pub use client::{Uploader, WowClient};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings, TriggerResult};
pub use models::{
    ConvertedSnapshot, Credentials, OutcomeKind, Parameter, ParameterMapping, SensorReading,
    StatusState, UploadOutcome, UploadStatus,
};
pub use registry::{HaRegistry, MemoryRegistry, RegistryValue, SensorRegistry};
