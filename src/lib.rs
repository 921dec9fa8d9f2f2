//! Statistics acquisition and aggregation engine for a distributed
//! data-grid cluster's management interface.
//!
//! A [`StatsModel`] drives a periodic refresh cycle over an ordered
//! registry of statistic types, transparently choosing between three
//! wire strategies per type (server-side batch reports, pre-aggregated
//! bulk REST responses and targeted per-entity queries) with safe
//! same-cycle fallback, and publishes the results as immutable,
//! concurrently readable snapshots.

pub mod capability;
pub mod error;
pub mod model;
pub mod reports;
pub mod retrievers;
pub mod settings;
pub mod transport;
pub mod types;

pub use capability::{normalize_version, CapabilityFlags, Flag, MODERN_VERSION};
pub use error::RetrieveError;
pub use model::{run_periodic, SelectionState, StatsModel};
pub use settings::Settings;
pub use transport::{
    EntityAttributes, EntityQuery, HttpRequestSender, ReportRow, RequestSender, TransportError,
    TransportKind,
};
pub use types::{EntityKey, Record, Schema, SharedSnapshot, Snapshot, StatisticType, Value};
