//! The request-sender seam between the engine and a cluster's
//! management interface. The engine is agnostic to the concrete backend
//! beyond branching on its [`TransportKind`].

use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use thiserror::Error;

mod http;

pub use http::HttpRequestSender;

/// Which wire strategy family the active backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Direct management-protocol backend.
    Management,
    /// HTTP backend capable of returning pre-aggregated structured data.
    Http,
}

/// A pattern selecting one or more addressable entities of a
/// management collection, e.g. all back-tier cache instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pub collection: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl EntityQuery {
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            params: Vec::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }
}

/// Attribute map of one matched entity, identity fields included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAttributes {
    fields: BTreeMap<String, Json>,
}

impl EntityAttributes {
    pub fn from_object(value: Json) -> Option<Self> {
        match value {
            Json::Object(fields) => Some(Self {
                fields: fields.into_iter().collect(),
            }),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Json> {
        self.fields.get(name)
    }

    pub fn str_(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Json::as_str)
    }

    pub fn i64_(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(json_i64)
    }

    pub fn f64_(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(json_f64)
    }

    pub fn bool_(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Json::as_bool)
    }
}

/// One tabular row of a batch report execution, keyed by column id.
pub type ReportRow = BTreeMap<String, Json>;

/// Numeric coercion tolerant of servers returning numbers as strings.
pub fn json_i64(value: &Json) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

pub fn json_f64(value: &Json) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// Report *execution* failure, as opposed to "no data". Triggers the
    /// permanent reporter downgrade at the orchestrator.
    #[error("report execution failed: {0}")]
    ReportExecution(String),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Executes one request against a cluster. Two interchangeable backends
/// exist; the engine only branches on [`RequestSender::kind`].
#[async_trait]
pub trait RequestSender: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Resolves a query pattern to every matching entity with the
    /// requested attributes (plus identity fields). A subsystem that is
    /// not present resolves to an empty list, not an error.
    async fn get_attributes(
        &self,
        query: &EntityQuery,
        names: &[&str],
    ) -> Result<Vec<EntityAttributes>, TransportError>;

    /// Executes a rendered batch-report descriptor server-side.
    async fn invoke_report(&self, descriptor: &str) -> Result<Vec<ReportRow>, TransportError>;

    /// Fetches a hierarchical structured tree (HTTP backend).
    async fn get_structured(&self, path: &str) -> Result<Json, TransportError>;
}
