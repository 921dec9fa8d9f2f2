//! Per-statistic-type retrievers. Each implements up to three retrieval
//! paths for one category of statistic and owns that category's fixed
//! column schema and per-entity key derivation.

use crate::{
    error::RetrieveError,
    model::StatsModel,
    reports::{ReportDescriptor, ReportValues},
    transport::{ReportRow, RequestSender},
    types::{EntityKey, Record, Schema, StatisticType},
};
use async_trait::async_trait;
use serde_json::Value as Json;

pub mod cache;
pub mod cluster;
pub mod federation;
pub mod member;
pub mod misc;
pub mod persistence;
pub mod proxy;
pub mod service;

pub type Rows = Vec<(EntityKey, Record)>;

/// Retrieval contract for one statistic type.
///
/// Every path may return `Ok(None)` as a "not applicable" sentinel:
/// for the direct path this means the type has nothing to produce
/// (e.g. a detail type without a selection); for the REST path it is
/// the structural unsupported-by-this-server signal that makes the
/// orchestrator fall back to the direct path.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn schema(&self) -> &'static Schema;

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError>;

    /// Selection values substituted into this type's report descriptor.
    fn report_values(&self, model: &StatsModel) -> ReportValues {
        let _ = model;
        ReportValues::default()
    }

    /// Maps one reporter row to a keyed record; `None` drops the row.
    /// Only consulted for types that declare a report descriptor.
    fn from_report_row(&self, model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let _ = (model, row);
        None
    }

    /// Batch-report path: renders the descriptor against the live
    /// selection, executes it server-side and parses the tabular rows.
    async fn query_report(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
        descriptor: &ReportDescriptor,
    ) -> Result<Option<Rows>, RetrieveError> {
        let Some(body) = descriptor.render(&self.report_values(model)) else {
            return Ok(None);
        };
        let rows = sender.invoke_report(&body).await?;
        Ok(Some(
            rows.iter()
                .filter_map(|row| self.from_report_row(model, row))
                .collect(),
        ))
    }

    /// REST bulk-aggregation path; default is "not applicable".
    async fn query_rest_aggregate(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let _ = (sender, model);
        Ok(None)
    }
}

/// Enumerated retriever registry, resolved at initialization. Keyed by
/// the statistic type tag rather than any runtime-type lookup.
pub fn retriever(ty: StatisticType) -> &'static dyn Retriever {
    match ty {
        StatisticType::Cluster => &cluster::ClusterRetriever,
        StatisticType::Service => &service::ServiceRetriever,
        StatisticType::ServiceDetail => &service::ServiceDetailRetriever,
        StatisticType::Cache => &cache::CacheRetriever,
        StatisticType::CacheDetail => &cache::CacheDetailRetriever,
        StatisticType::CacheFrontDetail => &cache::CacheFrontDetailRetriever,
        StatisticType::CacheStorageManager => &cache::CacheStorageManagerRetriever,
        StatisticType::Topic => &misc::TopicRetriever,
        StatisticType::Member => &member::MemberRetriever,
        StatisticType::NodeStorage => &member::NodeStorageRetriever,
        StatisticType::Machine => &member::MachineRetriever,
        StatisticType::Proxy => &proxy::ProxyRetriever,
        StatisticType::Persistence => &persistence::PersistenceRetriever,
        StatisticType::PersistenceNotifications => &persistence::PersistenceNotificationsRetriever,
        StatisticType::HttpSession => &misc::HttpSessionRetriever,
        StatisticType::FederationDestination => &federation::FederationDestinationRetriever,
        StatisticType::FederationOrigin => &federation::FederationOriginRetriever,
        StatisticType::FederationDestinationDetails => {
            &federation::FederationDestinationDetailsRetriever
        }
        StatisticType::FederationOriginDetails => &federation::FederationOriginDetailsRetriever,
        StatisticType::RamJournal => &misc::RAM_JOURNAL_RETRIEVER,
        StatisticType::FlashJournal => &misc::FLASH_JOURNAL_RETRIEVER,
        StatisticType::JCacheConfig => &misc::JCacheConfigRetriever,
        StatisticType::JCacheStats => &misc::JCacheStatsRetriever,
        StatisticType::HttpProxy => &proxy::HttpProxyRetriever,
        StatisticType::HttpProxyDetail => &proxy::HttpProxyDetailRetriever,
        StatisticType::Hotcache => &misc::HotcacheRetriever,
        StatisticType::HotcachePerCache => &misc::HotcachePerCacheRetriever,
        StatisticType::Executor => &misc::ExecutorRetriever,
        StatisticType::GrpcProxy => &proxy::GrpcProxyRetriever,
    }
}

// Reporter rows share the tolerant numeric coercions of the transport
// layer; missing columns read as empty/zero.

pub(crate) fn row_str(row: &ReportRow, column: &str) -> String {
    row.get(column)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_owned()
}

pub(crate) fn row_i64(row: &ReportRow, column: &str) -> i64 {
    row.get(column)
        .and_then(crate::transport::json_i64)
        .unwrap_or_default()
}

pub(crate) fn row_f64(row: &ReportRow, column: &str) -> f64 {
    row.get(column)
        .and_then(crate::transport::json_f64)
        .unwrap_or_default()
}
