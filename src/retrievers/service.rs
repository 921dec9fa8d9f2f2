//! Service summary and per-member service detail. The summary
//! retrieval additionally produces the distributed-cache set consumed
//! by cache aggregation, whichever path it came through.

use super::{row_f64, row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    reports::{ReportDescriptor, ReportValues},
    transport::{EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Service types with partitioned (as opposed to replicated) storage.
fn is_partitioned(service_type: &str) -> bool {
    matches!(service_type, "DistributedCache" | "FederatedCache")
}

pub static SCHEMA: Schema = Schema {
    name: "service",
    columns: &[
        "type",
        "statusHA",
        "memberCount",
        "storageEnabledCount",
        "partitionCount",
        "partitionsEndangered",
        "partitionsVulnerable",
        "partitionsUnbalanced",
        "requestPendingCount",
    ],
};

pub const COL_TYPE: usize = 0;
pub const COL_STATUS_HA: usize = 1;
pub const COL_MEMBER_COUNT: usize = 2;
pub const COL_STORAGE_ENABLED_COUNT: usize = 3;
pub const COL_PARTITION_COUNT: usize = 4;
pub const COL_PARTITIONS_ENDANGERED: usize = 5;
pub const COL_PARTITIONS_VULNERABLE: usize = 6;
pub const COL_PARTITIONS_UNBALANCED: usize = 7;
pub const COL_REQUEST_PENDING: usize = 8;

const ATTRIBUTES: &[&str] = &[
    "name",
    "type",
    "nodeId",
    "statusHA",
    "storageEnabled",
    "partitionsAll",
    "partitionsEndangered",
    "partitionsVulnerable",
    "partitionsUnbalanced",
    "requestPendingCount",
];

#[derive(Default)]
struct ServiceAggregate {
    service_type: String,
    status_ha: String,
    nodes: BTreeSet<i64>,
    storage_enabled: i64,
    partitions: i64,
    endangered: i64,
    vulnerable: i64,
    unbalanced: i64,
    pending: i64,
}

pub struct ServiceRetriever;

#[async_trait]
impl Retriever for ServiceRetriever {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(&EntityQuery::new("services"), ATTRIBUTES)
            .await?;

        let mut aggregates: BTreeMap<String, ServiceAggregate> = BTreeMap::new();
        for item in items {
            let Some(name) = item.str_("name") else {
                continue;
            };
            let entry = aggregates.entry(name.to_owned()).or_default();
            if entry.service_type.is_empty() {
                entry.service_type = item.str_("type").unwrap_or_default().to_owned();
            }
            if entry.status_ha.is_empty() {
                entry.status_ha = item.str_("statusHA").unwrap_or_default().to_owned();
            }
            if let Some(node) = item.i64_("nodeId") {
                entry.nodes.insert(node);
            }
            if item.bool_("storageEnabled").unwrap_or(false) {
                entry.storage_enabled += 1;
            }
            // Partition figures are service-wide; any member reports them.
            if entry.partitions == 0 {
                entry.partitions = item.i64_("partitionsAll").unwrap_or_default();
            }
            entry.endangered = entry
                .endangered
                .max(item.i64_("partitionsEndangered").unwrap_or_default());
            entry.vulnerable = entry
                .vulnerable
                .max(item.i64_("partitionsVulnerable").unwrap_or_default());
            entry.unbalanced = entry
                .unbalanced
                .max(item.i64_("partitionsUnbalanced").unwrap_or_default());
            entry.pending += item.i64_("requestPendingCount").unwrap_or_default();
        }

        let mut distributed = BTreeSet::new();
        let mut rows = Rows::new();
        for (name, aggregate) in aggregates {
            if is_partitioned(&aggregate.service_type) {
                distributed.insert(name.clone());
            }
            let mut record = Record::new(&SCHEMA);
            record.set(COL_TYPE, aggregate.service_type);
            record.set(COL_STATUS_HA, aggregate.status_ha);
            record.set(COL_MEMBER_COUNT, aggregate.nodes.len() as i64);
            record.set(COL_STORAGE_ENABLED_COUNT, aggregate.storage_enabled);
            record.set(COL_PARTITION_COUNT, aggregate.partitions);
            record.set(COL_PARTITIONS_ENDANGERED, aggregate.endangered);
            record.set(COL_PARTITIONS_VULNERABLE, aggregate.vulnerable);
            record.set(COL_PARTITIONS_UNBALANCED, aggregate.unbalanced);
            record.set(COL_REQUEST_PENDING, aggregate.pending);
            rows.push((EntityKey::Name(name), record));
        }

        model.set_distributed_caches(distributed);
        Ok(Some(rows))
    }

    // Custom reporter parsing: the distributed-cache set side effect
    // must happen on this path too, before Cache is processed.
    async fn query_report(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
        descriptor: &ReportDescriptor,
    ) -> Result<Option<Rows>, RetrieveError> {
        let Some(body) = descriptor.render(&ReportValues::default()) else {
            return Ok(None);
        };
        let report_rows = sender.invoke_report(&body).await?;

        let mut distributed = BTreeSet::new();
        let mut rows = Rows::new();
        for row in &report_rows {
            let name = row_str(row, "name");
            if name.is_empty() {
                continue;
            }
            let service_type = row_str(row, "type");
            if is_partitioned(&service_type) {
                distributed.insert(name.clone());
            }
            let mut record = Record::new(&SCHEMA);
            record.set(COL_TYPE, service_type);
            record.set(COL_STATUS_HA, row_str(row, "statusHA"));
            record.set(COL_MEMBER_COUNT, row_i64(row, "memberCount"));
            record.set(COL_STORAGE_ENABLED_COUNT, row_i64(row, "storageEnabledCount"));
            record.set(COL_PARTITION_COUNT, row_i64(row, "partitionCount"));
            record.set(COL_PARTITIONS_ENDANGERED, row_i64(row, "partitionsEndangered"));
            record.set(COL_PARTITIONS_VULNERABLE, row_i64(row, "partitionsVulnerable"));
            record.set(COL_PARTITIONS_UNBALANCED, row_i64(row, "partitionsUnbalanced"));
            record.set(COL_REQUEST_PENDING, row_i64(row, "requestPendingCount"));
            rows.push((EntityKey::Name(name), record));
        }

        model.set_distributed_caches(distributed);
        Ok(Some(rows))
    }
}

pub static DETAIL_SCHEMA: Schema = Schema {
    name: "serviceDetail",
    columns: &[
        "threadCount",
        "threadIdleCount",
        "taskBacklog",
        "requestAverageDuration",
        "taskAverageDuration",
    ],
};

pub const COL_THREAD_COUNT: usize = 0;
pub const COL_THREAD_IDLE: usize = 1;
pub const COL_TASK_BACKLOG: usize = 2;
pub const COL_REQUEST_AVERAGE: usize = 3;
pub const COL_TASK_AVERAGE: usize = 4;

pub struct ServiceDetailRetriever;

#[async_trait]
impl Retriever for ServiceDetailRetriever {
    fn schema(&self) -> &'static Schema {
        &DETAIL_SCHEMA
    }

    fn report_values(&self, model: &StatsModel) -> ReportValues {
        ReportValues {
            service_name: model.selected_service(),
            ..Default::default()
        }
    }

    fn from_report_row(&self, model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let service = model.selected_service()?;
        let node = row_i64(row, "nodeId");
        let mut record = Record::new(&DETAIL_SCHEMA);
        record.set(COL_THREAD_COUNT, row_i64(row, "threadCount"));
        record.set(COL_THREAD_IDLE, row_i64(row, "threadIdleCount"));
        record.set(COL_TASK_BACKLOG, row_i64(row, "taskBacklog"));
        record.set(COL_REQUEST_AVERAGE, row_f64(row, "requestAverageDuration"));
        record.set(COL_TASK_AVERAGE, row_f64(row, "taskAverageDuration"));
        Some((EntityKey::ServiceNode(service, node), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let Some(service) = model.selected_service() else {
            return Ok(None);
        };
        let items = sender
            .get_attributes(
                &EntityQuery::new("services").with("name", &service),
                &[
                    "nodeId",
                    "threadCount",
                    "threadIdleCount",
                    "taskBacklog",
                    "requestAverageDuration",
                    "taskAverageDuration",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let mut record = Record::new(&DETAIL_SCHEMA);
            record.set(COL_THREAD_COUNT, item.i64_("threadCount").unwrap_or_default());
            record.set(COL_THREAD_IDLE, item.i64_("threadIdleCount").unwrap_or_default());
            record.set(COL_TASK_BACKLOG, item.i64_("taskBacklog").unwrap_or_default());
            record.set(
                COL_REQUEST_AVERAGE,
                item.f64_("requestAverageDuration").unwrap_or_default(),
            );
            record.set(
                COL_TASK_AVERAGE,
                item.f64_("taskAverageDuration").unwrap_or_default(),
            );
            rows.push((EntityKey::ServiceNode(service.clone(), node), record));
        }
        Ok(Some(rows))
    }
}
