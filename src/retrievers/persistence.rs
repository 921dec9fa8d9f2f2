//! Persistence summary per service and persistence operation
//! notifications.

use super::{row_f64, row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    transport::{EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub static SCHEMA: Schema = Schema {
    name: "persistence",
    columns: &[
        "persistenceMode",
        "activeSpaceUsed",
        "averageLatencyMillis",
        "maxLatencyMillis",
        "snapshotCount",
        "operationStatus",
    ],
};

pub const COL_MODE: usize = 0;
pub const COL_ACTIVE_SPACE: usize = 1;
pub const COL_AVERAGE_LATENCY: usize = 2;
pub const COL_MAX_LATENCY: usize = 3;
pub const COL_SNAPSHOT_COUNT: usize = 4;
pub const COL_OPERATION_STATUS: usize = 5;

#[derive(Default)]
struct PersistenceAggregate {
    mode: String,
    space: i64,
    latency_sum: f64,
    latency_samples: i64,
    latency_max: i64,
    snapshots: i64,
    status: String,
}

pub struct PersistenceRetriever;

#[async_trait]
impl Retriever for PersistenceRetriever {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let service = row_str(row, "name");
        if service.is_empty() {
            return None;
        }
        let mut record = Record::new(&SCHEMA);
        record.set(COL_MODE, row_str(row, "persistenceMode"));
        record.set(COL_ACTIVE_SPACE, row_i64(row, "persistenceActiveSpaceUsed"));
        record.set(
            COL_AVERAGE_LATENCY,
            row_f64(row, "persistenceLatencyAverage"),
        );
        record.set(COL_MAX_LATENCY, row_i64(row, "persistenceLatencyMax"));
        record.set(COL_SNAPSHOT_COUNT, row_i64(row, "persistenceSnapshotCount"));
        record.set(COL_OPERATION_STATUS, row_str(row, "operationStatus"));
        Some((EntityKey::Name(service), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("services"),
                &[
                    "name",
                    "nodeId",
                    "persistenceMode",
                    "persistenceActiveSpaceUsed",
                    "persistenceLatencyAverage",
                    "persistenceLatencyMax",
                    "persistenceSnapshotCount",
                    "operationStatus",
                ],
            )
            .await?;

        let mut aggregates: BTreeMap<String, PersistenceAggregate> = BTreeMap::new();
        for item in items {
            let Some(service) = item.str_("name") else {
                continue;
            };
            let mode = item.str_("persistenceMode").unwrap_or_default();
            // Services without persistence report no meaningful mode.
            if mode.is_empty() || mode == "n/a" {
                continue;
            }
            let entry = aggregates.entry(service.to_owned()).or_default();
            entry.mode = mode.to_owned();
            entry.space += item.i64_("persistenceActiveSpaceUsed").unwrap_or_default();
            if let Some(latency) = item.f64_("persistenceLatencyAverage") {
                entry.latency_sum += latency;
                entry.latency_samples += 1;
            }
            entry.latency_max = entry
                .latency_max
                .max(item.i64_("persistenceLatencyMax").unwrap_or_default());
            entry.snapshots = entry
                .snapshots
                .max(item.i64_("persistenceSnapshotCount").unwrap_or_default());
            if entry.status.is_empty() {
                entry.status = item.str_("operationStatus").unwrap_or_default().to_owned();
            }
        }

        let rows = aggregates
            .into_iter()
            .map(|(service, aggregate)| {
                let mut record = Record::new(&SCHEMA);
                record.set(COL_MODE, aggregate.mode);
                record.set(COL_ACTIVE_SPACE, aggregate.space);
                record.set(
                    COL_AVERAGE_LATENCY,
                    if aggregate.latency_samples > 0 {
                        aggregate.latency_sum / aggregate.latency_samples as f64
                    } else {
                        0.0
                    },
                );
                record.set(COL_MAX_LATENCY, aggregate.latency_max);
                record.set(COL_SNAPSHOT_COUNT, aggregate.snapshots);
                record.set(COL_OPERATION_STATUS, aggregate.status);
                (EntityKey::Name(service), record)
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static NOTIFICATIONS_SCHEMA: Schema = Schema {
    name: "persistenceNotifications",
    columns: &[
        "serviceName",
        "operation",
        "startTime",
        "endTime",
        "durationMillis",
        "message",
    ],
};

pub const COL_NOTIFICATION_SERVICE: usize = 0;
pub const COL_OPERATION: usize = 1;
pub const COL_START_TIME: usize = 2;
pub const COL_END_TIME: usize = 3;
pub const COL_DURATION: usize = 4;
pub const COL_MESSAGE: usize = 5;

pub struct PersistenceNotificationsRetriever;

#[async_trait]
impl Retriever for PersistenceNotificationsRetriever {
    fn schema(&self) -> &'static Schema {
        &NOTIFICATIONS_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("persistenceNotifications"),
                &[
                    "sequence",
                    "serviceName",
                    "operation",
                    "startTime",
                    "endTime",
                    "durationMillis",
                    "message",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(sequence) = item.i64_("sequence") else {
                continue;
            };
            let mut record = Record::new(&NOTIFICATIONS_SCHEMA);
            record.set(
                COL_NOTIFICATION_SERVICE,
                item.str_("serviceName").unwrap_or_default(),
            );
            record.set(COL_OPERATION, item.str_("operation").unwrap_or_default());
            record.set(COL_START_TIME, item.str_("startTime").unwrap_or_default());
            record.set(COL_END_TIME, item.str_("endTime").unwrap_or_default());
            record.set(COL_DURATION, item.i64_("durationMillis").unwrap_or_default());
            record.set(COL_MESSAGE, item.str_("message").unwrap_or_default());
            rows.push((EntityKey::Id(sequence), record));
        }
        Ok(Some(rows))
    }
}
