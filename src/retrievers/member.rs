//! Cluster member, node-storage detection and machine-level statistics.

use super::{row_f64, row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    transport::{EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub static MEMBER_SCHEMA: Schema = Schema {
    name: "member",
    columns: &[
        "address",
        "port",
        "roleName",
        "publisherSuccessRate",
        "receiverSuccessRate",
        "sendQueueSize",
        "maxMemoryMB",
        "usedMemoryMB",
    ],
};

pub const COL_ADDRESS: usize = 0;
pub const COL_PORT: usize = 1;
pub const COL_ROLE: usize = 2;
pub const COL_PUBLISHER_RATE: usize = 3;
pub const COL_RECEIVER_RATE: usize = 4;
pub const COL_SEND_QUEUE: usize = 5;
pub const COL_MAX_MEMORY: usize = 6;
pub const COL_USED_MEMORY: usize = 7;

pub struct MemberRetriever;

#[async_trait]
impl Retriever for MemberRetriever {
    fn schema(&self) -> &'static Schema {
        &MEMBER_SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let node = row_i64(row, "nodeId");
        let max = row_i64(row, "memoryMaxMB");
        let available = row_i64(row, "memoryAvailableMB");
        let mut record = Record::new(&MEMBER_SCHEMA);
        record.set(COL_ADDRESS, row_str(row, "unicastAddress"));
        record.set(COL_PORT, row_i64(row, "unicastPort"));
        record.set(COL_ROLE, row_str(row, "roleName"));
        record.set(COL_PUBLISHER_RATE, row_f64(row, "publisherSuccessRate"));
        record.set(COL_RECEIVER_RATE, row_f64(row, "receiverSuccessRate"));
        record.set(COL_SEND_QUEUE, row_i64(row, "sendQueueSize"));
        record.set(COL_MAX_MEMORY, max);
        record.set(COL_USED_MEMORY, max - available);
        Some((EntityKey::Id(node), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("members"),
                &[
                    "nodeId",
                    "unicastAddress",
                    "unicastPort",
                    "roleName",
                    "publisherSuccessRate",
                    "receiverSuccessRate",
                    "sendQueueSize",
                    "memoryMaxMB",
                    "memoryAvailableMB",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let max = item.i64_("memoryMaxMB").unwrap_or_default();
            let available = item.i64_("memoryAvailableMB").unwrap_or_default();
            let mut record = Record::new(&MEMBER_SCHEMA);
            record.set(COL_ADDRESS, item.str_("unicastAddress").unwrap_or_default());
            record.set(COL_PORT, item.i64_("unicastPort").unwrap_or_default());
            record.set(COL_ROLE, item.str_("roleName").unwrap_or_default());
            record.set(
                COL_PUBLISHER_RATE,
                item.f64_("publisherSuccessRate").unwrap_or_default(),
            );
            record.set(
                COL_RECEIVER_RATE,
                item.f64_("receiverSuccessRate").unwrap_or_default(),
            );
            record.set(COL_SEND_QUEUE, item.i64_("sendQueueSize").unwrap_or_default());
            record.set(COL_MAX_MEMORY, max);
            record.set(COL_USED_MEMORY, max - available);
            rows.push((EntityKey::Id(node), record));
        }
        Ok(Some(rows))
    }
}

pub static NODE_STORAGE_SCHEMA: Schema = Schema {
    name: "nodeStorage",
    columns: &["storageEnabled"],
};

pub const COL_STORAGE_ENABLED: usize = 0;

pub struct NodeStorageRetriever;

#[async_trait]
impl Retriever for NodeStorageRetriever {
    fn schema(&self) -> &'static Schema {
        &NODE_STORAGE_SCHEMA
    }

    /// A node is storage-enabled if any distributed service hosted by
    /// it owns at least one primary partition. A node marked enabled by
    /// one service is never downgraded by another reporting zero.
    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("services"),
                &["nodeId", "type", "ownedPartitionsPrimary"],
            )
            .await?;

        let mut storage: BTreeMap<i64, bool> = BTreeMap::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let owned = item.i64_("ownedPartitionsPrimary").unwrap_or_default();
            let enabled = storage.entry(node).or_insert(false);
            if owned > 0 {
                *enabled = true;
            }
        }

        let rows = storage
            .into_iter()
            .map(|(node, enabled)| {
                let mut record = Record::new(&NODE_STORAGE_SCHEMA);
                record.set(COL_STORAGE_ENABLED, enabled);
                (EntityKey::Id(node), record)
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static MACHINE_SCHEMA: Schema = Schema {
    name: "machine",
    columns: &[
        "availableProcessors",
        "systemLoadAverage",
        "totalPhysicalMemory",
        "freePhysicalMemory",
        "percentFreeMemory",
    ],
};

pub const COL_PROCESSORS: usize = 0;
pub const COL_LOAD_AVERAGE: usize = 1;
pub const COL_TOTAL_MEMORY: usize = 2;
pub const COL_FREE_MEMORY: usize = 3;
pub const COL_PERCENT_FREE: usize = 4;

fn machine_record(
    processors: i64,
    load_average: f64,
    total_memory: i64,
    free_memory: i64,
) -> Record {
    let mut record = Record::new(&MACHINE_SCHEMA);
    record.set(COL_PROCESSORS, processors);
    record.set(COL_LOAD_AVERAGE, load_average);
    record.set(COL_TOTAL_MEMORY, total_memory);
    record.set(COL_FREE_MEMORY, free_memory);
    record.set(
        COL_PERCENT_FREE,
        if total_memory > 0 {
            free_memory as f64 / total_memory as f64 * 100.0
        } else {
            0.0
        },
    );
    record
}

pub struct MachineRetriever;

#[async_trait]
impl Retriever for MachineRetriever {
    fn schema(&self) -> &'static Schema {
        &MACHINE_SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let machine = row_str(row, "machineName");
        if machine.is_empty() {
            return None;
        }
        let record = machine_record(
            row_i64(row, "availableProcessors"),
            row_f64(row, "systemLoadAverage"),
            row_i64(row, "totalPhysicalMemorySize"),
            row_i64(row, "freePhysicalMemorySize"),
        );
        Some((EntityKey::Name(machine), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("machines"),
                &[
                    "machineName",
                    "availableProcessors",
                    "systemLoadAverage",
                    "totalPhysicalMemorySize",
                    "freePhysicalMemorySize",
                ],
            )
            .await?;

        // One member per machine is enough; take the first sighting.
        let mut rows = Rows::new();
        for item in items {
            let Some(machine) = item.str_("machineName") else {
                continue;
            };
            let key = EntityKey::Name(machine.to_owned());
            if rows.iter().any(|(k, _)| *k == key) {
                continue;
            }
            let record = machine_record(
                item.i64_("availableProcessors").unwrap_or_default(),
                item.f64_("systemLoadAverage").unwrap_or_default(),
                item.i64_("totalPhysicalMemorySize").unwrap_or_default(),
                item.i64_("freePhysicalMemorySize").unwrap_or_default(),
            );
            rows.push((key, record));
        }
        Ok(Some(rows))
    }
}
