//! Cache statistics, including the one genuinely non-trivial numeric
//! rule of the engine: distributed caches sum back-tier sizes across
//! members (each partition contributes once) while replicated caches
//! take one representative member (every member holds a full copy).

use super::{row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    reports::ReportValues,
    transport::{json_i64, EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Unit calculator that does not track byte sizes; byte accounting is
/// meaningless in this mode.
const FIXED_UNITS: &str = "FIXED";

pub static SCHEMA: Schema = Schema {
    name: "cache",
    columns: &["size", "memoryBytes", "averageObjectSize", "unitCalculator"],
};

pub const COL_SIZE: usize = 0;
pub const COL_MEMORY_BYTES: usize = 1;
pub const COL_AVERAGE_OBJECT_SIZE: usize = 2;
pub const COL_UNIT_CALCULATOR: usize = 3;

#[derive(Debug, Default)]
struct MemberFigures {
    size: i64,
    bytes: i64,
    fixed: bool,
}

fn cache_record(size: i64, bytes: i64, fixed: bool) -> Record {
    let (bytes, average) = if fixed {
        (0, 0)
    } else if size > 0 {
        (bytes, bytes / size)
    } else {
        (bytes, 0)
    };
    let mut record = Record::new(&SCHEMA);
    record.set(COL_SIZE, size);
    record.set(COL_MEMORY_BYTES, bytes);
    record.set(COL_AVERAGE_OBJECT_SIZE, average);
    record.set(
        COL_UNIT_CALCULATOR,
        if fixed { FIXED_UNITS } else { "BINARY" },
    );
    record
}

pub struct CacheRetriever;

#[async_trait]
impl Retriever for CacheRetriever {
    fn schema(&self) -> &'static Schema {
        &SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let service = row_str(row, "service");
        let name = row_str(row, "name");
        if service.is_empty() || name.is_empty() {
            return None;
        }
        // The reporter applies the storage-aware arithmetic server-side.
        let fixed = row_str(row, "unitCalculator") == FIXED_UNITS;
        let record = cache_record(row_i64(row, "size"), row_i64(row, "memoryBytes"), fixed);
        Some((EntityKey::ServiceCache(service, name), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let distributed = model.require_distributed_caches();
        let items = sender
            .get_attributes(
                &EntityQuery::new("caches").with("tier", "back"),
                &[
                    "name",
                    "service",
                    "nodeId",
                    "size",
                    "units",
                    "unitFactor",
                    "unitCalculator",
                ],
            )
            .await?;

        let mut members: BTreeMap<(String, String), Vec<MemberFigures>> = BTreeMap::new();
        for item in items {
            let (Some(service), Some(name)) = (item.str_("service"), item.str_("name")) else {
                continue;
            };
            let units = item.i64_("units").unwrap_or_default();
            let factor = item.i64_("unitFactor").unwrap_or(1).max(1);
            members
                .entry((service.to_owned(), name.to_owned()))
                .or_default()
                .push(MemberFigures {
                    size: item.i64_("size").unwrap_or_default(),
                    bytes: units * factor,
                    fixed: item.str_("unitCalculator") == Some(FIXED_UNITS),
                });
        }

        let mut rows = Rows::new();
        for ((service, name), figures) in members {
            let fixed = figures.first().is_some_and(|m| m.fixed);
            let (size, bytes) = if distributed.contains(&service) {
                figures.iter().fold((0, 0), |(size, bytes), m| {
                    (size + m.size, bytes + m.bytes)
                })
            } else {
                figures
                    .first()
                    .map(|m| (m.size, m.bytes))
                    .unwrap_or_default()
            };
            rows.push((
                EntityKey::ServiceCache(service, name),
                cache_record(size, bytes, fixed),
            ));
        }
        Ok(Some(rows))
    }

    /// Pre-aggregated bulk REST path. Returns `Ok(None)` when the
    /// server's response lacks the aggregated memory field (an older
    /// server), which makes the orchestrator fall back to the direct
    /// path instead of this retriever doing the fallback itself.
    async fn query_rest_aggregate(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let tree = sender.get_structured("caches?links=").await?;
        let Some(items) = tree.get("items").and_then(Json::as_array) else {
            return Err(RetrieveError::Malformed(
                "aggregated cache response without items".into(),
            ));
        };

        let mut rows = Rows::new();
        for item in items {
            let service = item.get("service").and_then(Json::as_str).unwrap_or_default();
            let name = item.get("name").and_then(Json::as_str).unwrap_or_default();
            if service.is_empty() || name.is_empty() {
                continue;
            }
            let Some(bytes) = item.get("memoryBytes").and_then(json_i64) else {
                return Ok(None);
            };
            let size = item.get("size").and_then(json_i64).unwrap_or_default();
            let fixed = item.get("unitCalculator").and_then(Json::as_str) == Some(FIXED_UNITS);
            rows.push((
                EntityKey::ServiceCache(service.to_owned(), name.to_owned()),
                cache_record(size, bytes, fixed),
            ));
        }
        Ok(Some(rows))
    }
}

pub static DETAIL_SCHEMA: Schema = Schema {
    name: "cacheDetail",
    columns: &[
        "size",
        "memoryBytes",
        "totalGets",
        "totalPuts",
        "cacheHits",
        "cacheMisses",
        "hitProbability",
    ],
};

pub const COL_DETAIL_SIZE: usize = 0;
pub const COL_DETAIL_MEMORY: usize = 1;
pub const COL_DETAIL_GETS: usize = 2;
pub const COL_DETAIL_PUTS: usize = 3;
pub const COL_DETAIL_HITS: usize = 4;
pub const COL_DETAIL_MISSES: usize = 5;
pub const COL_DETAIL_HIT_PROBABILITY: usize = 6;

async fn tier_detail(
    sender: &dyn RequestSender,
    model: &StatsModel,
    tier: &'static str,
) -> Result<Option<Rows>, RetrieveError> {
    let Some((service, cache)) = model.selected_cache() else {
        return Ok(None);
    };
    let items = sender
        .get_attributes(
            &EntityQuery::new("caches")
                .with("service", &service)
                .with("name", &cache)
                .with("tier", tier),
            &[
                "nodeId",
                "size",
                "units",
                "unitFactor",
                "totalGets",
                "totalPuts",
                "cacheHits",
                "cacheMisses",
            ],
        )
        .await?;

    let mut rows = Rows::new();
    for item in items {
        let Some(node) = item.i64_("nodeId") else {
            continue;
        };
        let hits = item.i64_("cacheHits").unwrap_or_default();
        let misses = item.i64_("cacheMisses").unwrap_or_default();
        let total = hits + misses;
        let probability = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        let units = item.i64_("units").unwrap_or_default();
        let factor = item.i64_("unitFactor").unwrap_or(1).max(1);
        let mut record = Record::new(&DETAIL_SCHEMA);
        record.set(COL_DETAIL_SIZE, item.i64_("size").unwrap_or_default());
        record.set(COL_DETAIL_MEMORY, units * factor);
        record.set(COL_DETAIL_GETS, item.i64_("totalGets").unwrap_or_default());
        record.set(COL_DETAIL_PUTS, item.i64_("totalPuts").unwrap_or_default());
        record.set(COL_DETAIL_HITS, hits);
        record.set(COL_DETAIL_MISSES, misses);
        record.set(COL_DETAIL_HIT_PROBABILITY, probability);
        rows.push((EntityKey::Id(node), record));
    }
    Ok(Some(rows))
}

pub struct CacheDetailRetriever;

#[async_trait]
impl Retriever for CacheDetailRetriever {
    fn schema(&self) -> &'static Schema {
        &DETAIL_SCHEMA
    }

    fn report_values(&self, model: &StatsModel) -> ReportValues {
        let selected = model.selected_cache();
        ReportValues {
            service_name: selected.as_ref().map(|(service, _)| service.clone()),
            cache_name: selected.map(|(_, cache)| cache),
            tier_name: Some("back".into()),
            ..Default::default()
        }
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let node = row_i64(row, "nodeId");
        let hits = row_i64(row, "cacheHits");
        let misses = row_i64(row, "cacheMisses");
        let total = hits + misses;
        let mut record = Record::new(&DETAIL_SCHEMA);
        record.set(COL_DETAIL_SIZE, row_i64(row, "size"));
        record.set(COL_DETAIL_MEMORY, row_i64(row, "memoryBytes"));
        record.set(COL_DETAIL_GETS, row_i64(row, "totalGets"));
        record.set(COL_DETAIL_PUTS, row_i64(row, "totalPuts"));
        record.set(COL_DETAIL_HITS, hits);
        record.set(COL_DETAIL_MISSES, misses);
        record.set(
            COL_DETAIL_HIT_PROBABILITY,
            if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        );
        Some((EntityKey::Id(node), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        tier_detail(sender, model, "back").await
    }
}

pub struct CacheFrontDetailRetriever;

#[async_trait]
impl Retriever for CacheFrontDetailRetriever {
    fn schema(&self) -> &'static Schema {
        &DETAIL_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        tier_detail(sender, model, "front").await
    }
}

pub static STORAGE_SCHEMA: Schema = Schema {
    name: "cacheStorageManager",
    columns: &[
        "locksGranted",
        "locksPending",
        "listenerRegistrations",
        "maxQueryDurationMillis",
        "maxQueryDescription",
        "indexTotalUnits",
    ],
};

pub const COL_LOCKS_GRANTED: usize = 0;
pub const COL_LOCKS_PENDING: usize = 1;
pub const COL_LISTENER_REGISTRATIONS: usize = 2;
pub const COL_MAX_QUERY_MILLIS: usize = 3;
pub const COL_MAX_QUERY_DESCRIPTION: usize = 4;
pub const COL_INDEX_UNITS: usize = 5;

pub struct CacheStorageManagerRetriever;

#[async_trait]
impl Retriever for CacheStorageManagerRetriever {
    fn schema(&self) -> &'static Schema {
        &STORAGE_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let Some((service, cache)) = model.selected_cache() else {
            return Ok(None);
        };
        let items = sender
            .get_attributes(
                &EntityQuery::new("storageManagers")
                    .with("service", &service)
                    .with("cache", &cache),
                &[
                    "nodeId",
                    "locksGranted",
                    "locksPending",
                    "listenerRegistrations",
                    "maxQueryDurationMillis",
                    "maxQueryDescription",
                    "indexTotalUnits",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let mut record = Record::new(&STORAGE_SCHEMA);
            record.set(COL_LOCKS_GRANTED, item.i64_("locksGranted").unwrap_or_default());
            record.set(COL_LOCKS_PENDING, item.i64_("locksPending").unwrap_or_default());
            record.set(
                COL_LISTENER_REGISTRATIONS,
                item.i64_("listenerRegistrations").unwrap_or_default(),
            );
            record.set(
                COL_MAX_QUERY_MILLIS,
                item.i64_("maxQueryDurationMillis").unwrap_or_default(),
            );
            record.set(
                COL_MAX_QUERY_DESCRIPTION,
                item.str_("maxQueryDescription").unwrap_or_default(),
            );
            record.set(COL_INDEX_UNITS, item.i64_("indexTotalUnits").unwrap_or_default());
            rows.push((EntityKey::Id(node), record));
        }
        Ok(Some(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_calculator_zeroes_memory_figures() {
        let record = cache_record(100, 4096, true);
        assert_eq!(record.get(COL_SIZE).as_i64(), Some(100));
        assert_eq!(record.get(COL_MEMORY_BYTES).as_i64(), Some(0));
        assert_eq!(record.get(COL_AVERAGE_OBJECT_SIZE).as_i64(), Some(0));
    }

    #[test]
    fn binary_calculator_reports_average_object_size() {
        let record = cache_record(10, 1000, false);
        assert_eq!(record.get(COL_MEMORY_BYTES).as_i64(), Some(1000));
        assert_eq!(record.get(COL_AVERAGE_OBJECT_SIZE).as_i64(), Some(100));
    }

    #[test]
    fn empty_cache_has_no_average() {
        let record = cache_record(0, 0, false);
        assert_eq!(record.get(COL_AVERAGE_OBJECT_SIZE).as_i64(), Some(0));
    }
}
