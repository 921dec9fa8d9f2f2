//! The remaining, mostly mechanical statistic categories: topics, web
//! sessions, elastic-data journals, JCache, HotCache and executors.

use super::{row_i64, row_str, Retriever, Rows};
use crate::{
    error::RetrieveError,
    model::StatsModel,
    transport::{EntityQuery, ReportRow, RequestSender},
    types::{EntityKey, Record, Schema},
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub static TOPIC_SCHEMA: Schema = Schema {
    name: "topic",
    columns: &["channels", "publishedCount", "pageCapacity"],
};

pub const COL_CHANNELS: usize = 0;
pub const COL_PUBLISHED: usize = 1;
pub const COL_PAGE_CAPACITY: usize = 2;

pub struct TopicRetriever;

#[async_trait]
impl Retriever for TopicRetriever {
    fn schema(&self) -> &'static Schema {
        &TOPIC_SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let name = row_str(row, "name");
        if name.is_empty() {
            return None;
        }
        let mut record = Record::new(&TOPIC_SCHEMA);
        record.set(COL_CHANNELS, row_i64(row, "channels"));
        record.set(COL_PUBLISHED, row_i64(row, "publishedCount"));
        record.set(COL_PAGE_CAPACITY, row_i64(row, "pageCapacity"));
        Some((EntityKey::Name(name), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("topics"),
                &["name", "nodeId", "channels", "publishedCount", "pageCapacity"],
            )
            .await?;

        #[derive(Default)]
        struct TopicAggregate {
            channels: i64,
            published: i64,
            page_capacity: i64,
        }

        let mut aggregates: BTreeMap<String, TopicAggregate> = BTreeMap::new();
        for item in items {
            let Some(name) = item.str_("name") else {
                continue;
            };
            let entry = aggregates.entry(name.to_owned()).or_default();
            if entry.channels == 0 {
                entry.channels = item.i64_("channels").unwrap_or_default();
            }
            if entry.page_capacity == 0 {
                entry.page_capacity = item.i64_("pageCapacity").unwrap_or_default();
            }
            entry.published += item.i64_("publishedCount").unwrap_or_default();
        }

        let rows = aggregates
            .into_iter()
            .map(|(name, aggregate)| {
                let mut record = Record::new(&TOPIC_SCHEMA);
                record.set(COL_CHANNELS, aggregate.channels);
                record.set(COL_PUBLISHED, aggregate.published);
                record.set(COL_PAGE_CAPACITY, aggregate.page_capacity);
                (EntityKey::Name(name), record)
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static HTTP_SESSION_SCHEMA: Schema = Schema {
    name: "httpSession",
    columns: &[
        "sessionCacheName",
        "sessionTimeout",
        "sessionAverageSize",
        "reapedSessions",
        "sessionUpdates",
    ],
};

pub const COL_SESSION_CACHE: usize = 0;
pub const COL_SESSION_TIMEOUT: usize = 1;
pub const COL_SESSION_AVERAGE_SIZE: usize = 2;
pub const COL_REAPED_SESSIONS: usize = 3;
pub const COL_SESSION_UPDATES: usize = 4;

pub struct HttpSessionRetriever;

#[async_trait]
impl Retriever for HttpSessionRetriever {
    fn schema(&self) -> &'static Schema {
        &HTTP_SESSION_SCHEMA
    }

    fn from_report_row(&self, _model: &StatsModel, row: &ReportRow) -> Option<(EntityKey, Record)> {
        let app = row_str(row, "appId");
        if app.is_empty() {
            return None;
        }
        let mut record = Record::new(&HTTP_SESSION_SCHEMA);
        record.set(COL_SESSION_CACHE, row_str(row, "sessionCacheName"));
        record.set(COL_SESSION_TIMEOUT, row_i64(row, "sessionTimeout"));
        record.set(COL_SESSION_AVERAGE_SIZE, row_i64(row, "sessionAverageSize"));
        record.set(COL_REAPED_SESSIONS, row_i64(row, "reapedSessions"));
        record.set(COL_SESSION_UPDATES, row_i64(row, "sessionUpdates"));
        Some((EntityKey::Name(app), record))
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("webSessions"),
                &[
                    "appId",
                    "nodeId",
                    "sessionCacheName",
                    "sessionTimeout",
                    "sessionAverageSize",
                    "reapedSessions",
                    "sessionUpdates",
                ],
            )
            .await?;

        #[derive(Default)]
        struct SessionAggregate {
            cache: String,
            timeout: i64,
            size_sum: i64,
            members: i64,
            reaped: i64,
            updates: i64,
        }

        let mut aggregates: BTreeMap<String, SessionAggregate> = BTreeMap::new();
        for item in items {
            let Some(app) = item.str_("appId") else {
                continue;
            };
            let entry = aggregates.entry(app.to_owned()).or_default();
            if entry.cache.is_empty() {
                entry.cache = item.str_("sessionCacheName").unwrap_or_default().to_owned();
            }
            if entry.timeout == 0 {
                entry.timeout = item.i64_("sessionTimeout").unwrap_or_default();
            }
            entry.size_sum += item.i64_("sessionAverageSize").unwrap_or_default();
            entry.members += 1;
            entry.reaped += item.i64_("reapedSessions").unwrap_or_default();
            entry.updates += item.i64_("sessionUpdates").unwrap_or_default();
        }

        let rows = aggregates
            .into_iter()
            .map(|(app, aggregate)| {
                let mut record = Record::new(&HTTP_SESSION_SCHEMA);
                record.set(COL_SESSION_CACHE, aggregate.cache);
                record.set(COL_SESSION_TIMEOUT, aggregate.timeout);
                record.set(
                    COL_SESSION_AVERAGE_SIZE,
                    if aggregate.members > 0 {
                        aggregate.size_sum / aggregate.members
                    } else {
                        0
                    },
                );
                record.set(COL_REAPED_SESSIONS, aggregate.reaped);
                record.set(COL_SESSION_UPDATES, aggregate.updates);
                (EntityKey::Name(app), record)
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static JOURNAL_SCHEMA: Schema = Schema {
    name: "journal",
    columns: &[
        "fileCount",
        "maxJournalFiles",
        "totalDataSize",
        "compactionCount",
        "exhaustiveCompactionCount",
        "currentCollectorLoadFactor",
    ],
};

pub const COL_FILE_COUNT: usize = 0;
pub const COL_MAX_FILES: usize = 1;
pub const COL_TOTAL_DATA_SIZE: usize = 2;
pub const COL_COMPACTIONS: usize = 3;
pub const COL_EXHAUSTIVE_COMPACTIONS: usize = 4;
pub const COL_COLLECTOR_LOAD: usize = 5;

/// Ram and flash journals differ only by the journal type parameter.
pub struct JournalRetriever {
    journal_type: &'static str,
}

pub static RAM_JOURNAL_RETRIEVER: JournalRetriever = JournalRetriever {
    journal_type: "ram",
};
pub static FLASH_JOURNAL_RETRIEVER: JournalRetriever = JournalRetriever {
    journal_type: "flash",
};

#[async_trait]
impl Retriever for JournalRetriever {
    fn schema(&self) -> &'static Schema {
        &JOURNAL_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("journal").with("type", self.journal_type),
                &[
                    "nodeId",
                    "fileCount",
                    "maxJournalFilesNumber",
                    "totalDataSize",
                    "compactionCount",
                    "exhaustiveCompactionCount",
                    "currentCollectorLoadFactor",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let mut record = Record::new(&JOURNAL_SCHEMA);
            record.set(COL_FILE_COUNT, item.i64_("fileCount").unwrap_or_default());
            record.set(
                COL_MAX_FILES,
                item.i64_("maxJournalFilesNumber").unwrap_or_default(),
            );
            record.set(
                COL_TOTAL_DATA_SIZE,
                item.i64_("totalDataSize").unwrap_or_default(),
            );
            record.set(
                COL_COMPACTIONS,
                item.i64_("compactionCount").unwrap_or_default(),
            );
            record.set(
                COL_EXHAUSTIVE_COMPACTIONS,
                item.i64_("exhaustiveCompactionCount").unwrap_or_default(),
            );
            record.set(
                COL_COLLECTOR_LOAD,
                item.f64_("currentCollectorLoadFactor").unwrap_or_default(),
            );
            rows.push((EntityKey::Id(node), record));
        }
        Ok(Some(rows))
    }
}

pub static JCACHE_CONFIG_SCHEMA: Schema = Schema {
    name: "jcacheConfig",
    columns: &[
        "keyType",
        "valueType",
        "statisticsEnabled",
        "readThrough",
        "writeThrough",
        "storeByValue",
    ],
};

pub struct JCacheConfigRetriever;

#[async_trait]
impl Retriever for JCacheConfigRetriever {
    fn schema(&self) -> &'static Schema {
        &JCACHE_CONFIG_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("jcaches").with("view", "config"),
                &[
                    "configUri",
                    "name",
                    "keyType",
                    "valueType",
                    "statisticsEnabled",
                    "readThrough",
                    "writeThrough",
                    "storeByValue",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let (Some(uri), Some(name)) = (item.str_("configUri"), item.str_("name")) else {
                continue;
            };
            let mut record = Record::new(&JCACHE_CONFIG_SCHEMA);
            record.set(0, item.str_("keyType").unwrap_or_default());
            record.set(1, item.str_("valueType").unwrap_or_default());
            record.set(2, item.bool_("statisticsEnabled").unwrap_or_default());
            record.set(3, item.bool_("readThrough").unwrap_or_default());
            record.set(4, item.bool_("writeThrough").unwrap_or_default());
            record.set(5, item.bool_("storeByValue").unwrap_or_default());
            rows.push((
                EntityKey::ServiceCache(uri.to_owned(), name.to_owned()),
                record,
            ));
        }
        Ok(Some(rows))
    }
}

pub static JCACHE_STATS_SCHEMA: Schema = Schema {
    name: "jcacheStats",
    columns: &[
        "cacheGets",
        "cachePuts",
        "cacheRemovals",
        "cacheHits",
        "cacheMisses",
        "averageGetTime",
        "averagePutTime",
    ],
};

pub struct JCacheStatsRetriever;

#[async_trait]
impl Retriever for JCacheStatsRetriever {
    fn schema(&self) -> &'static Schema {
        &JCACHE_STATS_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("jcaches").with("view", "statistics"),
                &[
                    "configUri",
                    "name",
                    "cacheGets",
                    "cachePuts",
                    "cacheRemovals",
                    "cacheHits",
                    "cacheMisses",
                    "averageGetTime",
                    "averagePutTime",
                ],
            )
            .await?;

        // Sum counters across members per (config uri, cache).
        let mut aggregates: BTreeMap<(String, String), [f64; 7]> = BTreeMap::new();
        for item in items {
            let (Some(uri), Some(name)) = (item.str_("configUri"), item.str_("name")) else {
                continue;
            };
            let entry = aggregates
                .entry((uri.to_owned(), name.to_owned()))
                .or_default();
            entry[0] += item.i64_("cacheGets").unwrap_or_default() as f64;
            entry[1] += item.i64_("cachePuts").unwrap_or_default() as f64;
            entry[2] += item.i64_("cacheRemovals").unwrap_or_default() as f64;
            entry[3] += item.i64_("cacheHits").unwrap_or_default() as f64;
            entry[4] += item.i64_("cacheMisses").unwrap_or_default() as f64;
            entry[5] = entry[5].max(item.f64_("averageGetTime").unwrap_or_default());
            entry[6] = entry[6].max(item.f64_("averagePutTime").unwrap_or_default());
        }

        let rows = aggregates
            .into_iter()
            .map(|((uri, name), totals)| {
                let mut record = Record::new(&JCACHE_STATS_SCHEMA);
                for (column, value) in totals.iter().enumerate().take(5) {
                    record.set(column, *value as i64);
                }
                record.set(5, totals[5]);
                record.set(6, totals[6]);
                (EntityKey::ServiceCache(uri, name), record)
            })
            .collect();
        Ok(Some(rows))
    }
}

pub static HOTCACHE_SCHEMA: Schema = Schema {
    name: "hotcache",
    columns: &["operationsProcessed", "startTime", "trailFileName", "trailFilePosition"],
};

pub struct HotcacheRetriever;

#[async_trait]
impl Retriever for HotcacheRetriever {
    fn schema(&self) -> &'static Schema {
        &HOTCACHE_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("hotcache"),
                &[
                    "nodeId",
                    "numberOfOperationsProcessed",
                    "startTime",
                    "trailFileName",
                    "trailFilePosition",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(node) = item.i64_("nodeId") else {
                continue;
            };
            let mut record = Record::new(&HOTCACHE_SCHEMA);
            record.set(0, item.i64_("numberOfOperationsProcessed").unwrap_or_default());
            record.set(1, item.str_("startTime").unwrap_or_default());
            record.set(2, item.str_("trailFileName").unwrap_or_default());
            record.set(3, item.i64_("trailFilePosition").unwrap_or_default());
            rows.push((EntityKey::Id(node), record));
        }
        Ok(Some(rows))
    }
}

pub static HOTCACHE_PER_CACHE_SCHEMA: Schema = Schema {
    name: "hotcachePerCache",
    columns: &["inserts", "updates", "deletes", "averageMicros", "maxMicros"],
};

pub struct HotcachePerCacheRetriever;

#[async_trait]
impl Retriever for HotcachePerCacheRetriever {
    fn schema(&self) -> &'static Schema {
        &HOTCACHE_PER_CACHE_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let Some(member) = model.selected_hotcache_member() else {
            return Ok(None);
        };
        let items = sender
            .get_attributes(
                &EntityQuery::new("hotcache").with("nodeId", member.to_string()),
                &[
                    "cacheName",
                    "inserts",
                    "updates",
                    "deletes",
                    "averageMicros",
                    "maxMicros",
                ],
            )
            .await?;

        let mut rows = Rows::new();
        for item in items {
            let Some(cache) = item.str_("cacheName") else {
                continue;
            };
            let mut record = Record::new(&HOTCACHE_PER_CACHE_SCHEMA);
            record.set(0, item.i64_("inserts").unwrap_or_default());
            record.set(1, item.i64_("updates").unwrap_or_default());
            record.set(2, item.i64_("deletes").unwrap_or_default());
            record.set(3, item.f64_("averageMicros").unwrap_or_default());
            record.set(4, item.i64_("maxMicros").unwrap_or_default());
            rows.push((EntityKey::Name(cache.to_owned()), record));
        }
        Ok(Some(rows))
    }
}

pub static EXECUTOR_SCHEMA: Schema = Schema {
    name: "executor",
    columns: &["memberCount", "tasksInProgress", "tasksCompleted", "tasksRejected"],
};

pub struct ExecutorRetriever;

#[async_trait]
impl Retriever for ExecutorRetriever {
    fn schema(&self) -> &'static Schema {
        &EXECUTOR_SCHEMA
    }

    async fn query_direct(
        &self,
        sender: &dyn RequestSender,
        _model: &StatsModel,
    ) -> Result<Option<Rows>, RetrieveError> {
        let items = sender
            .get_attributes(
                &EntityQuery::new("executors"),
                &[
                    "name",
                    "nodeId",
                    "tasksInProgressCount",
                    "tasksCompletedCount",
                    "tasksRejectedCount",
                ],
            )
            .await?;

        let mut aggregates: BTreeMap<String, [i64; 4]> = BTreeMap::new();
        for item in items {
            let Some(name) = item.str_("name") else {
                continue;
            };
            let entry = aggregates.entry(name.to_owned()).or_default();
            entry[0] += 1;
            entry[1] += item.i64_("tasksInProgressCount").unwrap_or_default();
            entry[2] += item.i64_("tasksCompletedCount").unwrap_or_default();
            entry[3] += item.i64_("tasksRejectedCount").unwrap_or_default();
        }

        let rows = aggregates
            .into_iter()
            .map(|(name, totals)| {
                let mut record = Record::new(&EXECUTOR_SCHEMA);
                record.set(0, totals[0]);
                record.set(1, totals[1]);
                record.set(2, totals[2]);
                record.set(3, totals[3]);
                (EntityKey::Name(name), record)
            })
            .collect();
        Ok(Some(rows))
    }
}
