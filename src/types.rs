//! Core data model: the ordered statistic registry, entity identity,
//! fixed-arity records and published snapshots.

use std::{fmt, sync::Arc};

/// One category of cluster metric tracked by the engine.
///
/// The declaration order is the processing order of a refresh cycle and
/// is load-bearing: `Cluster` resolves capability flags for everything
/// after it, and `Service` populates the distributed-cache set that
/// `Cache` aggregation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatisticType {
    Cluster,
    Service,
    ServiceDetail,
    Cache,
    CacheDetail,
    CacheFrontDetail,
    CacheStorageManager,
    Topic,
    Member,
    NodeStorage,
    Machine,
    Proxy,
    Persistence,
    PersistenceNotifications,
    HttpSession,
    FederationDestination,
    FederationOrigin,
    FederationDestinationDetails,
    FederationOriginDetails,
    RamJournal,
    FlashJournal,
    JCacheConfig,
    JCacheStats,
    HttpProxy,
    HttpProxyDetail,
    Hotcache,
    HotcachePerCache,
    Executor,
    GrpcProxy,
}

impl StatisticType {
    /// All statistic types in refresh-processing order.
    pub const ALL: [StatisticType; 29] = [
        StatisticType::Cluster,
        StatisticType::Service,
        StatisticType::ServiceDetail,
        StatisticType::Cache,
        StatisticType::CacheDetail,
        StatisticType::CacheFrontDetail,
        StatisticType::CacheStorageManager,
        StatisticType::Topic,
        StatisticType::Member,
        StatisticType::NodeStorage,
        StatisticType::Machine,
        StatisticType::Proxy,
        StatisticType::Persistence,
        StatisticType::PersistenceNotifications,
        StatisticType::HttpSession,
        StatisticType::FederationDestination,
        StatisticType::FederationOrigin,
        StatisticType::FederationDestinationDetails,
        StatisticType::FederationOriginDetails,
        StatisticType::RamJournal,
        StatisticType::FlashJournal,
        StatisticType::JCacheConfig,
        StatisticType::JCacheStats,
        StatisticType::HttpProxy,
        StatisticType::HttpProxyDetail,
        StatisticType::Hotcache,
        StatisticType::HotcachePerCache,
        StatisticType::Executor,
        StatisticType::GrpcProxy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatisticType::Cluster => "cluster",
            StatisticType::Service => "service",
            StatisticType::ServiceDetail => "serviceDetail",
            StatisticType::Cache => "cache",
            StatisticType::CacheDetail => "cacheDetail",
            StatisticType::CacheFrontDetail => "cacheFrontDetail",
            StatisticType::CacheStorageManager => "cacheStorageManager",
            StatisticType::Topic => "topic",
            StatisticType::Member => "member",
            StatisticType::NodeStorage => "nodeStorage",
            StatisticType::Machine => "machine",
            StatisticType::Proxy => "proxy",
            StatisticType::Persistence => "persistence",
            StatisticType::PersistenceNotifications => "persistenceNotifications",
            StatisticType::HttpSession => "httpSession",
            StatisticType::FederationDestination => "federationDestination",
            StatisticType::FederationOrigin => "federationOrigin",
            StatisticType::FederationDestinationDetails => "federationDestinationDetails",
            StatisticType::FederationOriginDetails => "federationOriginDetails",
            StatisticType::RamJournal => "ramJournal",
            StatisticType::FlashJournal => "flashJournal",
            StatisticType::JCacheConfig => "jcacheConfig",
            StatisticType::JCacheStats => "jcacheStats",
            StatisticType::HttpProxy => "httpProxy",
            StatisticType::HttpProxyDetail => "httpProxyDetail",
            StatisticType::Hotcache => "hotcache",
            StatisticType::HotcachePerCache => "hotcachePerCache",
            StatisticType::Executor => "executor",
            StatisticType::GrpcProxy => "grpcProxy",
        }
    }
}

impl fmt::Display for StatisticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of one record within a snapshot. Key shape is stable across
/// refresh cycles and across retrieval-strategy switches so that rows
/// can be re-identified after a refresh.
///
/// The upstream "domain partition" key component always resolved to
/// null and is collapsed away here; composite keys are two-part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    /// Simple name key (cluster, machine, topic, service aggregate).
    Name(String),
    /// Numeric key (node id, notification sequence).
    Id(i64),
    /// (service name, cache name)
    ServiceCache(String, String),
    /// (service name, participant name)
    ServiceParticipant(String, String),
    /// (service name, node id)
    ServiceNode(String, i64),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Name(name) => f.write_str(name),
            EntityKey::Id(id) => write!(f, "{id}"),
            EntityKey::ServiceCache(service, cache) => write!(f, "{service}/{cache}"),
            EntityKey::ServiceParticipant(service, participant) => {
                write!(f, "{service}/{participant}")
            }
            EntityKey::ServiceNode(service, node) => write!(f, "{service}/{node}"),
        }
    }
}

/// A single typed cell of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i64)
    }
}

/// Fixed column layout of one statistic type, declared once per type.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl Schema {
    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// A fixed-arity tuple of typed columns addressed by position.
///
/// Column access outside the schema arity is a programming error and
/// panics; arity is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: &'static Schema,
    values: Vec<Value>,
}

impl Record {
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            schema,
            values: vec![Value::Empty; schema.arity()],
        }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    fn check_column(&self, column: usize) {
        assert!(
            column < self.values.len(),
            "column {} out of range 0..{} for schema `{}`",
            column,
            self.values.len(),
            self.schema.name
        );
    }

    pub fn set(&mut self, column: usize, value: impl Into<Value>) {
        self.check_column(column);
        self.values[column] = value.into();
    }

    pub fn get(&self, column: usize) -> &Value {
        self.check_column(column);
        &self.values[column]
    }
}

/// The most recently retrieved, immutable set of records for one
/// statistic type. Replaced wholesale every cycle via an `Arc` swap;
/// never mutated in place.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Snapshot {
    rows: Vec<(EntityKey, Record)>,
}

pub type SharedSnapshot = Arc<Snapshot>;

impl Snapshot {
    pub fn new(rows: Vec<(EntityKey, Record)>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[(EntityKey, Record)] {
        &self.rows
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Record> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    static TEST_SCHEMA: Schema = Schema {
        name: "test",
        columns: &["a", "b"],
    };

    #[test]
    fn cluster_resolves_first_and_service_before_cache() {
        let order = StatisticType::ALL;
        assert_eq!(order[0], StatisticType::Cluster);
        let service = order.iter().position(|t| *t == StatisticType::Service);
        let cache = order.iter().position(|t| *t == StatisticType::Cache);
        assert!(service.unwrap() < cache.unwrap());
    }

    #[test]
    fn record_round_trips_typed_columns() {
        let mut record = Record::new(&TEST_SCHEMA);
        record.set(0, "hello");
        record.set(1, 42i64);
        assert_eq!(record.get(0).as_str(), Some("hello"));
        assert_eq!(record.get(1).as_i64(), Some(42));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_read_panics() {
        let record = Record::new(&TEST_SCHEMA);
        let _ = record.get(2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_write_panics() {
        let mut record = Record::new(&TEST_SCHEMA);
        record.set(5, 1i64);
    }

    #[test]
    fn records_with_equal_values_compare_equal() {
        let mut left = Record::new(&TEST_SCHEMA);
        left.set(0, "x");
        left.set(1, 7i64);
        let mut right = Record::new(&TEST_SCHEMA);
        right.set(0, "x");
        right.set(1, 7i64);
        assert_eq!(left, right);
        right.set(1, 8i64);
        assert_ne!(left, right);
    }

    #[test]
    fn snapshot_lookup_by_key() {
        let mut record = Record::new(&TEST_SCHEMA);
        record.set(0, "x");
        let snapshot = Snapshot::new(vec![(EntityKey::Name("a".into()), record)]);
        assert!(snapshot.get(&EntityKey::Name("a".into())).is_some());
        assert!(snapshot.get(&EntityKey::Name("b".into())).is_none());
    }
}
