//! Orchestrator behavior against a scripted in-memory request sender:
//! capability detection and gating, strategy fallback, aggregation
//! arithmetic, selection invalidation and the single-flight guard.

use async_trait::async_trait;
use grid_stats::{
    EntityAttributes, EntityKey, EntityQuery, ReportRow, RequestSender, Settings, StatsModel,
    StatisticType, TransportError, TransportKind,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Semaphore;

#[derive(Default)]
struct MockSender {
    kind: Option<TransportKind>,
    collections: HashMap<&'static str, Vec<Json>>,
    report_rows: Option<Vec<ReportRow>>,
    fail_reports: bool,
    structured: Option<Json>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<String>>,
}

impl MockSender {
    fn management() -> Self {
        Self {
            kind: Some(TransportKind::Management),
            ..Default::default()
        }
    }

    fn http() -> Self {
        Self {
            kind: Some(TransportKind::Http),
            ..Default::default()
        }
    }

    fn with_collection(mut self, collection: &'static str, items: Vec<Json>) -> Self {
        self.collections.insert(collection, items);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl RequestSender for MockSender {
    fn kind(&self) -> TransportKind {
        self.kind.unwrap_or(TransportKind::Management)
    }

    async fn get_attributes(
        &self,
        query: &EntityQuery,
        _names: &[&str],
    ) -> Result<Vec<EntityAttributes>, TransportError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.calls.lock().push(format!("get:{}", query.collection));
        let items = self
            .collections
            .get(query.collection)
            .cloned()
            .unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(EntityAttributes::from_object)
            .collect())
    }

    async fn invoke_report(&self, _descriptor: &str) -> Result<Vec<ReportRow>, TransportError> {
        self.calls.lock().push("report".to_owned());
        if self.fail_reports {
            return Err(TransportError::ReportExecution(
                "500 Internal Server Error: report engine unavailable".into(),
            ));
        }
        Ok(self.report_rows.clone().unwrap_or_default())
    }

    async fn get_structured(&self, path: &str) -> Result<Json, TransportError> {
        self.calls.lock().push(format!("structured:{path}"));
        Ok(self.structured.clone().unwrap_or_else(|| json!({})))
    }
}

fn eager_settings() -> Settings {
    let mut settings = Settings::default();
    settings.refresh_interval_secs = 0;
    settings
}

/// Model with a zero refresh interval so every call to `refresh` runs a
/// full cycle.
fn eager_model() -> StatsModel {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    StatsModel::new(eager_settings())
}

fn cluster_items(version: &str) -> Vec<Json> {
    vec![json!({
        "clusterName": "DevCluster",
        "version": version,
        "clusterSize": 3,
        "licenseMode": "Development",
        "membersDepartureCount": 0,
    })]
}

fn service_items() -> Vec<Json> {
    vec![
        json!({"name": "DistributedSvc", "type": "DistributedCache", "nodeId": 1,
               "statusHA": "NODE-SAFE", "storageEnabled": true, "partitionsAll": 257,
               "ownedPartitionsPrimary": 5}),
        json!({"name": "DistributedSvc", "type": "DistributedCache", "nodeId": 2,
               "statusHA": "NODE-SAFE", "storageEnabled": false, "partitionsAll": 257,
               "ownedPartitionsPrimary": 0}),
        json!({"name": "DistributedSvc", "type": "DistributedCache", "nodeId": 3,
               "statusHA": "NODE-SAFE", "storageEnabled": true, "partitionsAll": 257,
               "ownedPartitionsPrimary": 3}),
        json!({"name": "ReplicatedSvc", "type": "ReplicatedCache", "nodeId": 1,
               "statusHA": "n/a", "storageEnabled": true, "ownedPartitionsPrimary": 0}),
        json!({"name": "ReplicatedSvc", "type": "ReplicatedCache", "nodeId": 2,
               "statusHA": "n/a", "storageEnabled": true, "ownedPartitionsPrimary": 0}),
    ]
}

fn cache_items() -> Vec<Json> {
    vec![
        json!({"service": "DistributedSvc", "name": "orders", "nodeId": 1,
               "size": 10, "units": 1000, "unitFactor": 1, "unitCalculator": "BINARY"}),
        json!({"service": "DistributedSvc", "name": "orders", "nodeId": 2,
               "size": 15, "units": 1500, "unitFactor": 1, "unitCalculator": "BINARY"}),
        json!({"service": "DistributedSvc", "name": "orders", "nodeId": 3,
               "size": 7, "units": 700, "unitFactor": 1, "unitCalculator": "BINARY"}),
        json!({"service": "ReplicatedSvc", "name": "ref", "nodeId": 1,
               "size": 40, "units": 4000, "unitFactor": 1, "unitCalculator": "BINARY"}),
        json!({"service": "ReplicatedSvc", "name": "ref", "nodeId": 2,
               "size": 40, "units": 4000, "unitFactor": 1, "unitCalculator": "BINARY"}),
        json!({"service": "ReplicatedSvc", "name": "ref", "nodeId": 3,
               "size": 40, "units": 4000, "unitFactor": 1, "unitCalculator": "BINARY"}),
    ]
}

/// Pre-modern cluster: reporter never becomes available, everything
/// goes through the direct path.
fn legacy_sender() -> MockSender {
    MockSender::management()
        .with_collection("clusters", cluster_items("12.1.2.0"))
        .with_collection("services", service_items())
        .with_collection("caches", cache_items())
        .with_collection("members", vec![json!({"nodeId": 1, "roleName": "storage"})])
}

#[tokio::test]
async fn distributed_caches_sum_and_replicated_take_representative() {
    let model = eager_model();
    let sender = legacy_sender();

    assert!(model.refresh(&sender).await);

    let caches = model.get_snapshot(StatisticType::Cache).unwrap();
    let orders = caches
        .get(&EntityKey::ServiceCache(
            "DistributedSvc".into(),
            "orders".into(),
        ))
        .unwrap();
    assert_eq!(orders.get(0).as_i64(), Some(32));
    assert_eq!(orders.get(1).as_i64(), Some(3200));
    assert_eq!(orders.get(2).as_i64(), Some(100));

    let reference = caches
        .get(&EntityKey::ServiceCache(
            "ReplicatedSvc".into(),
            "ref".into(),
        ))
        .unwrap();
    assert_eq!(reference.get(0).as_i64(), Some(40), "must not sum to 120");
    assert_eq!(reference.get(1).as_i64(), Some(4000));

    let distributed = model.distributed_caches().unwrap();
    assert!(distributed.contains("DistributedSvc"));
    assert!(!distributed.contains("ReplicatedSvc"));
}

#[tokio::test]
async fn node_storage_never_downgrades_once_enabled() {
    let model = eager_model();
    let sender = legacy_sender();

    model.refresh(&sender).await;

    let storage = model.get_snapshot(StatisticType::NodeStorage).unwrap();
    // Node 1 owns primaries on the distributed service even though the
    // replicated service reports zero for it.
    assert_eq!(storage.get(&EntityKey::Id(1)).unwrap().get(0).as_i64(), Some(1));
    assert_eq!(storage.get(&EntityKey::Id(2)).unwrap().get(0).as_i64(), Some(0));
    assert_eq!(storage.get(&EntityKey::Id(3)).unwrap().get(0).as_i64(), Some(1));
}

#[tokio::test]
async fn version_detection_gates_reporter_and_stays_sticky() {
    let model = eager_model();
    let sender = MockSender::management()
        .with_collection("clusters", cluster_items("14.1.1.0.0"))
        .with_collection("services", service_items())
        .with_collection("caches", cache_items());

    model.refresh(&sender).await;
    assert!(model.flags().reporter_available.is_true());
    assert!(model.flags().modern_cluster.is_true());

    // A later cycle reporting an older version must not flip the flags.
    let downgraded = MockSender::management()
        .with_collection("clusters", cluster_items("12.1.2.0"))
        .with_collection("services", service_items())
        .with_collection("caches", cache_items());
    model.refresh(&downgraded).await;
    assert!(model.flags().reporter_available.is_true());
    assert!(model.flags().modern_cluster.is_true());
}

#[tokio::test]
async fn report_execution_failure_falls_back_same_cycle_and_disables_reporter() {
    let model = eager_model();
    let mut sender = MockSender::management()
        .with_collection("clusters", cluster_items("14.1.1.0.0"))
        .with_collection("services", service_items())
        .with_collection("caches", cache_items())
        .with_collection("members", vec![json!({"nodeId": 1, "roleName": "storage"})]);
    sender.fail_reports = true;

    assert!(model.refresh(&sender).await);

    // Service is the first reporter-eligible type after detection; its
    // execution failure disables the reporter for the session, yet the
    // same cycle still produces the data through the direct path.
    assert_eq!(sender.count_calls("report"), 1);
    assert!(model.flags().reporter_available.is_false());

    let services = model.get_snapshot(StatisticType::Service).unwrap();
    assert!(services.get(&EntityKey::Name("DistributedSvc".into())).is_some());
    assert!(model.get_snapshot(StatisticType::Member).is_some());

    // And it stays off in later cycles.
    model.refresh(&sender).await;
    assert_eq!(sender.count_calls("report"), 1);
}

#[tokio::test]
async fn unconfigured_subsystems_are_skipped_after_first_cycle() {
    let model = eager_model();
    let sender = legacy_sender();

    model.refresh(&sender).await;
    assert!(!model.is_federation_configured());
    assert!(!model.is_persistence_configured());
    assert_eq!(sender.count_calls("get:federation"), 2);
    // An empty retrieval leaves the slot absent, not present-and-empty.
    assert!(model.get_snapshot(StatisticType::FederationDestination).is_none());

    model.refresh(&sender).await;
    // No further federation round trips once resolved unconfigured.
    assert_eq!(sender.count_calls("get:federation"), 2);
    assert!(model.get_snapshot(StatisticType::FederationDestination).is_none());
    assert!(model.get_snapshot(StatisticType::FederationOrigin).is_none());
}

#[tokio::test]
async fn selection_change_invalidates_exactly_dependent_details() {
    let model = eager_model();
    let sender = legacy_sender().with_collection(
        "storageManagers",
        vec![json!({"nodeId": 1, "locksGranted": 2, "indexTotalUnits": 128})],
    );

    model.set_selected_cache(Some(("DistributedSvc".into(), "orders".into())));
    model.refresh(&sender).await;

    assert!(model.get_snapshot(StatisticType::CacheDetail).is_some());
    assert!(model.get_snapshot(StatisticType::CacheFrontDetail).is_some());
    assert!(model.get_snapshot(StatisticType::CacheStorageManager).is_some());
    assert!(model.get_snapshot(StatisticType::Member).is_some());

    model.set_selected_cache(Some(("ReplicatedSvc".into(), "ref".into())));

    assert!(model.get_snapshot(StatisticType::CacheDetail).is_none());
    assert!(model.get_snapshot(StatisticType::CacheFrontDetail).is_none());
    assert!(model.get_snapshot(StatisticType::CacheStorageManager).is_none());
    // Unrelated snapshots stay put.
    assert!(model.get_snapshot(StatisticType::Member).is_some());
    assert!(model.get_snapshot(StatisticType::Cache).is_some());
}

#[tokio::test]
async fn detail_types_are_absent_without_a_selection() {
    let model = eager_model();
    let sender = legacy_sender();

    model.refresh(&sender).await;

    assert!(model.get_snapshot(StatisticType::CacheDetail).is_none());
    assert!(model.get_snapshot(StatisticType::ServiceDetail).is_none());
    assert!(model.get_snapshot(StatisticType::HttpProxyDetail).is_none());
}

#[tokio::test]
async fn overlapping_refresh_tick_is_skipped() {
    let model = Arc::new(eager_model());
    let gate = Arc::new(Semaphore::new(0));
    let mut sender = legacy_sender();
    sender.gate = Some(gate.clone());
    let sender = Arc::new(sender);

    let first = {
        let model = model.clone();
        let sender = sender.clone();
        tokio::spawn(async move { model.refresh(&*sender).await })
    };
    // Let the first refresh reach the gated transport call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ungated = legacy_sender();
    assert!(!model.refresh(&ungated).await, "second tick must be a no-op");

    gate.add_permits(1000);
    assert!(first.await.unwrap());
}

#[tokio::test]
async fn rest_aggregation_is_used_when_the_server_supports_it() {
    let model = eager_model();
    let mut sender = MockSender::http()
        .with_collection("clusters", cluster_items("12.1.2.0"))
        .with_collection("services", service_items());
    sender.structured = Some(json!({
        "items": [
            {"service": "DistributedSvc", "name": "orders", "size": 32,
             "memoryBytes": 3200, "unitCalculator": "BINARY"},
        ]
    }));

    model.refresh(&sender).await;

    assert!(model.flags().rest_cache_aggregation_available.is_true());
    let caches = model.get_snapshot(StatisticType::Cache).unwrap();
    let orders = caches
        .get(&EntityKey::ServiceCache(
            "DistributedSvc".into(),
            "orders".into(),
        ))
        .unwrap();
    assert_eq!(orders.get(0).as_i64(), Some(32));
    // The direct cache query never ran.
    assert_eq!(sender.count_calls("get:caches"), 0);
}

#[tokio::test]
async fn old_server_rest_response_falls_back_to_direct_path() {
    let model = eager_model();
    let mut sender = MockSender::http()
        .with_collection("clusters", cluster_items("12.1.2.0"))
        .with_collection("services", service_items())
        .with_collection("caches", cache_items());
    // Older servers omit the aggregated memory field.
    sender.structured = Some(json!({
        "items": [{"service": "DistributedSvc", "name": "orders", "size": 32}]
    }));

    model.refresh(&sender).await;

    assert!(model.flags().rest_cache_aggregation_available.is_false());
    assert_eq!(sender.count_calls("structured:caches"), 1);
    // Same-cycle fallback: the data point comes from the direct path.
    let caches = model.get_snapshot(StatisticType::Cache).unwrap();
    let orders = caches
        .get(&EntityKey::ServiceCache(
            "DistributedSvc".into(),
            "orders".into(),
        ))
        .unwrap();
    assert_eq!(orders.get(0).as_i64(), Some(32));

    // Later cycles skip the unsupported bulk request entirely.
    model.refresh(&sender).await;
    assert_eq!(sender.count_calls("structured:caches"), 1);
}

#[tokio::test]
async fn cluster_identity_change_withholds_the_whole_cycle() {
    let model = eager_model();
    let sender = legacy_sender();
    model.refresh(&sender).await;
    assert_eq!(model.cluster_name().as_deref(), Some("DevCluster"));
    assert!(model.get_snapshot(StatisticType::Cluster).is_some());

    let other = MockSender::management()
        .with_collection(
            "clusters",
            vec![json!({"clusterName": "OtherCluster", "version": "12.1.2.0"})],
        )
        .with_collection("services", service_items())
        .with_collection("caches", cache_items());
    model.refresh(&other).await;
    assert!(model.get_snapshot(StatisticType::Cluster).is_none());
    // Nothing else from the foreign cluster gets queried or published;
    // the known cluster's snapshots stay as they were.
    assert_eq!(other.count_calls("get:services"), 0);
    let caches = model.get_snapshot(StatisticType::Cache).unwrap();
    let orders = caches
        .get(&EntityKey::ServiceCache(
            "DistributedSvc".into(),
            "orders".into(),
        ))
        .unwrap();
    assert_eq!(orders.get(0).as_i64(), Some(32));
}

#[tokio::test]
async fn refresh_is_a_noop_until_the_interval_elapses() {
    let model = StatsModel::new(Settings::default());
    let sender = legacy_sender();

    assert!(model.refresh(&sender).await);
    let calls = sender.calls().len();
    assert!(!model.refresh(&sender).await, "interval has not elapsed");
    assert_eq!(sender.calls().len(), calls);
}

#[tokio::test]
async fn federation_detail_counters_stay_integral() {
    let model = eager_model();
    let sender = legacy_sender().with_collection(
        "federation",
        vec![json!({
            "service": "FedSvc", "name": "RemoteSite", "nodeId": 1,
            "state": "CONNECTED", "currentBandwidth": 1.5,
            "totalBytesSent": 1024, "totalEntriesSent": 7,
            "totalRecordsSent": 3, "totalMsgSent": 10,
            "totalBytesReceived": 2048, "totalRecordsReceived": 4,
            "totalEntriesReceived": 8, "totalMsgReceived": 20,
        })],
    );
    model.set_selected_federation_participant(Some(("FedSvc".into(), "RemoteSite".into())));
    model.refresh(&sender).await;

    let details = model
        .get_snapshot(StatisticType::FederationDestinationDetails)
        .unwrap();
    let row = details.get(&EntityKey::Id(1)).unwrap();
    assert_eq!(row.get(0).as_str(), Some("CONNECTED"));
    assert_eq!(row.get(1).as_f64(), Some(1.5));
    // Counters keep the summary rows' integer typing.
    assert_eq!(row.get(2).as_i64(), Some(1024));
    assert_eq!(row.get(5).as_i64(), Some(10));
}

#[tokio::test]
async fn name_service_proxies_are_filtered_unless_included() {
    let proxies = vec![
        json!({"name": "ExtendProxy", "nodeId": 1, "hostIP": "10.0.0.1:9099",
               "connectionCount": 7}),
        json!({"name": "NameService", "nodeId": 1, "hostIP": "10.0.0.1:7574",
               "connectionCount": 0}),
    ];

    let model = eager_model();
    let sender = legacy_sender().with_collection("proxies", proxies.clone());
    model.refresh(&sender).await;
    let snapshot = model.get_snapshot(StatisticType::Proxy).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(model.is_extend_configured());

    let mut settings = eager_settings();
    settings.include_name_service = true;
    let inclusive = StatsModel::new(settings);
    let sender = legacy_sender().with_collection("proxies", proxies);
    inclusive.refresh(&sender).await;
    let snapshot = inclusive.get_snapshot(StatisticType::Proxy).unwrap();
    assert_eq!(snapshot.len(), 2);
}
