//! The refresh orchestrator's shared state: published snapshots,
//! capability flags, selection state and the read surface consumed by
//! presentation layers.

use crate::{
    capability::CapabilityFlags,
    settings::Settings,
    types::{SharedSnapshot, Snapshot, StatisticType},
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicBool, AtomicU64},
    time::{Duration, Instant},
};

mod refresh;

pub use refresh::run_periodic;

/// Currently-selected parent entity per detail view. Mutated by the
/// presentation layer, read by the refresh task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    /// (service name, cache name)
    pub cache: Option<(String, String)>,
    pub service: Option<String>,
    pub topic: Option<String>,
    /// (service name, participant name)
    pub federation_participant: Option<(String, String)>,
    pub http_proxy_service: Option<String>,
    pub hotcache_member: Option<i64>,
    pub outgoing_node: Option<i64>,
    pub incoming_node: Option<i64>,
}

/// The model driving the periodic statistics refresh cycle.
///
/// All state is behind interior mutability: the single refresh task is
/// the only writer of snapshots and flags, while presentation threads
/// read concurrently. Each snapshot slot is replaced by one atomic
/// `Arc` store, so readers see either the previous or the new cycle's
/// data, never a partially populated set.
pub struct StatsModel {
    settings: RwLock<Settings>,
    snapshots: RwLock<BTreeMap<StatisticType, SharedSnapshot>>,
    flags: RwLock<CapabilityFlags>,
    selection: RwLock<SelectionState>,
    distributed_caches: RwLock<Option<BTreeSet<String>>>,
    cluster_name: RwLock<Option<String>>,
    refresh_in_flight: AtomicBool,
    last_refresh: RwLock<Option<Instant>>,
    refresh_interval: RwLock<Duration>,
    cycles: AtomicU64,
}

impl StatsModel {
    pub fn new(settings: Settings) -> Self {
        let interval = Duration::from_secs(settings.refresh_interval_secs);
        let mut flags = CapabilityFlags::default();
        if settings.disable_reporter {
            flags.reporter_available.resolve(false);
        }
        Self {
            settings: RwLock::new(settings),
            snapshots: RwLock::new(BTreeMap::new()),
            flags: RwLock::new(flags),
            selection: RwLock::new(SelectionState::default()),
            distributed_caches: RwLock::new(None),
            cluster_name: RwLock::new(None),
            refresh_in_flight: AtomicBool::new(false),
            last_refresh: RwLock::new(None),
            refresh_interval: RwLock::new(interval),
            cycles: AtomicU64::new(0),
        }
    }

    // ---- published surface -------------------------------------------------

    /// Latest snapshot for a type, or `None` when the last cycle had no
    /// successful retrieval (or the type was skipped).
    pub fn get_snapshot(&self, ty: StatisticType) -> Option<SharedSnapshot> {
        self.snapshots.read().get(&ty).cloned()
    }

    pub fn flags(&self) -> CapabilityFlags {
        *self.flags.read()
    }

    pub fn refresh_interval(&self) -> Duration {
        *self.refresh_interval.read()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replaces the live configuration; the refresh interval is picked
    /// up at the end of the next cycle.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    pub fn cluster_name(&self) -> Option<String> {
        self.cluster_name.read().clone()
    }

    /// Cache/service names known to use partitioned storage semantics.
    pub fn distributed_caches(&self) -> Option<BTreeSet<String>> {
        self.distributed_caches.read().clone()
    }

    // Optional-subsystem predicates, derived from sticky flags resolved
    // on the first retrieval of the matching base type.

    pub fn is_federation_configured(&self) -> bool {
        self.flags.read().federation_configured.is_true()
    }

    pub fn is_extend_configured(&self) -> bool {
        self.flags.read().extend_configured.is_true()
    }

    pub fn is_http_proxy_configured(&self) -> bool {
        self.flags.read().http_proxy_configured.is_true()
    }

    pub fn is_persistence_configured(&self) -> bool {
        self.flags.read().persistence_configured.is_true()
    }

    pub fn is_coherence_web_configured(&self) -> bool {
        self.flags.read().coherence_web_configured.is_true()
    }

    pub fn is_elastic_data_configured(&self) -> bool {
        self.flags.read().elastic_data_configured.is_true()
    }

    pub fn is_jcache_configured(&self) -> bool {
        self.flags.read().jcache_configured.is_true()
    }

    pub fn is_hotcache_configured(&self) -> bool {
        self.flags.read().hotcache_configured.is_true()
    }

    // ---- selection ---------------------------------------------------------

    pub fn selection(&self) -> SelectionState {
        self.selection.read().clone()
    }

    pub fn selected_cache(&self) -> Option<(String, String)> {
        self.selection.read().cache.clone()
    }

    /// Changing the selected cache invalidates exactly the cache-scoped
    /// detail snapshots.
    pub fn set_selected_cache(&self, selection: Option<(String, String)>) {
        self.selection.write().cache = selection;
        self.clear_snapshot(StatisticType::CacheDetail);
        self.clear_snapshot(StatisticType::CacheFrontDetail);
        self.clear_snapshot(StatisticType::CacheStorageManager);
    }

    pub fn selected_service(&self) -> Option<String> {
        self.selection.read().service.clone()
    }

    pub fn set_selected_service(&self, selection: Option<String>) {
        self.selection.write().service = selection;
        self.clear_snapshot(StatisticType::ServiceDetail);
    }

    pub fn selected_topic(&self) -> Option<String> {
        self.selection.read().topic.clone()
    }

    pub fn set_selected_topic(&self, selection: Option<String>) {
        self.selection.write().topic = selection;
    }

    pub fn selected_federation_participant(&self) -> Option<(String, String)> {
        self.selection.read().federation_participant.clone()
    }

    pub fn set_selected_federation_participant(&self, selection: Option<(String, String)>) {
        self.selection.write().federation_participant = selection;
        self.clear_snapshot(StatisticType::FederationDestinationDetails);
        self.clear_snapshot(StatisticType::FederationOriginDetails);
    }

    pub fn selected_http_proxy_service(&self) -> Option<String> {
        self.selection.read().http_proxy_service.clone()
    }

    pub fn set_selected_http_proxy_service(&self, selection: Option<String>) {
        self.selection.write().http_proxy_service = selection;
        self.clear_snapshot(StatisticType::HttpProxyDetail);
    }

    pub fn selected_hotcache_member(&self) -> Option<i64> {
        self.selection.read().hotcache_member
    }

    pub fn set_selected_hotcache_member(&self, selection: Option<i64>) {
        self.selection.write().hotcache_member = selection;
        self.clear_snapshot(StatisticType::HotcachePerCache);
    }

    pub fn selected_outgoing_node(&self) -> Option<i64> {
        self.selection.read().outgoing_node
    }

    pub fn set_selected_outgoing_node(&self, selection: Option<i64>) {
        self.selection.write().outgoing_node = selection;
        self.clear_snapshot(StatisticType::FederationDestinationDetails);
    }

    pub fn selected_incoming_node(&self) -> Option<i64> {
        self.selection.read().incoming_node
    }

    pub fn set_selected_incoming_node(&self, selection: Option<i64>) {
        self.selection.write().incoming_node = selection;
        self.clear_snapshot(StatisticType::FederationOriginDetails);
    }

    // ---- crate-internal mutation (refresh task only) -----------------------

    pub(crate) fn install_snapshot(&self, ty: StatisticType, snapshot: Snapshot) {
        self.snapshots
            .write()
            .insert(ty, SharedSnapshot::new(snapshot));
    }

    pub(crate) fn clear_snapshot(&self, ty: StatisticType) {
        self.snapshots.write().remove(&ty);
    }

    pub(crate) fn flags_mut<R>(&self, mutate: impl FnOnce(&mut CapabilityFlags) -> R) -> R {
        mutate(&mut self.flags.write())
    }

    pub(crate) fn set_distributed_caches(&self, set: BTreeSet<String>) {
        *self.distributed_caches.write() = Some(set);
    }

    /// Side-effect output of the Service retrieval, required before the
    /// Cache retrieval runs. Running Cache first is a sequencing bug.
    pub(crate) fn require_distributed_caches(&self) -> BTreeSet<String> {
        self.distributed_caches
            .read()
            .clone()
            .unwrap_or_else(|| panic!("cache retrieval ran before the service retrieval populated the distributed cache set"))
    }

    pub(crate) fn record_cluster_name(&self, name: &str) -> Option<String> {
        let mut known = self.cluster_name.write();
        match known.as_deref() {
            Some(prev) if prev != name => Some(prev.to_owned()),
            Some(_) => None,
            None => {
                *known = Some(name.to_owned());
                None
            }
        }
    }
}
