//! The periodic refresh cycle: capability gating, per-type strategy
//! selection with same-cycle fallback, and snapshot publication.

use super::StatsModel;
use crate::{
    capability::{normalize_version, MODERN_VERSION},
    error::RetrieveError,
    reports::descriptor_for,
    retrievers::{retriever, Rows},
    transport::{RequestSender, TransportKind},
    types::{Snapshot, StatisticType},
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StatsModel {
    /// Runs one refresh cycle. Returns `false` without doing anything
    /// when another refresh is still in flight (the tick is skipped,
    /// not queued) or when the refresh interval has not elapsed yet.
    pub async fn refresh(&self, sender: &dyn RequestSender) -> bool {
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("refresh already in flight, skipping tick");
            return false;
        }
        let _guard = InFlightGuard(&self.refresh_in_flight);
        self.run_cycle(sender).await
    }

    async fn run_cycle(&self, sender: &dyn RequestSender) -> bool {
        let interval = self.refresh_interval();
        if let Some(last) = *self.last_refresh.read() {
            if last.elapsed() < interval {
                return false;
            }
        }

        let settings = self.settings();
        if settings.disable_reporter {
            self.flags_mut(|flags| flags.reporter_available.downgrade());
        }

        let first_cycle = self.cycles.load(Ordering::Acquire) == 0;
        for ty in StatisticType::ALL {
            if !self.should_retrieve(ty, first_cycle) {
                tracing::debug!(statistic = ty.name(), "subsystem not configured, skipping");
                continue;
            }
            let outcome = match self.retrieve(sender, ty).await {
                Ok(rows) => Some(rows),
                Err(err) => {
                    tracing::error!(statistic = ty.name(), error = %err, "retrieval failed");
                    None
                }
            };
            let non_empty = match outcome {
                Some(Some(rows)) => {
                    let snapshot = Snapshot::new(rows);
                    let non_empty = !snapshot.is_empty();
                    if ty == StatisticType::Cluster && !self.process_cluster(&snapshot) {
                        // Data from a foreign cluster must not be
                        // published; withhold the whole cycle, not just
                        // the cluster summary.
                        self.clear_snapshot(ty);
                        break;
                    }
                    if non_empty {
                        self.install_snapshot(ty, snapshot);
                    } else {
                        // Absence is the read surface's "no data"
                        // signal; an empty snapshot must not linger
                        // once the gating flag stops the retrievals.
                        self.clear_snapshot(ty);
                    }
                    Some(non_empty)
                }
                Some(None) => {
                    self.clear_snapshot(ty);
                    Some(false)
                }
                // Leave the snapshot and the configured flag alone on a
                // failed attempt; the subsystem gets another chance.
                None => {
                    self.clear_snapshot(ty);
                    None
                }
            };
            if let Some(non_empty) = non_empty {
                self.resolve_configured(ty, non_empty);
            }
        }

        *self.refresh_interval.write() =
            Duration::from_secs(self.settings().refresh_interval_secs);
        *self.last_refresh.write() = Some(Instant::now());
        self.cycles.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Every type gets one chance on the very first refresh so that
    /// undetected optional subsystems can prove presence; afterwards a
    /// type whose gating flag resolved to "not configured" is skipped.
    fn should_retrieve(&self, ty: StatisticType, first_cycle: bool) -> bool {
        if first_cycle {
            return true;
        }
        let flags = self.flags();
        let gate = match ty {
            StatisticType::Proxy => flags.extend_configured,
            StatisticType::HttpProxy | StatisticType::HttpProxyDetail => {
                flags.http_proxy_configured
            }
            StatisticType::Persistence | StatisticType::PersistenceNotifications => {
                flags.persistence_configured
            }
            StatisticType::HttpSession => flags.coherence_web_configured,
            StatisticType::RamJournal | StatisticType::FlashJournal => {
                flags.elastic_data_configured
            }
            StatisticType::JCacheConfig | StatisticType::JCacheStats => flags.jcache_configured,
            StatisticType::Hotcache | StatisticType::HotcachePerCache => flags.hotcache_configured,
            StatisticType::FederationDestination
            | StatisticType::FederationOrigin
            | StatisticType::FederationDestinationDetails
            | StatisticType::FederationOriginDetails => flags.federation_configured,
            _ => return true,
        };
        !gate.is_false()
    }

    /// Strategy selection in priority order: reporter, REST bulk
    /// aggregation, direct queries. Falls through tiers within the same
    /// cycle so no data point is lost to a downgrade.
    async fn retrieve(
        &self,
        sender: &dyn RequestSender,
        ty: StatisticType,
    ) -> Result<Option<Rows>, RetrieveError> {
        let retriever = retriever(ty);

        if self.reporter_eligible(ty) {
            if let Some(descriptor) = descriptor_for(ty) {
                match retriever.query_report(sender, self, descriptor).await {
                    Ok(Some(rows)) => return Ok(Some(rows)),
                    Ok(None) => {
                        tracing::debug!(
                            statistic = ty.name(),
                            report = descriptor.name,
                            "report not renderable without a selection, falling back"
                        );
                    }
                    Err(err) if err.is_report_execution() => {
                        tracing::warn!(
                            statistic = ty.name(),
                            report = descriptor.name,
                            error = %err,
                            "report execution failed, disabling reporter path for this session"
                        );
                        self.flags_mut(|flags| flags.reporter_available.downgrade());
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if sender.kind() == TransportKind::Http && self.rest_aggregate_eligible(ty) {
            match retriever.query_rest_aggregate(sender, self).await? {
                Some(rows) => {
                    if ty == StatisticType::Cache {
                        self.flags_mut(|flags| {
                            flags.rest_cache_aggregation_available.resolve(true)
                        });
                    }
                    return Ok(Some(rows));
                }
                None => {
                    // Structural unsupported-by-server signal, not an error.
                    if ty == StatisticType::Cache {
                        tracing::debug!(
                            statistic = ty.name(),
                            "server lacks aggregated cache responses, using direct path"
                        );
                        self.flags_mut(|flags| {
                            flags.rest_cache_aggregation_available.resolve(false)
                        });
                    }
                }
            }
        }

        retriever.query_direct(sender, self).await
    }

    fn reporter_eligible(&self, ty: StatisticType) -> bool {
        let flags = self.flags();
        if !flags.reporter_available.is_true() {
            return false;
        }
        // Proxy statistics via the reporter are broken against
        // pre-modern clusters; keep Proxy on the direct path there.
        // Deliberately not generalized to any other type.
        if ty == StatisticType::Proxy && !flags.modern_cluster.is_true() {
            return false;
        }
        true
    }

    fn rest_aggregate_eligible(&self, ty: StatisticType) -> bool {
        if ty == StatisticType::Cache {
            !self.flags().rest_cache_aggregation_available.is_false()
        } else {
            true
        }
    }

    /// Cluster post-processing: identity sanity check plus one-time
    /// version/capability detection. Returns whether the snapshot may
    /// be published.
    fn process_cluster(&self, snapshot: &Snapshot) -> bool {
        let Some((key, record)) = snapshot.rows().first() else {
            return true;
        };
        let name = key.to_string();
        if let Some(previous) = self.record_cluster_name(&name) {
            if self.settings().disable_cluster_identity_check {
                tracing::warn!(
                    expected = %previous,
                    connected = %name,
                    "cluster identity changed (check disabled)"
                );
            } else {
                tracing::error!(
                    expected = %previous,
                    connected = %name,
                    "connected cluster identity changed, dropping cluster data for this cycle"
                );
                return false;
            }
        }

        let flags = self.flags();
        if flags.reporter_available.is_unknown() || flags.modern_cluster.is_unknown() {
            let raw = record
                .get(crate::retrievers::cluster::COL_VERSION)
                .as_str()
                .unwrap_or_default()
                .to_owned();
            let normalized = normalize_version(&raw);
            let modern = normalized >= MODERN_VERSION;
            tracing::info!(version = %raw, normalized, modern, "detected cluster version");
            self.flags_mut(|flags| {
                flags.modern_cluster.resolve(modern);
                flags.reporter_available.resolve(modern);
            });
        }
        true
    }

    /// Resolves an optional subsystem's sticky flag from the outcome of
    /// its base type's retrieval (present-and-non-empty semantics).
    fn resolve_configured(&self, ty: StatisticType, non_empty: bool) {
        self.flags_mut(|flags| match ty {
            StatisticType::Proxy => flags.extend_configured.resolve(non_empty),
            StatisticType::HttpProxy => flags.http_proxy_configured.resolve(non_empty),
            StatisticType::Persistence => flags.persistence_configured.resolve(non_empty),
            StatisticType::HttpSession => flags.coherence_web_configured.resolve(non_empty),
            StatisticType::JCacheConfig => flags.jcache_configured.resolve(non_empty),
            StatisticType::Hotcache => flags.hotcache_configured.resolve(non_empty),
            // Paired base types: the first of the pair may only resolve
            // the flag positively so an empty first half cannot mask a
            // configured second half.
            StatisticType::RamJournal => {
                if non_empty {
                    flags.elastic_data_configured.resolve(true);
                }
            }
            StatisticType::FlashJournal => flags.elastic_data_configured.resolve(non_empty),
            StatisticType::FederationDestination => {
                if non_empty {
                    flags.federation_configured.resolve(true);
                }
            }
            StatisticType::FederationOrigin => flags.federation_configured.resolve(non_empty),
            _ => {}
        });
    }
}

/// Drives [`StatsModel::refresh`] off a fixed-interval timer. Ticks
/// that fire while a refresh is still running are skipped, never
/// queued. Picks up live reconfiguration of the interval between runs.
pub async fn run_periodic(model: Arc<StatsModel>, sender: Arc<dyn RequestSender>) {
    let mut period = model.refresh_interval();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        model.refresh(sender.as_ref()).await;
        let current = model.refresh_interval();
        if current != period {
            tracing::info!(?current, "refresh interval reconfigured");
            period = current;
            ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn model() -> StatsModel {
        StatsModel::new(Settings::default())
    }

    #[test]
    fn proxy_reporter_pinned_to_modern_clusters() {
        let model = model();
        model.flags_mut(|flags| {
            flags.reporter_available.resolve(true);
            flags.modern_cluster.resolve(false);
        });
        assert!(!model.reporter_eligible(StatisticType::Proxy));
        // The pin is proxy-specific and must not leak to other types.
        assert!(model.reporter_eligible(StatisticType::Member));
        assert!(model.reporter_eligible(StatisticType::Service));
    }

    #[test]
    fn reporter_requires_resolved_availability() {
        let model = model();
        assert!(!model.reporter_eligible(StatisticType::Member));
        model.flags_mut(|flags| {
            flags.reporter_available.resolve(true);
            flags.modern_cluster.resolve(true);
        });
        assert!(model.reporter_eligible(StatisticType::Proxy));
    }

    #[test]
    fn disabled_reporter_setting_resolves_flag_false() {
        let mut settings = Settings::default();
        settings.disable_reporter = true;
        let model = StatsModel::new(settings);
        assert!(model.flags().reporter_available.is_false());
    }

    #[test]
    fn every_type_retrieves_on_first_cycle() {
        let model = model();
        model.flags_mut(|flags| flags.federation_configured.resolve(false));
        for ty in StatisticType::ALL {
            assert!(model.should_retrieve(ty, true), "{ty} skipped on first cycle");
        }
        assert!(!model.should_retrieve(StatisticType::FederationDestination, false));
    }

    #[test]
    fn unresolved_gate_still_retrieves() {
        let model = model();
        assert!(model.should_retrieve(StatisticType::Persistence, false));
        model.flags_mut(|flags| flags.persistence_configured.resolve(false));
        assert!(!model.should_retrieve(StatisticType::Persistence, false));
        assert!(!model.should_retrieve(StatisticType::PersistenceNotifications, false));
        assert!(model.should_retrieve(StatisticType::Member, false));
    }
}
