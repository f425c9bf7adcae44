use chrono::{DateTime, Utc};
use futures::future::{try_join, try_join_all};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::PassSettings;
use crate::db::{InventoryTx, Store};
use crate::dhcp::{normalize_lease, DhcpSource};
use crate::dns::{normalize_record, DnsSource};
use crate::error::ReconcileError;
use crate::models::*;

use super::{compute_change_set, resolve, ChangeSet};

/// Reconciler runs batch passes that sync upstream DHCP/DNS state into the inventory.
/// At most one pass runs at a time per process.
pub struct Reconciler {
    store: Store,
    dhcp: Arc<dyn DhcpSource>,
    dns: Option<Arc<dyn DnsSource>>,
    guard: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Store, dhcp: Arc<dyn DhcpSource>, dns: Option<Arc<dyn DnsSource>>) -> Self {
        Self {
            store,
            dhcp,
            dns,
            guard: Mutex::new(()),
        }
    }

    /// Run one full pass: fetch, normalize, resolve, diff and apply.
    /// Every pass that gets past the guard is written to run history.
    pub async fn run_pass(&self, settings: &PassSettings) -> Result<PassSummary, ReconcileError> {
        let _guard = self
            .guard
            .try_lock()
            .map_err(|_| ReconcileError::PassInProgress)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(
            "Reconciliation pass {} started: {} scope(s), DNS {}",
            run_id,
            settings.scopes.len(),
            if self.dns.is_some() { "enabled" } else { "disabled" }
        );

        let mut skipped = 0;
        let result = self.execute(&run_id, settings, &mut skipped).await;
        let finished_at = Utc::now();

        let run = match &result {
            Ok(summary) => {
                tracing::info!("Reconciliation pass {} finished: {}", run_id, summary);
                ReconcileRun::succeeded(summary, started_at, finished_at)
            }
            Err(e) => {
                tracing::error!("Reconciliation pass {} aborted in {} phase: {}", run_id, e.phase(), e);
                ReconcileRun::failed(&run_id, e.phase().as_str(), e.to_string(), skipped, started_at, finished_at)
            }
        };
        if let Err(e) = self.store.record_run(&run).await {
            tracing::warn!("Failed to record run {}: {}", run_id, e);
        }

        result
    }

    async fn execute(
        &self,
        run_id: &str,
        settings: &PassSettings,
        skipped: &mut usize,
    ) -> Result<PassSummary, ReconcileError> {
        let (raw_leases, raw_records) = self.fetch(settings).await?;

        let mut leases = Vec::with_capacity(raw_leases.len());
        for raw in &raw_leases {
            match normalize_lease(raw) {
                Ok(fact) => leases.push(fact),
                Err(e) => {
                    tracing::warn!("Skipping lease {} in scope {}: {}", raw.ip, raw.scope, e);
                    *skipped += 1;
                }
            }
        }

        let mut facts = Vec::with_capacity(raw_records.len());
        for raw in &raw_records {
            match normalize_record(raw) {
                Ok(fact) => facts.push(fact),
                Err(e) => {
                    tracing::warn!("Skipping {} record {} in zone {}: {}", raw.record_type, raw.name, raw.zone, e);
                    *skipped += 1;
                }
            }
        }

        let now = Utc::now();
        let resolved = resolve(&leases, &facts, settings.hostname_policy, now);
        if resolved.is_empty() {
            return Err(ReconcileError::EmptyResolution);
        }
        tracing::debug!(
            "Resolved {} client(s) from {} lease(s) and {} DNS record(s)",
            resolved.len(),
            leases.len(),
            facts.len()
        );

        let tx = self
            .store
            .begin_pass(run_id)
            .await
            .map_err(ReconcileError::begin)?;
        let changes = apply(tx, run_id, &resolved, settings.retire_after_misses, now)
            .await
            .map_err(ReconcileError::StorageTransaction)?;

        Ok(PassSummary {
            run_id: run_id.to_string(),
            inserted: changes.inserts.len(),
            updated: changes.updates.len(),
            reactivated: changes.reactivated(),
            refreshed: changes.refreshes.len(),
            retired: changes.retirements.len(),
            skipped: *skipped,
        })
    }

    /// Fetch every scope and zone concurrently; the first failure aborts the pass
    async fn fetch(&self, settings: &PassSettings) -> Result<(Vec<RawLease>, Vec<RawDnsRecord>), ReconcileError> {
        let dhcp = self.dhcp.as_ref();
        let lease_fetches = settings.scopes.iter().map(|scope| async move {
            dhcp.fetch_leases(scope)
                .await
                .map_err(|e| ReconcileError::dhcp(scope, e))
        });

        let mut lookups: Vec<(&str, RecordType)> = Vec::new();
        if let Some(zone) = settings.forward_zone.as_deref() {
            lookups.push((zone, RecordType::A));
        }
        for zone in &settings.reverse_zones {
            lookups.push((zone.as_str(), RecordType::Ptr));
        }

        let record_fetches: Vec<_> = match self.dns.as_deref() {
            Some(dns) => lookups
                .iter()
                .map(|&(zone, record_type)| async move {
                    dns.fetch_records(zone, record_type)
                        .await
                        .map_err(|e| ReconcileError::dns(zone, e))
                })
                .collect(),
            None => {
                if !lookups.is_empty() {
                    tracing::debug!("No DNS source configured, skipping {} zone lookup(s)", lookups.len());
                }
                Vec::new()
            }
        };

        let (lease_batches, record_batches) =
            try_join(try_join_all(lease_fetches), try_join_all(record_fetches)).await?;

        Ok((
            lease_batches.into_iter().flatten().collect(),
            record_batches.into_iter().flatten().collect(),
        ))
    }
}

/// Diff and write inside the pass transaction; any failure rolls it back
async fn apply(
    mut tx: InventoryTx,
    run_id: &str,
    resolved: &[ClientRecord],
    retire_after_misses: u32,
    now: DateTime<Utc>,
) -> anyhow::Result<ChangeSet> {
    match diff_and_write(&mut tx, resolved, retire_after_misses, now).await {
        Ok(changes) => {
            tx.commit().await?;
            Ok(changes)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                tracing::warn!("Rollback of pass {} failed: {}", run_id, rb);
            }
            Err(e)
        }
    }
}

async fn diff_and_write(
    tx: &mut InventoryTx,
    resolved: &[ClientRecord],
    retire_after_misses: u32,
    now: DateTime<Utc>,
) -> anyhow::Result<ChangeSet> {
    let current = tx.current_inventory().await?;
    let changes = compute_change_set(resolved, &current, retire_after_misses);
    for update in &changes.updates {
        tracing::debug!("Updating {}: {}", update.record.mac, update.changed.join(", "));
    }
    tx.apply_change_set(&changes, now).await?;
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    const SCOPE: &str = "10.0.0.0";
    const ZONE: &str = "corp.example";
    const REVERSE_ZONE: &str = "0.0.10.in-addr.arpa";

    #[derive(Default)]
    struct FakeDhcp {
        leases: StdMutex<Vec<RawLease>>,
        down: AtomicBool,
    }

    impl FakeDhcp {
        fn set(&self, leases: Vec<RawLease>) {
            *self.leases.lock().unwrap() = leases;
        }
    }

    #[async_trait]
    impl DhcpSource for FakeDhcp {
        async fn fetch_leases(&self, scope: &str) -> Result<Vec<RawLease>> {
            if self.down.load(Ordering::SeqCst) {
                bail!("connection refused");
            }
            Ok(self
                .leases
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.scope == scope)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeDns {
        records: StdMutex<Vec<RawDnsRecord>>,
    }

    #[async_trait]
    impl DnsSource for FakeDns {
        async fn fetch_records(&self, zone: &str, record_type: RecordType) -> Result<Vec<RawDnsRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.zone == zone && r.record_type == record_type)
                .cloned()
                .collect())
        }
    }

    fn lease(mac: &str, ip: &str, hostname: &str) -> RawLease {
        RawLease {
            scope: SCOPE.to_string(),
            ip: ip.to_string(),
            mac: mac.to_string(),
            hostname: Some(hostname.to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(8)),
            lease_kind: LeaseKind::Dynamic,
        }
    }

    fn a_record(name: &str, ip: &str) -> RawDnsRecord {
        RawDnsRecord {
            zone: ZONE.to_string(),
            name: name.to_string(),
            record_type: RecordType::A,
            data: ip.to_string(),
        }
    }

    fn ptr_record(last_octet: &str, target: &str) -> RawDnsRecord {
        RawDnsRecord {
            zone: REVERSE_ZONE.to_string(),
            name: last_octet.to_string(),
            record_type: RecordType::Ptr,
            data: target.to_string(),
        }
    }

    fn settings() -> PassSettings {
        PassSettings {
            scopes: vec![SCOPE.to_string()],
            forward_zone: Some(ZONE.to_string()),
            reverse_zones: vec![REVERSE_ZONE.to_string()],
            ..PassSettings::default()
        }
    }

    struct Harness {
        store: Store,
        dhcp: Arc<FakeDhcp>,
        dns: Arc<FakeDns>,
        reconciler: Reconciler,
    }

    async fn harness() -> Harness {
        let store = Store::in_memory().await.unwrap();
        let dhcp = Arc::new(FakeDhcp::default());
        let dns = Arc::new(FakeDns::default());
        let reconciler = Reconciler::new(
            store.clone(),
            dhcp.clone() as Arc<dyn DhcpSource>,
            Some(dns.clone() as Arc<dyn DnsSource>),
        );
        Harness {
            store,
            dhcp,
            dns,
            reconciler,
        }
    }

    fn two_clients() -> Vec<RawLease> {
        vec![
            lease("AA-00-00-00-00-01", "10.0.0.1", "host1"),
            lease("aa:00:00:00:00:02", "10.0.0.2", "host2"),
        ]
    }

    #[tokio::test]
    async fn test_first_pass_inserts_and_records_run() {
        let h = harness().await;
        h.dhcp.set(two_clients());

        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 0);

        let runs = h.store.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, summary.run_id);
        assert_eq!(runs[0].status, run_status::SUCCEEDED);
        assert_eq!(runs[0].inserted, 2);
    }

    #[tokio::test]
    async fn test_repeated_pass_is_idempotent() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings()).await.unwrap();
        let before: Vec<ClientRecord> = h
            .store
            .list_clients(true, 100, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.record)
            .collect();

        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.retired, 0);
        assert_eq!(summary.refreshed, 2);

        let after: Vec<ClientRecord> = h
            .store
            .list_clients(true, 100, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.record)
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_ip_reassignment_updates_in_place() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings()).await.unwrap();

        h.dhcp.set(vec![
            lease("aa:00:00:00:00:01", "10.0.0.50", "host1"),
            lease("aa:00:00:00:00:02", "10.0.0.2", "host2"),
        ]);
        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.updated, 1);

        assert_eq!(h.store.count_clients().await.unwrap(), 2);
        let client = h.store.get_client("aa:00:00:00:00:01").await.unwrap();
        assert_eq!(client.record.ip.to_string(), "10.0.0.50");
    }

    #[tokio::test]
    async fn test_duplicate_leases_yield_one_row() {
        let h = harness().await;
        let mut stale = lease("aa:00:00:00:00:01", "10.0.0.9", "host1");
        stale.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        h.dhcp.set(vec![stale, lease("aa:00:00:00:00:01", "10.0.0.1", "host1")]);

        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 1);
        let client = h.store.get_client("aa:00:00:00:00:01").await.unwrap();
        assert_eq!(client.record.ip.to_string(), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_retired_client_is_reactivated_in_place() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings()).await.unwrap();
        let first_seen = h.store.get_client("aa:00:00:00:00:02").await.unwrap().first_seen_at;

        h.dhcp.set(vec![lease("aa:00:00:00:00:01", "10.0.0.1", "host1")]);
        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.retired, 1);
        assert!(h.store.get_client("aa:00:00:00:00:02").await.unwrap().retired);

        h.dhcp.set(two_clients());
        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.reactivated, 1);
        assert_eq!(summary.inserted, 0);

        let client = h.store.get_client("aa:00:00:00:00:02").await.unwrap();
        assert!(!client.retired);
        assert!(client.retired_at.is_none());
        assert_eq!(client.first_seen_at, first_seen);
        assert_eq!(h.store.count_clients().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_resolution_retires_nothing() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings()).await.unwrap();

        h.dhcp.set(Vec::new());
        let err = h.reconciler.run_pass(&settings()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::EmptyResolution));

        let active = h.store.list_clients(false, 100, 0).await.unwrap();
        assert_eq!(active.len(), 2);
        let runs = h.store.list_runs(10).await.unwrap();
        assert_eq!(runs[0].status, run_status::FAILED);
        assert_eq!(runs[0].phase.as_deref(), Some("resolve"));
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_inventory_untouched() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings()).await.unwrap();
        let before = h.store.list_clients(true, 100, 0).await.unwrap();

        h.dhcp.down.store(true, Ordering::SeqCst);
        let err = h.reconciler.run_pass(&settings()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UpstreamUnavailable { origin: "dhcp", .. }));

        assert_eq!(h.store.list_clients(true, 100, 0).await.unwrap(), before);
        let runs = h.store.list_runs(10).await.unwrap();
        assert_eq!(runs[0].phase.as_deref(), Some("fetch"));
    }

    #[tokio::test]
    async fn test_malformed_lease_is_skipped() {
        let h = harness().await;
        h.dhcp.set(vec![
            lease("aa:00:00:00:00:01", "10.0.0.1", "host1"),
            lease("aa:00:00:00:00:02", "10.0.0.2", "host2"),
            lease("zz:zz:zz:zz:zz:zz", "10.0.0.3", "host3"),
            lease("aa:00:00:00:00:04", "10.0.0.4", "host4"),
        ]);

        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(h.store.count_clients().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_malformed_dns_record_is_skipped() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        *h.dns.records.lock().unwrap() = vec![
            a_record("host1", "10.0.0.1"),
            a_record("host2", "10.0.0.999"),
            ptr_record("1", "host1.corp.example."),
        ];

        let summary = h.reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);

        let host1 = h.store.get_client("aa:00:00:00:00:01").await.unwrap();
        assert!(host1.record.dns_consistent);
        let host2 = h.store.get_client("aa:00:00:00:00:02").await.unwrap();
        assert!(!host2.record.dns_consistent);

        let runs = h.store.list_runs(10).await.unwrap();
        assert_eq!(runs[0].status, run_status::SUCCEEDED);
        assert_eq!(runs[0].skipped, 1);
    }

    #[tokio::test]
    async fn test_dns_consistency_end_to_end() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        *h.dns.records.lock().unwrap() = vec![
            a_record("host1", "10.0.0.1"),
            ptr_record("1", "host1.corp.example."),
            a_record("host2", "10.0.0.2"),
            ptr_record("2", "printer.corp.example."),
        ];

        h.reconciler.run_pass(&settings()).await.unwrap();

        let host1 = h.store.get_client("aa:00:00:00:00:01").await.unwrap();
        assert_eq!(host1.record.hostname.as_deref(), Some("host1"));
        assert!(host1.record.dns_consistent);

        let host2 = h.store.get_client("aa:00:00:00:00:02").await.unwrap();
        assert_eq!(host2.record.hostname.as_deref(), Some("host2"));
        assert!(!host2.record.dns_consistent);
    }

    #[tokio::test]
    async fn test_pass_without_dns_source_uses_leases_only() {
        let store = Store::in_memory().await.unwrap();
        let dhcp = Arc::new(FakeDhcp::default());
        dhcp.set(two_clients());
        let reconciler = Reconciler::new(store.clone(), dhcp, None);

        let summary = reconciler.run_pass(&settings()).await.unwrap();
        assert_eq!(summary.inserted, 2);
        let client = store.get_client("aa:00:00:00:00:01").await.unwrap();
        assert_eq!(client.record.hostname.as_deref(), Some("host1"));
        assert!(!client.record.dns_consistent);
    }

    #[tokio::test]
    async fn test_mid_apply_failure_rolls_back() {
        let h = harness().await;
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings()).await.unwrap();
        let before = h.store.list_clients(true, 100, 0).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_client BEFORE INSERT ON clients \
             WHEN NEW.mac = 'aa:00:00:00:00:03' \
             BEGIN SELECT RAISE(ABORT, 'simulated failure'); END",
        )
        .execute(h.store.pool())
        .await
        .unwrap();

        // 00 is inserted before 03 fails; 01 would move and 02 would retire
        h.dhcp.set(vec![
            lease("aa:00:00:00:00:00", "10.0.0.10", "host0"),
            lease("aa:00:00:00:00:01", "10.0.0.11", "host1"),
            lease("aa:00:00:00:00:03", "10.0.0.13", "host3"),
        ]);
        let err = h.reconciler.run_pass(&settings()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::StorageTransaction(_)));

        assert_eq!(h.store.list_clients(true, 100, 0).await.unwrap(), before);
        let runs = h.store.list_runs(10).await.unwrap();
        assert_eq!(runs[0].phase.as_deref(), Some("store"));
    }

    #[tokio::test]
    async fn test_grace_period_delays_retirement() {
        let h = harness().await;
        let settings = PassSettings {
            retire_after_misses: 2,
            ..settings()
        };
        h.dhcp.set(two_clients());
        h.reconciler.run_pass(&settings).await.unwrap();

        h.dhcp.set(vec![lease("aa:00:00:00:00:01", "10.0.0.1", "host1")]);
        let summary = h.reconciler.run_pass(&settings).await.unwrap();
        assert_eq!(summary.retired, 0);
        let client = h.store.get_client("aa:00:00:00:00:02").await.unwrap();
        assert!(!client.retired);
        assert_eq!(client.missed_passes, 1);

        let summary = h.reconciler.run_pass(&settings).await.unwrap();
        assert_eq!(summary.retired, 1);
        assert!(h.store.get_client("aa:00:00:00:00:02").await.unwrap().retired);
    }

    #[tokio::test]
    async fn test_concurrent_pass_is_rejected() {
        let h = harness().await;
        h.dhcp.set(two_clients());

        let _held = h.reconciler.guard.lock().await;
        let err = h.reconciler.run_pass(&settings()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::PassInProgress));
        assert!(h.store.list_runs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pass_blocked_by_another_writer_fails_in_lock_phase() {
        let path = crate::db::temp_database_path();
        let other_process = Store::with_pool_size(&path, 1).await.unwrap();
        let store = Store::with_pool_size(&path, 1).await.unwrap();
        let dhcp = Arc::new(FakeDhcp::default());
        dhcp.set(two_clients());
        let reconciler = Reconciler::new(store.clone(), dhcp, None);

        let held = other_process.begin_pass("other-process").await.unwrap();
        // released after the pass has given up on the lock but before its history write times out
        let release = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(7)).await;
            held.rollback().await.unwrap();
        });

        let err = reconciler.run_pass(&settings()).await.unwrap_err();
        release.await.unwrap();
        assert!(matches!(err, ReconcileError::LockHeld(_)));
        assert_eq!(err.phase(), crate::error::Phase::Lock);

        assert_eq!(store.count_clients().await.unwrap(), 0);
        let runs = store.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].phase.as_deref(), Some("lock"));

        crate::db::remove_database(&path);
    }
}
