//! In-memory lead store (single-process reference implementation).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{Lead, LeadId, StoreError, TenantId, Transition};
use crate::ports::{Clock, LeadFilter, LeadStore, LeadTx, SystemClock};

/// FIFO key: oldest `created_at` first, ties broken by id.
type RowKey = (DateTime<Utc>, LeadId);

/// Rows of one tenant.
///
/// - `rows` is the single source of truth, ordered for FIFO leasing.
/// - `by_id` maps an id back to its key.
#[derive(Default)]
struct TenantTable {
    rows: BTreeMap<RowKey, Lead>,
    by_id: HashMap<LeadId, DateTime<Utc>>,
}

impl TenantTable {
    fn put(&mut self, lead: Lead) {
        self.by_id.insert(lead.lead_id, lead.created_at);
        self.rows.insert((lead.created_at, lead.lead_id), lead);
    }

    fn remove(&mut self, key: &RowKey) -> Option<Lead> {
        self.by_id.remove(&key.1);
        self.rows.remove(key)
    }

    fn key_of(&self, id: &LeadId) -> Option<RowKey> {
        self.by_id.get(id).map(|created_at| (*created_at, *id))
    }

    /// Keys of matching rows in FIFO order.
    fn matching_keys(&self, filter: &LeadFilter) -> Vec<RowKey> {
        match &filter.lead_ids {
            // Point lookups instead of a full scan when ids are given.
            Some(ids) => {
                let mut keys: Vec<RowKey> = ids
                    .iter()
                    .filter_map(|id| self.key_of(id))
                    .filter(|key| self.rows.get(key).is_some_and(|lead| filter.matches(lead)))
                    .collect();
                keys.sort();
                keys.dedup();
                keys
            }
            None => self
                .rows
                .iter()
                .filter(|(_, lead)| filter.matches(lead))
                .map(|(key, _)| *key)
                .collect(),
        }
    }
}

#[derive(Default)]
struct InMemoryState {
    tenants: HashMap<TenantId, TenantTable>,
}

/// What to put back if a unit of work is dropped without commit.
enum Undo {
    Inserted { tenant: TenantId, key: RowKey },
    Updated { previous: Lead },
    Deleted { previous: Lead },
}

/// In-memory lead store.
///
/// A unit of work holds the whole table lock from `begin` until it is
/// committed or dropped, so `lease` never meets a row locked by someone else.
///
/// The store owns the clock: every queue sharing it sees the same time.
#[derive(Clone)]
pub struct InMemoryLeadStore {
    state: Arc<Mutex<InMemoryState>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Copy of every row of `tenant`, oldest first.
    pub async fn snapshot(&self, tenant: &TenantId) -> Vec<Lead> {
        let state = self.state.lock().await;
        state
            .tenants
            .get(tenant)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get(&self, tenant: &TenantId, id: LeadId) -> Option<Lead> {
        let state = self.state.lock().await;
        let table = state.tenants.get(tenant)?;
        let key = table.key_of(&id)?;
        table.rows.get(&key).cloned()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn begin(&self) -> Result<Box<dyn LeadTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryTx {
            guard,
            now: self.clock.now(),
            undo: Vec::new(),
            committed: false,
        }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<InMemoryState>,
    /// Read once under the lock, like a database transaction timestamp.
    now: DateTime<Utc>,
    undo: Vec<Undo>,
    committed: bool,
}

impl InMemoryTx {
    fn table(&self, tenant: &TenantId) -> Option<&TenantTable> {
        self.guard.tenants.get(tenant)
    }
}

#[async_trait]
impl LeadTx for InMemoryTx {
    async fn lock_tenant(&mut self, _tenant: &TenantId) -> Result<(), StoreError> {
        // The table lock taken in `begin` already serializes everyone.
        Ok(())
    }

    async fn now(&mut self) -> Result<DateTime<Utc>, StoreError> {
        Ok(self.now)
    }

    async fn count(&mut self, tenant: &TenantId, filter: &LeadFilter) -> Result<u64, StoreError> {
        Ok(self
            .table(tenant)
            .map(|table| table.matching_keys(filter).len() as u64)
            .unwrap_or(0))
    }

    async fn lease(
        &mut self,
        tenant: &TenantId,
        filter: &LeadFilter,
        limit: u32,
    ) -> Result<Vec<LeadId>, StoreError> {
        Ok(self
            .table(tenant)
            .map(|table| {
                table
                    .matching_keys(filter)
                    .into_iter()
                    .take(limit as usize)
                    .map(|(_, id)| id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &mut self,
        tenant: &TenantId,
        filter: &LeadFilter,
        transition: &Transition,
    ) -> Result<u64, StoreError> {
        let Some(table) = self.guard.tenants.get_mut(tenant) else {
            return Ok(0);
        };

        let mut changed = 0;
        for key in table.matching_keys(filter) {
            let Some(lead) = table.rows.get_mut(&key) else {
                continue;
            };
            let previous = lead.clone();
            if lead.apply(transition) {
                self.undo.push(Undo::Updated { previous });
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert(&mut self, lead: &Lead) -> Result<(), StoreError> {
        let table = self.guard.tenants.entry(lead.tenant_id.clone()).or_default();
        if table.by_id.contains_key(&lead.lead_id) {
            return Err(StoreError::Backend(format!(
                "duplicate lead_id {}",
                lead.lead_id
            )));
        }
        table.put(lead.clone());
        self.undo.push(Undo::Inserted {
            tenant: lead.tenant_id.clone(),
            key: (lead.created_at, lead.lead_id),
        });
        Ok(())
    }

    async fn fetch(&mut self, tenant: &TenantId, ids: &[LeadId]) -> Result<Vec<Lead>, StoreError> {
        let Some(table) = self.table(tenant) else {
            return Ok(Vec::new());
        };
        let filter = LeadFilter::new().ids(ids);
        Ok(table
            .matching_keys(&filter)
            .iter()
            .filter_map(|key| table.rows.get(key).cloned())
            .collect())
    }

    async fn delete(&mut self, tenant: &TenantId, filter: &LeadFilter) -> Result<u64, StoreError> {
        let Some(table) = self.guard.tenants.get_mut(tenant) else {
            return Ok(0);
        };
        let mut removed = 0;
        for key in table.matching_keys(filter) {
            if let Some(previous) = table.remove(&key) {
                self.undo.push(Undo::Deleted { previous });
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Roll back newest change first.
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Inserted { tenant, key } => {
                    if let Some(table) = self.guard.tenants.get_mut(&tenant) {
                        table.remove(&key);
                    }
                }
                Undo::Updated { previous } | Undo::Deleted { previous } => {
                    self.guard
                        .tenants
                        .entry(previous.tenant_id.clone())
                        .or_default()
                        .put(previous);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClaimToken, LeadStatus};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new("default").unwrap()
    }

    fn lead(created: DateTime<Utc>) -> Lead {
        Lead::new(
            LeadId::from_uuid(Uuid::new_v4()),
            tenant(),
            serde_json::json!({"n": created.timestamp()}),
            created,
            Duration::days(7),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    async fn seed(store: &InMemoryLeadStore, leads: &[Lead]) {
        let mut tx = store.begin().await.unwrap();
        for lead in leads {
            tx.insert(lead).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn lease_is_fifo_and_bounded() {
        let store = InMemoryLeadStore::new();
        // inserted out of order on purpose
        let late = lead(t0() + Duration::minutes(2));
        let early = lead(t0());
        let mid = lead(t0() + Duration::minutes(1));
        seed(&store, &[late.clone(), early.clone(), mid.clone()]).await;

        let mut tx = store.begin().await.unwrap();
        let ids = tx
            .lease(&tenant(), &LeadFilter::new().status(LeadStatus::New), 2)
            .await
            .unwrap();
        assert_eq!(ids, vec![early.lead_id, mid.lead_id]);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = InMemoryLeadStore::new();
        let kept = lead(t0());
        seed(&store, &[kept.clone()]).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&lead(t0() + Duration::minutes(1))).await.unwrap();
            let changed = tx
                .update(
                    &tenant(),
                    &LeadFilter::new().ids(&[kept.lead_id]),
                    &Transition::Claim {
                        token: ClaimToken::from_uuid(Uuid::new_v4()),
                        at: t0(),
                    },
                )
                .await
                .unwrap();
            assert_eq!(changed, 1);
            // no commit
        }

        let rows = store.snapshot(&tenant()).await;
        assert_eq!(rows, vec![kept]);
    }

    #[tokio::test]
    async fn rolled_back_delete_restores_rows() {
        let store = InMemoryLeadStore::new();
        let mut expired = lead(t0());
        expired.apply(&Transition::Expire);
        seed(&store, &[expired.clone()]).await;

        {
            let mut tx = store.begin().await.unwrap();
            let removed = tx
                .delete(&tenant(), &LeadFilter::new().status(LeadStatus::Expired))
                .await
                .unwrap();
            assert_eq!(removed, 1);
        }

        assert_eq!(store.get(&tenant(), expired.lead_id).await, Some(expired));
    }

    #[tokio::test]
    async fn update_skips_forbidden_edges() {
        let store = InMemoryLeadStore::new();
        let mut delivered = lead(t0());
        delivered.apply(&Transition::Claim {
            token: ClaimToken::from_uuid(Uuid::new_v4()),
            at: t0(),
        });
        delivered.apply(&Transition::Deliver { at: t0() });
        seed(&store, &[delivered.clone()]).await;

        let mut tx = store.begin().await.unwrap();
        let changed = tx
            .update(&tenant(), &LeadFilter::new(), &Transition::Expire)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(changed, 0);
        assert_eq!(store.get(&tenant(), delivered.lead_id).await, Some(delivered));
    }

    #[tokio::test]
    async fn duplicate_insert_is_an_error() {
        let store = InMemoryLeadStore::new();
        let row = lead(t0());
        seed(&store, &[row.clone()]).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert(&row).await.is_err());
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = InMemoryLeadStore::new();
        seed(&store, &[lead(t0())]).await;

        let other = TenantId::new("acme").unwrap();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count(&other, &LeadFilter::new()).await.unwrap(), 0);
        assert_eq!(tx.count(&tenant(), &LeadFilter::new()).await.unwrap(), 1);
    }
}
