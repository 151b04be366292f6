use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::connection::{ConnectionError, ConnectionErrorKind, ConnectionFactory, TenantHandle};
use crate::database::params::ConnectionParams;

type PendingHandle<H> = Shared<BoxFuture<'static, Result<H, ConnectionError>>>;

/// A live handle owned by the cache
struct CacheEntry<H> {
    handle: H,
    created_at: DateTime<Utc>,
    last_used: Instant,
}

enum Slot<H> {
    Ready(CacheEntry<H>),
    /// Creation in flight; every caller for the tenant awaits this future
    Pending { generation: u64, creation: PendingHandle<H> },
}

type Slots<H> = Arc<Mutex<HashMap<Uuid, Slot<H>>>>;

/// Introspection view of one cached handle
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub tenant_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
}

/// Per-tenant handle cache with single-flight creation.
///
/// At most one live handle exists per tenant. Creation runs in a spawned
/// task whose shared result is awaited by every concurrent caller, so all
/// of them observe the same handle or the same error no matter which caller
/// is cancelled. Clones share the same underlying cache.
pub struct TenantConnectionCache<F: ConnectionFactory> {
    factory: Arc<F>,
    slots: Slots<F::Handle>,
    next_generation: Arc<AtomicU64>,
}

impl<F: ConnectionFactory> Clone for TenantConnectionCache<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            slots: Arc::clone(&self.slots),
            next_generation: Arc::clone(&self.next_generation),
        }
    }
}

impl<F: ConnectionFactory> TenantConnectionCache<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Return the tenant's cached handle, or create it exactly once
    pub async fn get_or_create(&self, tenant_id: Uuid, params: &ConnectionParams) -> Result<F::Handle, ConnectionError> {
        let creation = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(&tenant_id) {
                Some(Slot::Ready(entry)) => {
                    entry.last_used = Instant::now();
                    return Ok(entry.handle.clone());
                }
                Some(Slot::Pending { creation, .. }) => {
                    debug!(%tenant_id, "Joining in-flight connection creation");
                    creation.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let creation = self.spawn_creation(tenant_id, generation, params.clone());
                    slots.insert(
                        tenant_id,
                        Slot::Pending {
                            generation,
                            creation: creation.clone(),
                        },
                    );
                    creation
                }
            }
        };

        creation.await
    }

    fn spawn_creation(&self, tenant_id: Uuid, generation: u64, params: ConnectionParams) -> PendingHandle<F::Handle> {
        let factory = Arc::clone(&self.factory);
        let slots = Arc::clone(&self.slots);

        let task = tokio::spawn(async move {
            let opened = factory.open_tenant_handle(&params).await;

            let mut slots = slots.lock().await;
            let still_pending = matches!(
                slots.get(&tenant_id),
                Some(Slot::Pending { generation: g, .. }) if *g == generation
            );

            match opened {
                Ok(handle) if still_pending => {
                    slots.insert(
                        tenant_id,
                        Slot::Ready(CacheEntry {
                            handle: handle.clone(),
                            created_at: Utc::now(),
                            last_used: Instant::now(),
                        }),
                    );
                    info!(%tenant_id, "Created tenant connection");
                    Ok(handle)
                }
                Ok(handle) => {
                    drop(slots);
                    handle.close().await;
                    debug!(%tenant_id, "Discarded connection invalidated during creation");
                    Err(ConnectionError::aborted())
                }
                Err(e) => {
                    if still_pending {
                        slots.remove(&tenant_id);
                    }
                    warn!(%tenant_id, error = %e, "Tenant connection failed");
                    Err(e)
                }
            }
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(ConnectionError::new(
                    ConnectionErrorKind::Other,
                    format!("connection task failed: {e}"),
                ))
            })
        }
        .boxed()
        .shared()
    }

    /// Remove and close the tenant's handle. A creation still in flight is
    /// discarded; no-op when nothing is cached.
    pub async fn invalidate(&self, tenant_id: Uuid) -> bool {
        let removed = self.slots.lock().await.remove(&tenant_id);
        match removed {
            Some(Slot::Ready(entry)) => {
                entry.handle.close().await;
                info!(%tenant_id, "Closed tenant connection");
                true
            }
            Some(Slot::Pending { .. }) => {
                debug!(%tenant_id, "Cancelled pending tenant connection");
                true
            }
            None => false,
        }
    }

    /// Close every cached handle; returns how many were closed
    pub async fn invalidate_all(&self) -> usize {
        let drained: Vec<(Uuid, Slot<F::Handle>)> = self.slots.lock().await.drain().collect();

        let mut closed = 0;
        for (tenant_id, slot) in drained {
            if let Slot::Ready(entry) = slot {
                entry.handle.close().await;
                debug!(%tenant_id, "Closed tenant connection");
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "Closed all tenant connections");
        }
        closed
    }

    /// Close handles idle for longer than `max_idle`. Pending creations are
    /// never touched: eviction and creation share the same lock.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let now = Instant::now();
        let evicted: Vec<(Uuid, F::Handle)> = {
            let mut slots = self.slots.lock().await;
            let idle: Vec<Uuid> = slots
                .iter()
                .filter_map(|(id, slot)| match slot {
                    Slot::Ready(entry) if now.duration_since(entry.last_used) > max_idle => Some(*id),
                    _ => None,
                })
                .collect();

            idle.into_iter()
                .filter_map(|id| match slots.remove(&id) {
                    Some(Slot::Ready(entry)) => Some((id, entry.handle)),
                    _ => None,
                })
                .collect()
        };

        let mut ids = Vec::with_capacity(evicted.len());
        for (tenant_id, handle) in evicted {
            handle.close().await;
            info!(%tenant_id, "Evicted idle tenant connection");
            ids.push(tenant_id);
        }
        ids
    }

    /// Periodically evict idle handles until the task is aborted
    pub fn spawn_eviction(&self, interval: Duration, max_idle: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = cache.evict_idle(max_idle).await;
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Idle eviction pass");
                }
            }
        })
    }

    /// Number of live handles
    pub async fn count(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub async fn list_tenant_ids(&self) -> BTreeSet<Uuid> {
        self.slots
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn entries(&self) -> Vec<CacheEntryInfo> {
        let now = Instant::now();
        let mut entries: Vec<CacheEntryInfo> = self
            .slots
            .lock()
            .await
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Ready(entry) => Some(CacheEntryInfo {
                    tenant_id: *id,
                    created_at: entry.created_at,
                    idle_secs: now.duration_since(entry.last_used).as_secs(),
                }),
                Slot::Pending { .. } => None,
            })
            .collect();
        entries.sort_by_key(|e| e.tenant_id);
        entries
    }
}
