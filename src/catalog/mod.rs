//! Catalog reads through the cache, writes straight to the store.
//!
//! Reads are served by two caches: one keyed by entity id (absent entities are
//! cached as `None`), one keyed by the normalized list query, holding a page
//! together with its total match count. A write removes the point entry for
//! its id only; cached list pages stay as they are until their TTL runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{CacheKey, CacheLayer, CacheStats, DEFAULT_TTL};
use crate::database::DataStore;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{BoardGame, GamePatch};
use crate::query::{ListRequest, Page, QueryCompiler, QueryPlan};
use crate::security::{AccessPolicy, Decision, Operation, Principal};

/// A page of results and the paging it was produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub items: Vec<BoardGame>,
    pub page_index: usize,
    pub page_size: usize,
    pub record_count: usize,
}

pub struct CatalogService {
    store: Arc<dyn DataStore>,
    compiler: QueryCompiler,
    policy: AccessPolicy,
    entries: CacheLayer<Option<BoardGame>>,
    lists: CacheLayer<Page>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self::with_settings(store, QueryCompiler::default(), DEFAULT_TTL)
    }

    pub fn with_settings(store: Arc<dyn DataStore>, compiler: QueryCompiler, ttl: Duration) -> Self {
        Self {
            store,
            compiler,
            policy: AccessPolicy,
            entries: CacheLayer::new("entity", ttl),
            lists: CacheLayer::new("list", ttl),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> ServiceResult<Option<BoardGame>> {
        let store = &self.store;
        self.entries
            .get_or_compute(&entry_key(id), || store.get(id))
            .await
            .map_err(ServiceError::internal)
    }

    pub async fn list(&self, request: &ListRequest) -> ServiceResult<Listing> {
        let plan = self.compiler.compile(request)?;
        let store = &self.store;
        let page = self
            .lists
            .get_or_compute(&list_key(&plan), || store.query(&plan))
            .await
            .map_err(ServiceError::internal)?;

        Ok(Listing {
            items: page.items,
            page_index: plan.page_index(),
            page_size: plan.page_size(),
            record_count: page.record_count,
        })
    }

    /// Applies `patch` to the entry it names. Returns `None` if there is no
    /// such entry.
    pub async fn update(
        &self,
        principal: &Principal,
        patch: &GamePatch,
    ) -> ServiceResult<Option<BoardGame>> {
        self.authorize(principal, Operation::UpdateEntry)?;

        let updated = self
            .store
            .update(patch, Utc::now())
            .await
            .map_err(ServiceError::internal)?;

        if let Some(game) = &updated {
            self.entries.invalidate(&entry_key(game.id));
            tracing::info!(id = game.id, user = %principal.username, "catalog entry updated");
        }
        Ok(updated)
    }

    /// Removes the entry. Returns what was removed, or `None`.
    pub async fn delete(&self, principal: &Principal, id: i64) -> ServiceResult<Option<BoardGame>> {
        self.authorize(principal, Operation::DeleteEntry)?;

        let removed = self.store.remove(id).await.map_err(ServiceError::internal)?;
        self.entries.invalidate(&entry_key(id));

        if removed.is_some() {
            tracing::info!(id, user = %principal.username, "catalog entry deleted");
        }
        Ok(removed)
    }

    /// The list request a caller gets when it sends no parameters.
    pub fn default_list_request(&self) -> ListRequest {
        self.compiler.default_request()
    }

    /// Drops expired entries from both caches.
    pub fn purge_expired(&self) -> usize {
        self.entries.purge_expired() + self.lists.purge_expired()
    }

    pub fn entry_cache_stats(&self) -> CacheStats {
        self.entries.stats()
    }

    pub fn list_cache_stats(&self) -> CacheStats {
        self.lists.stats()
    }

    fn authorize(&self, principal: &Principal, operation: Operation) -> ServiceResult<()> {
        match self.policy.authorize(principal, operation) {
            Decision::Allow => Ok(()),
            Decision::Deny { required } => Err(ServiceError::Authorization { required }),
        }
    }
}

fn entry_key(id: i64) -> CacheKey {
    CacheKey::point("entity", id)
}

fn list_key(plan: &QueryPlan) -> CacheKey {
    CacheKey::new("list")
        .field("filterText", plan.needle())
        .field("sortColumn", plan.column().as_str())
        .field("sortOrder", plan.order().as_str())
        .field("pageIndex", plan.page_index())
        .field("pageSize", plan.page_size())
}
