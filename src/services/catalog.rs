//! Cache-backed catalog of components and endpoints.
//!
//! Entries are cached per key (organization, resource or endpoint filter)
//! with a TTL. Each key owns its own async mutex, so concurrent requests for
//! the same organization wait for a single in-flight refresh instead of
//! hammering the peer. A failed refresh falls back to a stale entry when one
//! exists.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::models::catalog::contribution;
use crate::models::{ALL_COMPONENTS, Component, Endpoint, EndpointFilter};
use crate::services::context::RequestContext;
use crate::services::peers::{ComponentService, EndpointService, OrganizationService};

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

type Slot<T> = Arc<Mutex<Option<Cached<T>>>>;

/// Expired entries outlive their TTL this many times over as a fallback for
/// failed refreshes, then are evicted.
const STALE_RETENTION: u32 = 10;

/// Keyed TTL cache with one refresh lock per key.
struct TtlCache<T> {
    ttl: Duration,
    slots: RwLock<HashMap<String, Slot<T>>>,
}

impl<T: Clone> TtlCache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &str) -> Slot<T> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        if !slots.contains_key(key) {
            self.evict_stale(&mut slots);
        }
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Drop slots nobody holds whose value is past retention or was never fetched.
    fn evict_stale(&self, slots: &mut HashMap<String, Slot<T>>) {
        let horizon = self.ttl * STALE_RETENTION;
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(entry) => entry
                    .as_ref()
                    .is_some_and(|cached| cached.fetched_at.elapsed() < horizon),
                Err(_) => true,
            }
        });
        if slots.len() != before {
            debug!(evicted = before - slots.len(), "Evicted stale catalog entries");
        }
    }

    async fn get_or_refresh<F, Fut>(&self, key: &str, refresh: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let slot = self.slot(key).await;
        let mut entry = slot.lock().await;
        if let Some(cached) = entry.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(cached.value.clone());
        }

        match refresh().await {
            Ok(value) => {
                *entry = Some(Cached {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(value)
            }
            Err(e) if e.is_transport() => match entry.as_ref() {
                Some(stale) => {
                    warn!("Catalog refresh failed for '{}', using stale entry: {}", key, e);
                    Ok(stale.value.clone())
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn invalidate(&self, key: &str) {
        self.slots.write().await.remove(key);
    }

    async fn invalidate_where(&self, predicate: impl Fn(&str) -> bool) {
        self.slots.write().await.retain(|k, _| !predicate(k));
    }
}

/// Components a request resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentScope {
    /// The request targets the whole sub-organization.
    pub all: bool,
    pub components: Vec<Component>,
}

impl ComponentScope {
    pub fn ids(&self) -> Vec<String> {
        self.components.iter().map(|c| c.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Catalog adapter over the organization, service and endpoint peers.
pub struct Catalog {
    organizations: Arc<dyn OrganizationService>,
    services: Arc<dyn ComponentService>,
    endpoints: Arc<dyn EndpointService>,
    chains: TtlCache<Vec<String>>,
    components: TtlCache<Vec<Component>>,
    endpoint_lists: TtlCache<Vec<Endpoint>>,
}

impl Catalog {
    pub fn new(
        organizations: Arc<dyn OrganizationService>,
        services: Arc<dyn ComponentService>,
        endpoints: Arc<dyn EndpointService>,
        ttl: Duration,
    ) -> Self {
        Self {
            organizations,
            services,
            endpoints,
            chains: TtlCache::new(ttl),
            components: TtlCache::new(ttl),
            endpoint_lists: TtlCache::new(ttl),
        }
    }

    /// `resource_id` and its ancestors.
    pub async fn parent_chain(&self, ctx: &RequestContext, resource_id: &str) -> AppResult<Vec<String>> {
        self.chains
            .get_or_refresh(resource_id, || self.organizations.parent_chain(ctx, resource_id))
            .await
    }

    /// Enabled components owned by `org_id`.
    pub async fn list_services(&self, ctx: &RequestContext, org_id: &str) -> AppResult<Vec<Component>> {
        let all = self
            .components
            .get_or_refresh(org_id, || self.services.list_services(ctx, org_id))
            .await?;
        Ok(all.into_iter().filter(|c| !c.disabled).collect())
    }

    pub async fn list_endpoints(
        &self,
        ctx: &RequestContext,
        filter: &EndpointFilter,
    ) -> AppResult<Vec<Endpoint>> {
        let key = endpoint_key(filter);
        self.endpoint_lists
            .get_or_refresh(&key, || self.endpoints.list_endpoints(ctx, filter))
            .await
    }

    /// Endpoints of the given contributions owned anywhere in the org chain.
    pub async fn endpoints_in_chain(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        contribution_ids: &[&str],
    ) -> AppResult<Vec<Endpoint>> {
        let chain: HashSet<String> = self.parent_chain(ctx, org_id).await?.into_iter().collect();
        let endpoints = self
            .list_endpoints(ctx, &EndpointFilter::contributions(contribution_ids))
            .await?;
        Ok(endpoints
            .into_iter()
            .filter(|e| chain.contains(&e.resource_id))
            .collect())
    }

    /// Environment id to display name for the org chain.
    pub async fn environment_names(
        &self,
        ctx: &RequestContext,
        org_id: &str,
    ) -> AppResult<HashMap<String, String>> {
        Ok(self
            .endpoints_in_chain(ctx, org_id, &[contribution::PLATFORM_ENVIRONMENT])
            .await?
            .into_iter()
            .map(|e| (e.id, e.name))
            .collect())
    }

    /// Collapse a component list against the sub-org's catalog.
    ///
    /// `None`, `ALL` anywhere in the list, or the sub-org id itself select
    /// every component. Explicit ids keep request order and drop unknowns.
    pub async fn resolve_components(
        &self,
        ctx: &RequestContext,
        sub_org_id: &str,
        component_list: Option<&[String]>,
    ) -> AppResult<ComponentScope> {
        let catalog = self.list_services(ctx, sub_org_id).await?;
        let all = match component_list {
            None => true,
            Some(ids) => ids.iter().any(|id| id == ALL_COMPONENTS || id == sub_org_id),
        };
        if all {
            return Ok(ComponentScope {
                all: true,
                components: catalog,
            });
        }

        let by_id: HashMap<&str, &Component> = catalog.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut seen = HashSet::new();
        let components = component_list
            .unwrap_or_default()
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| {
                let found = by_id.get(id.as_str()).map(|c| (*c).clone());
                if found.is_none() {
                    debug!("Component '{}' not in catalog of '{}'", id, sub_org_id);
                }
                found
            })
            .collect();
        Ok(ComponentScope {
            all: false,
            components,
        })
    }

    /// Drop every cached entry for an organization.
    pub async fn invalidate(&self, org_id: &str) {
        self.chains.invalidate(org_id).await;
        self.components.invalidate(org_id).await;
        // Endpoint keys embed the owning resource when filtered by one.
        let marker = format!("@{}", org_id);
        self.endpoint_lists
            .invalidate_where(|k| k.ends_with(&marker) || !k.contains('@'))
            .await;
    }
}

fn endpoint_key(filter: &EndpointFilter) -> String {
    let mut ids = filter.contribution_ids.clone();
    ids.sort();
    match &filter.resource_id {
        Some(resource) => format!("{}@{}", ids.join(","), resource),
        None => ids.join(","),
    }
}
