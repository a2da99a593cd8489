use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{Minutes, Service};

/// Why a service selection can't be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogError {
    /// Referenced service id not found or inactive.
    UnknownService(Ulid),
    /// Empty selection or zero aggregate duration.
    EmptySelection,
}

/// The shop's service menu. Pure lookup — aggregation has no side effects,
/// and edits apply prospectively only (committed appointments carry frozen
/// duration and price).
pub struct ServiceCatalog {
    services: DashMap<Ulid, Service>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.services.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    /// Insert or replace a service definition.
    pub fn upsert(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    /// Mark a service inactive. Returns false if the id is unknown.
    pub fn retire(&self, id: &Ulid) -> bool {
        match self.services.get_mut(id) {
            Some(mut e) => {
                e.value_mut().active = false;
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<Service> {
        let mut out: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// Aggregate duration of a multi-service selection, in minutes.
    /// Duplicated ids count twice.
    pub fn total_duration(&self, ids: &[Ulid]) -> Result<Minutes, CatalogError> {
        self.sum(ids, |s| s.duration_min as Minutes)
            .and_then(|total| {
                if total == 0 {
                    Err(CatalogError::EmptySelection)
                } else {
                    Ok(total)
                }
            })
    }

    /// Aggregate price of a multi-service selection, in minor units.
    pub fn total_price(&self, ids: &[Ulid]) -> Result<u32, CatalogError> {
        self.sum(ids, |s| s.price_cents as Minutes).map(|t| t as u32)
    }

    fn sum(&self, ids: &[Ulid], f: impl Fn(&Service) -> Minutes) -> Result<Minutes, CatalogError> {
        if ids.is_empty() {
            return Err(CatalogError::EmptySelection);
        }
        let mut total: Minutes = 0;
        for id in ids {
            let entry = self
                .services
                .get(id)
                .ok_or(CatalogError::UnknownService(*id))?;
            if !entry.value().active {
                return Err(CatalogError::UnknownService(*id));
            }
            total += f(entry.value());
        }
        Ok(total)
    }
}
