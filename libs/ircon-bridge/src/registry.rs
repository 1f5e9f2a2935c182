//! Registry of shared device states, keyed by table identifier
//!
//! Fetch-or-create is atomic per key, so concurrent opens of the same
//! identifier always end up holding the same share.

use std::sync::Arc;

use dashmap::DashMap;
use errors::Result;
use tracing::{debug, info};

use crate::address::AddressResolver;
use crate::connection::ConnectionSettings;
use crate::share::SharedDeviceState;

#[derive(Debug)]
pub struct ShareRegistry {
    shares: DashMap<String, Arc<SharedDeviceState>>,
    resolver: AddressResolver,
    settings: ConnectionSettings,
}

impl ShareRegistry {
    pub fn new(resolver: AddressResolver, settings: ConnectionSettings) -> Self {
        Self {
            shares: DashMap::new(),
            resolver,
            settings,
        }
    }

    /// Return the share for `identifier`, creating it on first use.
    ///
    /// The identifier is resolved before the map is touched: an unparsable
    /// identifier never creates a share.
    pub fn get_or_create(&self, identifier: &str) -> Result<Arc<SharedDeviceState>> {
        if let Some(existing) = self.shares.get(identifier) {
            return Ok(Arc::clone(existing.value()));
        }

        let address = self.resolver.parse(identifier)?;
        let share = self
            .shares
            .entry(identifier.to_string())
            .or_insert_with(|| {
                debug!("Creating share {} -> {}", identifier, address);
                Arc::new(SharedDeviceState::new(
                    identifier,
                    address,
                    self.settings.clone(),
                ))
            })
            .value()
            .clone();
        Ok(share)
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<SharedDeviceState>> {
        self.shares.get(identifier).map(|s| Arc::clone(s.value()))
    }

    /// Forget the share for `identifier`.
    ///
    /// Accessors that still hold it keep working on the detached instance;
    /// the next open gets a fresh share with a fresh connection lifetime.
    pub fn release(&self, identifier: &str) -> Option<Arc<SharedDeviceState>> {
        let removed = self.shares.remove(identifier).map(|(_, share)| share);
        if removed.is_some() {
            info!("Released share {}", identifier);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shares.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }
}
