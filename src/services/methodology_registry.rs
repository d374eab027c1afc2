//! Methodology registry.
//!
//! Holds the methodologies available to the engine and answers which pool a
//! mode draws from. This is the only component with state that outlives a
//! single run; it is handed to the engine explicitly rather than kept global.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    builtin_catalog, Methodology, MethodologyDescriptor, MethodologyId, ReviewMode,
};
use crate::domain::ports::MethodologyExecutor;

/// In-memory methodology registry.
#[derive(Debug, Default, Clone)]
pub struct MethodologyRegistry {
    methodologies: BTreeMap<MethodologyId, Methodology>,
}

impl MethodologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in methodologies of `mode`, attaching executors
    /// produced by `executor_for`.
    pub fn with_builtin<F>(mode: &ReviewMode, mut executor_for: F) -> DomainResult<Self>
    where
        F: FnMut(&MethodologyDescriptor) -> Arc<dyn MethodologyExecutor>,
    {
        let mut registry = Self::new();
        for descriptor in builtin_catalog(mode) {
            let executor = executor_for(&descriptor);
            registry.register(Methodology::new(descriptor, executor))?;
        }
        Ok(registry)
    }

    /// Register a methodology. Ids are unique across all modes.
    pub fn register(&mut self, methodology: Methodology) -> DomainResult<()> {
        let id = methodology.id().clone();
        if self.methodologies.contains_key(&id) {
            return Err(DomainError::DuplicateMethodology(id));
        }
        tracing::debug!(
            methodology = %id,
            modes = ?methodology.descriptor.modes,
            "registered methodology"
        );
        self.methodologies.insert(id, methodology);
        Ok(())
    }

    pub fn get(&self, id: &MethodologyId) -> Option<&Methodology> {
        self.methodologies.get(id)
    }

    pub fn len(&self) -> usize {
        self.methodologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methodologies.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &MethodologyDescriptor> {
        self.methodologies.values().map(|m| &m.descriptor)
    }

    /// Methodology ids registered for `mode`, sorted.
    ///
    /// Fails with a configuration error when the mode has no methodologies or
    /// fewer than `required_clean_passes`, since a distinct streak of that
    /// length could never be observed.
    pub fn pool_for(&self, mode: &ReviewMode, required_clean_passes: u32) -> DomainResult<Vec<MethodologyId>> {
        let pool: Vec<MethodologyId> = self
            .methodologies
            .values()
            .filter(|m| m.descriptor.modes.contains(mode))
            .map(|m| m.id().clone())
            .collect();
        Self::check_pool_size(mode, pool, required_clean_passes)
    }

    /// Resolve an explicit pool override against the mode's registered pool.
    pub fn restricted_pool(
        &self,
        mode: &ReviewMode,
        ids: &[MethodologyId],
        required_clean_passes: u32,
    ) -> DomainResult<Vec<MethodologyId>> {
        let mut pool = Vec::with_capacity(ids.len());
        for id in ids {
            let methodology = self
                .methodologies
                .get(id)
                .ok_or_else(|| DomainError::UnknownMethodology(id.clone()))?;
            if !methodology.descriptor.modes.contains(mode) {
                return Err(DomainError::InvalidConfig(format!(
                    "methodology {id} is not registered for mode {mode}"
                )));
            }
            if !pool.contains(id) {
                pool.push(id.clone());
            }
        }
        pool.sort();
        Self::check_pool_size(mode, pool, required_clean_passes)
    }

    fn check_pool_size(
        mode: &ReviewMode,
        pool: Vec<MethodologyId>,
        required_clean_passes: u32,
    ) -> DomainResult<Vec<MethodologyId>> {
        if pool.is_empty() {
            return Err(DomainError::EmptyPool(mode.clone()));
        }
        if pool.len() < required_clean_passes as usize {
            return Err(DomainError::UndersizedPool {
                mode: mode.clone(),
                available: pool.len(),
                required: required_clean_passes,
            });
        }
        Ok(pool)
    }
}
