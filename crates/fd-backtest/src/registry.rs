//! Factor registry for discovery and introspection.
//!
//! The registry keeps factors in registration order. That order becomes the
//! column order of exposure tables, so it must be stable.

use crate::{BacktestError, Factor, Result};
use std::sync::Arc;

/// Metadata for factor introspection.
#[derive(Debug, Clone)]
pub struct FactorInfo {
    /// Factor name (unique identifier)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Required input columns
    pub required_columns: Vec<String>,
    /// Minimum observations per asset
    pub min_observations: usize,
}

/// Ordered registry of factors.
#[derive(Debug, Default, Clone)]
pub struct FactorRegistry {
    factors: Vec<Arc<dyn Factor>>,
}

impl FactorRegistry {
    /// Create a new empty registry.
    pub const fn new() -> Self {
        Self {
            factors: Vec::new(),
        }
    }

    /// Register the standard factors: Market, Size, Value, Momentum.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::factors::Market::default()));
        registry.register(Arc::new(crate::factors::Size));
        registry.register(Arc::new(crate::factors::Value));
        registry.register(Arc::new(crate::factors::Momentum::default()));
        registry
    }

    /// Register a factor, replacing one with the same name in place.
    pub fn register(&mut self, factor: Arc<dyn Factor>) {
        match self.factors.iter().position(|f| f.name() == factor.name()) {
            Some(index) => self.factors[index] = factor,
            None => self.factors.push(factor),
        }
    }

    /// Registry restricted to the named factors, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let factors = names
            .iter()
            .map(|name| {
                self.factors
                    .iter()
                    .find(|f| f.name() == *name)
                    .cloned()
                    .ok_or_else(|| BacktestError::UnknownFactor((*name).to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { factors })
    }

    /// Get a factor by name.
    pub fn get(&self, name: &str) -> Option<&dyn Factor> {
        self.factors
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// Factors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Factor> {
        self.factors.iter().map(|f| f.as_ref())
    }

    /// Get all factor metadata.
    pub fn all_info(&self) -> Vec<FactorInfo> {
        self.factors
            .iter()
            .map(|f| FactorInfo {
                name: f.name().to_string(),
                description: f.description().to_string(),
                required_columns: f.required_columns().iter().map(|s| s.to_string()).collect(),
                min_observations: f.min_observations(),
            })
            .collect()
    }

    /// Get all factor names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.factors.iter().map(|f| f.name()).collect()
    }

    /// Number of registered factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}
