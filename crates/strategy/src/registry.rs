use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Error, Result};
use tracing::debug;

use crate::strategies::{BollingerBreakout, MaRsi};
use crate::Strategy;

/// Lookup table from strategy identifier to implementation.
///
/// Built once at startup and read-only afterwards, so it can be shared
/// between tasks without locking.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Arc<dyn Strategy>>,
}

/// Collects strategies for a [`StrategyRegistry`]. Registering the same
/// identifier twice is an error.
#[derive(Default)]
pub struct RegistryBuilder {
    strategies: BTreeMap<&'static str, Arc<dyn Strategy>>,
}

impl RegistryBuilder {
    pub fn register<S: Strategy + 'static>(mut self, strategy: S) -> Result<Self> {
        let id = strategy.identifier();
        if self.strategies.contains_key(id) {
            return Err(Error::Config(format!("strategy '{id}' registered twice")));
        }
        debug!(strategy = id, "Registered strategy");
        self.strategies.insert(id, Arc::new(strategy));
        Ok(self)
    }

    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry { strategies: self.strategies }
    }
}

impl StrategyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding every strategy shipped with the bot.
    pub fn builtin() -> Result<Self> {
        Ok(Self::builder()
            .register(MaRsi)?
            .register(BollingerBreakout)?
            .build())
    }

    /// Resolve an identifier. Unknown names are `Error::Config` listing the
    /// registered identifiers.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies.get(id).cloned().ok_or_else(|| {
            Error::Config(format!(
                "unknown strategy '{id}', expected one of: {}",
                self.identifiers().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Registered identifiers in sorted order.
    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
