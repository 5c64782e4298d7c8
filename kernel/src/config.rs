use std::fmt;
use std::sync::OnceLock;

pub const DEFAULT_REDUCTION_FUEL: usize = 100_000;
pub const FUEL_ENV_VAR: &str = "TYCK_FUEL";

/// Where the active reduction budget came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelSource {
    Default,
    Environment,
    Override,
}

impl fmt::Display for FuelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelSource::Default => write!(f, "default"),
            FuelSource::Environment => write!(f, "{}", FUEL_ENV_VAR),
            FuelSource::Override => write!(f, "override"),
        }
    }
}

fn env_fuel() -> Option<usize> {
    static FROM_ENV: OnceLock<Option<usize>> = OnceLock::new();
    *FROM_ENV.get_or_init(|| {
        std::env::var(FUEL_ENV_VAR)
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .filter(|val| *val > 0)
    })
}

/// Budget for a single reduction or unification query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionConfig {
    pub fuel: usize,
    pub source: FuelSource,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        match env_fuel() {
            Some(fuel) => ReductionConfig {
                fuel,
                source: FuelSource::Environment,
            },
            None => ReductionConfig {
                fuel: DEFAULT_REDUCTION_FUEL,
                source: FuelSource::Default,
            },
        }
    }
}

impl ReductionConfig {
    /// An explicit positive budget wins over the environment.
    pub fn resolve(requested: Option<usize>) -> Self {
        match requested.filter(|fuel| *fuel > 0) {
            Some(fuel) => ReductionConfig {
                fuel,
                source: FuelSource::Override,
            },
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_budget_overrides() {
        let config = ReductionConfig::resolve(Some(42));
        assert_eq!(config.fuel, 42);
        assert_eq!(config.source, FuelSource::Override);
    }

    #[test]
    fn zero_budget_is_ignored() {
        let config = ReductionConfig::resolve(Some(0));
        assert_ne!(config.source, FuelSource::Override);
        assert!(config.fuel > 0);
    }
}
