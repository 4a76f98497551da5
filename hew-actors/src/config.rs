//! Runtime configuration.
//!
//! Defaults come from the host (`available_parallelism`) and can be
//! overridden programmatically or through environment variables:
//!
//! | Variable             | Field            |
//! |----------------------|------------------|
//! | `HEW_WORKERS`        | `worker_count`   |
//! | `HEW_MAX_THROUGHPUT` | `max_throughput` |

use std::thread;

use crate::error::{Error, Result};

/// Upper bound on the worker pool size.
pub const MAX_WORKERS: usize = 256;

/// Messages an actor may process per resumption before yielding.
pub const DEFAULT_MAX_THROUGHPUT: usize = 300;

const FALLBACK_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Messages handled per resume before the actor is requeued.
    pub max_throughput: usize,
    /// Seed for each worker's initial steal victim. Random when `None`.
    pub steal_seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let worker_count = thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(FALLBACK_WORKERS)
            .min(MAX_WORKERS);
        Self {
            worker_count,
            max_throughput: DEFAULT_MAX_THROUGHPUT,
            steal_seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with `HEW_WORKERS` / `HEW_MAX_THROUGHPUT` applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a variable is set but does not
    /// parse as an unsigned integer.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(n) = parse_var("HEW_WORKERS", &lookup)? {
            self.worker_count = n;
        }
        if let Some(n) = parse_var("HEW_MAX_THROUGHPUT", &lookup)? {
            self.max_throughput = n;
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    #[must_use]
    pub fn with_max_throughput(mut self, n: usize) -> Self {
        self.max_throughput = n;
        self
    }

    #[must_use]
    pub fn with_steal_seed(mut self, seed: u64) -> Self {
        self.steal_seed = Some(seed);
        self
    }

    /// Reject configurations the scheduler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero throughput or a worker
    /// count outside `1..=MAX_WORKERS`.
    pub fn validate(&self) -> Result<()> {
        if self.max_throughput == 0 {
            return Err(Error::InvalidConfig("max_throughput must be > 0".into()));
        }
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(Error::InvalidConfig(format!(
                "worker_count must be in 1..={MAX_WORKERS}, got {}",
                self.worker_count
            )));
        }
        Ok(())
    }
}

fn parse_var(key: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<usize>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|_| Error::InvalidConfig(format!("{key}={raw} is not a valid count")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.worker_count >= 1);
        assert_eq!(cfg.max_throughput, DEFAULT_MAX_THROUGHPUT);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_throughput() {
        let cfg = RuntimeConfig::default().with_max_throughput(0);
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_worker_bounds() {
        assert!(RuntimeConfig::default().with_worker_count(0).validate().is_err());
        assert!(RuntimeConfig::default()
            .with_worker_count(MAX_WORKERS + 1)
            .validate()
            .is_err());
        RuntimeConfig::default()
            .with_worker_count(MAX_WORKERS)
            .validate()
            .unwrap();
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = RuntimeConfig::default()
            .apply_overrides(|key| match key {
                "HEW_WORKERS" => Some("3".into()),
                "HEW_MAX_THROUGHPUT" => Some(" 17 ".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(cfg.worker_count, 3);
        assert_eq!(cfg.max_throughput, 17);
    }

    #[test]
    fn env_garbage_is_an_error() {
        let err = RuntimeConfig::default()
            .apply_overrides(|key| (key == "HEW_WORKERS").then(|| "many".into()))
            .unwrap_err();
        assert!(err.to_string().contains("HEW_WORKERS=many"));
    }
}
