//! Thread pool construction for cell workers

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tinsimp_core::{Error, Result};

/// Thread pool configuration for cell workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of threads to use (None = number of CPUs)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: Some(8 * 1024 * 1024), // 8MB stack
            thread_name_prefix: "tinsimp-cell".to_string(),
        }
    }
}

impl PoolConfig {
    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Threads the pool will actually run
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Build a dedicated thread pool from a configuration
pub fn build_thread_pool(config: &PoolConfig) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new().num_threads(config.effective_threads());

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    builder
        .build()
        .map_err(|e| Error::InvalidConfig(format!("Failed to create thread pool: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.num_threads, None);
        assert_eq!(config.stack_size, Some(8 * 1024 * 1024));
        assert!(config.effective_threads() >= 1);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::default()
            .with_threads(3)
            .with_stack_size(1024 * 1024)
            .with_thread_name_prefix("test");
        assert_eq!(config.effective_threads(), 3);
        assert_eq!(config.thread_name_prefix, "test");
    }

    #[test]
    fn test_build_thread_pool() {
        let pool = build_thread_pool(&PoolConfig::default().with_threads(2)).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("tinsimp-cell-"));
    }
}
