// library entry
pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod storage;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

// Re-export key components for convenience
pub use algorithms::{Algorithm, Verdict, WindowAlgorithm, WindowSpec};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{InMemoryConfig, LimiterConfig, RedisConfig};
pub use error::{RateLimiterError, Result, StorageError};
pub use limiter::{CheckOptions, RateLimiter};
pub use logging::init as init_logging;
pub use storage::{CounterSnapshot, CounterStore, MemoryStorage, RedisStorage};
