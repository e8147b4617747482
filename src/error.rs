// for error definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimiterError {
    /// Returned when a quota has a zero limit or a zero window
    #[error("Invalid window spec: {0}")]
    InvalidSpec(String),

    /// The counter store failed, timed out or returned garbage
    #[error("Store unavailable: {0}")]
    StoreUnavailable(StorageError),

    /// A store returned state that no atomic implementation could produce
    #[error("Store race detected: {0}")]
    StoreRace(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RateLimiterError {
    /// True when the failure came from the backend rather than the caller
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, RateLimiterError::StoreUnavailable(_))
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    RedisAuth(String),

    /// Redis command errors
    #[error("Redis command error: {0}")]
    RedisCommand(String),

    /// Data serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),

    /// The store did not answer within the configured timeout
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// The in-memory store is full of live keys
    #[error("Store capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A thread panicked while holding the store lock
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<StorageError> for RateLimiterError {
    fn from(err: StorageError) -> Self {
        RateLimiterError::StoreUnavailable(err)
    }
}

// Classify redis::RedisError into the matching StorageError
impl From<redis::RedisError> for RateLimiterError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            return RateLimiterError::StoreUnavailable(StorageError::Timeout(err.to_string()));
        }

        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                // authentication errors
                RateLimiterError::StoreUnavailable(StorageError::RedisAuth(err.to_string()))
            }
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                // Connection-related errors
                RateLimiterError::StoreUnavailable(StorageError::RedisConnection(err.to_string()))
            }
            redis::ErrorKind::TypeError => {
                RateLimiterError::StoreUnavailable(StorageError::Serialization(err.to_string()))
            }
            _ => {
                // Command/operation related errors
                RateLimiterError::StoreUnavailable(StorageError::RedisCommand(err.to_string()))
            }
        }
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, RateLimiterError>;
