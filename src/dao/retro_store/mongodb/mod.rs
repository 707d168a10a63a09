mod config;
mod connection;
mod error;
mod models;
/// Transactional MongoDB implementation of the store trait.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoRetroStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::DuplicateKey { collection } => {
                StorageError::Conflict(format!("duplicate key in `{collection}`"))
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
