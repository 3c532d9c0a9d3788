pub mod extraction;
pub mod fields;
pub mod hash;
pub mod processor;
pub mod watcher;

pub use extraction::*;
pub use fields::*;
pub use hash::*;
pub use processor::*;
pub use watcher::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),
}
