pub mod access;
pub mod config;
pub mod error;
pub mod index;
pub mod jobs;
pub mod model;
pub mod scanner;
pub mod search;
pub mod storage;

pub use access::{AccessContext, PathValidator, ResolvedPath};
pub use config::{AllowedDirectory, AppConfig, ExtensionPolicy};
pub use error::Error;
pub use index::{IndexSnapshot, IndexStore};
pub use jobs::{JobController, JobEvent, TriggerAck, ValidationReport};
pub use model::{
    FileCategory, FileRecord, IndexState, IndexStats, IndexStatus, JobKind, SearchResult,
};
pub use search::SearchService;
