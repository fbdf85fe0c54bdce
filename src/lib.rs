// CoFrame - repository import pipeline
// Root library module

pub mod classifier;
pub mod config;
pub mod fetcher;
pub mod filter;
pub mod importer;
pub mod observability;
pub mod store;
pub mod walker;

pub use observability::{init_logging, init_logging_with_level};

pub use classifier::{classify, CONTENT_TYPES, PLAINTEXT_LABEL};
pub use config::{AppConfig, DatabaseConfig, IngestConfig};
pub use fetcher::{FetchError, Fetcher, GitFetcher, ScratchSpace};
pub use filter::{ContentReader, FilterPolicy, FsContentReader, SkipReason};
pub use importer::{FileOutcome, ImportError, ImportStep, ImportSummary, Importer};
pub use store::{
    FileRow, MemoryProjectStore, NewFile, PgProjectStore, Project, ProjectId, ProjectStore,
    StoreError,
};
pub use walker::{walk, WalkEntry};
