pub mod auth;
pub mod config;
pub mod detector;
pub mod error;
pub mod invalidation;
pub mod kickoff;
pub mod monitor;
pub mod notifier;
pub mod pipeline;
pub mod poller;
pub mod postgres_store;
pub mod server;
pub mod store;
pub mod types;
pub mod urls;

pub use config::PipelineConfig;
pub use error::{ApiError, ClientError, PipelineError, StoreError};
pub use pipeline::{Collaborators, Pipeline};
pub use store::{MatchStore, MemoryStore};
