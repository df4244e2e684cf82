//! Veterinary clinic record service: owners, pets, vets, services, visits and appointments
//! behind a JWT-gated REST API.
//!
//! The core is the hook-driven [`service::CrudEngine`], the transactional
//! [`service::Scheduler`] and the [`sort::SortResolver`]. Storage sits behind
//! [`store::EntityStore`], with PostgreSQL and in-memory implementations.

pub mod auth;
pub mod case;
pub mod config;
pub mod dates;
pub mod dto;
pub mod error;
pub mod events;
pub mod extractors;
pub mod handlers;
pub mod hooks;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sort;
pub mod sql;
pub mod state;
pub mod store;

pub use auth::{AccessGate, CredentialIssuer, JwtGate, Principal};
pub use config::AppConfig;
pub use error::{AppError, ConfigError, StoreError};
pub use events::{EventSink, NoopSink, RecordingSink, TracingSink};
pub use migration::ensure_schema;
pub use routes::app_router;
pub use service::{CrudEngine, Scheduler};
pub use state::AppState;
pub use store::{EntityStore, MemoryStore, PgStore};
