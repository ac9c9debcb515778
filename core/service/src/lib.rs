pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod validation;

pub use config::ServiceConfig;
pub use database::Database;
pub use error::{NotesError, NotesResult};
pub use routes::{build_router, AppState};
