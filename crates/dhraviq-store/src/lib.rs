pub mod database;
pub mod documents;
pub mod error;
pub mod health_checks;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod users;

pub use database::Database;
pub use documents::{DocumentStore, SqliteDocumentStore};
pub use error::StoreError;
pub use health_checks::HealthCheckRepo;
pub use sessions::SessionRepo;
pub use users::UserRepo;
