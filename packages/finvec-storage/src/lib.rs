pub mod db;
pub mod models;
pub mod schema;
pub mod store;
pub mod tasks;
pub mod transactions;

mod error;

pub use error::Error;
pub use store::{TaskStore, TransactionStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
