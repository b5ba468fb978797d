//! Data access facade over the remote to-do collection.

mod error;
mod slot;
mod todo_client;

pub use error::ApiError;
pub use slot::CredentialSlot;
pub use todo_client::{remote_http_client, TodoApi, TodoClient};
