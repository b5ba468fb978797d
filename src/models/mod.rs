pub mod credential;
pub mod todo;

pub use credential::{Credential, Identity, ProviderTag};
pub use todo::{NewTodo, Todo, TodoPatch};
