use std::sync::Arc;

use futures::FutureExt;

use super::query_cache::Fetch;
use super::{QueryCache, QueryKey, QueryResult};
use crate::client::{ApiError, TodoApi};
use crate::models::{NewTodo, Todo, TodoPatch};

/// Values held by the to-do cache: list queries and single items share one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoData {
    List(Vec<Todo>),
    Item(Todo),
}

impl TodoData {
    fn into_list(self) -> Option<Vec<Todo>> {
        match self {
            TodoData::List(todos) => Some(todos),
            TodoData::Item(_) => None,
        }
    }

    fn into_item(self) -> Option<Todo> {
        match self {
            TodoData::Item(todo) => Some(todo),
            TodoData::List(_) => None,
        }
    }
}

/// Cached reads over a [`TodoApi`], with mutations propagated into the cache
/// once the remote has accepted them. A failed mutation leaves the cache as it was.
#[derive(Clone)]
pub struct TodoQueries {
    api: Arc<dyn TodoApi>,
    cache: QueryCache<TodoData>,
}

impl TodoQueries {
    pub fn new(api: Arc<dyn TodoApi>, cache: QueryCache<TodoData>) -> Self {
        TodoQueries { api, cache }
    }

    pub fn cache(&self) -> &QueryCache<TodoData> {
        &self.cache
    }

    /// A read observes its key while it runs, so a sweep cannot drop the
    /// entry out from under a caller still waiting on it.
    async fn read<F>(&self, key: QueryKey, fetcher: F) -> QueryResult<TodoData>
    where
        F: FnOnce() -> Fetch<TodoData> + Send,
    {
        let _watch = self.cache.observe(&key);
        self.cache.fetch(&key, fetcher).await
    }

    pub async fn list_all(&self) -> QueryResult<Vec<Todo>> {
        let api = self.api.clone();
        self.read(QueryKey::todos(), move || {
            async move { api.list_all().await.map(TodoData::List) }.boxed()
        })
        .await
        .map(TodoData::into_list)
    }

    pub async fn get_by_id(&self, id: i64) -> QueryResult<Todo> {
        let api = self.api.clone();
        self.read(QueryKey::todo(id), move || {
            async move { api.get_by_id(id).await.map(TodoData::Item) }.boxed()
        })
        .await
        .map(TodoData::into_item)
    }

    pub async fn list_by_owner(&self, owner_id: i64) -> QueryResult<Vec<Todo>> {
        let api = self.api.clone();
        self.read(QueryKey::todos_by_owner(owner_id), move || {
            async move { api.list_by_owner(owner_id).await.map(TodoData::List) }.boxed()
        })
        .await
        .map(TodoData::into_list)
    }

    /// Creates remotely, then prepends to the full list (if cached) and
    /// invalidates the new owner's list. Never retried.
    pub async fn create(&self, todo: &NewTodo) -> Result<Todo, ApiError> {
        let created = self.api.create(todo).await?;

        self.cache.update(&QueryKey::todos(), |data| {
            if let TodoData::List(todos) = data {
                todos.insert(0, created.clone());
            }
        });
        self.cache
            .invalidate(&QueryKey::todos_by_owner(created.user_id));
        Ok(created)
    }

    /// Updates remotely, then replaces the item in its own entry and in the
    /// full list, and invalidates the owner's list (both owners if it moved).
    pub async fn update(&self, id: i64, patch: &TodoPatch) -> Result<Todo, ApiError> {
        let previous_owner = self.known_owner(id);
        let updated = self.api.update(id, patch).await?;

        self.cache
            .set(&QueryKey::todo(id), TodoData::Item(updated.clone()));
        self.cache.update(&QueryKey::todos(), |data| {
            if let TodoData::List(todos) = data {
                if let Some(slot) = todos.iter_mut().find(|t| t.id == id) {
                    *slot = updated.clone();
                }
            }
        });
        self.cache
            .invalidate(&QueryKey::todos_by_owner(updated.user_id));
        if let Some(owner) = previous_owner.filter(|o| *o != updated.user_id) {
            self.cache.invalidate(&QueryKey::todos_by_owner(owner));
        }
        Ok(updated)
    }

    /// Deletes remotely, then drops the item from the full list and its own
    /// entry, and invalidates the former owner's list. When the owner is not
    /// known locally every owner list is invalidated.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let previous_owner = self.known_owner(id);
        self.api.delete(id).await?;

        self.cache.update(&QueryKey::todos(), |data| {
            if let TodoData::List(todos) = data {
                todos.retain(|t| t.id != id);
            }
        });
        self.cache.remove(&QueryKey::todo(id));
        match previous_owner {
            Some(owner) => self.cache.invalidate(&QueryKey::todos_by_owner(owner)),
            None => self.cache.invalidate(&QueryKey::owner_family()),
        };
        Ok(())
    }

    fn known_owner(&self, id: i64) -> Option<i64> {
        if let Some(TodoData::Item(todo)) = self.cache.get(&QueryKey::todo(id)) {
            return Some(todo.user_id);
        }
        match self.cache.get(&QueryKey::todos()) {
            Some(TodoData::List(todos)) => todos.iter().find(|t| t.id == id).map(|t| t.user_id),
            _ => None,
        }
    }
}
