//! Remote collection client — REST calls against `/todos`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::model::{NewTodo, TodoId, TodoItem, TodoPatch};
use crate::error::RemoteError;

/// Path of the collection under the API base.
const COLLECTION_PATH: &str = "/todos";

/// Request/response transport for the todo collection.
///
/// Implementations report any failure as the fixed error of the attempted
/// operation; callers never see status codes.
#[async_trait]
pub trait TodoApi: Send + Sync {
    /// GET the whole collection.
    async fn list(&self) -> Result<Vec<TodoItem>, RemoteError>;

    /// POST a new record and return what the server created.
    async fn create(&self, todo: &NewTodo) -> Result<TodoItem, RemoteError>;

    /// PUT the given fields onto a record.
    async fn replace(&self, id: TodoId, data: &TodoPatch) -> Result<(), RemoteError>;

    /// PATCH a record. Used by toggle.
    async fn patch(&self, id: TodoId, data: &TodoPatch) -> Result<(), RemoteError>;

    /// DELETE a record.
    async fn delete(&self, id: TodoId) -> Result<(), RemoteError>;
}

/// reqwest-backed implementation of [`TodoApi`].
pub struct HttpTodoApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTodoApi {
    /// Create a client for `base_url` (for example `https://jsonplaceholder.typicode.com`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    fn collection_url(&self) -> String {
        format!("{}{COLLECTION_PATH}", self.base_url)
    }

    fn record_url(&self, id: TodoId) -> String {
        format!("{}{COLLECTION_PATH}/{id}", self.base_url)
    }

    /// Send a request, discarding the body. Any failure becomes `err`.
    async fn send(&self, req: reqwest::RequestBuilder, err: RemoteError) -> Result<(), RemoteError> {
        let resp = req.send().await.map_err(|e| {
            debug!(error = %e, "Todo request failed");
            err
        })?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Todo request rejected");
            return Err(err);
        }
        Ok(())
    }

    /// Send a request and decode a JSON body. Any failure becomes `err`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        err: RemoteError,
    ) -> Result<T, RemoteError> {
        let resp = req.send().await.map_err(|e| {
            debug!(error = %e, "Todo request failed");
            err
        })?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Todo request rejected");
            return Err(err);
        }
        resp.json::<T>().await.map_err(|e| {
            debug!(error = %e, "Todo response could not be decoded");
            err
        })
    }
}

#[async_trait]
impl TodoApi for HttpTodoApi {
    async fn list(&self) -> Result<Vec<TodoItem>, RemoteError> {
        self.send_json(self.client.get(self.collection_url()), RemoteError::Fetch)
            .await
    }

    async fn create(&self, todo: &NewTodo) -> Result<TodoItem, RemoteError> {
        self.send_json(
            self.client.post(self.collection_url()).json(todo),
            RemoteError::Add,
        )
        .await
    }

    async fn replace(&self, id: TodoId, data: &TodoPatch) -> Result<(), RemoteError> {
        self.send(self.client.put(self.record_url(id)).json(data), RemoteError::Edit)
            .await
    }

    async fn patch(&self, id: TodoId, data: &TodoPatch) -> Result<(), RemoteError> {
        self.send(
            self.client.patch(self.record_url(id)).json(data),
            RemoteError::Toggle,
        )
        .await
    }

    async fn delete(&self, id: TodoId) -> Result<(), RemoteError> {
        self.send(self.client.delete(self.record_url(id)), RemoteError::Delete)
            .await
    }
}
