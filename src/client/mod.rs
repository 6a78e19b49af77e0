//! Field-device side: HTTP client for the sync proxy, password sign-in against
//! the managed auth service, and the offline authoring flow built on
//! [`LocalStore`](crate::local::LocalStore).

pub mod auth;
pub mod flow;

use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::local::StoreError;
use crate::routes::auth::AuthMeResponse;
use crate::routes::sync::{
    ContactoProyectoSyncRequest, LoginSyncResponse, NotaSyncRequest, SyncUploadResponse,
};
use crate::routes::ErrorResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        missing: Vec<String>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no active session")]
    NoSession,
    #[error("no project selected")]
    NoContext,
}

/// Client for the sync proxy. Calls are unary; nothing is retried.
pub struct SyncClient {
    http: Client,
    base_url: String,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// POST /sync/login
    pub async fn sync_login(&self, token: &str) -> Result<LoginSyncResponse, ClientError> {
        self.send(Method::POST, "/sync/login", token, Some(&serde_json::json!({})))
            .await
    }

    /// GET /auth/me
    pub async fn auth_me(&self, token: &str) -> Result<AuthMeResponse, ClientError> {
        self.send::<(), _>(Method::GET, "/auth/me", token, None).await
    }

    pub async fn upload_nota(
        &self,
        token: &str,
        request: &NotaSyncRequest,
    ) -> Result<SyncUploadResponse, ClientError> {
        self.send(Method::POST, "/sync/nota", token, Some(request))
            .await
    }

    pub async fn upload_contacto_proyecto(
        &self,
        token: &str,
        request: &ContactoProyectoSyncRequest,
    ) -> Result<SyncUploadResponse, ClientError> {
        self.send(Method::POST, "/sync/contacto-proyecto", token, Some(request))
            .await
    }
}

/// Map a non-2xx response to [`ClientError::Rejected`], preferring the
/// `{ok: false, error}` envelope and falling back to the raw body.
async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (message, missing) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(envelope) => (envelope.error, envelope.missing.unwrap_or_default()),
        Err(_) => (text, Vec::new()),
    };

    tracing::warn!(status = status.as_u16(), %message, "proxy rejected request");
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
        missing,
    })
}

/// Serve the real router over a [`FakeBackend`](crate::baas::fake::FakeBackend)
/// on an ephemeral port and return its base URL.
#[cfg(test)]
pub(crate) async fn spawn_proxy(backend: std::sync::Arc<crate::baas::fake::FakeBackend>) -> String {
    let app = crate::routes(crate::AppState::new(backend));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
