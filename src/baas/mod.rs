//! Port to the managed backend (auth, tables, object storage).
//!
//! Handlers only talk to [`Backend`]; the Supabase adapter and the in-memory
//! fake are interchangeable behind it.

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod models;
pub mod supabase;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use self::models::{
    AuthUser, NewArchivo, NewContactoProyecto, NewNota, Proyecto, TipoArchivo, TipoUsuario,
    Usuario, UsuarioProyecto,
};

/// Upload state written on remote header rows.
pub const ESTADO_SINCRONIZADO: &str = "sincronizado";

#[derive(Debug, Error)]
pub enum BackendError {
    /// The auth service rejected the access token.
    #[error("invalid token")]
    Unauthorized,
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Validate an access token and return its user.
    async fn get_user(&self, token: &str) -> Result<AuthUser, BackendError>;

    /// One-row probe of the `empresa` table.
    async fn sample_empresa(&self) -> Result<Vec<serde_json::Value>, BackendError>;

    async fn find_usuario(&self, id_usuario: Uuid) -> Result<Option<Usuario>, BackendError>;

    /// Projects of a company, ordered by id.
    async fn proyectos_by_empresa(&self, id_empresa: i64) -> Result<Vec<Proyecto>, BackendError>;

    async fn usuario_proyectos(
        &self,
        id_usuario: Uuid,
    ) -> Result<Vec<UsuarioProyecto>, BackendError>;

    async fn tipos_usuario(&self) -> Result<Vec<TipoUsuario>, BackendError>;

    async fn tipos_archivo(&self) -> Result<Vec<TipoArchivo>, BackendError>;

    /// Insert a header row and return its cloud id.
    async fn insert_archivo(&self, row: &NewArchivo) -> Result<i64, BackendError>;

    /// Store a JSON document in the record bucket.
    async fn upload_object(&self, path: &str, body: Vec<u8>) -> Result<(), BackendError>;

    async fn insert_nota(&self, row: &NewNota) -> Result<(), BackendError>;

    async fn insert_contacto_proyecto(&self, row: &NewContactoProyecto)
        -> Result<(), BackendError>;
}

/// Object storage key for an uploaded record.
pub fn storage_path(id_usuario: Uuid, kind: &str, id_archivo_cloud: i64) -> String {
    format!("{}/{}/{}.json", id_usuario, kind, id_archivo_cloud)
}
