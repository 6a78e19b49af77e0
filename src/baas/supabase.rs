//! Reqwest-backed Supabase adapter.
//!
//! Talks to the auth (`/auth/v1`), PostgREST (`/rest/v1`) and storage
//! (`/storage/v1`) surfaces with the service role key.

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::models::{
    AuthUser, NewArchivo, NewContactoProyecto, NewNota, Proyecto, TipoArchivo, TipoUsuario,
    Usuario, UsuarioProyecto,
};
use super::{Backend, BackendError};
use crate::config::AppConfig;

const USUARIO_COLUMNS: &str =
    "id_usuario,nombre_real,nombre_user,mail,id_empresa,id_rol_usuario,activo";

#[derive(Debug, Deserialize)]
struct InsertedArchivo {
    id_archivo: i64,
}

/// Error body shapes returned by PostgREST, GoTrue and storage.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

pub struct SupabaseBackend {
    http: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseBackend {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: config.supabase_url.clone(),
            service_key: config.service_role_key.clone(),
            bucket: config.storage_bucket.clone(),
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let response = self
            .request(Method::GET, self.table_url(table))
            .query(query)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = ensure_success(response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| BackendError::Decode(format!("{}: {}", table, e)))
    }

    async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<Response, BackendError> {
        let response = self
            .request(Method::POST, self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        ensure_success(response).await
    }
}

/// Turn a non-2xx response into [`BackendError::Status`] carrying the
/// backend's own message.
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.msg).or(body.error))
        .unwrap_or(text);

    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn get_user(&self, token: &str) -> Result<AuthUser, BackendError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await?;

        if matches!(
            response.status(),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
        ) {
            return Err(BackendError::Unauthorized);
        }

        let response = ensure_success(response).await?;
        response
            .json::<AuthUser>()
            .await
            .map_err(|e| BackendError::Decode(format!("auth user: {}", e)))
    }

    async fn sample_empresa(&self) -> Result<Vec<serde_json::Value>, BackendError> {
        self.select(
            "empresa",
            &[("select", "*".to_string()), ("limit", "1".to_string())],
        )
        .await
    }

    async fn find_usuario(&self, id_usuario: Uuid) -> Result<Option<Usuario>, BackendError> {
        let rows: Vec<Usuario> = self
            .select(
                "usuario",
                &[
                    ("select", USUARIO_COLUMNS.to_string()),
                    ("id_usuario", format!("eq.{}", id_usuario)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn proyectos_by_empresa(&self, id_empresa: i64) -> Result<Vec<Proyecto>, BackendError> {
        self.select(
            "proyecto",
            &[
                (
                    "select",
                    "id_proyecto,nombre_proyecto,titular,id_ubicacion,id_empresa".to_string(),
                ),
                ("id_empresa", format!("eq.{}", id_empresa)),
                ("order", "id_proyecto.asc".to_string()),
            ],
        )
        .await
    }

    async fn usuario_proyectos(
        &self,
        id_usuario: Uuid,
    ) -> Result<Vec<UsuarioProyecto>, BackendError> {
        self.select(
            "usuario_proyecto",
            &[
                ("select", "id_usuario,id_proyecto".to_string()),
                ("id_usuario", format!("eq.{}", id_usuario)),
            ],
        )
        .await
    }

    async fn tipos_usuario(&self) -> Result<Vec<TipoUsuario>, BackendError> {
        self.select(
            "tipo_usuario",
            &[
                ("select", "id_tipo_usuario,nombre_tipo".to_string()),
                ("order", "id_tipo_usuario.asc".to_string()),
            ],
        )
        .await
    }

    async fn tipos_archivo(&self) -> Result<Vec<TipoArchivo>, BackendError> {
        self.select(
            "tipo_archivo",
            &[
                ("select", "id_tipo_archivo,nombre_tipo_archivo".to_string()),
                ("order", "id_tipo_archivo.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_archivo(&self, row: &NewArchivo) -> Result<i64, BackendError> {
        let rows: Vec<InsertedArchivo> = self
            .insert("archivo", row)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("archivo insert: {}", e)))?;

        rows.first()
            .map(|r| r.id_archivo)
            .ok_or_else(|| BackendError::Decode("archivo insert returned no rows".to_string()))
    }

    async fn upload_object(&self, path: &str, body: Vec<u8>) -> Result<(), BackendError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let response = self
            .request(Method::POST, url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-upsert", "false")
            .body(body)
            .send()
            .await?;

        ensure_success(response).await.map(|_| ())
    }

    async fn insert_nota(&self, row: &NewNota) -> Result<(), BackendError> {
        self.insert("nota", row).await.map(|_| ())
    }

    async fn insert_contacto_proyecto(
        &self,
        row: &NewContactoProyecto,
    ) -> Result<(), BackendError> {
        self.insert("contacto_proyecto", row).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SupabaseBackend {
        let config = AppConfig::from_lookup(|key| match key {
            "SUPABASE_URL" => Some("https://demo.supabase.co/".to_string()),
            "SUPABASE_SERVICE_ROLE_KEY" => Some("service".to_string()),
            _ => None,
        })
        .unwrap();
        SupabaseBackend::new(&config).unwrap()
    }

    #[test]
    fn test_table_url_uses_rest_prefix() {
        assert_eq!(
            backend().table_url("usuario"),
            "https://demo.supabase.co/rest/v1/usuario"
        );
    }

    #[test]
    fn test_error_body_prefers_message_field() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"message":"duplicate key","code":"23505"}"#).unwrap();
        assert_eq!(body.message.as_deref(), Some("duplicate key"));
    }

    async fn mock_backend(app: axum::Router) -> SupabaseBackend {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = AppConfig::from_lookup(|key| match key {
            "SUPABASE_URL" => Some(url.clone()),
            "SUPABASE_SERVICE_ROLE_KEY" => Some("service".to_string()),
            _ => None,
        })
        .unwrap();
        SupabaseBackend::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_rejected_token_maps_to_unauthorized() {
        use axum::{http::StatusCode, routing::get};
        let app = axum::Router::new().route(
            "/auth/v1/user",
            get(|| async { (StatusCode::UNAUTHORIZED, "{\"msg\":\"bad jwt\"}") }),
        );
        let err = mock_backend(app).await.get_user("tok").await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthorized));
    }

    #[tokio::test]
    async fn test_insert_archivo_returns_generated_id() {
        use axum::{routing::post, Json};
        let app = axum::Router::new().route(
            "/rest/v1/archivo",
            post(|Json(row): Json<serde_json::Value>| async move {
                assert_eq!(row["estado_carga"], "sincronizado");
                Json(serde_json::json!([{ "id_archivo": 55 }]))
            }),
        );
        let id = mock_backend(app)
            .await
            .insert_archivo(&NewArchivo {
                id_usuario: Uuid::nil(),
                id_proyecto: 1,
                id_tipo_archivo: 3,
                fecha_creacion: "2025-01-15T10:30:00Z".to_string(),
                estado_carga: "sincronizado".to_string(),
                id_archivo_local: None,
            })
            .await
            .unwrap();
        assert_eq!(id, 55);
    }

    #[tokio::test]
    async fn test_storage_conflict_carries_backend_message() {
        use axum::{http::StatusCode, routing::post};
        let app = axum::Router::new().route(
            "/storage/v1/object/EtnoApp/{*path}",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    "{\"error\":\"Duplicate\",\"message\":\"The resource already exists\"}",
                )
            }),
        );
        let err = mock_backend(app)
            .await
            .upload_object("u/nota/1.json", b"{}".to_vec())
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "The resource already exists");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_auth_user_tolerates_extra_fields() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000001","aud":"authenticated","email":"a@b.cl"}"#,
        )
        .unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.cl"));
    }
}
