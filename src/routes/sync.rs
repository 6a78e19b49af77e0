/**
 * Sync Routes
 * Login-time catalog download and record uploads from field devices
 */
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::auth::require_auth;
use super::ApiError;
use crate::baas::models::{
    AuthUser, NewArchivo, NewContactoProyecto, NewNota, Proyecto, TipoArchivo, TipoUsuario,
    Usuario, UsuarioProyecto,
};
use crate::baas::{storage_path, Backend, ESTADO_SINCRONIZADO};
use crate::AppState;

const KIND_NOTA: &str = "nota";
const KIND_CONTACTO: &str = "contacto_proyecto";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSyncResponse {
    pub ok: bool,
    pub server_time: DateTime<Utc>,
    pub usuario: Usuario,
    pub proyectos_visibles: Vec<Proyecto>,
    pub usuario_proyecto: Vec<UsuarioProyecto>,
    pub tipo_usuario: Vec<TipoUsuario>,
    pub tipo_archivo: Vec<TipoArchivo>,
}

/// Body of POST /sync/nota. Every field is optional on the wire so that
/// absent fields can be reported together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotaSyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_archivo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuerpo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_creacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_proyecto: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tipo_archivo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_contacto_proyecto: Option<i64>,
}

/// Body of POST /sync/contacto-proyecto.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactoProyectoSyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_archivo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_contacto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_creacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_proyecto: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tipo_archivo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncUploadResponse {
    pub ok: bool,
    pub id_archivo_cloud: i64,
    /// Local id echoed back from the request.
    pub id_archivo: Option<i64>,
    pub path: String,
}

// ============================================================================
// Validation
// ============================================================================

/// Fields shared by every uploaded record header.
struct HeaderFields {
    fecha_creacion: String,
    id_proyecto: i64,
    id_tipo_archivo: i64,
}

fn present<T>(value: Option<T>, field: &'static str, missing: &mut Vec<&'static str>) -> Option<T> {
    if value.is_none() {
        missing.push(field);
    }
    value
}

fn present_text(
    value: Option<String>,
    field: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    present(value.filter(|v| !v.trim().is_empty()), field, missing)
}

fn header_fields(
    fecha_creacion: Option<String>,
    id_proyecto: Option<i64>,
    id_tipo_archivo: Option<i64>,
    missing: &mut Vec<&'static str>,
) -> Option<HeaderFields> {
    let fecha_creacion = present_text(fecha_creacion, "fecha_creacion", missing);
    let id_proyecto = present(id_proyecto, "id_proyecto", missing);
    let id_tipo_archivo = present(id_tipo_archivo, "id_tipo_archivo", missing);
    Some(HeaderFields {
        fecha_creacion: fecha_creacion?,
        id_proyecto: id_proyecto?,
        id_tipo_archivo: id_tipo_archivo?,
    })
}

/// Decode an upload body. Runs after authentication so a missing token is
/// reported before anything about the body.
fn parse_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, ApiError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
    if !is_json {
        return Err(ApiError::BadRequest(
            "Expected Content-Type: application/json".to_string(),
        ));
    }

    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

fn check_fecha(fecha_creacion: &str) -> Result<(), ApiError> {
    DateTime::parse_from_rfc3339(fecha_creacion)
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest(format!("Invalid fecha_creacion: {}", fecha_creacion)))
}

struct NotaUpload {
    header: HeaderFields,
    titulo: String,
    cuerpo: String,
}

impl NotaSyncRequest {
    fn validate(self) -> Result<NotaUpload, ApiError> {
        let mut missing = Vec::new();
        let titulo = present_text(self.titulo, "titulo", &mut missing);
        let cuerpo = present_text(self.cuerpo, "cuerpo", &mut missing);
        let header = header_fields(
            self.fecha_creacion,
            self.id_proyecto,
            self.id_tipo_archivo,
            &mut missing,
        );

        match (titulo, cuerpo, header) {
            (Some(titulo), Some(cuerpo), Some(header)) if missing.is_empty() => {
                check_fecha(&header.fecha_creacion)?;
                Ok(NotaUpload {
                    header,
                    titulo,
                    cuerpo,
                })
            }
            _ => Err(ApiError::MissingFields(missing)),
        }
    }
}

struct ContactoUpload {
    header: HeaderFields,
    id_contacto: String,
}

impl ContactoProyectoSyncRequest {
    fn validate(&self) -> Result<ContactoUpload, ApiError> {
        let mut missing = Vec::new();
        let id_contacto = present_text(self.id_contacto.clone(), "id_contacto", &mut missing);
        let header = header_fields(
            self.fecha_creacion.clone(),
            self.id_proyecto,
            self.id_tipo_archivo,
            &mut missing,
        );

        match (id_contacto, header) {
            (Some(id_contacto), Some(header)) if missing.is_empty() => {
                check_fecha(&header.fecha_creacion)?;
                Ok(ContactoUpload {
                    header,
                    id_contacto,
                })
            }
            _ => Err(ApiError::MissingFields(missing)),
        }
    }
}

// ============================================================================
// Upload pipeline
// ============================================================================

/// Steps (a) and (b) of every upload: header row, then the JSON document.
///
/// No step is undone when a later one fails; the first error is returned.
async fn store_header_and_blob(
    backend: &dyn Backend,
    user: &AuthUser,
    kind: &str,
    header: &HeaderFields,
    id_archivo_local: Option<i64>,
    document: serde_json::Value,
) -> Result<(i64, String), ApiError> {
    let id_archivo_cloud = backend
        .insert_archivo(&NewArchivo {
            id_usuario: user.id,
            id_proyecto: header.id_proyecto,
            id_tipo_archivo: header.id_tipo_archivo,
            fecha_creacion: header.fecha_creacion.clone(),
            estado_carga: ESTADO_SINCRONIZADO.to_string(),
            id_archivo_local,
        })
        .await?;

    let path = storage_path(user.id, kind, id_archivo_cloud);
    let body = serde_json::to_vec(&document)?;
    if let Err(e) = backend.upload_object(&path, body).await {
        tracing::warn!(id_archivo_cloud, path = %path, error = %e, "blob upload failed after header insert");
        return Err(e.into());
    }

    Ok((id_archivo_cloud, path))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sync/login
/// Profile, the company's projects, the user's project links and both catalogs
pub async fn sync_login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LoginSyncResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let backend = state.backend.as_ref();

    let usuario = backend
        .find_usuario(user.id)
        .await?
        .ok_or_else(|| ApiError::Server(format!("usuario {} not found", user.id)))?;

    let proyectos_visibles = backend.proyectos_by_empresa(usuario.id_empresa).await?;
    let usuario_proyecto = backend.usuario_proyectos(user.id).await?;
    let tipo_usuario = backend.tipos_usuario().await?;
    let tipo_archivo = backend.tipos_archivo().await?;

    tracing::info!(
        id_usuario = %user.id,
        proyectos = proyectos_visibles.len(),
        "login sync served"
    );

    Ok(Json(LoginSyncResponse {
        ok: true,
        server_time: Utc::now(),
        usuario,
        proyectos_visibles,
        usuario_proyecto,
        tipo_usuario,
        tipo_archivo,
    }))
}

/// POST /sync/nota
pub async fn sync_nota(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncUploadResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let payload: NotaSyncRequest = parse_body(&headers, &body)?;
    let id_archivo_local = payload.id_archivo;
    let id_contacto_proyecto = payload.id_contacto_proyecto;
    let nota = payload.validate()?;
    let backend = state.backend.as_ref();

    let document = serde_json::json!({
        "tipo": KIND_NOTA,
        "id_usuario": user.id,
        "id_archivo_local": id_archivo_local,
        "titulo": nota.titulo,
        "cuerpo": nota.cuerpo,
        "fecha_creacion": nota.header.fecha_creacion,
        "id_proyecto": nota.header.id_proyecto,
        "id_contacto_proyecto": id_contacto_proyecto,
    });

    let (id_archivo_cloud, path) =
        store_header_and_blob(backend, &user, KIND_NOTA, &nota.header, id_archivo_local, document)
            .await?;

    backend
        .insert_nota(&NewNota {
            id_archivo: id_archivo_cloud,
            titulo: nota.titulo,
            cuerpo: nota.cuerpo,
            id_contacto_proyecto,
            path_storage: path.clone(),
        })
        .await?;

    tracing::info!(id_usuario = %user.id, id_archivo_cloud, "nota synced");

    Ok(Json(SyncUploadResponse {
        ok: true,
        id_archivo_cloud,
        id_archivo: id_archivo_local,
        path,
    }))
}

/// POST /sync/contacto-proyecto
pub async fn sync_contacto_proyecto(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncUploadResponse>, ApiError> {
    let user = require_auth(&state, &headers).await?;
    let payload: ContactoProyectoSyncRequest = parse_body(&headers, &body)?;
    let contacto = payload.validate()?;
    let backend = state.backend.as_ref();

    let document = serde_json::json!({
        "tipo": KIND_CONTACTO,
        "id_usuario": user.id,
        "id_archivo_local": payload.id_archivo,
        "id_contacto": contacto.id_contacto,
        "fecha_creacion": contacto.header.fecha_creacion,
        "id_proyecto": contacto.header.id_proyecto,
        "cargo": payload.cargo,
        "organizacion": payload.organizacion,
        "observaciones": payload.observaciones,
    });

    let (id_archivo_cloud, path) = store_header_and_blob(
        backend,
        &user,
        KIND_CONTACTO,
        &contacto.header,
        payload.id_archivo,
        document,
    )
    .await?;

    backend
        .insert_contacto_proyecto(&NewContactoProyecto {
            id_archivo: id_archivo_cloud,
            id_contacto: contacto.id_contacto,
            cargo: payload.cargo,
            organizacion: payload.organizacion,
            observaciones: payload.observaciones,
            path_storage: path.clone(),
        })
        .await?;

    tracing::info!(id_usuario = %user.id, id_archivo_cloud, "contacto_proyecto synced");

    Ok(Json(SyncUploadResponse {
        ok: true,
        id_archivo_cloud,
        id_archivo: payload.id_archivo,
        path,
    }))
}
