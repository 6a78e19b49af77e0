//! Row types of the local store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::baas::models::{Proyecto, TipoArchivo, TipoUsuario};

/// Upload state of a locally authored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstadoCarga {
    Pendiente,
    Sincronizado,
}

impl EstadoCarga {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoCarga::Pendiente => "pendiente",
            EstadoCarga::Sincronizado => "sincronizado",
        }
    }
}

impl std::fmt::Display for EstadoCarga {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LocalSession {
    pub id_usuario: String,
    pub token: String,
    pub last_verified_at: String,
    pub expires_at: String,
}

impl LocalSession {
    /// `None` when the stored value cannot be parsed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Expiry at or before `now`. An unreadable expiry is not detected as
    /// expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| expires_at <= now)
    }

    /// Readable expiry strictly after `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LocalProyecto {
    pub id_proyecto: i64,
    pub nombre_proyecto: String,
    pub activo: String,
    pub id_ubicacion: Option<i64>,
    pub id_empresa: i64,
}

impl From<&Proyecto> for LocalProyecto {
    /// Projects the proxy lists are the visible ones, so they are cached as active.
    fn from(p: &Proyecto) -> Self {
        Self {
            id_proyecto: p.id_proyecto,
            nombre_proyecto: p.nombre_proyecto.clone(),
            activo: "1".to_string(),
            id_ubicacion: p.id_ubicacion,
            id_empresa: p.id_empresa,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LocalTipoUsuario {
    pub id_tipo_usuario: i64,
    pub nombre_tipo: String,
}

impl From<&TipoUsuario> for LocalTipoUsuario {
    fn from(t: &TipoUsuario) -> Self {
        Self {
            id_tipo_usuario: t.id_tipo_usuario,
            nombre_tipo: t.nombre_tipo.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LocalTipoArchivo {
    pub id_tipo_archivo: i64,
    pub nombre_tipo_archivo: String,
}

impl From<&TipoArchivo> for LocalTipoArchivo {
    fn from(t: &TipoArchivo) -> Self {
        Self {
            id_tipo_archivo: t.id_tipo_archivo,
            nombre_tipo_archivo: t.nombre_tipo_archivo.clone(),
        }
    }
}

/// Selected project and acting role of a user.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LocalContext {
    pub id_usuario: String,
    pub id_proyecto: i64,
    pub id_tipo_usuario: i64,
    pub context_created_at: String,
}

/// Header row of a locally authored record.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LocalArchivo {
    pub id_archivo_local: i64,
    pub id_archivo_cloud: Option<String>,
    pub estado_carga: String,
    pub fecha_creacion: String,
    pub path_local: Option<String>,
    pub id_usuario: String,
    /// Project selected when the record was written. Empty on rows from
    /// older database files.
    pub id_proyecto: Option<i64>,
    pub id_tipo_archivo: i64,
}

/// Note joined with its header, as listed to the user.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct NotaLocal {
    pub id_archivo_local: i64,
    pub titulo: String,
    pub cuerpo: String,
    pub fecha_creacion: String,
    pub estado_carga: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ContactoLocal {
    pub id_archivo_local: i64,
    pub id_contacto: String,
    pub fecha_creacion: String,
    pub estado_carga: String,
}

/// Everything needed to upload a pending note.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PendingNota {
    pub id_archivo_local: i64,
    pub id_usuario: String,
    pub id_proyecto: Option<i64>,
    pub titulo: String,
    pub cuerpo: String,
    pub fecha_creacion: String,
    pub id_tipo_archivo: i64,
    pub id_contacto_proyecto: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PendingContacto {
    pub id_archivo_local: i64,
    pub id_usuario: String,
    pub id_proyecto: Option<i64>,
    pub id_contacto: String,
    pub fecha_creacion: String,
    pub id_tipo_archivo: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: &str) -> LocalSession {
        LocalSession {
            id_usuario: "u".to_string(),
            token: "t".to_string(),
            last_verified_at: Utc::now().to_rfc3339(),
            expires_at: expires_at.to_string(),
        }
    }

    #[test]
    fn test_session_in_past_is_expired() {
        let now = Utc::now();
        assert!(session(&(now - Duration::seconds(1)).to_rfc3339()).is_expired(now));
        assert!(!session(&(now + Duration::hours(1)).to_rfc3339()).is_expired(now));
    }

    #[test]
    fn test_session_expiring_exactly_now_is_expired() {
        let now = Utc::now();
        assert!(session(&now.to_rfc3339()).is_expired(now));
        assert!(!session(&now.to_rfc3339()).is_valid(now));
    }

    #[test]
    fn test_unparseable_expiry_is_neither_expired_nor_valid() {
        let now = Utc::now();
        assert!(!session("mañana").is_expired(now));
        assert!(!session("mañana").is_valid(now));
    }

    #[test]
    fn test_visible_project_cached_as_active() {
        let local = LocalProyecto::from(&Proyecto {
            id_proyecto: 5,
            nombre_proyecto: "P".to_string(),
            titular: None,
            id_ubicacion: None,
            id_empresa: 1,
        });
        assert_eq!(local.activo, "1");
    }
}
