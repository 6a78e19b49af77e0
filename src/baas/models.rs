//! Rows exchanged with the managed backend (auth user, reference tables, uploads).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User returned by the auth service for a valid access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// `public.usuario`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usuario {
    pub id_usuario: Uuid,
    pub nombre_real: Option<String>,
    pub nombre_user: Option<String>,
    pub mail: Option<String>,
    pub id_empresa: i64,
    pub id_rol_usuario: Option<i64>,
    pub activo: Option<bool>,
}

/// `public.proyecto`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proyecto {
    pub id_proyecto: i64,
    pub nombre_proyecto: String,
    pub titular: Option<String>,
    pub id_ubicacion: Option<i64>,
    pub id_empresa: i64,
}

/// `public.usuario_proyecto`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsuarioProyecto {
    pub id_usuario: Uuid,
    pub id_proyecto: i64,
}

/// `public.tipo_usuario`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipoUsuario {
    pub id_tipo_usuario: i64,
    pub nombre_tipo: String,
}

/// `public.tipo_archivo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipoArchivo {
    pub id_tipo_archivo: i64,
    pub nombre_tipo_archivo: String,
}

/// Header row written first for every uploaded record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArchivo {
    pub id_usuario: Uuid,
    pub id_proyecto: i64,
    pub id_tipo_archivo: i64,
    pub fecha_creacion: String,
    pub estado_carga: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_archivo_local: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNota {
    pub id_archivo: i64,
    pub titulo: String,
    pub cuerpo: String,
    pub id_contacto_proyecto: Option<i64>,
    pub path_storage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContactoProyecto {
    pub id_archivo: i64,
    pub id_contacto: String,
    pub cargo: Option<String>,
    pub organizacion: Option<String>,
    pub observaciones: Option<String>,
    pub path_storage: String,
}
