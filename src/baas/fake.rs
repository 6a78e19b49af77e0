//! In-memory [`Backend`] used by tests and by downstream crates through the
//! `test-support` feature.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{
    AuthUser, NewArchivo, NewContactoProyecto, NewNota, Proyecto, TipoArchivo, TipoUsuario,
    Usuario, UsuarioProyecto,
};
use super::{Backend, BackendError};

/// Step at which the fake reports a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    GetUser,
    Reads,
    InsertArchivo,
    UploadObject,
    InsertDetail,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub tokens: HashMap<String, AuthUser>,
    pub empresas: Vec<serde_json::Value>,
    pub usuarios: Vec<Usuario>,
    pub proyectos: Vec<Proyecto>,
    pub usuario_proyecto: Vec<UsuarioProyecto>,
    pub tipos_usuario: Vec<TipoUsuario>,
    pub tipos_archivo: Vec<TipoArchivo>,
    pub archivos: Vec<(i64, NewArchivo)>,
    pub objects: HashMap<String, Vec<u8>>,
    pub notas: Vec<NewNota>,
    pub contactos: Vec<NewContactoProyecto>,
    pub fail_at: Option<FailAt>,
}

impl FakeState {
    /// Total rows and objects written so far.
    pub fn write_count(&self) -> usize {
        self.archivos.len() + self.objects.len() + self.notas.len() + self.contactos.len()
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with one company, one user holding `token`, two projects and
    /// both catalogs populated.
    pub async fn seeded(token: &str, user_id: Uuid) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock().await;
            state.tokens.insert(
                token.to_string(),
                AuthUser {
                    id: user_id,
                    email: Some("terreno@etnoapp.cl".to_string()),
                },
            );
            state
                .empresas
                .push(serde_json::json!({ "id_empresa": 1, "nombre_empresa": "Etno" }));
            state.usuarios.push(Usuario {
                id_usuario: user_id,
                nombre_real: Some("Ana Terreno".to_string()),
                nombre_user: Some("aterreno".to_string()),
                mail: Some("terreno@etnoapp.cl".to_string()),
                id_empresa: 1,
                id_rol_usuario: Some(2),
                activo: Some(true),
            });
            state.proyectos = vec![
                Proyecto {
                    id_proyecto: 1,
                    nombre_proyecto: "Linea base Atacama".to_string(),
                    titular: Some("Minera Norte".to_string()),
                    id_ubicacion: Some(10),
                    id_empresa: 1,
                },
                Proyecto {
                    id_proyecto: 2,
                    nombre_proyecto: "Consulta indigena Biobio".to_string(),
                    titular: None,
                    id_ubicacion: None,
                    id_empresa: 1,
                },
                Proyecto {
                    id_proyecto: 3,
                    nombre_proyecto: "Otra empresa".to_string(),
                    titular: None,
                    id_ubicacion: None,
                    id_empresa: 99,
                },
            ];
            state.usuario_proyecto.push(UsuarioProyecto {
                id_usuario: user_id,
                id_proyecto: 1,
            });
            state.tipos_usuario = vec![
                TipoUsuario {
                    id_tipo_usuario: 1,
                    nombre_tipo: "Antropologo".to_string(),
                },
                TipoUsuario {
                    id_tipo_usuario: 2,
                    nombre_tipo: "Asistente".to_string(),
                },
            ];
            state.tipos_archivo = vec![
                TipoArchivo {
                    id_tipo_archivo: 1,
                    nombre_tipo_archivo: "Audio".to_string(),
                },
                TipoArchivo {
                    id_tipo_archivo: 2,
                    nombre_tipo_archivo: "Contacto".to_string(),
                },
                TipoArchivo {
                    id_tipo_archivo: 3,
                    nombre_tipo_archivo: "Nota".to_string(),
                },
            ];
        }
        backend
    }

    pub async fn fail_at(&self, step: Option<FailAt>) {
        self.state.lock().await.fail_at = step;
    }
}

fn injected(step: FailAt) -> BackendError {
    BackendError::Status {
        status: 500,
        message: format!("injected failure at {:?}", step),
    }
}

fn check(state: &FakeState, step: FailAt) -> Result<(), BackendError> {
    if state.fail_at == Some(step) {
        Err(injected(step))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_user(&self, token: &str) -> Result<AuthUser, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::GetUser)?;
        state
            .tokens
            .get(token)
            .cloned()
            .ok_or(BackendError::Unauthorized)
    }

    async fn sample_empresa(&self) -> Result<Vec<serde_json::Value>, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::Reads)?;
        Ok(state.empresas.iter().take(1).cloned().collect())
    }

    async fn find_usuario(&self, id_usuario: Uuid) -> Result<Option<Usuario>, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::Reads)?;
        Ok(state
            .usuarios
            .iter()
            .find(|u| u.id_usuario == id_usuario)
            .cloned())
    }

    async fn proyectos_by_empresa(&self, id_empresa: i64) -> Result<Vec<Proyecto>, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::Reads)?;
        let mut rows: Vec<Proyecto> = state
            .proyectos
            .iter()
            .filter(|p| p.id_empresa == id_empresa)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.id_proyecto);
        Ok(rows)
    }

    async fn usuario_proyectos(
        &self,
        id_usuario: Uuid,
    ) -> Result<Vec<UsuarioProyecto>, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::Reads)?;
        Ok(state
            .usuario_proyecto
            .iter()
            .filter(|up| up.id_usuario == id_usuario)
            .cloned()
            .collect())
    }

    async fn tipos_usuario(&self) -> Result<Vec<TipoUsuario>, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::Reads)?;
        Ok(state.tipos_usuario.clone())
    }

    async fn tipos_archivo(&self) -> Result<Vec<TipoArchivo>, BackendError> {
        let state = self.state.lock().await;
        check(&state, FailAt::Reads)?;
        Ok(state.tipos_archivo.clone())
    }

    async fn insert_archivo(&self, row: &NewArchivo) -> Result<i64, BackendError> {
        let mut state = self.state.lock().await;
        check(&state, FailAt::InsertArchivo)?;
        let id = state.archivos.len() as i64 + 1000;
        state.archivos.push((id, row.clone()));
        Ok(id)
    }

    async fn upload_object(&self, path: &str, body: Vec<u8>) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        check(&state, FailAt::UploadObject)?;
        if state.objects.contains_key(path) {
            return Err(BackendError::Status {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        state.objects.insert(path.to_string(), body);
        Ok(())
    }

    async fn insert_nota(&self, row: &NewNota) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        check(&state, FailAt::InsertDetail)?;
        state.notas.push(row.clone());
        Ok(())
    }

    async fn insert_contacto_proyecto(
        &self,
        row: &NewContactoProyecto,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        check(&state, FailAt::InsertDetail)?;
        state.contactos.push(row.clone());
        Ok(())
    }
}
