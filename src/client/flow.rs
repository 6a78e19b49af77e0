//! Offline authoring flow: sign in once, pick a project and role, write
//! records locally, and push them to the proxy when asked.

use serde::Serialize;

use super::auth::AuthSession;
use super::{ClientError, SyncClient};
use crate::local::models::{
    LocalContext, LocalProyecto, LocalSession, LocalTipoArchivo, LocalTipoUsuario, PendingContacto,
    PendingNota,
};
use crate::local::{LocalStore, StoreError};
use crate::routes::sync::{
    ContactoProyectoSyncRequest, LoginSyncResponse, NotaSyncRequest, SyncUploadResponse,
};

/// `tipo_archivo` id of notes in the synced catalog.
pub const TIPO_ARCHIVO_NOTA: i64 = 3;

/// Persist the session, run login sync and cache the returned catalogs.
///
/// The session is stored before the sync call, so a failed sync leaves the
/// user signed in with whatever catalogs were cached earlier.
pub async fn login(
    store: &LocalStore,
    client: &SyncClient,
    session: &AuthSession,
) -> Result<LoginSyncResponse, ClientError> {
    store.initialize().await?;
    store
        .save_session(
            &session.user_id.to_string(),
            &session.access_token,
            session.expires_at,
        )
        .await?;

    let sync = client.sync_login(&session.access_token).await?;
    apply_login_sync(store, &sync).await?;
    Ok(sync)
}

/// Replace every cached catalog with the rows from a login sync, in one
/// transaction.
pub async fn apply_login_sync(
    store: &LocalStore,
    sync: &LoginSyncResponse,
) -> Result<(), StoreError> {
    let proyectos: Vec<LocalProyecto> = sync.proyectos_visibles.iter().map(Into::into).collect();
    let tipos_usuario: Vec<LocalTipoUsuario> = sync.tipo_usuario.iter().map(Into::into).collect();
    let tipos_archivo: Vec<LocalTipoArchivo> = sync.tipo_archivo.iter().map(Into::into).collect();

    store
        .replace_catalogs(&proyectos, &tipos_usuario, &tipos_archivo)
        .await?;

    tracing::info!(
        proyectos = proyectos.len(),
        tipos_usuario = tipos_usuario.len(),
        tipos_archivo = tipos_archivo.len(),
        "catalogs cached"
    );
    Ok(())
}

async fn current_session(store: &LocalStore) -> Result<LocalSession, ClientError> {
    store.initialize().await?;
    store.get_session().await?.ok_or(ClientError::NoSession)
}

async fn current_context(store: &LocalStore) -> Result<(LocalSession, LocalContext), ClientError> {
    let session = current_session(store).await?;
    let context = store
        .get_context(&session.id_usuario)
        .await?
        .ok_or(ClientError::NoContext)?;
    Ok((session, context))
}

/// Choose the project and acting role for the signed-in user.
pub async fn select_context(
    store: &LocalStore,
    id_proyecto: i64,
    id_tipo_usuario: i64,
) -> Result<LocalContext, ClientError> {
    let session = current_session(store).await?;
    store
        .save_context(&session.id_usuario, id_proyecto, id_tipo_usuario)
        .await?;
    store
        .get_context(&session.id_usuario)
        .await?
        .ok_or(ClientError::NoContext)
}

/// Forget the context, then the session. Authored records stay on the device.
pub async fn logout(store: &LocalStore) -> Result<(), ClientError> {
    store.initialize().await?;
    let Some(session) = store.get_session().await? else {
        return Ok(());
    };
    store.clear_context(&session.id_usuario).await?;
    store.clear_session().await?;
    Ok(())
}

pub async fn save_nota(
    store: &LocalStore,
    titulo: &str,
    cuerpo: &str,
    id_contacto_proyecto: Option<i64>,
) -> Result<i64, ClientError> {
    let (session, context) = current_context(store).await?;
    let id = store
        .create_nota_local(
            titulo,
            cuerpo,
            &session.id_usuario,
            context.id_proyecto,
            TIPO_ARCHIVO_NOTA,
            id_contacto_proyecto,
        )
        .await?;
    Ok(id)
}

pub async fn save_contacto(
    store: &LocalStore,
    id_contacto: &str,
    id_tipo_archivo: i64,
) -> Result<i64, ClientError> {
    let (session, context) = current_context(store).await?;
    let id = store
        .create_contacto_local(
            id_contacto,
            &session.id_usuario,
            context.id_proyecto,
            id_tipo_archivo,
        )
        .await?;
    Ok(id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushedRecord {
    pub id_archivo_local: i64,
    pub id_archivo_cloud: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushFailure {
    pub id_archivo_local: i64,
    /// Set when the upload went through but the local record could not be
    /// marked as synced.
    pub id_archivo_cloud: Option<i64>,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct PushReport {
    pub uploaded: Vec<PushedRecord>,
    pub failed: Vec<PushFailure>,
}

impl PushReport {
    /// Record the outcome of one upload, marking the local record as synced
    /// when the proxy accepted it.
    async fn record(
        &mut self,
        store: &LocalStore,
        id_archivo_local: i64,
        result: Result<SyncUploadResponse, ClientError>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(id_archivo_local, error = %e, "upload failed");
                self.failed.push(PushFailure {
                    id_archivo_local,
                    id_archivo_cloud: None,
                    error: e.to_string(),
                });
                return;
            }
        };

        let id_archivo_cloud = response.id_archivo_cloud;
        match store.mark_synced(id_archivo_local, id_archivo_cloud).await {
            Ok(()) => self.uploaded.push(PushedRecord {
                id_archivo_local,
                id_archivo_cloud,
                path: response.path,
            }),
            Err(e) => {
                // Uploaded but still pending locally; a later push sends it again
                tracing::error!(
                    id_archivo_local,
                    id_archivo_cloud,
                    error = %e,
                    "uploaded record could not be marked as synced"
                );
                self.failed.push(PushFailure {
                    id_archivo_local,
                    id_archivo_cloud: Some(id_archivo_cloud),
                    error: e.to_string(),
                });
            }
        }
    }
}

fn contacto_request(pending: &PendingContacto, id_proyecto: i64) -> ContactoProyectoSyncRequest {
    ContactoProyectoSyncRequest {
        id_archivo: Some(pending.id_archivo_local),
        id_contacto: Some(pending.id_contacto.clone()),
        fecha_creacion: Some(pending.fecha_creacion.clone()),
        id_proyecto: Some(id_proyecto),
        id_tipo_archivo: Some(pending.id_tipo_archivo),
        ..Default::default()
    }
}

fn nota_request(
    pending: &PendingNota,
    id_proyecto: i64,
    id_contacto_proyecto: Option<i64>,
) -> NotaSyncRequest {
    NotaSyncRequest {
        id_archivo: Some(pending.id_archivo_local),
        titulo: Some(pending.titulo.clone()),
        cuerpo: Some(pending.cuerpo.clone()),
        fecha_creacion: Some(pending.fecha_creacion.clone()),
        id_proyecto: Some(id_proyecto),
        id_tipo_archivo: Some(pending.id_tipo_archivo),
        id_contacto_proyecto,
    }
}

/// Cloud id of an already uploaded local record.
async fn cloud_id(store: &LocalStore, id_archivo_local: i64) -> Result<Option<i64>, StoreError> {
    Ok(store
        .get_archivo(id_archivo_local)
        .await?
        .and_then(|archivo| archivo.id_archivo_cloud)
        .and_then(|id| id.parse().ok()))
}

/// Upload every pending record of the signed-in user.
///
/// Records go up under the project selected when they were written; rows from
/// older database files without one use the current context. Contacts go
/// first so notes can reference their cloud ids. Each record is sent once;
/// failures are collected and the record stays pending.
pub async fn push_pending(
    store: &LocalStore,
    client: &SyncClient,
) -> Result<PushReport, ClientError> {
    let (session, context) = current_context(store).await?;
    let mut report = PushReport::default();

    for pending in store.pending_contactos().await? {
        if pending.id_usuario != session.id_usuario {
            continue;
        }
        let id_proyecto = pending.id_proyecto.unwrap_or(context.id_proyecto);
        let result = client
            .upload_contacto_proyecto(&session.token, &contacto_request(&pending, id_proyecto))
            .await;
        report.record(store, pending.id_archivo_local, result).await;
    }

    for pending in store.pending_notas().await? {
        if pending.id_usuario != session.id_usuario {
            continue;
        }
        let id_contacto_proyecto = match pending.id_contacto_proyecto {
            None => None,
            Some(local) => match cloud_id(store, local).await? {
                Some(cloud) => Some(cloud),
                None => {
                    report.failed.push(PushFailure {
                        id_archivo_local: pending.id_archivo_local,
                        id_archivo_cloud: None,
                        error: format!("referenced contacto {} is not synced", local),
                    });
                    continue;
                }
            },
        };
        let id_proyecto = pending.id_proyecto.unwrap_or(context.id_proyecto);
        let result = client
            .upload_nota(
                &session.token,
                &nota_request(&pending, id_proyecto, id_contacto_proyecto),
            )
            .await;
        report.record(store, pending.id_archivo_local, result).await;
    }

    tracing::info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        "push finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baas::fake::{FailAt, FakeBackend};
    use crate::client::spawn_proxy;
    use crate::local::guard::{check_access, GuardOutcome};
    use crate::local::{execute_raw, test_store};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    const TOKEN: &str = "field-token";

    struct Harness {
        store: LocalStore,
        client: SyncClient,
        backend: Arc<FakeBackend>,
        session: AuthSession,
    }

    async fn harness() -> Harness {
        let user_id = Uuid::new_v4();
        let backend = Arc::new(FakeBackend::seeded(TOKEN, user_id).await);
        let client = SyncClient::new(spawn_proxy(backend.clone()).await).unwrap();
        Harness {
            store: test_store().await,
            client,
            backend,
            session: AuthSession {
                access_token: TOKEN.to_string(),
                user_id,
                email: None,
                expires_at: Utc::now() + Duration::hours(1),
            },
        }
    }

    #[tokio::test]
    async fn test_login_caches_exactly_the_fetched_catalogs() {
        let h = harness().await;
        let sync = login(&h.store, &h.client, &h.session).await.unwrap();

        let proyectos: Vec<i64> = h
            .store
            .get_proyectos()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id_proyecto)
            .collect();
        let expected: Vec<i64> = sync.proyectos_visibles.iter().map(|p| p.id_proyecto).collect();
        assert_eq!(proyectos, expected);
        assert_eq!(h.store.get_tipos_usuario().await.unwrap().len(), sync.tipo_usuario.len());
        assert_eq!(h.store.get_tipos_archivo().await.unwrap().len(), sync.tipo_archivo.len());

        let session = h.store.get_session().await.unwrap().unwrap();
        assert_eq!(session.id_usuario, h.session.user_id.to_string());
    }

    #[tokio::test]
    async fn test_login_then_guard_requires_project_selection() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        assert_eq!(
            check_access(&h.store, Utc::now()).await.unwrap(),
            GuardOutcome::RedirectSelectProyecto
        );

        select_context(&h.store, 1, 1).await.unwrap();
        assert!(matches!(
            check_access(&h.store, Utc::now()).await.unwrap(),
            GuardOutcome::Allow(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_login_sync_keeps_session() {
        let h = harness().await;
        h.backend.fail_at(Some(FailAt::Reads)).await;
        let err = login(&h.store, &h.client, &h.session).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 500, .. }));
        assert!(h.store.get_session().await.unwrap().is_some());
        assert!(h.store.get_proyectos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_nota_requires_session_and_context() {
        let h = harness().await;
        let err = save_nota(&h.store, "t", "c", None).await.unwrap_err();
        assert!(matches!(err, ClientError::NoSession));

        login(&h.store, &h.client, &h.session).await.unwrap();
        let err = save_nota(&h.store, "t", "c", None).await.unwrap_err();
        assert!(matches!(err, ClientError::NoContext));
        assert!(h.store.get_notas_locales().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_context_then_session_keeps_records() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 1, 1).await.unwrap();
        save_nota(&h.store, "t", "c", None).await.unwrap();

        logout(&h.store).await.unwrap();
        let id_usuario = h.session.user_id.to_string();
        assert!(h.store.get_session().await.unwrap().is_none());
        assert!(h.store.get_context(&id_usuario).await.unwrap().is_none());
        assert_eq!(h.store.get_notas_locales().await.unwrap().len(), 1);

        // Logging out twice is harmless
        logout(&h.store).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_pending_uploads_and_marks_synced() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 2, 1).await.unwrap();

        let contacto = save_contacto(&h.store, "c-17", 2).await.unwrap();
        let nota = save_nota(&h.store, "Entrevista", "Notas de campo", Some(contacto))
            .await
            .unwrap();

        let report = push_pending(&h.store, &h.client).await.unwrap();
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(report.uploaded[0].id_archivo_local, contacto);
        assert_eq!(report.uploaded[1].id_archivo_local, nota);

        assert!(h.store.pending_notas().await.unwrap().is_empty());
        assert!(h.store.pending_contactos().await.unwrap().is_empty());

        let state = h.backend.state.lock().await;
        assert_eq!(state.archivos.len(), 2);
        assert!(state.archivos.iter().all(|(_, a)| a.id_proyecto == 2));
        assert_eq!(state.notas.len(), 1);
        assert_eq!(
            state.notas[0].id_contacto_proyecto,
            Some(report.uploaded[0].id_archivo_cloud)
        );
        drop(state);

        // Nothing left to send
        let again = push_pending(&h.store, &h.client).await.unwrap();
        assert!(again.uploaded.is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_leaves_record_pending() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 1, 1).await.unwrap();
        let contacto = save_contacto(&h.store, "c-1", 2).await.unwrap();
        save_nota(&h.store, "con contacto", "x", Some(contacto))
            .await
            .unwrap();

        h.backend.fail_at(Some(FailAt::InsertArchivo)).await;
        let report = push_pending(&h.store, &h.client).await.unwrap();
        assert!(report.uploaded.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(h.store.pending_notas().await.unwrap().len(), 1);
        assert_eq!(h.store.pending_contactos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mark_synced_reports_cloud_id_and_continues() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 1, 1).await.unwrap();
        let first = save_nota(&h.store, "uno", "a", None).await.unwrap();
        let second = save_nota(&h.store, "dos", "b", None).await.unwrap();

        execute_raw(
            &h.store,
            r#"
            CREATE TRIGGER lock_archivo BEFORE UPDATE ON LOCAL_ARCHIVO
            BEGIN
                SELECT RAISE(ABORT, 'archivo locked');
            END
            "#,
        )
        .await;

        let report = push_pending(&h.store, &h.client).await.unwrap();
        assert!(report.uploaded.is_empty());
        assert_eq!(report.failed.len(), 2);

        let state = h.backend.state.lock().await;
        assert_eq!(state.archivos.len(), 2);
        for (failure, local) in report.failed.iter().zip([first, second]) {
            assert_eq!(failure.id_archivo_local, local);
            let cloud = failure.id_archivo_cloud.expect("cloud id kept");
            assert!(state.archivos.iter().any(|(id, _)| *id == cloud));
            assert!(failure.error.contains("archivo locked"), "{}", failure.error);
        }
        drop(state);

        assert_eq!(h.store.pending_notas().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_upload_has_no_cloud_id() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 1, 1).await.unwrap();
        save_nota(&h.store, "t", "c", None).await.unwrap();

        h.backend.fail_at(Some(FailAt::InsertArchivo)).await;
        let report = push_pending(&h.store, &h.client).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id_archivo_cloud, None);
    }

    #[tokio::test]
    async fn test_records_upload_under_project_they_were_written_in() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 1, 1).await.unwrap();
        let contacto = save_contacto(&h.store, "c-3", 2).await.unwrap();
        save_nota(&h.store, "en proyecto 1", "x", Some(contacto))
            .await
            .unwrap();

        select_context(&h.store, 2, 1).await.unwrap();
        save_nota(&h.store, "en proyecto 2", "y", None).await.unwrap();

        let report = push_pending(&h.store, &h.client).await.unwrap();
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(report.uploaded.len(), 3);

        let state = h.backend.state.lock().await;
        let proyectos: Vec<i64> = state.archivos.iter().map(|(_, a)| a.id_proyecto).collect();
        assert_eq!(proyectos, vec![1, 1, 2]);
    }

    #[tokio::test]
    async fn test_record_without_stored_project_uses_current_context() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        select_context(&h.store, 2, 1).await.unwrap();
        save_nota(&h.store, "antigua", "z", None).await.unwrap();
        execute_raw(&h.store, "UPDATE LOCAL_ARCHIVO SET id_proyecto = NULL").await;

        let report = push_pending(&h.store, &h.client).await.unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(h.backend.state.lock().await.archivos[0].1.id_proyecto, 2);
    }

    #[tokio::test]
    async fn test_login_sync_replaces_catalogs_atomically() {
        let h = harness().await;
        login(&h.store, &h.client, &h.session).await.unwrap();
        let proyectos = h.store.get_proyectos().await.unwrap();
        let tipos_usuario = h.store.get_tipos_usuario().await.unwrap();
        assert!(!proyectos.is_empty());

        execute_raw(
            &h.store,
            r#"
            CREATE TRIGGER reject_tipo_archivo BEFORE INSERT ON LOCAL_TIPO_ARCHIVO
            BEGIN
                SELECT RAISE(ABORT, 'tipo_archivo rejected');
            END
            "#,
        )
        .await;

        let err = login(&h.store, &h.client, &h.session).await.unwrap_err();
        assert!(matches!(err, ClientError::Store(_)));
        assert_eq!(h.store.get_proyectos().await.unwrap(), proyectos);
        assert_eq!(h.store.get_tipos_usuario().await.unwrap(), tipos_usuario);
    }
}
