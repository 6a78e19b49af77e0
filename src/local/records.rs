//! Records authored offline: LOCAL_ARCHIVO headers with LOCAL_NOTA and
//! LOCAL_CONTACTO_PROYECTO details.

use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use super::models::{
    ContactoLocal, EstadoCarga, LocalArchivo, NotaLocal, PendingContacto, PendingNota,
};
use super::session::timestamp;
use super::{LocalStore, StoreError};

/// Insert a pending header and return its local id.
async fn insert_header(
    tx: &mut Transaction<'_, Sqlite>,
    id_usuario: &str,
    id_proyecto: i64,
    id_tipo_archivo: i64,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO LOCAL_ARCHIVO
            (id_archivo_cloud, estado_carga, fecha_creacion, path_local, id_usuario,
             id_proyecto, id_tipo_archivo)
        VALUES (NULL, ?, ?, NULL, ?, ?, ?)
        "#,
    )
    .bind(EstadoCarga::Pendiente.as_str())
    .bind(timestamp(Utc::now()))
    .bind(id_usuario)
    .bind(id_proyecto)
    .bind(id_tipo_archivo)
    .execute(&mut **tx)
    .await?;

    match result.last_insert_rowid() {
        0 => Err(StoreError::MissingRowId("LOCAL_ARCHIVO")),
        id => Ok(id),
    }
}

impl LocalStore {
    /// Create a pending note under `id_proyecto`: header and detail in one
    /// transaction.
    pub async fn create_nota_local(
        &self,
        titulo: &str,
        cuerpo: &str,
        id_usuario: &str,
        id_proyecto: i64,
        id_tipo_archivo: i64,
        id_contacto_proyecto: Option<i64>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool()?.begin().await?;
        let id_archivo_local =
            insert_header(&mut tx, id_usuario, id_proyecto, id_tipo_archivo).await?;

        sqlx::query(
            r#"
            INSERT INTO LOCAL_NOTA (id_archivo_local, titulo, cuerpo, id_contacto_proyecto)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id_archivo_local)
        .bind(titulo)
        .bind(cuerpo)
        .bind(id_contacto_proyecto)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(id_archivo_local, "local nota created");
        Ok(id_archivo_local)
    }

    /// Create a pending contact link.
    pub async fn create_contacto_local(
        &self,
        id_contacto: &str,
        id_usuario: &str,
        id_proyecto: i64,
        id_tipo_archivo: i64,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool()?.begin().await?;
        let id_archivo_local =
            insert_header(&mut tx, id_usuario, id_proyecto, id_tipo_archivo).await?;

        sqlx::query("INSERT INTO LOCAL_CONTACTO_PROYECTO (id_archivo_local, id_contacto) VALUES (?, ?)")
            .bind(id_archivo_local)
            .bind(id_contacto)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(id_archivo_local, "local contacto_proyecto created");
        Ok(id_archivo_local)
    }

    /// Notes, newest first.
    pub async fn get_notas_locales(&self) -> Result<Vec<NotaLocal>, StoreError> {
        let rows = sqlx::query_as::<_, NotaLocal>(
            r#"
            SELECT n.id_archivo_local, n.titulo, n.cuerpo, a.fecha_creacion, a.estado_carga
            FROM LOCAL_NOTA n
            INNER JOIN LOCAL_ARCHIVO a ON n.id_archivo_local = a.id_archivo_local
            ORDER BY a.fecha_creacion DESC, a.id_archivo_local DESC
            "#,
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn get_contactos_locales(&self) -> Result<Vec<ContactoLocal>, StoreError> {
        let rows = sqlx::query_as::<_, ContactoLocal>(
            r#"
            SELECT c.id_archivo_local, c.id_contacto, a.fecha_creacion, a.estado_carga
            FROM LOCAL_CONTACTO_PROYECTO c
            INNER JOIN LOCAL_ARCHIVO a ON c.id_archivo_local = a.id_archivo_local
            ORDER BY a.fecha_creacion DESC, a.id_archivo_local DESC
            "#,
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn get_archivo(&self, id_archivo_local: i64) -> Result<Option<LocalArchivo>, StoreError> {
        let row = sqlx::query_as::<_, LocalArchivo>(
            "SELECT * FROM LOCAL_ARCHIVO WHERE id_archivo_local = ?",
        )
        .bind(id_archivo_local)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    /// Notes not yet uploaded, oldest first.
    pub async fn pending_notas(&self) -> Result<Vec<PendingNota>, StoreError> {
        let rows = sqlx::query_as::<_, PendingNota>(
            r#"
            SELECT n.id_archivo_local, a.id_usuario, a.id_proyecto, n.titulo, n.cuerpo, a.fecha_creacion,
                   a.id_tipo_archivo, n.id_contacto_proyecto
            FROM LOCAL_NOTA n
            INNER JOIN LOCAL_ARCHIVO a ON n.id_archivo_local = a.id_archivo_local
            WHERE a.estado_carga = ?
            ORDER BY a.fecha_creacion ASC, a.id_archivo_local ASC
            "#,
        )
        .bind(EstadoCarga::Pendiente.as_str())
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn pending_contactos(&self) -> Result<Vec<PendingContacto>, StoreError> {
        let rows = sqlx::query_as::<_, PendingContacto>(
            r#"
            SELECT c.id_archivo_local, a.id_usuario, a.id_proyecto, c.id_contacto, a.fecha_creacion,
                   a.id_tipo_archivo
            FROM LOCAL_CONTACTO_PROYECTO c
            INNER JOIN LOCAL_ARCHIVO a ON c.id_archivo_local = a.id_archivo_local
            WHERE a.estado_carga = ?
            ORDER BY a.fecha_creacion ASC, a.id_archivo_local ASC
            "#,
        )
        .bind(EstadoCarga::Pendiente.as_str())
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    /// Record the cloud id of an uploaded header and flip it to synced.
    pub async fn mark_synced(
        &self,
        id_archivo_local: i64,
        id_archivo_cloud: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE LOCAL_ARCHIVO
            SET id_archivo_cloud = ?, estado_carga = ?
            WHERE id_archivo_local = ?
            "#,
        )
        .bind(id_archivo_cloud.to_string())
        .bind(EstadoCarga::Sincronizado.as_str())
        .bind(id_archivo_local)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::test_store;

    const NOTA: i64 = 3;

    #[tokio::test]
    async fn test_create_nota_writes_pending_header_and_detail() {
        let store = test_store().await;
        let id = store
            .create_nota_local("Ceremonia", "Registro de la ceremonia", "user-a", 1, NOTA, None)
            .await
            .unwrap();

        let header = store.get_archivo(id).await.unwrap().unwrap();
        assert_eq!(header.estado_carga, "pendiente");
        assert!(header.id_archivo_cloud.is_none());
        assert!(header.path_local.is_none());
        assert_eq!(header.id_usuario, "user-a");
        assert_eq!(header.id_proyecto, Some(1));
        assert_eq!(header.id_tipo_archivo, NOTA);
    }

    #[tokio::test]
    async fn test_two_notes_get_distinct_ids_newest_first() {
        let store = test_store().await;
        let first = store
            .create_nota_local("uno", "a", "user-a", 1, NOTA, None)
            .await
            .unwrap();
        let second = store
            .create_nota_local("dos", "b", "user-a", 1, NOTA, None)
            .await
            .unwrap();
        assert_ne!(first, second);

        let notas = store.get_notas_locales().await.unwrap();
        let ids: Vec<i64> = notas.iter().map(|n| n.id_archivo_local).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(notas[0].titulo, "dos");
        assert!(store.get_archivo(first).await.unwrap().is_some());
        assert!(store.get_archivo(second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_archivo_missing_returns_none() {
        let store = test_store().await;
        assert!(store.get_archivo(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nota_can_reference_contacto() {
        let store = test_store().await;
        let contacto = store
            .create_contacto_local("c-1", "user-a", 1, 2)
            .await
            .unwrap();
        store
            .create_nota_local("con contacto", "x", "user-a", 1, NOTA, Some(contacto))
            .await
            .unwrap();

        let pending = store.pending_notas().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id_contacto_proyecto, Some(contacto));
        assert_eq!(store.get_contactos_locales().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_synced_removes_from_pending() {
        let store = test_store().await;
        let a = store
            .create_nota_local("a", "a", "user-a", 1, NOTA, None)
            .await
            .unwrap();
        let b = store
            .create_nota_local("b", "b", "user-a", 1, NOTA, None)
            .await
            .unwrap();

        store.mark_synced(a, 1001).await.unwrap();

        let pending: Vec<i64> = store
            .pending_notas()
            .await
            .unwrap()
            .iter()
            .map(|n| n.id_archivo_local)
            .collect();
        assert_eq!(pending, vec![b]);

        let header = store.get_archivo(a).await.unwrap().unwrap();
        assert_eq!(header.estado_carga, "sincronizado");
        assert_eq!(header.id_archivo_cloud.as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn test_create_nota_on_unopened_store_fails() {
        let store = LocalStore::in_memory().unwrap();
        let err = store
            .create_nota_local("a", "b", "user-a", 1, NOTA, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized));
    }
}
