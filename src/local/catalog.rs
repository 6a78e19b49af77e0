//! Catalog mirrors: projects, user types, file types.
//!
//! Each `replace_*` clears the table and reinserts inside one transaction, so
//! readers see either the previous catalog or the new one in full.
//! [`replace_catalogs`](LocalStore::replace_catalogs) does the same for all
//! three tables at once.

use sqlx::{Sqlite, Transaction};

use super::models::{LocalProyecto, LocalTipoArchivo, LocalTipoUsuario};
use super::{LocalStore, StoreError};

async fn write_proyectos(
    tx: &mut Transaction<'_, Sqlite>,
    proyectos: &[LocalProyecto],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM LOCAL_PROYECTO")
        .execute(&mut **tx)
        .await?;
    for p in proyectos {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO LOCAL_PROYECTO
                (id_proyecto, nombre_proyecto, activo, id_ubicacion, id_empresa)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(p.id_proyecto)
        .bind(&p.nombre_proyecto)
        .bind(&p.activo)
        .bind(p.id_ubicacion)
        .bind(p.id_empresa)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn write_tipos_usuario(
    tx: &mut Transaction<'_, Sqlite>,
    tipos: &[LocalTipoUsuario],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM LOCAL_TIPO_USUARIO")
        .execute(&mut **tx)
        .await?;
    for t in tipos {
        sqlx::query(
            "INSERT OR REPLACE INTO LOCAL_TIPO_USUARIO (id_tipo_usuario, nombre_tipo) VALUES (?, ?)",
        )
        .bind(t.id_tipo_usuario)
        .bind(&t.nombre_tipo)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn write_tipos_archivo(
    tx: &mut Transaction<'_, Sqlite>,
    tipos: &[LocalTipoArchivo],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM LOCAL_TIPO_ARCHIVO")
        .execute(&mut **tx)
        .await?;
    for t in tipos {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO LOCAL_TIPO_ARCHIVO (id_tipo_archivo, nombre_tipo_archivo)
            VALUES (?, ?)
            "#,
        )
        .bind(t.id_tipo_archivo)
        .bind(&t.nombre_tipo_archivo)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl LocalStore {
    /// Replace projects, user types and file types together. On any failure
    /// all three keep their previous rows.
    pub async fn replace_catalogs(
        &self,
        proyectos: &[LocalProyecto],
        tipos_usuario: &[LocalTipoUsuario],
        tipos_archivo: &[LocalTipoArchivo],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;
        write_proyectos(&mut tx, proyectos).await?;
        write_tipos_usuario(&mut tx, tipos_usuario).await?;
        write_tipos_archivo(&mut tx, tipos_archivo).await?;
        tx.commit().await?;
        tracing::debug!(
            proyectos = proyectos.len(),
            tipos_usuario = tipos_usuario.len(),
            tipos_archivo = tipos_archivo.len(),
            "catalogs replaced"
        );
        Ok(())
    }

    pub async fn replace_proyectos(&self, proyectos: &[LocalProyecto]) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;
        write_proyectos(&mut tx, proyectos).await?;
        tx.commit().await?;
        tracing::debug!(count = proyectos.len(), "LOCAL_PROYECTO replaced");
        Ok(())
    }

    /// Active projects only.
    pub async fn get_proyectos(&self) -> Result<Vec<LocalProyecto>, StoreError> {
        let rows = sqlx::query_as::<_, LocalProyecto>(
            "SELECT * FROM LOCAL_PROYECTO WHERE activo = '1' ORDER BY id_proyecto ASC",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn replace_tipos_usuario(
        &self,
        tipos: &[LocalTipoUsuario],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;
        write_tipos_usuario(&mut tx, tipos).await?;
        tx.commit().await?;
        tracing::debug!(count = tipos.len(), "LOCAL_TIPO_USUARIO replaced");
        Ok(())
    }

    pub async fn get_tipos_usuario(&self) -> Result<Vec<LocalTipoUsuario>, StoreError> {
        let rows = sqlx::query_as::<_, LocalTipoUsuario>(
            "SELECT * FROM LOCAL_TIPO_USUARIO ORDER BY id_tipo_usuario ASC",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn replace_tipos_archivo(
        &self,
        tipos: &[LocalTipoArchivo],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;
        write_tipos_archivo(&mut tx, tipos).await?;
        tx.commit().await?;
        tracing::debug!(count = tipos.len(), "LOCAL_TIPO_ARCHIVO replaced");
        Ok(())
    }

    pub async fn get_tipos_archivo(&self) -> Result<Vec<LocalTipoArchivo>, StoreError> {
        let rows = sqlx::query_as::<_, LocalTipoArchivo>(
            "SELECT * FROM LOCAL_TIPO_ARCHIVO ORDER BY id_tipo_archivo ASC",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }
}
