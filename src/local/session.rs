//! LOCAL_SESSION and LOCAL_CONTEXT.

use chrono::{DateTime, SecondsFormat, Utc};

use super::models::{LocalContext, LocalSession};
use super::{LocalStore, StoreError};

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl LocalStore {
    /// Replace the stored session; at most one row ever exists.
    pub async fn save_session(
        &self,
        id_usuario: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool()?.begin().await?;

        sqlx::query("DELETE FROM LOCAL_SESSION")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO LOCAL_SESSION (id_usuario, token, last_verified_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id_usuario)
        .bind(token)
        .bind(timestamp(Utc::now()))
        .bind(timestamp(expires_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(id_usuario, "local session saved");
        Ok(())
    }

    pub async fn get_session(&self) -> Result<Option<LocalSession>, StoreError> {
        let session = sqlx::query_as::<_, LocalSession>("SELECT * FROM LOCAL_SESSION LIMIT 1")
            .fetch_optional(self.pool()?)
            .await?;
        Ok(session)
    }

    pub async fn clear_session(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM LOCAL_SESSION")
            .execute(self.pool()?)
            .await?;
        tracing::info!("local session cleared");
        Ok(())
    }

    /// Select project and role for a user, replacing any previous choice.
    pub async fn save_context(
        &self,
        id_usuario: &str,
        id_proyecto: i64,
        id_tipo_usuario: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO LOCAL_CONTEXT
                (id_usuario, id_proyecto, id_tipo_usuario, context_created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id_usuario)
        .bind(id_proyecto)
        .bind(id_tipo_usuario)
        .bind(timestamp(Utc::now()))
        .execute(self.pool()?)
        .await?;

        tracing::info!(id_usuario, id_proyecto, id_tipo_usuario, "local context saved");
        Ok(())
    }

    pub async fn get_context(&self, id_usuario: &str) -> Result<Option<LocalContext>, StoreError> {
        let context = sqlx::query_as::<_, LocalContext>(
            "SELECT * FROM LOCAL_CONTEXT WHERE id_usuario = ? LIMIT 1",
        )
        .bind(id_usuario)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(context)
    }

    pub async fn clear_context(&self, id_usuario: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM LOCAL_CONTEXT WHERE id_usuario = ?")
            .bind(id_usuario)
            .execute(self.pool()?)
            .await?;
        tracing::info!(id_usuario, "local context cleared");
        Ok(())
    }
}
