use sqlx::SqlitePool;

/// Create-if-absent statements, run on every start.
///
/// Headers reference neither the context nor the file-type catalog through a
/// foreign key: both are cleared and rewritten while authored records remain.
const TABLES: &[(&str, &str)] = &[
    (
        "LOCAL_SESSION",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_SESSION (
            id_usuario TEXT PRIMARY KEY,
            token TEXT NOT NULL,
            last_verified_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "LOCAL_PROYECTO",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_PROYECTO (
            id_proyecto INTEGER PRIMARY KEY,
            nombre_proyecto TEXT NOT NULL,
            activo TEXT NOT NULL,
            id_ubicacion INTEGER,
            id_empresa INTEGER NOT NULL
        )
        "#,
    ),
    (
        "LOCAL_TIPO_USUARIO",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_TIPO_USUARIO (
            id_tipo_usuario INTEGER PRIMARY KEY,
            nombre_tipo TEXT NOT NULL
        )
        "#,
    ),
    (
        "LOCAL_CONTEXT",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_CONTEXT (
            id_usuario TEXT PRIMARY KEY,
            id_proyecto INTEGER NOT NULL,
            id_tipo_usuario INTEGER NOT NULL,
            context_created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "LOCAL_TIPO_ARCHIVO",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_TIPO_ARCHIVO (
            id_tipo_archivo INTEGER PRIMARY KEY,
            nombre_tipo_archivo TEXT NOT NULL
        )
        "#,
    ),
    (
        "LOCAL_ARCHIVO",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_ARCHIVO (
            id_archivo_local INTEGER PRIMARY KEY AUTOINCREMENT,
            id_archivo_cloud TEXT,
            estado_carga TEXT NOT NULL,
            fecha_creacion TEXT NOT NULL,
            path_local TEXT,
            id_usuario TEXT NOT NULL,
            id_proyecto INTEGER,
            id_tipo_archivo INTEGER NOT NULL
        )
        "#,
    ),
    (
        "LOCAL_CONTACTO_PROYECTO",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_CONTACTO_PROYECTO (
            id_archivo_local INTEGER PRIMARY KEY,
            id_contacto TEXT NOT NULL,
            FOREIGN KEY (id_archivo_local) REFERENCES LOCAL_ARCHIVO(id_archivo_local)
        )
        "#,
    ),
    (
        "LOCAL_NOTA",
        r#"
        CREATE TABLE IF NOT EXISTS LOCAL_NOTA (
            id_archivo_local INTEGER PRIMARY KEY,
            titulo TEXT NOT NULL,
            cuerpo TEXT NOT NULL,
            id_contacto_proyecto INTEGER,
            FOREIGN KEY (id_archivo_local) REFERENCES LOCAL_ARCHIVO(id_archivo_local),
            FOREIGN KEY (id_contacto_proyecto) REFERENCES LOCAL_CONTACTO_PROYECTO(id_archivo_local)
        )
        "#,
    ),
    (
        "idx_local_archivo_estado",
        r#"
        CREATE INDEX IF NOT EXISTS idx_local_archivo_estado
            ON LOCAL_ARCHIVO(estado_carga, fecha_creacion)
        "#,
    ),
];

/// Columns added after the first release, as `(table, column, type)`.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[("LOCAL_ARCHIVO", "id_proyecto", "INTEGER")];

pub(super) async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for &(name, sql) in TABLES {
        sqlx::query(sql).execute(pool).await?;
        tracing::trace!(table = name, "ensured");
    }
    add_missing_columns(pool).await
}

/// Bring database files created by older builds up to the current columns.
async fn add_missing_columns(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for &(table, column, ty) in ADDED_COLUMNS {
        let present: Option<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_optional(pool)
                .await?;
        if present.is_none() {
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, ty))
                .execute(pool)
                .await?;
            tracing::info!(table, column, "column added");
        }
    }
    Ok(())
}
