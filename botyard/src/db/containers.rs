//! SQLite-backed container record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use botyard_shared::errors::{BotyardError, BotyardResult};

use super::{Database, db_err};
use crate::models::{
    ContainerRecord, ContainerState, DisplayMetadata, NewContainerRecord, OwnerKey,
};
use crate::repository::ContainersRepository;

const SELECT_COLUMNS: &str = "SELECT id, container_name, port, container_id, bot_id, project_id, \
     user_id, name, description, icon, state, created_at, updated_at, deleted_at \
     FROM bot_containers";

/// [`ContainersRepository`] over the `bot_containers` and `bots` tables.
#[derive(Clone)]
pub struct SqliteContainersRepository {
    db: Database,
}

impl SqliteContainersRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn find_one<P>(
        &self,
        clause: &'static str,
        params: P,
        what: String,
    ) -> BotyardResult<ContainerRecord>
    where
        P: rusqlite::Params + Send + 'static,
    {
        self.db
            .with_conn(move |conn| {
                let sql = format!("{} WHERE {} AND state <> 'deleted'", SELECT_COLUMNS, clause);
                let record = db_err!(conn.query_row(&sql, params, record_from_row).optional())?;
                record.ok_or_else(|| BotyardError::NotFound(what))
            })
            .await
    }

    async fn soft_delete<P>(
        &self,
        clause: &'static str,
        params: P,
        what: String,
    ) -> BotyardResult<()>
    where
        P: rusqlite::Params + Send + 'static,
    {
        self.db
            .with_conn(move |conn| {
                // ?1 is always the timestamp; the clause numbers its own params from ?2.
                let sql = format!(
                    "UPDATE bot_containers SET state = 'deleted', deleted_at = ?1, updated_at = ?1 \
                     WHERE {} AND state NOT IN ('running', 'deleted')",
                    clause
                );
                let changed = db_err!(conn.execute(&sql, params))?;
                if changed == 0 {
                    return Err(BotyardError::NotDeleted(format!(
                        "{} (missing, running or already deleted)",
                        what
                    )));
                }
                tracing::debug!("Soft-deleted {}", what);
                Ok(())
            })
            .await
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_time(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ContainerRecord> {
    let port: i64 = row.get(2)?;
    let port = u16::try_from(port).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(2, port))?;
    let state: String = row.get(10)?;
    let state = state
        .parse::<ContainerState>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    let deleted_at: Option<String> = row.get(13)?;

    Ok(ContainerRecord {
        id: row.get(0)?,
        container_name: row.get(1)?,
        port,
        runtime_container_id: row.get(3)?,
        owner: OwnerKey::new(row.get(4)?, row.get(5)?, row.get(6)?),
        metadata: DisplayMetadata {
            name: row.get(7)?,
            description: row.get(8)?,
            icon: row.get(9)?,
        },
        state,
        created_at: parse_time(11, row.get(11)?)?,
        updated_at: parse_time(12, row.get(12)?)?,
        deleted_at: deleted_at.map(|raw| parse_time(13, raw)).transpose()?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn insert_record(conn: &mut Connection, record: &NewContainerRecord) -> BotyardResult<i64> {
    let ts = now();
    let tx = db_err!(conn.transaction())?;

    let inserted = tx.execute(
        "INSERT INTO bot_containers (
            container_name, port, container_id, bot_id, project_id, user_id,
            name, description, icon, state, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'created', ?10, ?10)",
        params![
            record.container_name,
            record.port,
            record.runtime_container_id,
            record.owner.bot_id,
            record.owner.project_id,
            record.owner.owner_id,
            record.metadata.name,
            record.metadata.description,
            record.metadata.icon,
            ts,
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(BotyardError::NotCreated(format!(
                "bot_container for {}: {}",
                record.owner, e
            )));
        }
        Err(e) => return Err(BotyardError::Database(e.to_string())),
    }
    let id = tx.last_insert_rowid();

    db_err!(tx.execute(
        "INSERT INTO bots (id, state, updated_at) VALUES (?1, 'created', ?2)
         ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
         WHERE bots.state <> 'deleted'",
        params![record.owner.bot_id, ts],
    ))?;

    db_err!(tx.commit())?;
    Ok(id)
}

#[async_trait]
impl ContainersRepository for SqliteContainersRepository {
    async fn find_by_id(&self, id: i64) -> BotyardResult<ContainerRecord> {
        self.find_one("id = ?1", (id,), format!("bot_container {}", id))
            .await
    }

    async fn find_by_runtime_id(&self, runtime_id: &str) -> BotyardResult<ContainerRecord> {
        let runtime_id = runtime_id.to_string();
        let what = format!("bot_container with container_id {}", runtime_id);
        self.find_one("container_id = ?1", (runtime_id,), what).await
    }

    async fn find_by_owner_key(&self, owner: &OwnerKey) -> BotyardResult<ContainerRecord> {
        self.find_one(
            "bot_id = ?1 AND project_id = ?2 AND user_id = ?3",
            (owner.bot_id, owner.project_id, owner.owner_id),
            format!("bot_container for {}", owner),
        )
        .await
    }

    async fn list_all(&self) -> BotyardResult<Vec<ContainerRecord>> {
        self.db
            .with_conn(|conn| {
                let sql = format!("{} WHERE state <> 'deleted' ORDER BY id", SELECT_COLUMNS);
                let mut stmt = db_err!(conn.prepare(&sql))?;
                let rows = db_err!(stmt.query_map([], record_from_row))?;
                let records = db_err!(rows.collect::<rusqlite::Result<Vec<_>>>())?;
                if records.is_empty() {
                    return Err(BotyardError::NotFound(
                        "no live bot_containers".to_string(),
                    ));
                }
                Ok(records)
            })
            .await
    }

    async fn create(&self, record: &NewContainerRecord) -> BotyardResult<i64> {
        let record = record.clone();
        self.db
            .with_conn(move |conn| insert_record(conn, &record))
            .await
    }

    async fn set_state(&self, state: ContainerState, id: i64) -> BotyardResult<()> {
        self.db
            .with_conn(move |conn| {
                let tx = db_err!(conn.transaction())?;
                let current: Option<String> = db_err!(
                    tx.query_row(
                        "SELECT state FROM bot_containers WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()
                )?;
                let current = current
                    .ok_or_else(|| BotyardError::NotUpdated(format!("bot_container {}", id)))?
                    .parse::<ContainerState>()?;
                current.transition(state)?;

                db_err!(tx.execute(
                    "UPDATE bot_containers SET state = ?1, updated_at = ?2 WHERE id = ?3",
                    params![state.as_str(), now(), id],
                ))?;
                db_err!(tx.commit())?;
                Ok(())
            })
            .await
    }

    async fn stop_state(&self, id: i64, bot_id: i64) -> BotyardResult<()> {
        self.db
            .with_conn(move |conn| {
                let ts = now();
                // Dropping the transaction on any early return rolls back both updates.
                let tx = db_err!(conn.transaction())?;

                let containers = db_err!(tx.execute(
                    "UPDATE bot_containers SET state = 'stopped', updated_at = ?2
                     WHERE id = ?1 AND state <> 'deleted'",
                    params![id, ts],
                ))?;
                if containers == 0 {
                    return Err(BotyardError::NotUpdated(format!(
                        "bot_container {} is missing or deleted",
                        id
                    )));
                }

                let bots = db_err!(tx.execute(
                    "UPDATE bots SET state = 'stopped', updated_at = ?2
                     WHERE id = ?1 AND state <> 'deleted'",
                    params![bot_id, ts],
                ))?;
                if bots == 0 {
                    return Err(BotyardError::NotUpdated(format!(
                        "bot {} is missing or deleted",
                        bot_id
                    )));
                }

                db_err!(tx.commit())?;
                Ok(())
            })
            .await
    }

    async fn delete_by_id(&self, id: i64) -> BotyardResult<()> {
        self.soft_delete("id = ?2", (now(), id), format!("bot_container {}", id))
            .await
    }

    async fn delete_by_owner_key(&self, owner: &OwnerKey) -> BotyardResult<()> {
        self.soft_delete(
            "bot_id = ?2 AND project_id = ?3 AND user_id = ?4",
            (now(), owner.bot_id, owner.project_id, owner.owner_id),
            format!("bot_container for {}", owner),
        )
        .await
    }

    async fn delete_by_runtime_id(&self, runtime_id: &str) -> BotyardResult<()> {
        let what = format!("bot_container with container_id {}", runtime_id);
        self.soft_delete("container_id = ?2", (now(), runtime_id.to_string()), what)
            .await
    }
}
