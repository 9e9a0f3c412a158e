//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持。实体本体存放在 `entities` 表，
//! 索引项存放在 `entity_index` 表，查询通过 EXISTS 子查询匹配索引。

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::backend::{DatastoreBackend, PutMode, RawEntity};
use super::query::{FilterOp, Query};
use crate::error::{DatastoreError, DatastoreResult};

/// 数据库文件名
pub const DB_FILE_NAME: &str = "fleet.db";

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteBackend {
    /// 创建新的 SQLite 后端实例
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件存储目录，必须已存在；数据库文件为 `{db_path}/fleet.db`
    pub async fn new(db_path: &Path) -> DatastoreResult<Self> {
        let file = db_path.join(DB_FILE_NAME);

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))
            .map_err(|e| DatastoreError::Config(format!("Failed to parse SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let backend = Self { pool };
        backend.init().await?;

        info!(
            "SQLite datastore initialized: path={}, WAL mode enabled",
            file.display()
        );

        Ok(backend)
    }

    /// 构造过滤条件对应的 WHERE 子句
    fn build_where(query: &Query, with_cursor: bool) -> (String, Vec<String>) {
        let mut sql = String::from("e.kind = ?");
        let mut args = vec![query.kind().to_string()];

        if with_cursor && let Some(after) = query.after_id() {
            sql.push_str(" AND e.id > ?");
            args.push(after.to_string());
        }

        for filter in query.filters() {
            let values = filter.encoded_values();
            match filter.op {
                FilterOp::Eq | FilterOp::In => {
                    if values.is_empty() {
                        sql.push_str(" AND 0");
                        continue;
                    }
                    let placeholders = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!(
                        " AND EXISTS (SELECT 1 FROM entity_index i WHERE i.kind = e.kind \
                         AND i.id = e.id AND i.field = ? AND i.value IN ({placeholders}))"
                    ));
                    args.push(filter.field.clone());
                    args.extend(values);
                }
                _ => {
                    let Some(target) = filter.values.first() else {
                        sql.push_str(" AND 0");
                        continue;
                    };
                    sql.push_str(&format!(
                        " AND EXISTS (SELECT 1 FROM entity_index i WHERE i.kind = e.kind \
                         AND i.id = e.id AND i.field = ? AND substr(i.value, 1, 2) = ? \
                         AND i.value {} ?)",
                        filter.sql_operator()
                    ));
                    args.push(filter.field.clone());
                    args.push(target.type_prefix().to_string());
                    args.push(target.encode());
                }
            }
        }

        (sql, args)
    }
}

#[async_trait]
impl DatastoreBackend for SqliteBackend {
    async fn init(&self) -> DatastoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                body BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entity_index (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entity_index_lookup
             ON entity_index(kind, field, value)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entity_index_owner
             ON entity_index(kind, id)",
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite datastore tables and indexes initialized");
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> DatastoreResult<Option<RawEntity>> {
        let row = sqlx::query("SELECT body FROM entities WHERE kind = ? AND id = ?")
            .bind(kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(RawEntity {
                kind: kind.to_string(),
                id: id.to_string(),
                body: row.try_get("body")?,
                index: Vec::new(),
            }),
            None => None,
        })
    }

    async fn put(&self, entity: RawEntity, mode: PutMode) -> DatastoreResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = match mode {
            PutMode::Upsert | PutMode::Insert => {
                let conflict = if mode == PutMode::Upsert {
                    "DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at"
                } else {
                    "DO NOTHING"
                };
                sqlx::query(&format!(
                    "INSERT INTO entities (kind, id, body, updated_at) VALUES (?, ?, ?, ?)
                     ON CONFLICT(kind, id) {conflict}"
                ))
                .bind(&entity.kind)
                .bind(&entity.id)
                .bind(&entity.body)
                .bind(now)
                .execute(&mut *tx)
                .await?
            }
            PutMode::Update => {
                sqlx::query("UPDATE entities SET body = ?, updated_at = ? WHERE kind = ? AND id = ?")
                    .bind(&entity.body)
                    .bind(now)
                    .bind(&entity.kind)
                    .bind(&entity.id)
                    .execute(&mut *tx)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(match mode {
                PutMode::Insert => DatastoreError::already_exists(&entity.kind, &entity.id),
                _ => DatastoreError::not_found(&entity.kind, &entity.id),
            });
        }

        sqlx::query("DELETE FROM entity_index WHERE kind = ? AND id = ?")
            .bind(&entity.kind)
            .bind(&entity.id)
            .execute(&mut *tx)
            .await?;

        for (field, value) in &entity.index {
            sqlx::query("INSERT INTO entity_index (kind, id, field, value) VALUES (?, ?, ?, ?)")
                .bind(&entity.kind)
                .bind(&entity.id)
                .bind(field)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> DatastoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM entities WHERE kind = ? AND id = ?")
            .bind(kind)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM entity_index WHERE kind = ? AND id = ?")
            .bind(kind)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, query: &Query) -> DatastoreResult<Vec<RawEntity>> {
        let (where_clause, args) = Self::build_where(query, true);
        let columns = if query.is_keys_only() {
            "e.id"
        } else {
            "e.id, e.body"
        };
        let mut sql = format!("SELECT {columns} FROM entities e WHERE {where_clause} ORDER BY e.id ASC");
        if let Some(limit) = query.get_limit() {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query(&sql);
        for arg in args {
            q = q.bind(arg);
        }

        let rows = q.fetch_all(&self.pool).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let body = if query.is_keys_only() {
                Vec::new()
            } else {
                row.try_get("body")?
            };
            entities.push(RawEntity {
                kind: query.kind().to_string(),
                id: row.try_get("id")?,
                body,
                index: Vec::new(),
            });
        }
        Ok(entities)
    }

    async fn count(&self, query: &Query) -> DatastoreResult<u64> {
        let (where_clause, args) = Self::build_where(query, false);
        let sql = format!("SELECT COUNT(*) FROM entities e WHERE {where_clause}");

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for arg in args {
            q = q.bind(arg);
        }

        let count = q.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}
