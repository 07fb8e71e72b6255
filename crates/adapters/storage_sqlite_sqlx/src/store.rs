//! Store handle and the query plumbing shared by every table.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};

use metahub_app::ports::{Page, Paged};

use crate::error::StorageError;

/// `SQLite`-backed implementation of every repository port.
///
/// Cloning is cheap: the pool is reference counted.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Wrapper decoding the JSON `body` column without polluting domain structs
/// with database concerns.
pub(crate) struct Body<T>(pub(crate) T);

impl<'r, T: DeserializeOwned> FromRow<'r, SqliteRow> for Body<T> {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let body: String = row.try_get("body")?;
        serde_json::from_str(&body)
            .map(Self)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))
    }
}

/// Row filter applied to listings and counts.
pub(crate) enum Filter<'a> {
    /// Rows carrying every label (no labels means every row).
    Labels(&'a [String]),
    /// Rows whose `column` equals the value.
    Column(&'static str, &'a str),
}

impl Filter<'_> {
    fn push_to(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");
        match self {
            Self::Labels(labels) => {
                for label in *labels {
                    builder
                        .push(" AND EXISTS (SELECT 1 FROM json_each(labels) WHERE json_each.value = ")
                        .push_bind(label.clone())
                        .push(")");
                }
            }
            Self::Column(column, value) => {
                builder
                    .push(format!(" AND {column} = "))
                    .push_bind((*value).to_string());
            }
        }
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

/// Fetch the single row of `table` whose `column` equals `value`.
pub(crate) async fn find<T>(
    pool: &SqlitePool,
    table: &'static str,
    column: &'static str,
    value: String,
) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned + Send + Unpin,
{
    let sql = format!("SELECT body FROM {table} WHERE {column} = ?");
    let row: Option<Body<T>> = sqlx::query_as(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|body| body.0))
}

/// One page of `table`, ordered by name, plus the filtered row count.
pub(crate) async fn fetch_page<T>(
    pool: &SqlitePool,
    table: &'static str,
    filter: Filter<'_>,
    page: Page,
) -> Result<Paged<T>, StorageError>
where
    T: DeserializeOwned + Send + Unpin,
{
    let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
    filter.push_to(&mut count);
    let (total,): (i64,) = count.build_query_as().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT body FROM {table}"));
    filter.push_to(&mut select);
    select
        .push(" ORDER BY name LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(page.offset));
    let rows: Vec<Body<T>> = select.build_query_as().fetch_all(pool).await?;

    Ok(Paged {
        items: rows.into_iter().map(|body| body.0).collect(),
        total: u64::try_from(total).unwrap_or_default(),
    })
}

/// Delete the row of `table` named `name`.
pub(crate) async fn delete_named(
    pool: &SqlitePool,
    table: &'static str,
    entity: &'static str,
    name: &str,
) -> Result<(), StorageError> {
    let sql = format!("DELETE FROM {table} WHERE name = ?");
    let result = sqlx::query(&sql).bind(name).execute(pool).await?;
    ensure_affected(result.rows_affected(), entity, name)
}

pub(crate) fn ensure_affected(
    rows: u64,
    entity: &'static str,
    name: &str,
) -> Result<(), StorageError> {
    if rows == 0 {
        return Err(StorageError::Missing {
            entity,
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SqliteStore {
    crate::pool::Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .unwrap()
    .store()
}
