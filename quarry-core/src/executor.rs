use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Database, Row, Sqlite, TypeInfo, ValueRef};

use crate::error::QuarryResult;
use crate::value::Value;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, <Sqlite as Database>::Arguments<'q>>;

#[cfg(feature = "metrics")]
fn record_query_metrics(operation: &str, table: &str, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let labels = [
        ("operation", operation.to_owned()),
        ("table", table.to_owned()),
    ];
    metrics::histogram!("quarry.query.duration_ms", &labels).record(elapsed_ms);
    metrics::counter!("quarry.query.count", &labels).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_query_metrics(_operation: &str, _table: &str, _elapsed: Duration) {}

#[inline(always)]
fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(Option::<i64>::None),
        Value::Int(v) => query.bind(v),
        Value::Real(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Bool(v) => query.bind(v),
    }
}

pub(crate) fn format_binds(binds: &[Value]) -> String {
    let rendered: Vec<String> = binds.iter().map(Value::to_log_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// Reads column `index` by its storage class.
pub(crate) fn decode_column(row: &SqliteRow, index: usize) -> QuarryResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
        "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => Value::Real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

pub(crate) fn row_values(row: &SqliteRow) -> QuarryResult<Vec<Value>> {
    (0..row.len()).map(|index| decode_column(row, index)).collect()
}

/// Runs a SELECT and decodes every row into values.
pub(crate) async fn fetch_values(
    conn: &mut SqliteConnection,
    operation: &'static str,
    table: &str,
    sql: &str,
    binds: Vec<Value>,
) -> QuarryResult<Vec<Vec<Value>>> {
    tracing::debug!(
        operation,
        table,
        sql = %sql,
        binds = %format_binds(&binds),
        "quarry query"
    );
    let start = Instant::now();
    let query = binds.into_iter().fold(sqlx::query::<Sqlite>(sql), bind_value);
    let rows = query.fetch_all(&mut *conn).await?;
    record_query_metrics(operation, table, start.elapsed());
    rows.iter().map(row_values).collect()
}

/// Runs a statement and returns the affected row count.
pub(crate) async fn execute(
    conn: &mut SqliteConnection,
    operation: &'static str,
    table: &str,
    sql: &str,
    binds: Vec<Value>,
) -> QuarryResult<u64> {
    tracing::debug!(
        operation,
        table,
        sql = %sql,
        binds = %format_binds(&binds),
        "quarry statement"
    );
    let start = Instant::now();
    let query = binds.into_iter().fold(sqlx::query::<Sqlite>(sql), bind_value);
    let result = query.execute(&mut *conn).await?;
    record_query_metrics(operation, table, start.elapsed());
    Ok(result.rows_affected())
}

/// Stream of decoded rows; `conn` stays borrowed until the stream is dropped.
pub(crate) fn stream_values<'c>(
    conn: &'c mut SqliteConnection,
    sql: &'c str,
    binds: Vec<Value>,
) -> futures_util::stream::BoxStream<'c, QuarryResult<Vec<Value>>> {
    use futures_util::StreamExt;

    tracing::debug!(
        operation = "stream",
        sql = %sql,
        binds = %format_binds(&binds),
        "quarry query"
    );
    let query = binds.into_iter().fold(sqlx::query::<Sqlite>(sql), bind_value);
    query
        .fetch(conn)
        .map(|row| row.map_err(Into::into).and_then(|row| row_values(&row)))
        .boxed()
}
