use sqlx::Database;

// Multi-database rendering
// Queries execute on SQLite; the same query tree renders for any dialect below.
/// A trait that encapsulates what a database needs for Quarry to render SQL for it.
///
/// Implementing this trait lets the renderer emit the right placeholder style,
/// identifier quoting and column types for schema export.
pub trait SqlDialect: Database + Sized + Send + Sync {
    /// Returns the placeholder for the `n`-th parameter in a query (e.g., "?" or "$1").
    fn placeholder(n: usize) -> String;
    /// Returns the LIMIT value used when only an OFFSET was requested.
    fn unbounded_limit() -> &'static str;

    /// Returns the native SQL type for 32-bit integers.
    fn int_type() -> &'static str {
        "INTEGER"
    }
    /// Returns the native SQL type for 64-bit integers.
    fn bigint_type() -> &'static str {
        "BIGINT"
    }
    /// Returns the native SQL type for text strings.
    fn text_type() -> &'static str {
        "TEXT"
    }
    /// Returns the native SQL type for booleans.
    fn bool_type() -> &'static str {
        "BOOLEAN"
    }
    /// Returns the native SQL type for floating-point numbers.
    fn float_type() -> &'static str {
        "REAL"
    }

    /// Quotes an identifier (table/column/alias name) to prevent SQL injection.
    fn quote_identifier(ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

impl SqlDialect for sqlx::Sqlite {
    fn placeholder(_n: usize) -> String {
        "?".to_owned()
    }
    fn unbounded_limit() -> &'static str {
        "-1"
    }
}

#[cfg(feature = "postgres")]
impl SqlDialect for sqlx::Postgres {
    fn placeholder(n: usize) -> String {
        format!("${}", n)
    }
    fn unbounded_limit() -> &'static str {
        "ALL"
    }
    fn float_type() -> &'static str {
        "DOUBLE PRECISION"
    }
    fn quote_identifier(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}
