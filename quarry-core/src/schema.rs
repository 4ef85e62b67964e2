use sqlx::SqlitePool;

use crate::dialect::SqlDialect;
use crate::entity::{EntityMeta, SqlType};

/// Metadata about a database column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    /// Declared type as written in the DDL (e.g. "BIGINT", "TEXT").
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// A foreign key of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Metadata about a database table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
    pub foreign_keys: Vec<SchemaForeignKey>,
}

impl SchemaTable {
    /// Returns a column by name if it exists in the table.
    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn type_name<DB: SqlDialect>(sql_type: SqlType) -> &'static str {
    match sql_type {
        SqlType::Integer => DB::int_type(),
        SqlType::BigInt => DB::bigint_type(),
        SqlType::Real => DB::float_type(),
        SqlType::Text => DB::text_type(),
        SqlType::Boolean => DB::bool_type(),
    }
}

/// `CREATE TABLE IF NOT EXISTS` for one mapped entity.
pub fn create_table_sql<DB: SqlDialect>(meta: &EntityMeta) -> String {
    let columns: Vec<String> = meta
        .columns
        .iter()
        .map(|column| {
            let mut def = format!(
                "{} {}",
                DB::quote_identifier(column.name),
                type_name::<DB>(column.sql_type)
            );
            if column.primary_key {
                def.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(target) = column.references {
                let target = target();
                def.push_str(&format!(
                    " REFERENCES {} ({})",
                    DB::quote_identifier(target.table),
                    DB::quote_identifier(target.id_column)
                ));
            }
            def
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        DB::quote_identifier(meta.table),
        columns.join(", ")
    )
}

/// `INSERT` of every mapped column, in mapping order.
pub(crate) fn insert_sql<DB: SqlDialect>(meta: &EntityMeta) -> String {
    let columns: Vec<String> = meta
        .columns
        .iter()
        .map(|column| DB::quote_identifier(column.name))
        .collect();
    let placeholders: Vec<String> = (1..=meta.columns.len()).map(DB::placeholder).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        DB::quote_identifier(meta.table),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Introspects the schema of a SQLite database.
pub async fn introspect_sqlite_schema(pool: &SqlitePool) -> Result<Vec<SchemaTable>, sqlx::Error> {
    let table_names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut tables = Vec::new();
    for name in table_names {
        let pragma_sql = format!("PRAGMA table_info({})", name);
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&pragma_sql).fetch_all(pool).await?;

        if rows.is_empty() {
            continue;
        }

        let columns = rows
            .into_iter()
            .map(|(_cid, col_name, col_type, notnull, _default, pk)| {
                let is_pk = pk > 0;
                SchemaColumn {
                    name: col_name,
                    sql_type: col_type,
                    nullable: !is_pk && notnull == 0,
                    primary_key: is_pk,
                }
            })
            .collect();

        let foreign_keys = introspect_sqlite_foreign_keys(pool, &name).await?;

        tables.push(SchemaTable {
            name,
            columns,
            foreign_keys,
        });
    }

    Ok(tables)
}

async fn introspect_sqlite_foreign_keys(
    pool: &SqlitePool,
    table: &str,
) -> Result<Vec<SchemaForeignKey>, sqlx::Error> {
    let sql = format!("PRAGMA foreign_key_list({})", table);
    let rows: Vec<(i64, i64, String, String, Option<String>, String, String, String)> =
        sqlx::query_as(&sql).fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|(_id, _seq, ref_table, column, ref_column, _upd, _del, _match)| SchemaForeignKey {
            column,
            ref_table,
            ref_column: ref_column.unwrap_or_default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use sqlx::Sqlite;

    use super::*;
    use crate::entity::ColumnMeta;

    static TEAM: EntityMeta = EntityMeta {
        name: "Team",
        table: "team",
        id_column: "team_id",
        columns: &[
            ColumnMeta {
                name: "team_id",
                property: "id",
                sql_type: SqlType::BigInt,
                nullable: false,
                primary_key: true,
                references: None,
            },
            ColumnMeta {
                name: "name",
                property: "name",
                sql_type: SqlType::Text,
                nullable: false,
                primary_key: false,
                references: None,
            },
        ],
    };

    fn team() -> &'static EntityMeta {
        &TEAM
    }

    static MEMBER: EntityMeta = EntityMeta {
        name: "Member",
        table: "member",
        id_column: "member_id",
        columns: &[
            ColumnMeta {
                name: "member_id",
                property: "id",
                sql_type: SqlType::BigInt,
                nullable: false,
                primary_key: true,
                references: None,
            },
            ColumnMeta {
                name: "username",
                property: "username",
                sql_type: SqlType::Text,
                nullable: true,
                primary_key: false,
                references: None,
            },
            ColumnMeta {
                name: "team_id",
                property: "team",
                sql_type: SqlType::BigInt,
                nullable: true,
                primary_key: false,
                references: Some(team),
            },
        ],
    };

    #[test]
    fn create_table_renders_keys_and_references() {
        assert_eq!(
            create_table_sql::<Sqlite>(&MEMBER),
            "CREATE TABLE IF NOT EXISTS `member` (`member_id` BIGINT PRIMARY KEY, \
             `username` TEXT, `team_id` BIGINT REFERENCES `team` (`team_id`))"
        );
        assert_eq!(
            create_table_sql::<Sqlite>(&TEAM),
            "CREATE TABLE IF NOT EXISTS `team` (`team_id` BIGINT PRIMARY KEY, `name` TEXT NOT NULL)"
        );
    }

    #[test]
    fn insert_lists_every_column() {
        assert_eq!(
            insert_sql::<Sqlite>(&MEMBER),
            "INSERT INTO `member` (`member_id`, `username`, `team_id`) VALUES (?, ?, ?)"
        );
    }

    #[tokio::test]
    async fn sqlite_introspection_reports_foreign_keys() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        for meta in [&TEAM, &MEMBER] {
            sqlx::query(&create_table_sql::<Sqlite>(meta))
                .execute(&pool)
                .await
                .unwrap();
        }

        let tables = introspect_sqlite_schema(&pool).await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["member", "team"]);

        let member = &tables[0];
        assert_eq!(
            member.column("member_id"),
            Some(&SchemaColumn {
                name: "member_id".to_string(),
                sql_type: "BIGINT".to_string(),
                nullable: false,
                primary_key: true,
            })
        );
        assert!(member.column("username").is_some_and(|c| c.nullable));
        assert_eq!(
            member.foreign_keys,
            vec![SchemaForeignKey {
                column: "team_id".to_string(),
                ref_table: "team".to_string(),
                ref_column: "team_id".to_string(),
            }]
        );
        assert!(tables[1].foreign_keys.is_empty());
    }
}
