//! Per-backend positional binders.
//!
//! sqlx query builders are generic over the database, so each backend gets
//! its own bind function. Callers fold the parameter list through one of
//! these, which preserves list order.

use crate::value::ParamValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q ParamValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        ParamValue::Null => query.bind(None::<String>),
        ParamValue::Bool(v) => query.bind(*v),
        ParamValue::Int(v) => query.bind(*v),
        ParamValue::Float(v) => query.bind(*v),
        ParamValue::String(v) => query.bind(v.as_str()),
        ParamValue::Json(v) => query.bind(Json(v)),
    }
}

pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q ParamValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        ParamValue::Null => query.bind(None::<String>),
        ParamValue::Bool(v) => query.bind(*v),
        ParamValue::Int(v) => query.bind(*v),
        ParamValue::Float(v) => query.bind(*v),
        ParamValue::String(v) => query.bind(v.as_str()),
        ParamValue::Json(v) => query.bind(Json(v)),
    }
}

pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q ParamValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        ParamValue::Null => query.bind(None::<String>),
        ParamValue::Bool(v) => query.bind(*v),
        ParamValue::Int(v) => query.bind(*v),
        ParamValue::Float(v) => query.bind(*v),
        ParamValue::String(v) => query.bind(v.as_str()),
        // No JSON column type in SQLite; the serialized text goes in as TEXT
        ParamValue::Json(v) => query.bind(v.to_string()),
    }
}
