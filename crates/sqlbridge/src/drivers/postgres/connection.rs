//! tokio-postgres native driver.
//!
//! Connections are opened without TLS from the `postgresql://` URL the
//! dialect renders. Auto-commit is emulated: with auto-commit off the first
//! statement opens a transaction with `BEGIN`, and commit or rollback ends
//! it. `?` placeholders are rewritten to `$n` at prepare time and parameters
//! are converted to the type the server inferred for each placeholder.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{CancelToken, Client, Config, NoTls, SimpleQueryMessage, Statement};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::schema::ValueType;
use crate::core::value::{Row, SqlValue};
use crate::error::EXECUTE_FAILED;
use crate::native::{
    CancelHandle, ConnectRequest, ExecuteOutcome, NativeConnection, NativeDriver, NativeError,
    NativeResult, NativeResultSet, QueryOptions, StatementId,
};
use crate::typemap::{NativeColumn, NativeType};

type Param = Box<dyn ToSql + Sync + Send>;

/// Opens [`PostgresConnection`]s.
#[derive(Debug, Clone, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NativeDriver for PostgresDriver {
    fn name(&self) -> &str {
        "tokio-postgres"
    }

    async fn connect(&self, request: &ConnectRequest) -> NativeResult<Box<dyn NativeConnection>> {
        let config = pg_config(request)?;
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| NativeError::connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection terminated: {}", e);
            }
        });

        let cancel = Arc::new(PostgresCancel {
            token: client.cancel_token(),
        });
        Ok(Box::new(PostgresConnection {
            client: Some(client),
            cancel,
            statements: HashMap::new(),
            next_statement: 1,
            auto_commit: true,
            in_transaction: false,
        }))
    }
}

/// Build a client config from `postgresql://host[:port]/database[?options]`
/// plus the request's credentials and properties.
fn pg_config(request: &ConnectRequest) -> NativeResult<Config> {
    let rest = request
        .url
        .strip_prefix("postgresql://")
        .or_else(|| request.url.strip_prefix("postgres://"))
        .ok_or_else(|| NativeError::connection(format!("not a PostgreSQL URL: {}", request.url)))?;

    let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
    let (authority, database) = location.split_once('/').unwrap_or((location, ""));
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };

    let mut config = Config::new();
    config.host(if host.is_empty() { "localhost" } else { host });
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        let port = port
            .parse::<u16>()
            .map_err(|_| NativeError::connection(format!("invalid port '{}'", port)))?;
        config.port(port);
    }
    if !database.is_empty() {
        config.dbname(database);
    }
    if !request.username.is_empty() {
        config.user(&request.username);
    }
    if !request.password.is_empty() {
        config.password(&request.password);
    }

    let mut options: BTreeMap<&str, &str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    for (key, value) in &request.properties {
        options.insert(key.as_str(), value.as_str());
    }

    for (key, value) in options {
        match key {
            "application_name" | "ApplicationName" => {
                config.application_name(value);
            }
            "connect_timeout" | "connectTimeout" => {
                let secs = value.parse::<u64>().map_err(|_| {
                    NativeError::connection(format!("invalid connect_timeout '{}'", value))
                })?;
                config.connect_timeout(Duration::from_secs(secs));
            }
            "options" => {
                config.options(value);
            }
            "keepalives" | "tcpKeepAlive" => {
                config.keepalives(matches!(value, "1" | "true"));
            }
            "sslmode" | "ssl" if matches!(value, "require" | "verify-ca" | "verify-full" | "true") => {
                return Err(NativeError::unsupported(format!("{}={}", key, value)));
            }
            other => debug!("Ignoring PostgreSQL connection option {}", other),
        }
    }
    Ok(config)
}

struct PostgresCancel {
    token: CancelToken,
}

#[async_trait]
impl CancelHandle for PostgresCancel {
    async fn cancel(&self, _statement: StatementId) -> NativeResult<()> {
        self.token
            .cancel_query(NoTls)
            .await
            .map_err(|e| NativeError::connection(e.to_string()))
    }
}

struct PgStatement {
    statement: Statement,
    sql: String,
    batch: Vec<Vec<SqlValue>>,
}

/// One tokio-postgres client.
pub struct PostgresConnection {
    client: Option<Client>,
    cancel: Arc<PostgresCancel>,
    statements: HashMap<u64, PgStatement>,
    next_statement: u64,
    auto_commit: bool,
    in_transaction: bool,
}

impl PostgresConnection {
    fn client(&self) -> NativeResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| NativeError::connection("connection is closed"))
    }

    fn statement(&self, id: StatementId) -> NativeResult<&PgStatement> {
        self.statements
            .get(&id.0)
            .ok_or_else(|| NativeError::statement(format!("unknown statement {}", id)))
    }

    /// Open a transaction when auto-commit is off and none is open.
    async fn begin_if_needed(&mut self) -> NativeResult<()> {
        if self.auto_commit || self.in_transaction {
            return Ok(());
        }
        self.client()?.batch_execute("BEGIN").await.map_err(pg_error)?;
        self.in_transaction = true;
        Ok(())
    }

    async fn end_transaction(&mut self, sql: &str) -> NativeResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client()?.batch_execute(sql).await.map_err(pg_error)
    }

    async fn run_update(&self, id: StatementId, values: &[SqlValue]) -> NativeResult<u64> {
        let stmt = self.statement(id)?;
        let params = bind(values, stmt.statement.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as _).collect();
        self.client()?
            .execute(&stmt.statement, &refs)
            .await
            .map_err(pg_error)
    }
}

#[async_trait]
impl NativeConnection for PostgresConnection {
    async fn set_auto_commit(&mut self, on: bool) -> NativeResult<()> {
        if on && self.in_transaction {
            self.end_transaction("COMMIT").await?;
        }
        self.auto_commit = on;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn prepare(&mut self, sql: &str, return_generated_keys: bool) -> NativeResult<StatementId> {
        if return_generated_keys {
            return Err(NativeError::unsupported("generated keys"));
        }
        let rewritten = rewrite_placeholders(sql);
        let statement = self
            .client()?
            .prepare(&rewritten)
            .await
            .map_err(pg_error)?;

        let id = self.next_statement;
        self.next_statement += 1;
        self.statements.insert(
            id,
            PgStatement {
                statement,
                sql: rewritten,
                batch: Vec::new(),
            },
        );
        Ok(StatementId(id))
    }

    async fn describe(&mut self, statement: StatementId) -> NativeResult<Vec<NativeColumn>> {
        Ok(self
            .statement(statement)?
            .statement
            .columns()
            .iter()
            .map(|c| native_column(c.name(), c.type_()))
            .collect())
    }

    async fn execute_update(&mut self, statement: StatementId, params: &[SqlValue]) -> NativeResult<u64> {
        self.begin_if_needed().await?;
        self.run_update(statement, params).await
    }

    async fn add_batch(&mut self, statement: StatementId, params: &[SqlValue]) -> NativeResult<()> {
        self.statements
            .get_mut(&statement.0)
            .ok_or_else(|| NativeError::statement(format!("unknown statement {}", statement)))?
            .batch
            .push(params.to_vec());
        Ok(())
    }

    /// Executes queued rows one by one inside the open transaction.
    async fn execute_batch(&mut self, statement: StatementId) -> NativeResult<Vec<i64>> {
        self.begin_if_needed().await?;
        let rows = match self.statements.get_mut(&statement.0) {
            Some(stmt) => std::mem::take(&mut stmt.batch),
            None => return Err(NativeError::statement(format!("unknown statement {}", statement))),
        };

        let mut counts = Vec::with_capacity(rows.len());
        for (i, values) in rows.iter().enumerate() {
            match self.run_update(statement, values).await {
                Ok(n) => counts.push(n as i64),
                Err(e) => {
                    counts.resize(rows.len(), EXECUTE_FAILED);
                    return Err(NativeError::batch(format!("Batch entry {} failed", i), counts).chain(e));
                }
            }
        }
        Ok(counts)
    }

    async fn clear_batch(&mut self, statement: StatementId) -> NativeResult<()> {
        if let Some(stmt) = self.statements.get_mut(&statement.0) {
            stmt.batch.clear();
        }
        Ok(())
    }

    async fn query(
        &mut self,
        statement: StatementId,
        params: &[SqlValue],
        options: &QueryOptions,
    ) -> NativeResult<NativeResultSet> {
        self.begin_if_needed().await?;
        let stmt = self.statement(statement)?;
        let bound = bind(params, stmt.statement.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p.as_ref() as _).collect();
        let rows = self
            .client()?
            .query(&stmt.statement, &refs)
            .await
            .map_err(pg_error)?;

        let columns: Vec<NativeColumn> = stmt
            .statement
            .columns()
            .iter()
            .map(|c| native_column(c.name(), c.type_()))
            .collect();
        let limit = options.max_rows.map_or(rows.len(), |m| m as usize);
        let rows = rows
            .iter()
            .take(limit)
            .map(|row| read_row(row, stmt.statement.columns()))
            .collect();
        debug!("Fetched from {}", stmt.sql);
        Ok(NativeResultSet { columns, rows })
    }

    async fn execute(&mut self, sql: &str) -> NativeResult<ExecuteOutcome> {
        self.begin_if_needed().await?;
        let messages = self.client()?.simple_query(sql).await.map_err(pg_error)?;

        let mut columns: Vec<NativeColumn> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut update_count = None;
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row
                            .columns()
                            .iter()
                            .map(|c| NativeColumn::new(c.name(), NativeType::Varchar))
                            .collect();
                    }
                    rows.push(
                        (0..row.len())
                            .map(|i| match row.get(i) {
                                Some(text) => SqlValue::Text(text.to_string()),
                                None => SqlValue::Null(ValueType::String),
                            })
                            .collect(),
                    );
                }
                SimpleQueryMessage::CommandComplete(n) => update_count = Some(n),
                _ => {}
            }
        }

        if rows.is_empty() && columns.is_empty() {
            return Ok(ExecuteOutcome {
                update_count,
                result: None,
            });
        }
        Ok(ExecuteOutcome {
            update_count: None,
            result: Some(NativeResultSet { columns, rows }),
        })
    }

    async fn close_statement(&mut self, statement: StatementId) -> NativeResult<()> {
        self.statements.remove(&statement.0);
        Ok(())
    }

    async fn commit(&mut self) -> NativeResult<()> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback(&mut self) -> NativeResult<()> {
        self.end_transaction("ROLLBACK").await
    }

    async fn set_savepoint(&mut self, name: &str) -> NativeResult<()> {
        self.begin_if_needed().await?;
        self.client()?
            .batch_execute(&format!("SAVEPOINT {}", name))
            .await
            .map_err(pg_error)
    }

    async fn release_savepoint(&mut self, name: &str) -> NativeResult<()> {
        self.client()?
            .batch_execute(&format!("RELEASE SAVEPOINT {}", name))
            .await
            .map_err(pg_error)
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> NativeResult<()> {
        self.client()?
            .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .await
            .map_err(pg_error)
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        self.cancel.clone()
    }

    async fn is_valid(&mut self) -> bool {
        match &self.client {
            Some(client) => client.simple_query("SELECT 1").await.is_ok(),
            None => false,
        }
    }

    fn is_closed(&self) -> bool {
        self.client.as_ref().map_or(true, Client::is_closed)
    }

    /// Drops the client, which ends the connection task.
    async fn close(&mut self) -> NativeResult<()> {
        self.statements.clear();
        self.in_transaction = false;
        self.client = None;
        Ok(())
    }
}

fn pg_error(e: tokio_postgres::Error) -> NativeError {
    if e.is_closed() {
        return NativeError::connection(e.to_string());
    }
    match e.code() {
        Some(state) => {
            let message = e
                .as_db_error()
                .map_or_else(|| e.to_string(), |db| db.message().to_string());
            NativeError::statement(message).with_sql_state(state.code())
        }
        None => NativeError::statement(e.to_string()),
    }
}

/// Replace `?` placeholders with `$1`, `$2`, ... outside quotes and comments.
pub(crate) fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.chars().peekable();
    let mut n = 0;

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(c);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '?' => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

fn native_column(name: &str, ty: &Type) -> NativeColumn {
    let native_type = match *ty {
        Type::BOOL => NativeType::Boolean,
        Type::INT2 => NativeType::SmallInt,
        Type::INT4 | Type::OID => NativeType::Integer,
        Type::INT8 => NativeType::BigInt,
        Type::FLOAT4 => NativeType::Real,
        Type::FLOAT8 => NativeType::Double,
        Type::NUMERIC => NativeType::Numeric,
        Type::CHAR | Type::BPCHAR => NativeType::Char,
        Type::VARCHAR | Type::NAME | Type::UUID => NativeType::Varchar,
        Type::TEXT | Type::JSON | Type::JSONB | Type::XML => NativeType::LongVarchar,
        Type::DATE => NativeType::Date,
        Type::TIME => NativeType::Time,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => NativeType::Timestamp,
        Type::BYTEA => NativeType::Binary,
        _ => NativeType::Other,
    };
    NativeColumn::new(name, native_type).with_type_name(ty.name())
}

fn read_row(row: &tokio_postgres::Row, columns: &[tokio_postgres::Column]) -> Row {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| read_value(row, i, c.type_()))
        .collect()
}

fn read_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> SqlValue {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T> {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    let (value, null) = match *ty {
        Type::BOOL => (get::<bool>(row, idx).map(SqlValue::Bool), ValueType::Boolean),
        Type::INT2 => (get::<i16>(row, idx).map(|v| SqlValue::Integer(v.into())), ValueType::Integer),
        Type::INT4 => (get::<i32>(row, idx).map(|v| SqlValue::Integer(v.into())), ValueType::Integer),
        Type::INT8 => (get::<i64>(row, idx).map(SqlValue::Integer), ValueType::Integer),
        Type::OID => (get::<u32>(row, idx).map(|v| SqlValue::Integer(v.into())), ValueType::Integer),
        Type::FLOAT4 => (get::<f32>(row, idx).map(|v| SqlValue::Number(v.into())), ValueType::Number),
        Type::FLOAT8 => (get::<f64>(row, idx).map(SqlValue::Number), ValueType::Number),
        Type::NUMERIC => (get::<Decimal>(row, idx).map(SqlValue::BigNumber), ValueType::BigNumber),
        Type::UUID => (get::<Uuid>(row, idx).map(SqlValue::Uuid), ValueType::String),
        Type::DATE => (get::<NaiveDate>(row, idx).map(SqlValue::Date), ValueType::Date),
        Type::TIME => (get::<NaiveTime>(row, idx).map(SqlValue::Time), ValueType::Date),
        Type::TIMESTAMP => (get::<NaiveDateTime>(row, idx).map(SqlValue::DateTime), ValueType::Timestamp),
        Type::TIMESTAMPTZ => (
            get::<DateTime<FixedOffset>>(row, idx).map(SqlValue::DateTimeOffset),
            ValueType::Timestamp,
        ),
        Type::BYTEA => (get::<Vec<u8>>(row, idx).map(SqlValue::Bytes), ValueType::Binary),
        Type::JSON | Type::JSONB => (
            get::<serde_json::Value>(row, idx).map(|v| SqlValue::Text(v.to_string())),
            ValueType::String,
        ),
        _ => (get::<String>(row, idx).map(SqlValue::Text), ValueType::String),
    };
    value.unwrap_or(SqlValue::Null(null))
}

/// Convert parameters to the types the server expects.
fn bind(values: &[SqlValue], types: &[Type]) -> NativeResult<Vec<Param>> {
    if values.len() != types.len() {
        return Err(NativeError::statement(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            values.len()
        )));
    }
    values
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (value, ty))| {
            to_param(value, ty).ok_or_else(|| {
                NativeError::statement(format!(
                    "parameter {} ({}) cannot be sent as {}",
                    i + 1,
                    value.value_type().as_str(),
                    ty.name()
                ))
            })
        })
        .collect()
}

fn to_param(value: &SqlValue, ty: &Type) -> Option<Param> {
    if value.is_null() {
        return Some(typed_null(ty));
    }
    let param: Param = match *ty {
        Type::BOOL => Box::new(match value {
            SqlValue::Bool(b) => *b,
            SqlValue::Integer(v) => *v != 0,
            SqlValue::Text(s) => matches!(s.trim().to_ascii_uppercase().as_str(), "Y" | "YES" | "TRUE" | "1"),
            _ => return None,
        }),
        Type::INT2 => Box::new(i16::try_from(integer(value)?).ok()?),
        Type::INT4 => Box::new(i32::try_from(integer(value)?).ok()?),
        Type::INT8 => Box::new(integer(value)?),
        Type::FLOAT4 => Box::new(number(value)? as f32),
        Type::FLOAT8 => Box::new(number(value)?),
        Type::NUMERIC => Box::new(match value {
            SqlValue::BigNumber(d) => *d,
            SqlValue::Integer(v) => Decimal::from(*v),
            SqlValue::Number(f) => Decimal::from_f64(*f)?,
            SqlValue::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        }),
        Type::UUID => Box::new(match value {
            SqlValue::Uuid(u) => *u,
            SqlValue::Text(s) => Uuid::parse_str(s.trim()).ok()?,
            _ => return None,
        }),
        Type::BYTEA => Box::new(match value {
            SqlValue::Bytes(b) => b.clone(),
            SqlValue::Text(s) => s.as_bytes().to_vec(),
            _ => return None,
        }),
        Type::DATE => Box::new(match value {
            SqlValue::Date(d) => *d,
            SqlValue::DateTime(dt) => dt.date(),
            SqlValue::DateTimeOffset(dt) => dt.date_naive(),
            _ => return None,
        }),
        Type::TIME => Box::new(match value {
            SqlValue::Time(t) => *t,
            SqlValue::DateTime(dt) => dt.time(),
            _ => return None,
        }),
        Type::TIMESTAMP => Box::new(match value {
            SqlValue::DateTime(dt) => *dt,
            SqlValue::DateTimeOffset(dt) => dt.naive_utc(),
            SqlValue::Date(d) => d.and_time(NaiveTime::MIN),
            _ => return None,
        }),
        Type::TIMESTAMPTZ => Box::new(match value {
            SqlValue::DateTimeOffset(dt) => *dt,
            SqlValue::DateTime(dt) => dt.and_utc().fixed_offset(),
            SqlValue::Date(d) => d.and_time(NaiveTime::MIN).and_utc().fixed_offset(),
            _ => return None,
        }),
        _ => Box::new(value.to_string()),
    };
    Some(param)
}

fn integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::Number(f) => Some(f.round() as i64),
        SqlValue::BigNumber(d) => d.round().to_i64(),
        other => other.as_i64(),
    }
}

fn number(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Number(f) => Some(*f),
        SqlValue::Integer(v) => Some(*v as f64),
        SqlValue::BigNumber(d) => d.to_f64(),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn typed_null(ty: &Type) -> Param {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::NUMERIC => Box::new(None::<Decimal>),
        Type::UUID => Box::new(None::<Uuid>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        Type::DATE => Box::new(None::<NaiveDate>),
        Type::TIME => Box::new(None::<NaiveTime>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<FixedOffset>>),
        _ => Box::new(None::<String>),
    }
}
