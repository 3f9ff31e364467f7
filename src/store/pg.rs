//! PostgreSQL store.
//!
//! A fresh blocking connection is opened for every operation. Loads run in a
//! single transaction: drop, recreate from the frame's schema, binary COPY.

use super::{quote_ident, RecordStore, StoreError};
use crate::config::DbConfig;
use crate::data::{date_to_epoch_days, epoch_days_to_date};
use chrono::NaiveDate;
use polars::prelude::*;
use postgres::binary_copy::BinaryCopyInWriter;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls, Row};
use tracing::{debug, info};

/// Column types read back without a server-side cast.
const NATIVE_TYPES: [Type; 11] = [
    Type::TEXT,
    Type::VARCHAR,
    Type::BPCHAR,
    Type::NAME,
    Type::BOOL,
    Type::INT2,
    Type::INT4,
    Type::INT8,
    Type::FLOAT4,
    Type::FLOAT8,
    Type::DATE,
];

/// Column type used when writing a frame column of `dtype`.
pub fn sql_type_for(dtype: &DataType) -> Type {
    match dtype {
        DataType::Boolean => Type::BOOL,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => Type::INT8,
        DataType::UInt64 | DataType::Float32 | DataType::Float64 => Type::FLOAT8,
        DataType::Date => Type::DATE,
        _ => Type::TEXT,
    }
}

/// A frame column converted to values the COPY writer accepts.
enum SqlColumn {
    Text(Vec<Option<String>>),
    BigInt(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Date(Vec<Option<NaiveDate>>),
}

impl SqlColumn {
    fn from_series(series: &Series) -> PolarsResult<Self> {
        let ty = sql_type_for(series.dtype());

        let column = if ty == Type::BOOL {
            Self::Bool(series.bool()?.into_iter().collect())
        } else if ty == Type::INT8 {
            let ints = series.cast(&DataType::Int64)?;
            let values: Vec<Option<i64>> = ints.i64()?.into_iter().collect();
            Self::BigInt(values)
        } else if ty == Type::FLOAT8 {
            let floats = series.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = floats
                .f64()?
                .into_iter()
                .map(|v| v.filter(|f| !f.is_nan()))
                .collect();
            Self::Double(values)
        } else if ty == Type::DATE {
            let days = series.cast(&DataType::Int32)?;
            let values: Vec<Option<NaiveDate>> = days
                .i32()?
                .into_iter()
                .map(|v| v.and_then(epoch_days_to_date))
                .collect();
            Self::Date(values)
        } else {
            let text = series.cast(&DataType::String)?;
            let values: Vec<Option<String>> = text
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            Self::Text(values)
        };

        Ok(column)
    }

    fn sql_type(&self) -> Type {
        match self {
            Self::Text(_) => Type::TEXT,
            Self::BigInt(_) => Type::INT8,
            Self::Double(_) => Type::FLOAT8,
            Self::Bool(_) => Type::BOOL,
            Self::Date(_) => Type::DATE,
        }
    }

    fn value(&self, row: usize) -> &(dyn ToSql + Sync) {
        match self {
            Self::Text(v) => &v[row],
            Self::BigInt(v) => &v[row],
            Self::Double(v) => &v[row],
            Self::Bool(v) => &v[row],
            Self::Date(v) => &v[row],
        }
    }
}

fn read_column(rows: &[Row], idx: usize, name: &str, ty: &Type) -> Result<Column, StoreError> {
    let name = PlSmallStr::from(name);

    let column = if *ty == Type::BOOL {
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<bool>>(idx))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    } else if *ty == Type::INT2 {
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<i16>>(idx).map(|v| v.map(i64::from)))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    } else if *ty == Type::INT4 {
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<i32>>(idx).map(|v| v.map(i64::from)))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    } else if *ty == Type::INT8 {
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<i64>>(idx))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    } else if *ty == Type::FLOAT4 {
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<f32>>(idx).map(|v| v.map(f64::from)))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    } else if *ty == Type::FLOAT8 {
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<f64>>(idx))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    } else if *ty == Type::DATE {
        let days = rows
            .iter()
            .map(|row| row.try_get::<_, Option<NaiveDate>>(idx).map(|v| v.map(date_to_epoch_days)))
            .collect::<Result<Vec<_>, _>>()?;
        Column::from(Series::new(name, days).cast(&DataType::Date)?)
    } else {
        // text, or any other type cast to text by the query
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<String>>(idx))
            .collect::<Result<Vec<_>, _>>()?;
        Column::new(name, values)
    };

    Ok(column)
}

/// PostgreSQL-backed [`RecordStore`].
pub struct PgStore {
    config: DbConfig,
}

impl PgStore {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    fn connect(&self) -> Result<Client, StoreError> {
        debug!(url = %self.config.redacted_url(), "connecting");
        let client = postgres::Config::new()
            .user(&self.config.user)
            .password(&self.config.password)
            .host(&self.config.host)
            .port(self.config.port)
            .dbname(&self.config.database)
            .connect(NoTls)?;
        Ok(client)
    }
}

impl RecordStore for PgStore {
    fn replace_table(&mut self, table: &str, df: &DataFrame) -> Result<u64, StoreError> {
        let columns = df
            .get_columns()
            .iter()
            .map(|col| SqlColumn::from_series(col.as_materialized_series()))
            .collect::<PolarsResult<Vec<_>>>()?;
        let names: Vec<String> = df
            .get_columns()
            .iter()
            .map(|col| quote_ident(col.name().as_str()))
            .collect();
        let types: Vec<Type> = columns.iter().map(SqlColumn::sql_type).collect();

        let ident = quote_ident(table);
        let definitions = names
            .iter()
            .zip(&types)
            .map(|(name, ty)| format!("{} {}", name, ty.name()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut client = self.connect()?;
        let mut tx = client.transaction()?;
        tx.batch_execute(&format!("DROP TABLE IF EXISTS {}", ident))?;
        tx.batch_execute(&format!("CREATE TABLE {} ({})", ident, definitions))?;

        let written = if columns.is_empty() {
            0
        } else {
            let copy = format!("COPY {} ({}) FROM STDIN BINARY", ident, names.join(", "));
            let sink = tx.copy_in(copy.as_str())?;
            let mut writer = BinaryCopyInWriter::new(sink, &types);
            for row in 0..df.height() {
                let values: Vec<&(dyn ToSql + Sync)> =
                    columns.iter().map(|col| col.value(row)).collect();
                writer.write(&values)?;
            }
            writer.finish()?
        };
        tx.commit()?;

        info!(table, rows = written, "replaced table");
        Ok(written)
    }

    fn fetch_table(&mut self, table: &str) -> Result<DataFrame, StoreError> {
        let mut client = self.connect()?;
        let ident = quote_ident(table);

        let probe = client.prepare(&format!("SELECT * FROM {}", ident))?;
        let select_list = probe
            .columns()
            .iter()
            .map(|col| {
                let name = quote_ident(col.name());
                if NATIVE_TYPES.contains(col.type_()) {
                    name
                } else {
                    format!("{}::text AS {}", name, name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let query = if select_list.is_empty() {
            format!("SELECT * FROM {}", ident)
        } else {
            format!("SELECT {} FROM {}", select_list, ident)
        };
        let statement = client.prepare(&query)?;
        let rows = client.query(&statement, &[])?;

        let columns = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| read_column(&rows, idx, col.name(), col.type_()))
            .collect::<Result<Vec<_>, _>>()?;
        let df = DataFrame::new(columns)?;

        info!(table, rows = df.height(), columns = df.width(), "fetched table");
        Ok(df)
    }
}
