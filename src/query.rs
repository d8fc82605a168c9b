use crate::backend::{Statement, StatementParameter};
use crate::error::TableportError;
use crate::filter::{Filter, Literal};
use serde_json::{Map, Value};
use std::fmt;

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn validate_identifier(kind: &str, name: &str) -> Result<String, TableportError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TableportError::validation(format!("{} name must not be empty", kind)));
    }
    if name.len() > 255 {
        return Err(TableportError::validation(format!(
            "{} name exceeds 255 characters",
            kind
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(TableportError::validation(format!(
            "{} name contains control characters",
            kind
        )));
    }
    Ok(name.to_string())
}

/// Three-level Unity Catalog table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(catalog: &str, schema: &str, table: &str) -> Result<Self, TableportError> {
        Ok(Self {
            catalog: validate_identifier("catalog", catalog)?,
            schema: validate_identifier("schema", schema)?,
            table: validate_identifier("table", table)?,
        })
    }

    /// Quoted `catalog.schema.table` path for use in SQL.
    pub fn to_sql(&self) -> String {
        format!(
            "{}.{}.{}",
            quote_ident(&self.catalog),
            quote_ident(&self.schema),
            quote_ident(&self.table)
        )
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// `*` or an explicit column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelection {
    All,
    Named(Vec<String>),
}

impl ColumnSelection {
    /// Parse a comma-separated column list. Blank input selects all columns.
    pub fn parse(text: &str) -> Result<Self, TableportError> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Ok(ColumnSelection::All);
        }

        let columns = text
            .split(',')
            .map(|c| {
                let c = c.trim();
                if c == "*" {
                    return Err(TableportError::validation(
                        "'*' cannot be combined with named columns",
                    ));
                }
                validate_identifier("column", c)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ColumnSelection::Named(columns))
    }

    fn to_sql(&self) -> String {
        match self {
            ColumnSelection::All => "*".to_string(),
            ColumnSelection::Named(columns) => columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Validated limit/offset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    pub fn validate(limit: i64, offset: i64, max_limit: u32) -> Result<Self, TableportError> {
        if limit <= 0 {
            return Err(TableportError::validation("Limit must be greater than 0")
                .with_detail("field", "limit")
                .with_detail("value", limit));
        }
        if limit > i64::from(max_limit) {
            return Err(
                TableportError::validation(format!("Limit cannot exceed {}", max_limit))
                    .with_detail("field", "limit")
                    .with_detail("value", limit),
            );
        }
        if offset < 0 {
            return Err(TableportError::validation("Offset must be non-negative")
                .with_detail("field", "offset")
                .with_detail("value", offset));
        }
        Ok(Self {
            limit: limit as u32,
            offset: offset as u64,
        })
    }
}

/// Named parameters collected while rendering a statement.
#[derive(Debug, Default)]
pub struct ParameterList {
    params: Vec<StatementParameter>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a literal and return its `:name` marker.
    pub fn bind(&mut self, value: &Literal) -> String {
        let (text, type_name) = value.to_parameter_parts();
        self.push(Some(text), Some(type_name))
    }

    pub fn bind_null(&mut self) -> String {
        self.push(None, None)
    }

    fn push(&mut self, value: Option<String>, type_name: Option<&str>) -> String {
        let name = format!("p{}", self.params.len());
        let marker = format!(":{}", name);
        self.params.push(StatementParameter {
            name,
            value,
            type_name: type_name.map(str::to_string),
        });
        marker
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_inner(self) -> Vec<StatementParameter> {
        self.params
    }
}

/// A table read before it is rendered to SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub table: TableRef,
    pub columns: ColumnSelection,
    pub filter: Option<Filter>,
    pub pagination: Pagination,
}

impl TableQuery {
    pub fn to_statement(&self) -> Statement {
        let mut params = ParameterList::new();
        let mut sql = format!("SELECT {} FROM {}", self.columns.to_sql(), self.table.to_sql());
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.render(&mut params));
        }
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            self.pagination.limit, self.pagination.offset
        ));
        Statement {
            sql,
            parameters: params.into_inner(),
        }
    }
}

/// A multi-row INSERT with every value bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub statement: Statement,
    pub column_count: usize,
    pub placeholder_count: usize,
}

impl InsertStatement {
    /// Build from records sharing the first record's columns.
    pub fn build(table: &TableRef, records: &[Map<String, Value>]) -> Result<Self, TableportError> {
        let first = records
            .first()
            .ok_or_else(|| TableportError::validation("no records to insert"))?;
        let columns = first
            .keys()
            .map(|c| validate_identifier("column", c))
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(TableportError::validation("records must have at least one column"));
        }

        let mut params = ParameterList::new();
        let mut values_clauses = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let mut markers = Vec::with_capacity(columns.len());
            for (key, column) in first.keys().zip(&columns) {
                let value = record.get(key).ok_or_else(|| {
                    TableportError::validation(format!("record {} is missing column {}", i, column))
                        .with_detail("record", i)
                        .with_detail("column", column.as_str())
                })?;
                let marker = match Literal::from_json(value)? {
                    Some(literal) => params.bind(&literal),
                    None => params.bind_null(),
                };
                markers.push(marker);
            }
            values_clauses.push(format!("({})", markers.join(", ")));
        }

        let columns_sql = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table.to_sql(),
            columns_sql,
            values_clauses.join(", ")
        );

        let placeholder_count = params.len();
        Ok(Self {
            statement: Statement {
                sql,
                parameters: params.into_inner(),
            },
            column_count: columns.len(),
            placeholder_count,
        })
    }

    /// Rows covered by the statement's placeholders.
    pub fn row_count(&self) -> u64 {
        (self.placeholder_count / self.column_count) as u64
    }
}
