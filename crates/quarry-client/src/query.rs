//! SQL query helpers: type detection, validation, result formatting.

use crate::types::{ColumnInfo, Row};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Statement kinds the client distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Unknown,
}

impl QueryType {
    /// Classify by the leading keyword.
    pub fn detect(query: &str) -> Self {
        let query = query.trim().to_uppercase();
        if query.starts_with("SELECT") {
            QueryType::Select
        } else if query.starts_with("INSERT") {
            QueryType::Insert
        } else if query.starts_with("UPDATE") {
            QueryType::Update
        } else if query.starts_with("DELETE") {
            QueryType::Delete
        } else if query.starts_with("CREATE TABLE") {
            QueryType::Create
        } else if query.starts_with("ALTER") {
            QueryType::Alter
        } else if query.starts_with("DROP") {
            QueryType::Drop
        } else {
            QueryType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Create => "CREATE",
            QueryType::Alter => "ALTER",
            QueryType::Drop => "DROP",
            QueryType::Unknown => "UNKNOWN",
        }
    }

    /// Whether the statement modifies rows (the `write_query` tool).
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            QueryType::Insert | QueryType::Update | QueryType::Delete
        )
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a query was rejected before being sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidQuery {
    #[error("Query cannot be empty")]
    Empty,

    #[error("Query contains potentially dangerous pattern: {0}")]
    DangerousPattern(&'static str),

    #[error("{0}")]
    MissingClause(&'static str),

    #[error("Unsupported query type: {0}")]
    Unsupported(QueryType),
}

const DANGEROUS_PATTERNS: &[&str] = &[
    r";\s*DROP\s+TABLE",
    r";\s*DELETE\s+FROM",
    r";\s*UPDATE\s+.*\s*SET",
    r";\s*INSERT\s+INTO",
    r"--",
    r"/\*.*\*/",
];

fn ci(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("static SQL pattern is valid")
}

static DANGEROUS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| DANGEROUS_PATTERNS.iter().map(|p| (*p, ci(p))).collect());

static FROM_CLAUSE: LazyLock<Regex> = LazyLock::new(|| ci(r"FROM\s+\w+"));
static INTO_CLAUSE: LazyLock<Regex> = LazyLock::new(|| ci(r"INTO\s+\w+"));
static SET_CLAUSE: LazyLock<Regex> = LazyLock::new(|| ci(r"SET\s+\w+\s*="));
static TABLE_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| ci(r"TABLE\s+(IF\s+NOT\s+EXISTS\s+)?\w+\s*\("));

/// Basic syntax and injection screening. Returns the detected type.
pub fn validate_query(query: &str) -> Result<QueryType, InvalidQuery> {
    if query.trim().is_empty() {
        return Err(InvalidQuery::Empty);
    }

    if let Some((pattern, _)) = DANGEROUS.iter().find(|(_, re)| re.is_match(query)) {
        return Err(InvalidQuery::DangerousPattern(pattern));
    }

    let query_type = QueryType::detect(query);
    let (clause, message) = match query_type {
        QueryType::Select => (&*FROM_CLAUSE, "SELECT query must include FROM clause"),
        QueryType::Insert => (&*INTO_CLAUSE, "INSERT query must include INTO clause"),
        QueryType::Update => (&*SET_CLAUSE, "UPDATE query must include SET clause"),
        QueryType::Delete => (&*FROM_CLAUSE, "DELETE query must include FROM clause"),
        QueryType::Create => (
            &*TABLE_DEFINITION,
            "CREATE TABLE query must include table name and column definitions",
        ),
        other => return Err(InvalidQuery::Unsupported(other)),
    };

    if clause.is_match(query) {
        Ok(query_type)
    } else {
        Err(InvalidQuery::MissingClause(message))
    }
}

/// Display form of a cell value: strings unquoted, NULL spelled out.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Pad or truncate `text` to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    format!("{text:<width$}").chars().take(width).collect()
}

/// Render rows as a fixed-width text table.
///
/// Columns come from the first row. When the table is wider than `max_width`
/// the columns shrink proportionally, to no less than 10 characters, and both
/// column names and cell values are truncated to fit.
pub fn format_query_results(rows: &[Row], max_width: usize) -> String {
    let Some(first) = rows.first() else {
        return "No results found.".to_string();
    };
    let columns: Vec<&String> = first.keys().collect();
    if columns.is_empty() {
        return format!("Query returned {} rows with no columns.", rows.len());
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            let len = row.get(*col).map(cell_text).unwrap_or_default().chars().count();
            widths[i] = widths[i].max(len);
        }
    }

    let total: usize = widths.iter().sum::<usize>() + 3 * columns.len() - 1;
    if total > max_width {
        let scale = max_width as f64 / total as f64;
        for width in &mut widths {
            *width = ((*width as f64 * scale) as usize).max(10);
        }
    }

    let header = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| fit(col, *w))
        .collect::<Vec<_>>()
        .join(" | ");
    let separator = "-".repeat(header.chars().count());

    let lines: Vec<String> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(&widths)
                .map(|(col, w)| {
                    fit(&row.get(*col).map(cell_text).unwrap_or_default(), *w)
                })
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();

    format!("{header}\n{separator}\n{}", lines.join("\n"))
}

/// `SELECT <columns> FROM <table> LIMIT 5;`
pub fn sample_select_query(table: &str, columns: &[ColumnInfo]) -> String {
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    format!("SELECT {} FROM {table} LIMIT 5;", names.join(", "))
}

/// A CREATE TABLE statement with one column definition per line.
pub fn create_table_query(table: &str, columns: &[ColumnInfo]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.column_type))
        .collect();
    format!("CREATE TABLE {table} (\n  {}\n);", defs.join(",\n  "))
}
