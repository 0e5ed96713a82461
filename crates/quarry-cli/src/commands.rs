//! Subcommand handlers.

use crate::Command;
use anyhow::{Result, bail};
use quarry_client::analysis::{analyze_query_results, format_insights_for_memo};
use quarry_client::query::{QueryType, format_query_results, sample_select_query, validate_query};
use quarry_client::{AppendMode, ColumnInfo, Row, SqliteClient, WriteOutcome};

/// Output width for result tables.
const TABLE_WIDTH: usize = 100;

pub(crate) async fn run(client: &SqliteClient, command: Command) -> Result<()> {
    match command {
        Command::Tools => {
            for tool in client.tools() {
                println!("{} - {}", tool.name, tool.description);
            }
        }
        Command::Tables => {
            let tables = client.list_tables().await?;
            if tables.is_empty() {
                println!("No tables found.");
            }
            for table in tables {
                println!("{table}");
            }
        }
        Command::Describe { table } => {
            let columns = client.describe_table(&table).await?;
            if columns.is_empty() {
                println!("No columns found for '{table}'.");
            } else {
                println!("{}", format_query_results(&column_rows(&columns), TABLE_WIDTH));
                println!("\n{}", sample_select_query(&table, &columns));
            }
        }
        Command::Query { sql } => {
            expect_query(&sql, |t| t == QueryType::Select)?;
            let rows = client.execute_read_query(&sql).await?;
            println!("{}", format_query_results(&rows, TABLE_WIDTH));
        }
        Command::Exec { sql } => {
            expect_query(&sql, |t| t.is_write())?;
            let outcome = client.execute_write_query(&sql).await?;
            println!("{}", write_summary(&outcome));
        }
        Command::CreateTable { sql } => {
            expect_query(&sql, |t| t == QueryType::Create)?;
            println!("{}", client.create_table(&sql).await?.message);
        }
        Command::Insight { text, no_wait } => {
            let mode = if no_wait {
                AppendMode::NonBlocking
            } else {
                AppendMode::Blocking
            };
            println!("{}", client.append_insight(&text, mode).await?.message);
        }
        Command::Memo => {
            println!("{}", client.get_insights_memo().await?);
        }
        Command::Analyze { sql, context } => {
            expect_query(&sql, |t| t == QueryType::Select)?;
            let rows = client.execute_read_query(&sql).await?;
            let insights = analyze_query_results(&sql, &rows);
            let entry = format_insights_for_memo(&insights, &sql, context.as_deref());
            println!("{entry}");
            let receipt = client.append_insight(&entry, AppendMode::Blocking).await?;
            eprintln!("{}", receipt.message);
        }
    }
    Ok(())
}

/// Validate `sql` and check that its type is accepted by the command.
fn expect_query(sql: &str, accepts: impl Fn(QueryType) -> bool) -> Result<QueryType> {
    let query_type = validate_query(sql)?;
    if !accepts(query_type) {
        bail!("{query_type} statements are not accepted by this command");
    }
    Ok(query_type)
}

fn column_rows(columns: &[ColumnInfo]) -> Vec<Row> {
    columns
        .iter()
        .filter_map(|c| match serde_json::to_value(c) {
            Ok(serde_json::Value::Object(row)) => Some(row),
            _ => None,
        })
        .collect()
}

fn write_summary(outcome: &WriteOutcome) -> String {
    match &outcome.error {
        Some(error) => format!("Error: {error}"),
        None => format!("{} row(s) affected", outcome.affected_rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_commands_reject_other_statement_types() {
        assert!(expect_query("SELECT * FROM t", |t| t == QueryType::Select).is_ok());
        let err = expect_query("DELETE FROM t", |t| t == QueryType::Select).unwrap_err();
        assert!(err.to_string().contains("DELETE"), "{err}");
        let err = expect_query("SELECT * FROM t; DROP TABLE t", |t| t == QueryType::Select)
            .unwrap_err();
        assert!(err.to_string().contains("dangerous"), "{err}");
    }

    #[test]
    fn columns_render_as_rows() {
        let rows = column_rows(&[ColumnInfo::new("id", "INTEGER")]);
        assert_eq!(rows[0]["name"], "id");
        assert_eq!(rows[0]["type"], "INTEGER");
    }

    #[test]
    fn write_summaries() {
        let ok = WriteOutcome {
            affected_rows: 2,
            error: None,
        };
        assert_eq!(write_summary(&ok), "2 row(s) affected");
        assert_eq!(
            write_summary(&WriteOutcome::failed("locked")),
            "Error: locked"
        );
    }
}
