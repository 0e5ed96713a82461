//! Heuristic business insights from query results.

use crate::query::cell_text;
use crate::types::{ColumnInfo, Row};
use serde_json::Value;

const AGGREGATES: [&str; 4] = ["AVG", "SUM", "MIN", "MAX"];

/// Derive plain-language observations from `rows` returned by `query`.
pub fn analyze_query_results(query: &str, rows: &[Row]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["No data available for analysis.".to_string()];
    }

    let mut insights = vec![format!("Query returned {} rows of data.", rows.len())];
    let upper = query.to_uppercase();

    if upper.contains("COUNT") && rows.len() == 1 {
        for (key, value) in &rows[0] {
            if key.to_uppercase().contains("COUNT") {
                insights.push(format!("Total count: {}", cell_text(value)));
            }
        }
    } else if AGGREGATES.iter().any(|agg| upper.contains(agg)) {
        for row in rows {
            for (key, value) in row {
                let key_upper = key.to_uppercase();
                if AGGREGATES.iter().any(|agg| key_upper.contains(agg)) {
                    insights.push(format!("{key}: {}", cell_text(value)));
                }
            }
        }
    } else if let Some((_, grouping)) = upper.split_once("GROUP BY") {
        if rows.len() > 1 {
            insights.extend(group_extremes(grouping, rows));
        }
    }

    insights
}

/// Highest and lowest group by the first measure column.
fn group_extremes(grouping: &str, rows: &[Row]) -> Vec<String> {
    let keys: Vec<&String> = rows[0].keys().collect();
    let Some(grouped) = keys
        .iter()
        .rev()
        .find(|k| grouping.contains(&k.to_uppercase()))
    else {
        return Vec::new();
    };
    let Some(measure) = keys.iter().find(|k| *k != grouped) else {
        return Vec::new();
    };

    let score = |row: &&Row| row.get(*measure).and_then(numeric);
    let mut top: Option<(&Row, f64)> = None;
    let mut bottom: Option<(&Row, f64)> = None;
    for row in rows {
        let top_score = score(&row).unwrap_or(0.0);
        if top.is_none_or(|(_, best)| top_score > best) {
            top = Some((row, top_score));
        }
        let bottom_score = score(&row).unwrap_or(f64::INFINITY);
        if bottom.is_none_or(|(_, worst)| bottom_score < worst) {
            bottom = Some((row, bottom_score));
        }
    }

    let describe = |label: &str, row: &Row| {
        format!(
            "{label} {grouped}: {} with {measure} of {}",
            row.get(*grouped).map(cell_text).unwrap_or_default(),
            row.get(*measure).map(cell_text).unwrap_or_default(),
        )
    };

    let mut insights = Vec::new();
    if let Some((row, _)) = top {
        insights.push(describe("Top", row));
    }
    if let Some((row, _)) = bottom {
        insights.push(describe("Bottom", row));
    }
    insights
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

/// Markdown block for the memo: header, the query, then one bullet per insight.
pub fn format_insights_for_memo(insights: &[String], query: &str, context: Option<&str>) -> String {
    if insights.is_empty() {
        return String::new();
    }

    let header = match context {
        Some(context) => format!("## Business Insight: {context}"),
        None => "## Business Insight".to_string(),
    };
    let bullets: Vec<String> = insights.iter().map(|i| format!("- {i}")).collect();

    format!("{header}\n\n```sql\n{query}\n```\n\n{}\n", bullets.join("\n"))
}

/// Memo block summarizing a table's structure.
pub fn schema_insight(table: &str, columns: &[ColumnInfo]) -> String {
    let mut insights = vec![format!("Table '{table}' has {} columns:", columns.len())];

    let mut by_type: Vec<(String, Vec<&str>)> = Vec::new();
    for column in columns {
        let column_type = column.column_type.to_uppercase();
        match by_type.iter_mut().find(|(t, _)| *t == column_type) {
            Some((_, names)) => names.push(&column.name),
            None => by_type.push((column_type, vec![column.name.as_str()])),
        }
    }
    for (column_type, names) in &by_type {
        insights.push(format!(
            "- {} {column_type} columns: {}",
            names.len(),
            names.join(", ")
        ));
    }

    let keys: Vec<&str> = columns
        .iter()
        .filter(|c| {
            let name = c.name.to_lowercase();
            name.contains("id") || name.contains("key")
        })
        .map(|c| c.name.as_str())
        .collect();
    if !keys.is_empty() {
        insights.push(format!("Potential key columns: {}", keys.join(", ")));
    }

    let dates: Vec<&str> = columns
        .iter()
        .filter(|c| {
            let name = c.name.to_lowercase();
            let column_type = c.column_type.to_uppercase();
            name.contains("date")
                || name.contains("time")
                || column_type.contains("DATE")
                || column_type.contains("TIME")
        })
        .map(|c| c.name.as_str())
        .collect();
    if !dates.is_empty() {
        insights.push(format!("Date/time columns: {}", dates.join(", ")));
    }

    format_insights_for_memo(
        &insights,
        &format!("DESCRIBE {table}"),
        Some(&format!("Schema Analysis for {table}")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn empty_results() {
        assert_eq!(
            analyze_query_results("SELECT * FROM t", &[]),
            vec!["No data available for analysis."]
        );
    }

    #[test]
    fn single_count_row() {
        let insights = analyze_query_results(
            "SELECT COUNT(*) AS order_count FROM orders",
            &rows(json!([{"order_count": 42}])),
        );
        assert_eq!(
            insights,
            vec!["Query returned 1 rows of data.", "Total count: 42"]
        );
    }

    #[test]
    fn aggregate_columns_are_reported_per_row() {
        let insights = analyze_query_results(
            "SELECT AVG(total) AS avg_total, MAX(total) AS max_total FROM orders",
            &rows(json!([{"avg_total": 12.5, "max_total": 40}])),
        );
        assert_eq!(insights[1], "avg_total: 12.5");
        assert_eq!(insights[2], "max_total: 40");
    }

    #[test]
    fn grouped_results_report_top_and_bottom() {
        let insights = analyze_query_results(
            "SELECT region, revenue FROM sales GROUP BY region",
            &rows(json!([
                {"region": "north", "revenue": 100},
                {"region": "south", "revenue": 250},
                {"region": "east", "revenue": "75"}
            ])),
        );
        assert_eq!(
            insights,
            vec![
                "Query returned 3 rows of data.",
                "Top region: south with revenue of 250",
                "Bottom region: east with revenue of 75",
            ]
        );
    }

    #[test]
    fn memo_block_layout() {
        let block = format_insights_for_memo(
            &["Query returned 2 rows of data.".to_string()],
            "SELECT * FROM users",
            Some("Users"),
        );
        assert_eq!(
            block,
            "## Business Insight: Users\n\n```sql\nSELECT * FROM users\n```\n\n\
             - Query returned 2 rows of data.\n"
        );
        assert!(format_insights_for_memo(&[], "SELECT 1", None).is_empty());
    }

    #[test]
    fn schema_summary() {
        let columns = vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("name", "TEXT"),
            ColumnInfo::new("email", "text"),
            ColumnInfo::new("created_at", "TIMESTAMP"),
        ];
        let block = schema_insight("users", &columns);
        assert!(block.starts_with("## Business Insight: Schema Analysis for users"));
        assert!(block.contains("```sql\nDESCRIBE users\n```"));
        assert!(block.contains("- Table 'users' has 4 columns:"));
        assert!(block.contains("- - 2 TEXT columns: name, email"));
        assert!(block.contains("- Potential key columns: id"));
        assert!(block.contains("- Date/time columns: created_at"));
    }
}
