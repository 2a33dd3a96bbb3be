pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use colored::Colorize;
use serde_json::Value;

use crate::OutputFormat;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => {
            report_warnings(value);
            csv_out::print_csv(value)
        }
        OutputFormat::Minimal => {
            report_warnings(value);
            minimal::print_minimal(value)
        }
    }
}

/// CSV and minimal output carry no room for warnings, so they go to stderr.
fn report_warnings(value: &Value) {
    for w in collect_warnings(value) {
        eprintln!("{}: {}", "warning".yellow().bold(), w);
    }
}

fn collect_warnings(value: &Value) -> Vec<&str> {
    match value.get("warnings") {
        Some(Value::Array(warnings)) => warnings.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collects_string_warnings() {
        let value = json!({
            "result": {},
            "warnings": ["No price history for NOPX", 3]
        });
        assert_eq!(collect_warnings(&value), vec!["No price history for NOPX"]);
    }

    #[test]
    fn test_no_warnings_field() {
        assert!(collect_warnings(&json!({ "result": {} })).is_empty());
    }
}
