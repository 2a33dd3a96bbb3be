use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Decimal places shown for floating-point cells (weights, ratios, volatilities).
const FLOAT_PLACES: usize = 6;

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(envelope) => match envelope.get("result") {
            Some(Value::Object(result)) => {
                print_section(result);
                print_envelope_notes(envelope);
            }
            _ => print_section(envelope),
        },
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_envelope_notes(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Scalars go in a Field/Value table; lists of records and nested objects
/// (weights, rankings, the pipeline's sub-results) get their own tables.
fn print_section(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut nested: Vec<(&String, &Value)> = Vec::new();
    for (key, val) in map {
        match val {
            Value::Object(_) => nested.push((key, val)),
            Value::Array(arr) if arr.first().is_some_and(Value::is_object) => {
                nested.push((key, val))
            }
            _ => builder.push_record([key.as_str(), &format_value(val)]),
        }
    }
    println!("{}", Table::from(builder));

    for (key, val) in nested {
        println!("\n{}:", key);
        match val {
            Value::Object(inner) => print_section(inner),
            Value::Array(arr) => print_array_table(arr),
            _ => {}
        }
    }
}

/// One row per record, columns from the first record's flattened keys.
fn print_array_table(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        if arr.is_empty() {
            println!("(empty)");
        }
        for item in arr {
            println!("{}", format_value(item));
        }
        return;
    };

    let headers: Vec<String> = flatten(first).into_iter().map(|(k, _)| k).collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for map in arr.iter().filter_map(Value::as_object) {
        let cells = flatten(map);
        let row: Vec<String> = headers
            .iter()
            .map(|h| {
                cells
                    .iter()
                    .find(|(k, _)| k == h)
                    .map(|(_, v)| format_value(v))
                    .unwrap_or_default()
            })
            .collect();
        builder.push_record(row);
    }
    println!("{}", Table::from(builder));
}

/// Flatten nested objects into dotted keys (`metrics.ticker`).
pub(crate) fn flatten(map: &Map<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (key, val) in map {
        match val {
            Value::Object(inner) => {
                for (sub, v) in flatten(inner) {
                    out.push((format!("{}.{}", key, sub), v));
                }
            }
            _ => out.push((key.clone(), val.clone())),
        }
    }
    out
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(|f| format!("{:.*}", FLOAT_PLACES, f))
            .unwrap_or_else(|| n.to_string()),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_floats_rounded_integers_kept() {
        assert_eq!(format_value(&json!(0.68571428571)), "0.685714");
        assert_eq!(format_value(&json!(15)), "15");
        assert_eq!(format_value(&json!(null)), "-");
        assert_eq!(format_value(&json!(["AAA", "BBB"])), "AAA, BBB");
    }

    #[test]
    fn test_flatten_dotted_keys() {
        let value = json!({ "rank": 1, "metrics": { "ticker": "AAA", "roe": "0.2" } });
        let keys: Vec<String> = flatten(value.as_object().unwrap())
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["metrics.roe", "metrics.ticker", "rank"]);
    }
}
