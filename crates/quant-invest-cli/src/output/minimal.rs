use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Allocations print as `asset weight` lines and screens as `ticker score`
/// lines. Anything else falls back to well-known fields in order of
/// priority, then to the first field in the result object.
pub fn print_minimal(value: &Value) {
    // Try to extract the "result" envelope
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Pipeline output nests the allocation
    let result_obj = result_obj
        .get("allocation")
        .filter(|a| a.is_object())
        .unwrap_or(result_obj);

    // Allocations print one "asset weight" line each
    if let Some(Value::Array(weights)) = result_obj.get("weights") {
        if !weights.is_empty() {
            for w in weights {
                println!(
                    "{} {}",
                    w.get("asset").map(format_minimal).unwrap_or_default(),
                    w.get("weight").map(format_minimal).unwrap_or_default()
                );
            }
            return;
        }
    }

    // Screening prints the ranked tickers
    if let Some(Value::Array(ranked)) = result_obj.get("ranked") {
        for candidate in ranked {
            let ticker = candidate
                .get("metrics")
                .and_then(|m| m.get("ticker"))
                .map(format_minimal)
                .unwrap_or_default();
            let score = candidate.get("score").map(format_minimal).unwrap_or_default();
            println!("{} {}", ticker, score);
        }
        return;
    }

    // Priority list of key output fields
    let priority_keys = [
        "sharpe_ratio",
        "status",
        "annualized_volatility",
        "annualized_return",
        "hurst_exponent",
        "rsi",
    ];

    if let Value::Object(map) = result_obj {
        // Try priority keys first (skip null values)
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        // Fall back to first field
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Not an object, just print directly
    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
