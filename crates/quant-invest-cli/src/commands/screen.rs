use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use quant_invest_core::screening::{screen_universe, ScreeningInput};

use crate::input;

/// Arguments for fundamental screening
#[derive(Args)]
pub struct ScreenArgs {
    /// Fundamental metrics JSON: an array of candidates or {"candidates": [...]}
    #[arg(long)]
    pub input: Option<String>,

    /// Number of top-ranked candidates to keep
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Minimum return on equity (e.g. 0.15 for 15%)
    #[arg(long, allow_hyphen_values = true)]
    pub min_roe: Option<Decimal>,

    /// Maximum debt-to-equity ratio
    #[arg(long)]
    pub max_debt_to_equity: Option<Decimal>,

    /// Minimum profit margin
    #[arg(long, allow_hyphen_values = true)]
    pub min_profit_margin: Option<Decimal>,

    /// Maximum PEG ratio
    #[arg(long)]
    pub max_peg: Option<Decimal>,
}

pub fn run_screen(args: ScreenArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data = if let Some(ref path) = args.input {
        input::file::read_json_value(path)?
    } else if let Some(data) = input::stdin::read_stdin::<Value>()? {
        data
    } else {
        return Err("--input <metrics.json> or stdin required for screening".into());
    };

    let mut request = screening_request(data)?;
    if let Some(top_n) = args.top_n {
        request.top_n = top_n;
    }
    if let Some(v) = args.min_roe {
        request.thresholds.min_roe = v;
    }
    if let Some(v) = args.max_debt_to_equity {
        request.thresholds.max_debt_to_equity = v;
    }
    if let Some(v) = args.min_profit_margin {
        request.thresholds.min_profit_margin = v;
    }
    if let Some(v) = args.max_peg {
        request.thresholds.max_peg = v;
    }

    let result = screen_universe(&request)?;
    Ok(serde_json::to_value(result)?)
}

/// Accept either a bare candidate array or a full screening request.
pub(crate) fn screening_request(data: Value) -> Result<ScreeningInput, Box<dyn std::error::Error>> {
    let wrapped = match data {
        Value::Array(_) => serde_json::json!({ "candidates": data }),
        other => other,
    };
    Ok(serde_json::from_value(wrapped)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bare_array_gets_defaults() {
        let request = screening_request(serde_json::json!([
            { "ticker": "AAA", "roe": "0.2" },
            { "ticker": "BBB" }
        ]))
        .unwrap();
        assert_eq!(request.candidates.len(), 2);
        assert_eq!(request.top_n, 15);
        assert_eq!(request.thresholds.min_roe, dec!(0.15));
    }

    #[test]
    fn test_full_request_keeps_thresholds() {
        let request = screening_request(serde_json::json!({
            "candidates": [{ "ticker": "AAA" }],
            "thresholds": { "max_peg": "1.5" },
            "top_n": 3
        }))
        .unwrap();
        assert_eq!(request.top_n, 3);
        assert_eq!(request.thresholds.max_peg, dec!(1.5));
        assert_eq!(request.thresholds.min_roe, dec!(0.15));
    }
}
