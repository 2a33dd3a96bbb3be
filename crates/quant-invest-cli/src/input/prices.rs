use chrono::NaiveDate;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use quant_invest_core::market_data::PriceMatrix;

use crate::input::file;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Load a price matrix from a `.csv` file or a JSON file.
pub fn read_prices(path: &str) -> Result<PriceMatrix, Box<dyn std::error::Error>> {
    let is_csv = Path::new(path)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return file::read_json(path);
    }
    let canonical = file::resolve_path(path)?;
    let handle = File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let prices = parse_price_csv(handle)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    debug!(
        path = %canonical.display(),
        assets = prices.n_assets(),
        rows = prices.n_rows(),
        "loaded price history"
    );
    Ok(prices)
}

/// Parse `date,<id>,<id>...` rows. An empty cell is a missing price.
pub fn parse_price_csv<R: Read>(reader: R) -> Result<PriceMatrix, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err("Price CSV needs a date column followed by at least one asset column".into());
    }
    let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = i + 2;
        let raw_date = record.get(0).unwrap_or("");
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| format!("Row {}: invalid date '{}': {}", line, raw_date, e))?;

        let mut row = Vec::with_capacity(assets.len());
        for (c, asset) in assets.iter().enumerate() {
            let cell = record.get(c + 1).unwrap_or("");
            if cell.is_empty() {
                row.push(None);
                continue;
            }
            let price: f64 = cell.parse().map_err(|_| {
                format!("Row {}, column '{}': '{}' is not a number", line, asset, cell)
            })?;
            row.push(Some(price));
        }
        dates.push(date);
        rows.push(row);
    }

    Ok(PriceMatrix::new(assets, Some(dates), rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_with_gaps() {
        let csv = "date,AAPL,MSFT\n2024-01-02,185.6,370.9\n2024-01-03,,372.1\n2024-01-04,184.2,\n";
        let m = parse_price_csv(csv.as_bytes()).unwrap();
        assert_eq!(m.assets(), &["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(m.n_rows(), 3);
        assert_eq!(m.rows()[1], vec![None, Some(372.1)]);
        assert_eq!(m.rows()[2], vec![Some(184.2), None]);
        assert_eq!(m.dates().unwrap().len(), 3);
    }

    #[test]
    fn test_non_numeric_cell_names_row_and_column() {
        let csv = "date,AAPL\n2024-01-02,185.6\n2024-01-03,n/a\n";
        let err = parse_price_csv(csv.as_bytes()).unwrap_err().to_string();
        assert!(err.contains("Row 3"), "{}", err);
        assert!(err.contains("AAPL"), "{}", err);
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let csv = "date,AAPL\n2024-01-02,-1.0\n";
        assert!(parse_price_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_unordered_dates_rejected() {
        let csv = "date,AAPL\n2024-01-03,1.0\n2024-01-02,1.1\n";
        assert!(parse_price_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_header_only_date_rejected() {
        assert!(parse_price_csv("date\n2024-01-02\n".as_bytes()).is_err());
    }
}
