use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::QuantInvestError;
use crate::types::AssetId;
use crate::QuantInvestResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Date-ordered price history for a set of assets.
///
/// Rows are observations, columns are assets. A cell is `None` when the
/// source had no price for that asset on that date. Present prices are
/// always finite and strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceMatrix")]
pub struct PriceMatrix {
    assets: Vec<AssetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dates: Option<Vec<NaiveDate>>,
    rows: Vec<Vec<Option<f64>>>,
}

/// Unvalidated wire form of [`PriceMatrix`].
#[derive(Debug, Clone, Deserialize)]
struct RawPriceMatrix {
    assets: Vec<AssetId>,
    #[serde(default)]
    dates: Option<Vec<NaiveDate>>,
    rows: Vec<Vec<Option<f64>>>,
}

impl TryFrom<RawPriceMatrix> for PriceMatrix {
    type Error = QuantInvestError;

    fn try_from(raw: RawPriceMatrix) -> Result<Self, Self::Error> {
        PriceMatrix::new(raw.assets, raw.dates, raw.rows)
    }
}

/// Result of selecting a subset of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSelection {
    pub matrix: PriceMatrix,
    /// Requested identifiers that the matrix does not contain.
    pub missing: Vec<AssetId>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl PriceMatrix {
    /// Build a validated price matrix.
    ///
    /// Fails on an empty asset list, duplicate or blank identifiers, ragged
    /// rows, dates that are not strictly increasing, and any present price
    /// that is not a finite positive number.
    pub fn new(
        assets: Vec<AssetId>,
        dates: Option<Vec<NaiveDate>>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> QuantInvestResult<Self> {
        validate_assets(&assets)?;

        for (r, row) in rows.iter().enumerate() {
            if row.len() != assets.len() {
                return Err(QuantInvestError::invalid(
                    "rows",
                    format!(
                        "Row {} has {} values, expected {}",
                        r,
                        row.len(),
                        assets.len()
                    ),
                ));
            }
            for (c, cell) in row.iter().enumerate() {
                if let Some(price) = cell {
                    if !price.is_finite() || *price <= 0.0 {
                        return Err(QuantInvestError::invalid(
                            format!("rows[{}][{}]", r, assets[c]),
                            format!("Price must be a finite positive number, got {}", price),
                        ));
                    }
                }
            }
        }

        if let Some(ref d) = dates {
            if d.len() != rows.len() {
                return Err(QuantInvestError::invalid(
                    "dates",
                    format!("Expected {} dates but got {}", rows.len(), d.len()),
                ));
            }
            if let Some(pos) = d.windows(2).position(|w| w[1] <= w[0]) {
                return Err(QuantInvestError::invalid(
                    "dates",
                    format!("Dates must be strictly increasing (at {})", d[pos + 1]),
                ));
            }
        }

        Ok(PriceMatrix {
            assets,
            dates,
            rows,
        })
    }

    /// Build a matrix from per-asset columns of equal length.
    pub fn from_columns(
        columns: Vec<(AssetId, Vec<Option<f64>>)>,
        dates: Option<Vec<NaiveDate>>,
    ) -> QuantInvestResult<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if let Some((id, col)) = columns.iter().find(|(_, c)| c.len() != n_rows) {
            return Err(QuantInvestError::invalid(
                "columns",
                format!("Column '{}' has {} values, expected {}", id, col.len(), n_rows),
            ));
        }
        let rows = (0..n_rows)
            .map(|r| columns.iter().map(|(_, col)| col[r]).collect())
            .collect();
        let assets = columns.into_iter().map(|(id, _)| id).collect();
        PriceMatrix::new(assets, dates, rows)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn dates(&self) -> Option<&[NaiveDate]> {
        self.dates.as_deref()
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Raw column for one asset, gaps included.
    pub fn column(&self, asset: &str) -> Option<Vec<Option<f64>>> {
        let c = self.column_index(asset)?;
        Some(self.rows.iter().map(|row| row[c]).collect())
    }

    /// Gap-free price series for one asset (missing cells removed).
    pub fn series(&self, asset: &str) -> Option<Vec<f64>> {
        let c = self.column_index(asset)?;
        Some(self.rows.iter().filter_map(|row| row[c]).collect())
    }

    /// Most recent available price for one asset.
    pub fn latest_price(&self, asset: &str) -> Option<f64> {
        let c = self.column_index(asset)?;
        self.rows.iter().rev().find_map(|row| row[c])
    }

    // -----------------------------------------------------------------------
    // Cleaning
    // -----------------------------------------------------------------------

    /// Drop rows in which every asset is missing.
    pub fn drop_empty_rows(&self) -> PriceMatrix {
        let keep: Vec<usize> = (0..self.rows.len())
            .filter(|&r| self.rows[r].iter().any(|cell| cell.is_some()))
            .collect();
        self.take_rows(&keep)
    }

    /// Drop columns with no prices at all, returning the dropped identifiers.
    ///
    /// Mirrors a bulk download where failed tickers come back empty. Errors
    /// when no column has data.
    pub fn drop_empty_columns(&self) -> QuantInvestResult<(PriceMatrix, Vec<AssetId>)> {
        let (keep, dropped): (Vec<usize>, Vec<usize>) = (0..self.assets.len())
            .partition(|&c| self.rows.iter().any(|row| row[c].is_some()));
        if keep.is_empty() {
            return Err(QuantInvestError::InsufficientData(
                "No asset has any price data".into(),
            ));
        }
        let dropped_ids = dropped.iter().map(|&c| self.assets[c].clone()).collect();
        Ok((self.take_columns(&keep), dropped_ids))
    }

    /// Carry the last seen price forward into gaps. Leading gaps stay empty.
    pub fn forward_filled(&self) -> PriceMatrix {
        let mut last: Vec<Option<f64>> = vec![None; self.assets.len()];
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, cell)| {
                        if cell.is_some() {
                            last[c] = *cell;
                        }
                        last[c]
                    })
                    .collect()
            })
            .collect();
        PriceMatrix {
            assets: self.assets.clone(),
            dates: self.dates.clone(),
            rows,
        }
    }

    /// Keep only the requested columns, in request order.
    ///
    /// Unknown identifiers are reported in [`ColumnSelection::missing`]
    /// instead of failing; a selection with no surviving column is an error.
    pub fn select(&self, assets: &[AssetId]) -> QuantInvestResult<ColumnSelection> {
        let mut keep = Vec::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();
        for id in assets {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.column_index(id) {
                Some(c) => keep.push(c),
                None => missing.push(id.clone()),
            }
        }
        if keep.is_empty() {
            return Err(QuantInvestError::InsufficientData(format!(
                "None of the requested assets have price data: {}",
                missing.join(", ")
            )));
        }
        Ok(ColumnSelection {
            matrix: self.take_columns(&keep),
            missing,
        })
    }

    fn take_rows(&self, keep: &[usize]) -> PriceMatrix {
        PriceMatrix {
            assets: self.assets.clone(),
            dates: self
                .dates
                .as_ref()
                .map(|d| keep.iter().map(|&r| d[r]).collect()),
            rows: keep.iter().map(|&r| self.rows[r].clone()).collect(),
        }
    }

    fn take_columns(&self, keep: &[usize]) -> PriceMatrix {
        PriceMatrix {
            assets: keep.iter().map(|&c| self.assets[c].clone()).collect(),
            dates: self.dates.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().map(|&c| row[c]).collect())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_assets(assets: &[AssetId]) -> QuantInvestResult<()> {
    if assets.is_empty() {
        return Err(QuantInvestError::invalid(
            "assets",
            "At least one asset column required",
        ));
    }
    let mut seen = HashSet::new();
    for id in assets {
        if id.trim().is_empty() {
            return Err(QuantInvestError::invalid(
                "assets",
                "Asset identifiers must not be blank",
            ));
        }
        if !seen.insert(id.as_str()) {
            return Err(QuantInvestError::invalid(
                "assets",
                format!("Duplicate asset identifier '{}'", id),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
