//! Descriptive statistics and chi-squared association tests

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::warn;

use crate::data::{median, CustomerData};
use crate::error::AnalysisError;

/// Dataset-level counts
#[derive(Debug, Clone, PartialEq)]
pub struct ExploratorySummary {
    pub rows: usize,
    pub columns: usize,
    /// Percentage of churned customers
    pub churn_rate_pct: f64,
    pub complete_rows: usize,
}

pub fn exploratory_summary(data: &CustomerData) -> Result<ExploratorySummary, AnalysisError> {
    Ok(ExploratorySummary {
        rows: data.frame.height(),
        columns: data.frame.width(),
        churn_rate_pct: round2(data.churn_rate() * 100.0),
        complete_rows: data.complete_rows()?,
    })
}

/// Summary of one numeric column, ready for a histogram panel
#[derive(Debug, Clone)]
pub struct NumericDistribution {
    pub column: String,
    pub values: Vec<f64>,
    pub mean: f64,
    pub median: f64,
    pub distinct: usize,
}

impl NumericDistribution {
    pub fn from_values(column: &str, values: Vec<f64>) -> Self {
        let distinct = values
            .iter()
            .map(|v| v.to_bits())
            .collect::<BTreeSet<_>>()
            .len();
        Self {
            column: column.to_string(),
            mean: mean(&values).unwrap_or(0.0),
            median: median(&values).unwrap_or(0.0),
            distinct,
            values,
        }
    }

    /// Empty or constant columns get a placeholder instead of a histogram
    pub fn is_degenerate(&self) -> bool {
        self.distinct <= 1
    }

    pub fn bins(&self) -> usize {
        self.distinct.clamp(1, 20)
    }
}

/// Strength of a categorical association by p-value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssociationStrength {
    #[serde(rename = "very strong")]
    VeryStrong,
    #[serde(rename = "strong")]
    Strong,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "none")]
    None,
}

impl AssociationStrength {
    pub fn from_p_value(p: f64) -> Self {
        if p < 0.001 {
            AssociationStrength::VeryStrong
        } else if p < 0.01 {
            AssociationStrength::Strong
        } else if p < 0.05 {
            AssociationStrength::Moderate
        } else {
            AssociationStrength::None
        }
    }
}

/// Chi-squared test of independence between one categorical column and churn
#[derive(Debug, Clone)]
pub struct ChiSquareTest {
    pub column: String,
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
    pub strength: AssociationStrength,
}

/// Run the chi-squared independence test of `levels` against `target`.
///
/// Returns `None` for degenerate contingency tables: fewer than two distinct
/// values on either axis, or a zero expected count. Applies Yates' continuity
/// correction when the table has one degree of freedom.
pub fn chi_square_test(column: &str, levels: &[String], target: &[usize]) -> Option<ChiSquareTest> {
    let table = contingency_table(levels, target);
    let classes: BTreeSet<usize> = table.values().flat_map(|row| row.keys().copied()).collect();
    if table.len() < 2 || classes.len() < 2 {
        warn!(column, "Contingency table too small for chi-squared, skipping");
        return None;
    }

    let n: f64 = table.values().flat_map(|row| row.values()).sum::<usize>() as f64;
    let col_totals: BTreeMap<usize, f64> = classes
        .iter()
        .map(|&c| {
            let total: usize = table.values().map(|row| row.get(&c).copied().unwrap_or(0)).sum();
            (c, total as f64)
        })
        .collect();

    let dof = (table.len() - 1) * (classes.len() - 1);
    let mut statistic = 0.0;
    for row in table.values() {
        let row_total: f64 = row.values().sum::<usize>() as f64;
        for (&class, &col_total) in &col_totals {
            let expected = row_total * col_total / n;
            if expected <= 0.0 {
                warn!(column, "Zero expected count in contingency table, skipping");
                return None;
            }
            let observed = row.get(&class).copied().unwrap_or(0) as f64;
            let mut diff = (observed - expected).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            statistic += diff * diff / expected;
        }
    }

    let p_value = ChiSquared::new(dof as f64).ok()?.sf(statistic);
    Some(ChiSquareTest {
        column: column.to_string(),
        statistic,
        p_value,
        dof,
        strength: AssociationStrength::from_p_value(p_value),
    })
}

/// Churn rate (%) per level, highest first
pub fn churn_rate_by_level(levels: &[String], target: &[usize]) -> Vec<(String, f64)> {
    let mut rates: Vec<(String, f64)> = contingency_table(levels, target)
        .into_iter()
        .map(|(level, counts)| {
            let total: usize = counts.values().sum();
            let churned = counts.get(&1).copied().unwrap_or(0);
            (level, churned as f64 / total as f64 * 100.0)
        })
        .collect();
    rates.sort_by(|a, b| b.1.total_cmp(&a.1));
    rates
}

fn contingency_table(levels: &[String], target: &[usize]) -> BTreeMap<String, BTreeMap<usize, usize>> {
    let mut table: BTreeMap<String, BTreeMap<usize, usize>> = BTreeMap::new();
    for (level, &label) in levels.iter().zip(target) {
        *table
            .entry(level.clone())
            .or_default()
            .entry(label)
            .or_default() += 1;
    }
    table
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
