use crate::catalog::CatalogRow;
use crate::error::{Result, StackError};
use std::fmt;
use std::str::FromStr;

/// Variables published as one file per month
pub const MONTHLY_VARIABLES: [&str; 3] = ["pr", "tasmax", "tasmin"];

pub fn is_monthly(variable: &str) -> bool {
    MONTHLY_VARIABLES.contains(&variable)
}

/// Inclusive integer range, written `low,high` or `n` on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusiveRange<T> {
    pub low: T,
    pub high: T,
}

impl<T: PartialOrd + Copy> InclusiveRange<T> {
    pub fn new(low: T, high: T) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: T) -> bool {
        self.low <= value && value <= self.high
    }
}

impl<T> FromStr for InclusiveRange<T>
where
    T: FromStr + PartialOrd + Copy + fmt::Display,
{
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |v: &str| {
            v.trim()
                .parse::<T>()
                .map_err(|_| StackError::InvalidRange(format!("{:?} is not a number", v.trim())))
        };

        let (low, high) = match s.split_once(',') {
            Some((low, high)) => (parse(low)?, parse(high)?),
            None => {
                let v = parse(s)?;
                (v, v)
            }
        };

        if low > high {
            return Err(StackError::InvalidRange(format!(
                "low bound {} is greater than high bound {}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub variable: Option<String>,
    pub month_range: Option<InclusiveRange<u8>>,
    pub time_range: Option<InclusiveRange<i32>>,
}

/// A catalog row that passed selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTile {
    pub url: String,
    pub variable: String,
    pub month: Option<u8>,
    pub time_id: i32,
}

impl SelectedTile {
    /// Band description written to the output stack, e.g. `pr_c-10_m3` or `bio12_c5`
    pub fn band_label(&self) -> String {
        match self.month {
            Some(month) if is_monthly(&self.variable) => {
                format!("{}_c{}_m{}", self.variable, self.time_id, month)
            }
            _ => format!("{}_c{}", self.variable, self.time_id),
        }
    }
}

impl SelectionCriteria {
    pub fn matches(&self, row: &CatalogRow) -> bool {
        if let Some(variable) = &self.variable {
            if &row.variable != variable {
                return false;
            }
        }

        if is_monthly(&row.variable) {
            if let Some(range) = &self.month_range {
                match row.month {
                    Some(month) if range.contains(month) => {}
                    _ => return false,
                }
            }
        }

        if let Some(range) = &self.time_range {
            if !range.contains(row.time_id) {
                return false;
            }
        }

        true
    }
}

/// Narrow the catalog to the rows matching `criteria`, preserving catalog order
pub fn select_tiles(catalog: &[CatalogRow], criteria: &SelectionCriteria) -> Vec<SelectedTile> {
    catalog
        .iter()
        .filter(|row| criteria.matches(row))
        .map(|row| SelectedTile {
            url: row.url.clone(),
            variable: row.variable.clone(),
            month: if is_monthly(&row.variable) { row.month } else { None },
            time_id: row.time_id,
        })
        .collect()
}
