use std::collections::BTreeMap;

use tracing::warn;

use super::api_types::ApiRecord;

/// Volume for a single quarter
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterUsage {
  pub year: i32,
  pub quarter: u8,
  pub volume: f64,
}

impl QuarterUsage {
  /// Parse a record like `{"quarter": "2004-Q3", "volume_of_mobile_data": "0.000384"}`
  pub fn from_record(record: &ApiRecord) -> Option<Self> {
    let (year, quarter) = record.quarter.trim().split_once("-Q")?;
    let year: i32 = year.parse().ok()?;
    let quarter: u8 = quarter.parse().ok()?;
    if !(1..=4).contains(&quarter) {
      return None;
    }
    let volume: f64 = record.volume_of_mobile_data.trim().parse().ok()?;

    Some(Self {
      year,
      quarter,
      volume,
    })
  }

  pub fn label(&self) -> String {
    format!("Q{}", self.quarter)
  }
}

/// Totals for one year
#[derive(Debug, Clone, PartialEq)]
pub struct YearUsage {
  pub year: i32,
  pub total_volume: f64,
  /// Quarters in order
  pub quarters: Vec<QuarterUsage>,
  /// Some quarter had less volume than the quarter before it in the same year
  pub has_decrease: bool,
}

/// The dataset grouped by year, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearlyUsage {
  pub years: Vec<YearUsage>,
}

impl YearlyUsage {
  pub fn from_records(records: &[ApiRecord]) -> Self {
    let mut by_year: BTreeMap<i32, Vec<QuarterUsage>> = BTreeMap::new();

    for record in records {
      match QuarterUsage::from_record(record) {
        Some(q) => by_year.entry(q.year).or_default().push(q),
        None => warn!(id = record.id, quarter = %record.quarter, "skipping malformed record"),
      }
    }

    let years = by_year
      .into_iter()
      .map(|(year, mut quarters)| {
        quarters.sort_by_key(|q| q.quarter);
        let total_volume = quarters.iter().map(|q| q.volume).sum();
        let has_decrease = quarters.windows(2).any(|w| w[1].volume < w[0].volume);
        YearUsage {
          year,
          total_volume,
          quarters,
          has_decrease,
        }
      })
      .collect();

    Self { years }
  }

  pub fn is_empty(&self) -> bool {
    self.years.is_empty()
  }

  pub fn len(&self) -> usize {
    self.years.len()
  }
}
