use serde::Serialize;
use serde::ser::Serializer;

pub const DEFAULT_START_YEAR: i32 = 2026;
pub const DEFAULT_END_YEAR: i32 = 2040;

/// Inclusive range of simulated calendar years.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Horizon {
    pub start_year: i32,
    pub end_year: i32,
}

impl Default for Horizon {
    fn default() -> Self {
        Self {
            start_year: DEFAULT_START_YEAR,
            end_year: DEFAULT_END_YEAR,
        }
    }
}

impl Horizon {
    pub fn years(self) -> impl Iterator<Item = i32> {
        self.start_year..=self.end_year
    }

    pub fn len(self) -> usize {
        if self.end_year < self.start_year {
            0
        } else {
            (i64::from(self.end_year) - i64::from(self.start_year) + 1) as usize
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Parameters of one projection run. The input layer is expected to have
/// validated these; the engine trusts them as given.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub csi_score: i32,
    pub initial_count: f64,
    pub service_profit: f64,
    pub ownership_years: u32,
    pub warranty_years: u32,
    pub vehicle_profit: f64,
    pub horizon: Horizon,
}

/// A cohort of customers sharing an origination year. `count` is an expected
/// value and may be fractional.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wave {
    pub year: i32,
    pub count: f64,
}

impl Wave {
    pub fn age_in(&self, year: i32) -> i64 {
        i64::from(year) - i64::from(self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyRecord {
    pub year: i32,
    pub service_accum: f64,
    pub repeat_accum: f64,
    pub service_customers: i64,
    pub repeat_purchases: i64,
    pub total_profit: i64,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsRecord {
    pub service_customers: i64,
    pub repeat_purchases: i64,
    pub total_profit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub totals: TotalsRecord,
    pub years: Vec<YearlyRecord>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RowLabel {
    Total,
    Year(i32),
}

impl Serialize for RowLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowLabel::Total => serializer.serialize_str("Total"),
            RowLabel::Year(year) => serializer.serialize_i32(*year),
        }
    }
}

/// Display row: the totals row first, then one row per year ascending.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub label: RowLabel,
    pub service_customers: i64,
    pub repeat_purchases: i64,
    pub total_profit: i64,
}

impl ResultTable {
    pub fn rows(&self) -> impl Iterator<Item = TableRow> + '_ {
        let totals = TableRow {
            label: RowLabel::Total,
            service_customers: self.totals.service_customers,
            repeat_purchases: self.totals.repeat_purchases,
            total_profit: self.totals.total_profit,
        };
        std::iter::once(totals).chain(self.years.iter().map(|record| TableRow {
            label: RowLabel::Year(record.year),
            service_customers: record.service_customers,
            repeat_purchases: record.repeat_purchases,
            total_profit: record.total_profit,
        }))
    }
}
