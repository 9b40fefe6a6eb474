mod engine;
mod rates;
mod types;

pub use engine::{project, project_with_waves};
pub use rates::{CsiRates, SatisfactionTier, csi_rates};
pub use types::{
    DEFAULT_END_YEAR, DEFAULT_START_YEAR, Horizon, Inputs, ResultTable, RowLabel, TableRow,
    TotalsRecord, Wave, YearlyRecord,
};
