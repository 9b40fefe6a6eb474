use super::rates::csi_rates;
use super::types::{Horizon, Inputs, ResultTable, TotalsRecord, Wave, YearlyRecord};

/// Upper bound on the up-front allocation for yearly rows.
const YEAR_CAPACITY_HINT: usize = 256;

/// Projects service customers, repeat purchases and profit for every year of
/// the horizon, totals row included.
///
/// Inputs are taken as already validated. Nothing is rejected here: zero
/// ownership or warranty years give all-zero rows and an inverted horizon
/// gives an empty year list, the same way on every run.
pub fn project(inputs: &Inputs) -> ResultTable {
    project_with_waves(inputs).0
}

/// Runs the projection and also hands back the wave ledger: the seed wave
/// first, then every repeat-purchase wave in the order it was spawned.
pub fn project_with_waves(inputs: &Inputs) -> (ResultTable, Vec<Wave>) {
    let rates = csi_rates(inputs.csi_score);
    let warranty_years = i64::from(inputs.warranty_years);
    let ownership_years = i64::from(inputs.ownership_years);

    let mut waves = vec![Wave {
        year: inputs.horizon.start_year.saturating_sub(1),
        count: inputs.initial_count,
    }];
    let mut spawned = Vec::new();
    let mut years = Vec::with_capacity(year_capacity(inputs.horizon));

    for year in inputs.horizon.years() {
        let mut service_accum = 0.0;
        let mut repeat_accum = 0.0;

        for wave in &waves {
            let age = wave.age_in(year);
            if (1..=warranty_years).contains(&age) {
                service_accum += wave.count * rates.service_return;
            }
            if age == ownership_years {
                let repeat = wave.count * rates.repeat_purchase;
                repeat_accum += repeat;
                spawned.push(Wave { year, count: repeat });
            }
        }

        // Waves spawned this year only become visible from next year on.
        for wave in &spawned {
            log::trace!("year={year} spawned wave count={:.6}", wave.count);
        }
        waves.append(&mut spawned);

        let service_customers = round_count(service_accum);
        let repeat_purchases = round_count(repeat_accum);
        let total_profit = round_count(
            service_customers as f64 * inputs.service_profit
                + repeat_purchases as f64 * inputs.vehicle_profit,
        );
        log::debug!(
            "year={year} service={service_accum:.4} repeat={repeat_accum:.4} profit={total_profit} waves={}",
            waves.len()
        );

        years.push(YearlyRecord {
            year,
            service_accum,
            repeat_accum,
            service_customers,
            repeat_purchases,
            total_profit,
        });
    }

    let totals = TotalsRecord {
        service_customers: years.iter().map(|r| r.service_customers).sum(),
        repeat_purchases: years.iter().map(|r| r.repeat_purchases).sum(),
        total_profit: years.iter().map(|r| r.total_profit).sum(),
    };

    (ResultTable { totals, years }, waves)
}

fn year_capacity(horizon: Horizon) -> usize {
    horizon.len().min(YEAR_CAPACITY_HINT)
}

// Half-to-even, matching the rounding the exported figures have always used.
fn round_count(value: f64) -> i64 {
    value.round_ties_even() as i64
}
