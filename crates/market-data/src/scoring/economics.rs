//! Unit economics: per-unit cost breakdown and the rank-to-velocity
//! estimator behind the value projections.

use nicheradar_core::config::{MarginConfig, ScoringConfig};

/// Per-unit cost decomposition at a given sale price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitEconomics {
    pub price: f64,
    pub cogs: f64,
    pub fulfilment_fee: f64,
    pub referral_fee: f64,
    pub ppc_cost: f64,
    pub returns_cost: f64,
    /// Price minus all costs
    pub net_margin: f64,
    /// Net margin as a fraction of price
    pub margin_ratio: f64,
}

/// Banded fulfilment fee: the first band whose ceiling exceeds the price.
pub fn fulfilment_fee(price: f64, config: &MarginConfig) -> f64 {
    for band in &config.fee_bands {
        if price < band.price_under {
            return band.fee;
        }
    }
    config.fee_default
}

pub fn unit_economics(price: f64, config: &MarginConfig) -> UnitEconomics {
    let cogs = price * config.cogs_pct;
    let fulfilment = fulfilment_fee(price, config);
    let referral = price * config.referral_pct;
    let ppc = price * config.ppc_pct;
    let returns = price * config.return_rate_pct;
    let net = price - cogs - fulfilment - referral - ppc - returns;
    UnitEconomics {
        price,
        cogs,
        fulfilment_fee: fulfilment,
        referral_fee: referral,
        ppc_cost: ppc,
        returns_cost: returns,
        net_margin: net,
        margin_ratio: if price > 0.0 { net / price } else { 0.0 },
    }
}

/// Expected monthly units for a primary sales rank, from the band table.
pub fn monthly_units(rank: i64, config: &ScoringConfig) -> f64 {
    for band in &config.velocity_bands {
        if rank <= band.rank_under {
            return band.units_per_month;
        }
    }
    config.velocity_floor_units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_bands_are_price_exclusive_ceilings() {
        let config = MarginConfig::default();
        assert_eq!(fulfilment_fee(9.99, &config), 3.22);
        assert_eq!(fulfilment_fee(10.0, &config), 4.75);
        assert_eq!(fulfilment_fee(49.99, &config), 5.40);
        assert_eq!(fulfilment_fee(151.0, &config), 8.50);
    }

    #[test]
    fn unit_economics_decomposes_price() {
        let config = MarginConfig::default();
        let econ = unit_economics(25.0, &config);
        assert!((econ.cogs - 7.5).abs() < 1e-9);
        assert!((econ.fulfilment_fee - 5.40).abs() < 1e-9);
        assert!((econ.referral_fee - 3.75).abs() < 1e-9);
        assert!((econ.ppc_cost - 2.5).abs() < 1e-9);
        assert!((econ.returns_cost - 0.75).abs() < 1e-9);
        assert!((econ.net_margin - 5.1).abs() < 1e-9);
        assert!((econ.margin_ratio - 0.204).abs() < 1e-9);
    }

    #[test]
    fn velocity_bands_step_down_with_rank() {
        let config = ScoringConfig::default();
        assert_eq!(monthly_units(90, &config), 3000.0);
        assert_eq!(monthly_units(100, &config), 3000.0);
        assert_eq!(monthly_units(101, &config), 1500.0);
        assert_eq!(monthly_units(60_000, &config), 25.0);
        assert_eq!(monthly_units(500_000, &config), 8.0);
    }
}
