//! Cross-venue funding-rate arbitrage evaluation.
//!
//! Holding a hedged position (long on one venue, short on the other) earns the funding
//! rate differential every hour while paying a round trip of trading fees once. The
//! evaluator prices both hedge directions under maker and taker fees and keeps the
//! direction with the higher annualised yield.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

const HOURS_PER_DAY: f64 = 24.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// Maker/taker fee percentages applied to the whole position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_fee_pct: f64,
    pub taker_fee_pct: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_fee_pct: 0.01,
            taker_fee_pct: 0.035,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

/// Which venue holds the long leg of the hedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HedgeDirection {
    LongAShortB,
    ShortALongB,
}

impl HedgeDirection {
    pub fn side_a(&self) -> Side {
        match self {
            HedgeDirection::LongAShortB => Side::Long,
            HedgeDirection::ShortALongB => Side::Short,
        }
    }

    pub fn side_b(&self) -> Side {
        match self {
            HedgeDirection::LongAShortB => Side::Short,
            HedgeDirection::ShortALongB => Side::Long,
        }
    }

    /// Funding differential earned by holding this direction.
    fn funding_diff(&self, funding_rate_a: f64, funding_rate_b: f64) -> f64 {
        match self {
            HedgeDirection::LongAShortB => -funding_rate_a - (-funding_rate_b),
            HedgeDirection::ShortALongB => funding_rate_a - funding_rate_b,
        }
    }
}

impl Display for HedgeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HedgeDirection::LongAShortB => write!(f, "long A / short B"),
            HedgeDirection::ShortALongB => write!(f, "short A / long B"),
        }
    }
}

/// Profitability of a hedge under one fee tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierOutcome {
    /// Entry plus exit fees on both legs.
    pub trading_fees: f64,
    pub net_profit_per_hour: f64,
    /// Hours of funding needed to pay back the fees. Infinite when funding profit is zero.
    pub breakeven_hours: f64,
    pub net_daily_profit: f64,
    /// Annualised yield in percent of position size. NaN when funding profit is zero.
    pub apy: f64,
}

impl TierOutcome {
    fn price(position_size_usd: f64, fee_pct: f64, funding_profit_per_hour: f64) -> Self {
        let trading_fees = (position_size_usd / 2.0) * (fee_pct / 100.0) * 2.0;
        let breakeven_hours = trading_fees / funding_profit_per_hour;
        let net_daily_profit = (HOURS_PER_DAY - breakeven_hours) * funding_profit_per_hour;

        Self {
            trading_fees,
            net_profit_per_hour: funding_profit_per_hour - trading_fees,
            breakeven_hours,
            net_daily_profit,
            apy: (net_daily_profit / position_size_usd) * DAYS_PER_YEAR * 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageScenario {
    pub direction: HedgeDirection,
    /// Absolute funding rate differential between the legs.
    pub funding_rate_diff: f64,
    pub funding_profit_per_hour: f64,
    pub maker: TierOutcome,
    pub taker: TierOutcome,
}

impl ArbitrageScenario {
    fn price(
        direction: HedgeDirection,
        position_size_usd: f64,
        funding_rate_a: f64,
        funding_rate_b: f64,
        fees: &FeeSchedule,
    ) -> Self {
        let diff = direction.funding_diff(funding_rate_a, funding_rate_b);
        let funding_profit_per_hour = (diff / 100.0) * position_size_usd;

        Self {
            direction,
            funding_rate_diff: diff.abs(),
            funding_profit_per_hour,
            maker: TierOutcome::price(position_size_usd, fees.maker_fee_pct, funding_profit_per_hour),
            taker: TierOutcome::price(position_size_usd, fees.taker_fee_pct, funding_profit_per_hour),
        }
    }

    /// The better of the maker and taker yields. NaN only if both are NaN.
    pub fn best_apy(&self) -> f64 {
        self.maker.apy.max(self.taker.apy)
    }
}

impl Display for ArbitrageScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: diff {:.6}%, {:.2}/h funding, APY maker {:.2}% taker {:.2}%, breakeven maker {:.2}h taker {:.2}h",
            self.direction,
            self.funding_rate_diff,
            self.funding_profit_per_hour,
            self.maker.apy,
            self.taker.apy,
            self.maker.breakeven_hours,
            self.taker.breakeven_hours,
        )
    }
}

/// Prices both hedge directions and returns the one with the higher best-tier APY.
///
/// The result is not filtered by sign: a losing best direction is still returned and
/// callers decide what counts as an opportunity. A zero differential yields an infinite
/// breakeven and NaN yields rather than an error.
///
/// Returns `None` only when the inputs cannot be priced: a non-finite funding rate or a
/// position size that is not a positive finite number.
pub fn evaluate(
    position_size_usd: f64,
    funding_rate_a: f64,
    funding_rate_b: f64,
    fees: &FeeSchedule,
) -> Option<ArbitrageScenario> {
    if !funding_rate_a.is_finite() || !funding_rate_b.is_finite() {
        return None;
    }
    if !position_size_usd.is_finite() || position_size_usd <= 0.0 {
        return None;
    }

    let long_a = ArbitrageScenario::price(
        HedgeDirection::LongAShortB,
        position_size_usd,
        funding_rate_a,
        funding_rate_b,
        fees,
    );
    let short_a = ArbitrageScenario::price(
        HedgeDirection::ShortALongB,
        position_size_usd,
        funding_rate_a,
        funding_rate_b,
        fees,
    );

    // NaN never compares greater, so ties and degenerate inputs keep the first candidate
    if short_a.best_apy() > long_a.best_apy() {
        Some(short_a)
    } else {
        Some(long_a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9 * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn reference_scenario_prices_long_a_short_b() {
        let scenario = evaluate(300_000.0, 0.0013, 0.0106, &FeeSchedule::default()).unwrap();

        assert_eq!(scenario.direction, HedgeDirection::LongAShortB);
        assert_eq!(scenario.direction.side_a(), Side::Long);
        assert_eq!(scenario.direction.side_b(), Side::Short);

        assert_close(scenario.funding_rate_diff, 0.0093);
        assert_close(scenario.funding_profit_per_hour, 27.9);

        assert_close(scenario.maker.trading_fees, 30.0);
        assert_close(scenario.maker.net_profit_per_hour, -2.1);
        assert_close(scenario.maker.breakeven_hours, 30.0 / 27.9);
        assert_close(scenario.maker.net_daily_profit, 639.6);
        assert_close(scenario.maker.apy, 639.6 / 300_000.0 * 365.0 * 100.0);

        assert_close(scenario.taker.trading_fees, 105.0);
        assert_close(scenario.taker.net_profit_per_hour, -77.1);
        assert_close(scenario.taker.breakeven_hours, 105.0 / 27.9);
        assert_close(scenario.taker.net_daily_profit, 564.6);
        assert_close(scenario.taker.apy, 564.6 / 300_000.0 * 365.0 * 100.0);

        assert_close(scenario.best_apy(), scenario.maker.apy);
    }

    #[test]
    fn higher_rate_on_a_prefers_short_a() {
        let scenario = evaluate(300_000.0, 0.0106, 0.0013, &FeeSchedule::default()).unwrap();

        assert_eq!(scenario.direction, HedgeDirection::ShortALongB);
        assert_close(scenario.funding_profit_per_hour, 27.9);
        assert_close(scenario.maker.apy, 639.6 / 300_000.0 * 365.0 * 100.0);
    }

    #[test]
    fn losing_scenario_is_still_returned() {
        // differential too small to cover fees within a day
        let scenario = evaluate(300_000.0, 0.0001, 0.0002, &FeeSchedule::default()).unwrap();

        assert!(scenario.best_apy() < 0.0);
        assert!(scenario.maker.net_profit_per_hour < 0.0);
    }

    #[test]
    fn zero_differential_propagates_non_finite_values() {
        let scenario = evaluate(300_000.0, 0.005, 0.005, &FeeSchedule::default()).unwrap();

        assert_eq!(scenario.direction, HedgeDirection::LongAShortB);
        assert_eq!(scenario.funding_profit_per_hour, 0.0);
        assert_eq!(scenario.maker.breakeven_hours, f64::INFINITY);
        assert_eq!(scenario.taker.breakeven_hours, f64::INFINITY);
        assert!(scenario.maker.apy.is_nan());
        assert!(scenario.taker.apy.is_nan());
        assert!(scenario.best_apy().is_nan());
    }

    #[test]
    fn zero_fees_break_even_immediately() {
        let fees = FeeSchedule {
            maker_fee_pct: 0.0,
            taker_fee_pct: 0.0,
        };
        let scenario = evaluate(100_000.0, 0.01, -0.01, &fees).unwrap();

        assert_eq!(scenario.direction, HedgeDirection::ShortALongB);
        assert_eq!(scenario.maker.breakeven_hours, 0.0);
        assert_close(scenario.maker.net_daily_profit, 24.0 * 20.0);
    }

    #[test]
    fn unpriceable_inputs_yield_none() {
        let fees = FeeSchedule::default();
        assert!(evaluate(300_000.0, f64::NAN, 0.01, &fees).is_none());
        assert!(evaluate(300_000.0, 0.01, f64::INFINITY, &fees).is_none());
        assert!(evaluate(0.0, 0.01, 0.02, &fees).is_none());
        assert!(evaluate(-5.0, 0.01, 0.02, &fees).is_none());
    }

    proptest! {
        #[test]
        fn chosen_direction_is_never_worse(
            rate_a in -0.1f64..0.1,
            rate_b in -0.1f64..0.1,
            position in 1_000f64..10_000_000f64,
        ) {
            let fees = FeeSchedule::default();
            let best = evaluate(position, rate_a, rate_b, &fees).unwrap();

            for direction in [HedgeDirection::LongAShortB, HedgeDirection::ShortALongB] {
                let other = ArbitrageScenario::price(direction, position, rate_a, rate_b, &fees);
                if !other.best_apy().is_nan() {
                    prop_assert!(best.best_apy() >= other.best_apy());
                }
            }
        }

        #[test]
        fn evaluation_is_deterministic(
            rate_a in -0.1f64..0.1,
            rate_b in -0.1f64..0.1,
        ) {
            let fees = FeeSchedule::default();
            let first = evaluate(300_000.0, rate_a, rate_b, &fees).unwrap();
            let second = evaluate(300_000.0, rate_a, rate_b, &fees).unwrap();

            prop_assert_eq!(first.direction, second.direction);
            prop_assert_eq!(first.best_apy().to_bits(), second.best_apy().to_bits());
        }
    }
}
