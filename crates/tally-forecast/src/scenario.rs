//! Forecast scenarios.

use crate::config::{ScenarioConfig, ScenarioShift};
use crate::drivers::{DriverKind, Drivers};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A forecast case.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Drivers as computed
    #[display("base")]
    Base,
    /// Faster growth, wider margins
    #[display("bull")]
    Bull,
    /// Slower growth, thinner margins
    #[display("bear")]
    Bear,
}

impl Scenario {
    /// Every scenario, base first.
    pub const ALL: [Self; 3] = [Self::Base, Self::Bull, Self::Bear];

    const fn shift(self, config: &ScenarioConfig) -> Option<ScenarioShift> {
        match self {
            Self::Base => None,
            Self::Bull => Some(config.bull),
            Self::Bear => Some(config.bear),
        }
    }
}

/// Growth scaled by `multiplier` relative to its own magnitude.
///
/// A multiplier above one always moves growth up and one below one always
/// moves it down, whatever the sign of `growth`. For non-negative growth this
/// is plain multiplication.
const fn scale_growth(growth: f64, multiplier: f64) -> f64 {
    growth + growth.abs() * (multiplier - 1.0)
}

/// Drivers adjusted for a scenario.
///
/// Growth is scaled by its magnitude, so bull stays above base and bear
/// below it when trailing growth is negative. Each margin is shifted then
/// clamped to `[0, 1]`. Drivers without a value stay without one.
pub fn apply_scenario(drivers: &Drivers, scenario: Scenario, config: &ScenarioConfig) -> Drivers {
    let mut adjusted = drivers.clone();
    let Some(shift) = scenario.shift(config) else {
        return adjusted;
    };
    if let Some(growth) = drivers.value(DriverKind::RevenueGrowth) {
        adjusted.set_value(
            DriverKind::RevenueGrowth,
            scale_growth(growth, shift.growth_multiplier),
        );
    }
    for kind in DriverKind::MARGINS {
        if let Some(margin) = drivers.value(kind) {
            adjusted.set_value(kind, (margin + shift.margin_shift).clamp(0.0, 1.0));
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn drivers() -> Drivers {
        Drivers::default()
            .with_value(DriverKind::RevenueGrowth, 0.1)
            .with_value(DriverKind::GrossMargin, 0.99)
            .with_value(DriverKind::NetMargin, 0.01)
            .with_value(DriverKind::TaxRate, 0.21)
    }

    #[test]
    fn test_base_is_unchanged() {
        let base = apply_scenario(&drivers(), Scenario::Base, &ScenarioConfig::default());
        assert_eq!(base, drivers());
    }

    #[test]
    fn test_bull_and_bear() {
        let config = ScenarioConfig::default();
        let bull = apply_scenario(&drivers(), Scenario::Bull, &config);
        assert_relative_eq!(bull.value(DriverKind::RevenueGrowth).unwrap(), 0.15);
        assert_relative_eq!(bull.value(DriverKind::GrossMargin).unwrap(), 1.0);
        assert_relative_eq!(bull.value(DriverKind::NetMargin).unwrap(), 0.03);
        assert_relative_eq!(bull.value(DriverKind::TaxRate).unwrap(), 0.21);

        let bear = apply_scenario(&drivers(), Scenario::Bear, &config);
        assert_relative_eq!(bear.value(DriverKind::RevenueGrowth).unwrap(), 0.05);
        assert_relative_eq!(bear.value(DriverKind::GrossMargin).unwrap(), 0.97);
        assert_relative_eq!(bear.value(DriverKind::NetMargin).unwrap(), 0.0);
        assert_eq!(bear.value(DriverKind::OperatingMargin), None);
    }

    #[rstest]
    #[case(0.1, 0.15, 0.05)]
    #[case(-0.1, -0.05, -0.15)]
    #[case(0.0, 0.0, 0.0)]
    fn test_growth_follows_scenario_direction(
        #[case] growth: f64,
        #[case] bull: f64,
        #[case] bear: f64,
    ) {
        let config = ScenarioConfig::default();
        let drivers = Drivers::default().with_value(DriverKind::RevenueGrowth, growth);
        let adjusted = |scenario| {
            apply_scenario(&drivers, scenario, &config)
                .value(DriverKind::RevenueGrowth)
                .unwrap()
        };
        assert_relative_eq!(adjusted(Scenario::Bull), bull, epsilon = 1e-12);
        assert_relative_eq!(adjusted(Scenario::Bear), bear, epsilon = 1e-12);
    }
}
