//! Forecasts driven by canonical facts

use approx::assert_relative_eq;
use chrono::NaiveDate;
use rstest::rstest;
use tally_data::{CanonicalFact, PeriodType, Statement};
use tally_forecast::{
    DriverDefaults, DriverKind, Drivers, ForecastOptions, ForecastPeriod, MetricSeries, Scenario,
    ScenarioConfig, build_forecast, build_forecast_summary, compute_drivers,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fact(end: NaiveDate, statement: Statement, line_item: &str, value: f64) -> CanonicalFact {
    let period_type = statement.expected_period_type();
    CanonicalFact {
        ticker: "ACME".into(),
        cik: "0000000042".into(),
        accession: Some("0000000042-24-000010".into()),
        period_start: (period_type == PeriodType::Duration).then(|| end - chrono::Duration::days(90)),
        period_end: end,
        period_type,
        statement,
        line_item: line_item.into(),
        value,
        unit: "USD".into(),
        source_fact_id: Some(1),
        source_xbrl_tag: Some(format!("us-gaap:{line_item}")),
        source_context_ref: Some("ctx".into()),
    }
}

fn history() -> Vec<CanonicalFact> {
    use Statement::{BalanceSheet, CashFlow, IncomeStatement};
    [(date(2023, 12, 31), 80.0), (date(2024, 3, 31), 100.0)]
        .into_iter()
        .flat_map(|(end, revenue)| {
            vec![
                fact(end, IncomeStatement, "revenue", revenue),
                fact(end, IncomeStatement, "gross_profit", revenue * 0.5),
                fact(end, IncomeStatement, "operating_income", revenue * 0.25),
                fact(end, IncomeStatement, "net_income", revenue * 0.2),
                fact(end, CashFlow, "net_income", revenue * 0.2),
                fact(end, CashFlow, "cfo", revenue * 0.3),
                fact(end, CashFlow, "capex", -revenue * 0.05),
                fact(end, BalanceSheet, "cash", 40.0),
                fact(end, BalanceSheet, "segment_cash", 1.0),
            ]
        })
        .collect()
}

#[test]
fn test_canonical_history_to_forecast() {
    let series = MetricSeries::from_canonical(&history());
    assert_eq!(series.len(), 2);
    let drivers = compute_drivers(&series, &DriverDefaults::default());
    assert_relative_eq!(drivers.value(DriverKind::RevenueGrowth).unwrap(), 0.25);
    assert_relative_eq!(drivers.value(DriverKind::GrossMargin).unwrap(), 0.5);
    assert_relative_eq!(drivers.value(DriverKind::FcfMargin).unwrap(), 0.25, epsilon = 1e-12);

    let (anchor_date, anchor) = series.latest().unwrap();
    assert!(anchor.value("segment_cash").is_none());
    let forecast = build_forecast(
        anchor_date,
        anchor,
        &drivers,
        &ForecastOptions::default(),
        &ScenarioConfig::default(),
    );
    assert_eq!(forecast.len(), 12);

    for index in 1..=4 {
        let revenue = |scenario| {
            forecast
                .iter()
                .find(|p| p.scenario == scenario && p.period_index == index)
                .and_then(|p| p.value("revenue"))
                .unwrap()
        };
        assert!(revenue(Scenario::Bull) > revenue(Scenario::Base));
        assert!(revenue(Scenario::Base) > revenue(Scenario::Bear));
    }

    let base: Vec<_> = forecast.iter().filter(|p| p.scenario == Scenario::Base).collect();
    assert_eq!(base[0].period_end, date(2024, 6, 30));
    assert_relative_eq!(base[0].value("revenue").unwrap(), 125.0);
    assert_relative_eq!(base[1].value("revenue").unwrap(), 156.25);
    for period in &forecast {
        for kind in period.assumptions.keys() {
            assert!(drivers.get(*kind).is_some());
        }
    }

    let summary = build_forecast_summary(&forecast);
    assert_eq!(summary.len(), 4);
    let band = &summary[&date(2024, 6, 30)]["revenue"];
    assert_eq!(band.scenarios, 3);
    assert_relative_eq!(band.point, 125.0);
    assert!(band.low < band.point && band.point < band.high);
}

#[test]
fn test_empty_history() {
    let series = MetricSeries::from_canonical(&[]);
    assert!(compute_drivers(&series, &DriverDefaults::default()).is_empty());
    assert!(series.latest().is_none());
}

fn at(forecast: &[ForecastPeriod], scenario: Scenario, index: usize, line_item: &str) -> f64 {
    forecast
        .iter()
        .find(|p| p.scenario == scenario && p.period_index == index)
        .and_then(|p| p.value(line_item))
        .unwrap()
}

#[rstest]
#[case::shrinking(-0.2)]
#[case::flat(0.0)]
#[case::growing(0.25)]
fn test_scenario_ordering(#[case] growth: f64) {
    let end = date(2024, 3, 31);
    let series = MetricSeries::new().with(end, "revenue", 100.0);
    let (anchor_date, anchor) = series.latest().unwrap();
    let drivers = Drivers::default()
        .with_value(DriverKind::RevenueGrowth, growth)
        .with_value(DriverKind::GrossMargin, 1.0)
        .with_value(DriverKind::NetMargin, 0.1);
    let forecast = build_forecast(
        anchor_date,
        anchor,
        &drivers,
        &ForecastOptions::default(),
        &ScenarioConfig::default(),
    );

    for index in 1..=4 {
        let revenue = |scenario| at(&forecast, scenario, index, "revenue");
        if growth == 0.0 {
            // no growth to scale: revenue ties and only the margins separate the cases
            assert_relative_eq!(revenue(Scenario::Bull), revenue(Scenario::Base));
            assert_relative_eq!(revenue(Scenario::Base), revenue(Scenario::Bear));
        } else {
            assert!(revenue(Scenario::Bull) > revenue(Scenario::Base), "period {index}");
            assert!(revenue(Scenario::Base) > revenue(Scenario::Bear), "period {index}");
        }

        let net_income = |scenario| at(&forecast, scenario, index, "net_income");
        assert!(net_income(Scenario::Bull) > net_income(Scenario::Base), "period {index}");
        assert!(net_income(Scenario::Base) > net_income(Scenario::Bear), "period {index}");

        // a margin already at the clamp cannot widen further
        let gross_profit = |scenario| at(&forecast, scenario, index, "gross_profit");
        assert_relative_eq!(gross_profit(Scenario::Bull), revenue(Scenario::Bull));
        assert!(gross_profit(Scenario::Bear) < revenue(Scenario::Bear));
    }
}
