//! Derived line items.
//!
//! A line item is derived only when it is missing for the period, every
//! required input is present, and the inputs share a unit. Derived facts carry
//! no source fact; their accession and period start come from their inputs.
//!
//! Rules run in a fixed order and later rules see earlier results, so a
//! derived `liabilities` feeds `liabilities_noncurrent`.

use crate::config::AggregatorConfig;
use crate::group::compare_accession;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tally_data::{CanonicalFact, PeriodType, Statement};
use tracing::trace;

use tally_data::Statement::{BalanceSheet as Bs, CashFlow as Cf, IncomeStatement as Is};

/// `target = total - sum(components present)`, requiring at least one component.
#[derive(Debug, Clone, Copy)]
struct Residual {
    target: &'static str,
    total: &'static str,
    components: &'static [&'static str],
}

const BALANCE_SHEET_RESIDUALS: &[Residual] = &[
    Residual {
        target: "liabilities",
        total: "liabilities_equity",
        components: &["equity"],
    },
    Residual {
        target: "other_assets_current",
        total: "assets_current",
        components: &[
            "cash",
            "short_term_investments",
            "accounts_receivable",
            "inventory",
            "prepaid_expenses",
        ],
    },
    Residual {
        target: "assets_noncurrent",
        total: "assets",
        components: &["assets_current"],
    },
    Residual {
        target: "other_assets_noncurrent",
        total: "assets_noncurrent",
        components: &["ppe", "goodwill", "intangible_assets", "long_term_investments"],
    },
    Residual {
        target: "other_liabilities_current",
        total: "liabilities_current",
        components: &[
            "accounts_payable",
            "accrued_expenses",
            "deferred_revenue_current",
            "debt_current",
        ],
    },
    Residual {
        target: "liabilities_noncurrent",
        total: "liabilities",
        components: &["liabilities_current"],
    },
    Residual {
        target: "other_liabilities_noncurrent",
        total: "liabilities_noncurrent",
        components: &["debt_long_term", "deferred_revenue_noncurrent"],
    },
];

/// `target = sum(sign * term)`, requiring every term.
#[derive(Debug, Clone, Copy)]
struct Identity {
    target: (Statement, &'static str),
    terms: &'static [(Statement, &'static str, f64)],
}

const INCOME_STATEMENT_IDENTITIES: &[Identity] = &[
    Identity {
        target: (Is, "cogs"),
        terms: &[(Is, "revenue", 1.0), (Is, "gross_profit", -1.0)],
    },
    Identity {
        target: (Is, "gross_profit"),
        terms: &[(Is, "revenue", 1.0), (Is, "cogs", -1.0)],
    },
    Identity {
        target: (Is, "total_expenses"),
        terms: &[(Is, "operating_expenses", 1.0), (Is, "cogs", 1.0)],
    },
    Identity {
        target: (Is, "operating_expenses"),
        terms: &[(Is, "total_expenses", 1.0), (Is, "cogs", -1.0)],
    },
    Identity {
        target: (Is, "ebitda"),
        terms: &[(Is, "operating_income", 1.0), (Cf, "depreciation_amortization", 1.0)],
    },
];

/// Addends of the change in cash identity.
pub const CASH_FLOW_ADDENDS: &[&str] =
    &["cfo", "cfi", "cff", "fx_on_cash", "change_in_restricted_cash"];

/// Activity totals; at least one must be present to sum the identity.
pub const CASH_FLOW_ACTIVITIES: &[&str] = &["cfo", "cfi", "cff"];

/// Working capital movements summed into `change_working_capital`.
pub const WORKING_CAPITAL_ITEMS: &[&str] = &[
    "change_accounts_receivable",
    "change_inventory",
    "change_prepaid_expenses",
    "change_other_assets",
    "change_accounts_payable",
    "change_accrued_expenses",
    "change_deferred_revenue",
    "change_other_liabilities",
];

/// Facts of one (ticker, cik, period end, unit) bucket.
#[derive(Debug)]
struct PeriodFacts {
    items: BTreeMap<Statement, BTreeMap<String, CanonicalFact>>,
    derived: Vec<CanonicalFact>,
}

impl PeriodFacts {
    fn new(facts: Vec<&CanonicalFact>) -> Self {
        let mut items: BTreeMap<Statement, BTreeMap<String, CanonicalFact>> = BTreeMap::new();
        for fact in facts {
            items
                .entry(fact.statement)
                .or_default()
                .insert(fact.line_item.clone(), fact.clone());
        }
        Self {
            items,
            derived: Vec::new(),
        }
    }

    fn get(&self, statement: Statement, line_item: &str) -> Option<&CanonicalFact> {
        self.items.get(&statement)?.get(line_item)
    }

    fn value(&self, statement: Statement, line_item: &str) -> Option<f64> {
        self.get(statement, line_item).map(|f| f.value)
    }

    fn has(&self, statement: Statement, line_item: &str) -> bool {
        self.get(statement, line_item).is_some()
    }

    /// Records a derived fact built from the first input's identity fields.
    fn add(
        &mut self,
        statement: Statement,
        line_item: &str,
        value: f64,
        inputs: &[(Statement, &str)],
    ) {
        let sources: Vec<&CanonicalFact> = inputs
            .iter()
            .filter_map(|(s, item)| self.get(*s, item))
            .collect();
        let Some(first) = sources.first() else {
            return;
        };
        let accession = sources
            .iter()
            .map(|f| f.accession.as_deref())
            .max_by(|a, b| compare_accession(*a, *b))
            .flatten()
            .map(str::to_string);
        let period_type = statement.expected_period_type();
        let period_start = match period_type {
            PeriodType::Instant => None,
            _ => sources.iter().find_map(|f| f.period_start),
        };
        let fact = CanonicalFact {
            ticker: first.ticker.clone(),
            cik: first.cik.clone(),
            accession,
            period_start,
            period_end: first.period_end,
            period_type,
            statement,
            line_item: line_item.to_string(),
            value,
            unit: first.unit.clone(),
            source_fact_id: None,
            source_xbrl_tag: None,
            source_context_ref: None,
        };
        trace!(%statement, line_item, value, period_end = %fact.period_end, "derived line item");
        self.items
            .entry(statement)
            .or_default()
            .insert(line_item.to_string(), fact.clone());
        self.derived.push(fact);
    }

    fn derive_balance_sheet(&mut self, tolerance: f64) {
        for rule in BALANCE_SHEET_RESIDUALS {
            if self.has(Bs, rule.target) {
                continue;
            }
            let Some(total) = self.value(Bs, rule.total) else {
                continue;
            };
            let present: Vec<&str> = rule
                .components
                .iter()
                .copied()
                .filter(|item| self.has(Bs, item))
                .collect();
            if present.is_empty() {
                continue;
            }
            let residual = total - present.iter().filter_map(|item| self.value(Bs, item)).sum::<f64>();
            if residual.abs() <= tolerance {
                continue;
            }
            let inputs: Vec<(Statement, &str)> = std::iter::once(rule.total)
                .chain(present)
                .map(|item| (Bs, item))
                .collect();
            self.add(Bs, rule.target, residual, &inputs);
        }
    }

    fn derive_income_statement(&mut self) {
        for identity in INCOME_STATEMENT_IDENTITIES {
            let (statement, target) = identity.target;
            if self.has(statement, target) {
                continue;
            }
            let values: Option<Vec<f64>> = identity
                .terms
                .iter()
                .map(|(s, item, sign)| self.value(*s, item).map(|v| v * sign))
                .collect();
            let Some(values) = values else {
                continue;
            };
            let inputs: Vec<(Statement, &str)> =
                identity.terms.iter().map(|(s, item, _)| (*s, *item)).collect();
            self.add(statement, target, values.iter().sum(), &inputs);
        }
    }

    fn derive_cash_flow(&mut self, tolerance: f64) {
        let activities: Vec<f64> = CASH_FLOW_ACTIVITIES
            .iter()
            .filter_map(|item| self.value(Cf, item))
            .collect();

        if let Some(change) = self.value(Cf, "change_in_cash") {
            if activities.len() == CASH_FLOW_ACTIVITIES.len() {
                self.solve_addend("fx_on_cash", change, tolerance);
                if self.has(Cf, "fx_on_cash") {
                    self.solve_addend("change_in_restricted_cash", change, tolerance);
                }
            }
        } else if !activities.is_empty() {
            let total: f64 = CASH_FLOW_ADDENDS
                .iter()
                .filter_map(|item| self.value(Cf, item))
                .sum();
            let inputs: Vec<(Statement, &str)> =
                CASH_FLOW_ADDENDS.iter().map(|item| (Cf, *item)).collect();
            self.add(Cf, "change_in_cash", total, &inputs);
        }

        if !self.has(Cf, "change_working_capital") {
            let present: Vec<(Statement, &str)> = WORKING_CAPITAL_ITEMS
                .iter()
                .filter(|item| self.has(Cf, item))
                .map(|item| (Cf, *item))
                .collect();
            if !present.is_empty() {
                let total: f64 = present
                    .iter()
                    .filter_map(|(s, item)| self.value(*s, item))
                    .sum();
                self.add(Cf, "change_working_capital", total, &present);
            }
        }
    }

    /// Solves one missing addend of the change in cash identity.
    fn solve_addend(&mut self, target: &str, change: f64, tolerance: f64) {
        if self.has(Cf, target) {
            return;
        }
        let others: f64 = CASH_FLOW_ADDENDS
            .iter()
            .filter(|item| **item != target)
            .filter_map(|item| self.value(Cf, item))
            .sum();
        let residual = change - others;
        if residual.abs() <= tolerance {
            return;
        }
        let inputs: Vec<(Statement, &str)> = std::iter::once("cfo")
            .chain(std::iter::once("change_in_cash"))
            .chain(CASH_FLOW_ACTIVITIES.iter().skip(1).copied())
            .map(|item| (Cf, item))
            .collect();
        self.add(Cf, target, residual, &inputs);
    }
}

/// Computes every derivable line item missing from `facts`.
///
/// Returns only the derived facts; the input is left untouched.
pub fn derive_line_items(facts: &[CanonicalFact], config: &AggregatorConfig) -> Vec<CanonicalFact> {
    let mut buckets: BTreeMap<(&str, &str, NaiveDate, &str), Vec<&CanonicalFact>> =
        BTreeMap::new();
    for fact in facts {
        buckets
            .entry((fact.ticker.as_str(), fact.cik.as_str(), fact.period_end, fact.unit.as_str()))
            .or_default()
            .push(fact);
    }

    let mut derived = Vec::new();
    for bucket in buckets.into_values() {
        let mut period = PeriodFacts::new(bucket);
        period.derive_balance_sheet(config.residual_tolerance);
        period.derive_income_statement();
        period.derive_cash_flow(config.residual_tolerance);
        derived.append(&mut period.derived);
    }
    derived
}
