//! Canonical schema: the (statement, line item) allow-list.
//!
//! Every fact outside these lists is dropped at persistence or aggregation
//! time. The order of each list is the order statements are displayed in.

use crate::facts::Statement;

/// Income statement line items in display order.
pub const INCOME_STATEMENT_ITEMS: &[&str] = &[
    "revenue",
    "cogs",
    "gross_profit",
    "r_and_d",
    "sga",
    "operating_expenses",
    "operating_income",
    "interest_income",
    "interest_expense",
    "other_income_expense",
    "pre_tax_income",
    "income_tax_expense",
    "net_income",
    "ebitda",
    "total_expenses",
    "eps_basic",
    "eps_diluted",
    "shares_basic",
    "shares_diluted",
    "shares_outstanding",
];

/// Balance sheet line items in display order.
pub const BALANCE_SHEET_ITEMS: &[&str] = &[
    "cash",
    "short_term_investments",
    "long_term_investments",
    "accounts_receivable",
    "inventory",
    "prepaid_expenses",
    "other_assets_current",
    "assets_current",
    "other_assets_noncurrent",
    "assets_noncurrent",
    "assets",
    "ppe",
    "goodwill",
    "intangible_assets",
    "accounts_payable",
    "accrued_expenses",
    "deferred_revenue_current",
    "deferred_revenue_noncurrent",
    "other_liabilities_current",
    "liabilities_current",
    "other_liabilities_noncurrent",
    "liabilities_noncurrent",
    "liabilities",
    "debt_current",
    "debt_long_term",
    "equity",
    "retained_earnings",
    "treasury_stock",
    "minority_interest",
    "liabilities_equity",
];

/// Cash flow line items in display order.
pub const CASH_FLOW_ITEMS: &[&str] = &[
    "net_income",
    "depreciation_amortization",
    "stock_compensation",
    "change_accounts_receivable",
    "change_inventory",
    "change_prepaid_expenses",
    "change_other_assets",
    "change_accounts_payable",
    "change_accrued_expenses",
    "change_deferred_revenue",
    "change_other_liabilities",
    "change_working_capital",
    "cfo",
    "capex",
    "acquisitions",
    "cfi",
    "dividends_paid",
    "share_repurchases",
    "debt_issued",
    "debt_repaid",
    "cff",
    "fx_on_cash",
    "change_in_restricted_cash",
    "change_in_cash",
];

/// Returns true if `line_item` may be stored on `statement`.
pub fn is_allowed(statement: Statement, line_item: &str) -> bool {
    statement.line_items().contains(&line_item)
}

/// Position of `line_item` in the statement's display order.
///
/// Unknown items rank after every known one.
pub fn display_rank(statement: Statement, line_item: &str) -> usize {
    let items = statement.line_items();
    items
        .iter()
        .position(|item| *item == line_item)
        .unwrap_or(items.len())
}

/// Every statement that carries `line_item`.
pub fn statements_for(line_item: &str) -> Vec<Statement> {
    Statement::ALL
        .into_iter()
        .filter(|statement| is_allowed(*statement, line_item))
        .collect()
}

/// Returns true if `line_item` is allowed on any statement.
pub fn is_known_line_item(line_item: &str) -> bool {
    Statement::ALL
        .iter()
        .any(|statement| is_allowed(*statement, line_item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Statement::IncomeStatement, "revenue", true)]
    #[case(Statement::BalanceSheet, "other_assets_current", true)]
    #[case(Statement::CashFlow, "change_in_cash", true)]
    #[case(Statement::BalanceSheet, "revenue", false)]
    #[case(Statement::IncomeStatement, "segment_revenue", false)]
    fn test_is_allowed(#[case] statement: Statement, #[case] item: &str, #[case] expected: bool) {
        assert_eq!(is_allowed(statement, item), expected);
    }

    #[test]
    fn test_net_income_on_two_statements() {
        assert_eq!(
            statements_for("net_income"),
            vec![Statement::IncomeStatement, Statement::CashFlow]
        );
    }

    #[test]
    fn test_display_rank() {
        assert_eq!(display_rank(Statement::IncomeStatement, "revenue"), 0);
        assert_eq!(display_rank(Statement::IncomeStatement, "cogs"), 1);
        assert_eq!(
            display_rank(Statement::IncomeStatement, "unknown"),
            INCOME_STATEMENT_ITEMS.len()
        );
    }

    #[test]
    fn test_anchor_items_are_allowed() {
        for statement in Statement::ALL {
            for item in statement.anchor_items() {
                assert!(is_allowed(statement, item), "{item} on {statement}");
            }
        }
    }
}
