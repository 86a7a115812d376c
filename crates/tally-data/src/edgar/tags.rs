//! Curated XBRL concept vocabulary.
//!
//! Maps vendor concept names to canonical `(line_item, statement)` pairs. A
//! concept can map to several pairs (`us-gaap:NetIncomeLoss` feeds both the
//! income statement and the cash flow statement), so lookups always return a
//! slice, possibly empty.

use crate::error::{DataError, Result};
use crate::facts::Statement;
use crate::schema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use tracing::warn;

use crate::facts::Statement::{BalanceSheet as Bs, CashFlow as Cf, IncomeStatement as Is};

/// Standard vocabulary, one row per (concept, line item, statement).
const STANDARD_TAGS: &[(&str, &str, Statement)] = &[
    // Income statement
    ("us-gaap:Revenues", "revenue", Is),
    ("us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax", "revenue", Is),
    ("us-gaap:RevenueFromContractWithCustomerIncludingAssessedTax", "revenue", Is),
    ("us-gaap:SalesRevenueNet", "revenue", Is),
    ("us-gaap:TotalRevenues", "revenue", Is),
    ("us-gaap:RevenuesNetOfInterestExpense", "revenue", Is),
    ("us-gaap:CostOfRevenue", "cogs", Is),
    ("us-gaap:CostOfGoodsAndServicesSold", "cogs", Is),
    ("us-gaap:CostOfGoodsSold", "cogs", Is),
    ("us-gaap:CostOfSales", "cogs", Is),
    ("us-gaap:GrossProfit", "gross_profit", Is),
    ("us-gaap:ResearchAndDevelopmentExpense", "r_and_d", Is),
    ("us-gaap:ResearchAndDevelopmentExpenseExcludingAcquiredInProcessCost", "r_and_d", Is),
    ("us-gaap:SellingGeneralAndAdministrativeExpense", "sga", Is),
    ("us-gaap:OperatingExpenses", "operating_expenses", Is),
    ("us-gaap:CostsAndExpenses", "total_expenses", Is),
    ("us-gaap:OperatingIncomeLoss", "operating_income", Is),
    ("us-gaap:InvestmentIncomeInterest", "interest_income", Is),
    ("us-gaap:InterestIncomeOther", "interest_income", Is),
    ("us-gaap:InterestExpense", "interest_expense", Is),
    ("us-gaap:InterestExpenseNonoperating", "interest_expense", Is),
    ("us-gaap:InterestExpenseDebt", "interest_expense", Is),
    ("us-gaap:NonoperatingIncomeExpense", "other_income_expense", Is),
    ("us-gaap:OtherNonoperatingIncomeExpense", "other_income_expense", Is),
    (
        "us-gaap:IncomeLossFromContinuingOperationsBeforeIncomeTaxesExtraordinaryItemsNoncontrollingInterest",
        "pre_tax_income",
        Is,
    ),
    (
        "us-gaap:IncomeLossFromContinuingOperationsBeforeIncomeTaxesMinorityInterestAndIncomeLossFromEquityMethodInvestments",
        "pre_tax_income",
        Is,
    ),
    ("us-gaap:IncomeTaxExpenseBenefit", "income_tax_expense", Is),
    ("us-gaap:NetIncomeLoss", "net_income", Is),
    ("us-gaap:NetIncomeLoss", "net_income", Cf),
    ("us-gaap:ProfitLoss", "net_income", Is),
    ("us-gaap:ProfitLoss", "net_income", Cf),
    ("us-gaap:EarningsPerShareBasic", "eps_basic", Is),
    ("us-gaap:EarningsPerShareDiluted", "eps_diluted", Is),
    ("us-gaap:EarningsPerShareBasicAndDiluted", "eps_basic", Is),
    ("us-gaap:EarningsPerShareBasicAndDiluted", "eps_diluted", Is),
    ("us-gaap:WeightedAverageNumberOfSharesOutstandingBasic", "shares_basic", Is),
    ("us-gaap:WeightedAverageNumberOfDilutedSharesOutstanding", "shares_diluted", Is),
    ("us-gaap:CommonStockSharesOutstanding", "shares_outstanding", Is),
    ("dei:EntityCommonStockSharesOutstanding", "shares_outstanding", Is),
    // Balance sheet
    ("us-gaap:CashAndCashEquivalentsAtCarryingValue", "cash", Bs),
    ("us-gaap:Cash", "cash", Bs),
    ("us-gaap:ShortTermInvestments", "short_term_investments", Bs),
    ("us-gaap:MarketableSecuritiesCurrent", "short_term_investments", Bs),
    ("us-gaap:AvailableForSaleSecuritiesDebtSecuritiesCurrent", "short_term_investments", Bs),
    ("us-gaap:LongTermInvestments", "long_term_investments", Bs),
    ("us-gaap:MarketableSecuritiesNoncurrent", "long_term_investments", Bs),
    ("us-gaap:AccountsReceivableNetCurrent", "accounts_receivable", Bs),
    ("us-gaap:AccountsReceivableNet", "accounts_receivable", Bs),
    ("us-gaap:InventoryNet", "inventory", Bs),
    ("us-gaap:PrepaidExpenseCurrent", "prepaid_expenses", Bs),
    ("us-gaap:PrepaidExpenseAndOtherAssetsCurrent", "prepaid_expenses", Bs),
    ("us-gaap:OtherAssetsCurrent", "other_assets_current", Bs),
    ("us-gaap:AssetsCurrent", "assets_current", Bs),
    ("us-gaap:OtherAssetsNoncurrent", "other_assets_noncurrent", Bs),
    ("us-gaap:AssetsNoncurrent", "assets_noncurrent", Bs),
    ("us-gaap:Assets", "assets", Bs),
    ("us-gaap:PropertyPlantAndEquipmentNet", "ppe", Bs),
    ("us-gaap:Goodwill", "goodwill", Bs),
    ("us-gaap:IntangibleAssetsNetExcludingGoodwill", "intangible_assets", Bs),
    ("us-gaap:FiniteLivedIntangibleAssetsNet", "intangible_assets", Bs),
    ("us-gaap:AccountsPayableCurrent", "accounts_payable", Bs),
    ("us-gaap:AccruedLiabilitiesCurrent", "accrued_expenses", Bs),
    ("us-gaap:AccruedLiabilitiesAndOtherCurrent", "accrued_expenses", Bs),
    ("us-gaap:ContractWithCustomerLiabilityCurrent", "deferred_revenue_current", Bs),
    ("us-gaap:DeferredRevenueCurrent", "deferred_revenue_current", Bs),
    ("us-gaap:ContractWithCustomerLiabilityNoncurrent", "deferred_revenue_noncurrent", Bs),
    ("us-gaap:DeferredRevenueNoncurrent", "deferred_revenue_noncurrent", Bs),
    ("us-gaap:OtherLiabilitiesCurrent", "other_liabilities_current", Bs),
    ("us-gaap:LiabilitiesCurrent", "liabilities_current", Bs),
    ("us-gaap:OtherLiabilitiesNoncurrent", "other_liabilities_noncurrent", Bs),
    ("us-gaap:LiabilitiesNoncurrent", "liabilities_noncurrent", Bs),
    ("us-gaap:Liabilities", "liabilities", Bs),
    ("us-gaap:LongTermDebtCurrent", "debt_current", Bs),
    ("us-gaap:DebtCurrent", "debt_current", Bs),
    ("us-gaap:LongTermDebtNoncurrent", "debt_long_term", Bs),
    ("us-gaap:StockholdersEquity", "equity", Bs),
    (
        "us-gaap:StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
        "equity",
        Bs,
    ),
    ("us-gaap:RetainedEarningsAccumulatedDeficit", "retained_earnings", Bs),
    ("us-gaap:TreasuryStockValue", "treasury_stock", Bs),
    ("us-gaap:TreasuryStockCommonValue", "treasury_stock", Bs),
    ("us-gaap:MinorityInterest", "minority_interest", Bs),
    ("us-gaap:NoncontrollingInterest", "minority_interest", Bs),
    ("us-gaap:LiabilitiesAndStockholdersEquity", "liabilities_equity", Bs),
    // Cash flow
    ("us-gaap:DepreciationDepletionAndAmortization", "depreciation_amortization", Cf),
    ("us-gaap:DepreciationAndAmortization", "depreciation_amortization", Cf),
    ("us-gaap:DepreciationAmortizationAndAccretionNet", "depreciation_amortization", Cf),
    ("us-gaap:ShareBasedCompensation", "stock_compensation", Cf),
    ("us-gaap:AllocatedShareBasedCompensationExpense", "stock_compensation", Cf),
    ("us-gaap:IncreaseDecreaseInAccountsReceivable", "change_accounts_receivable", Cf),
    ("us-gaap:IncreaseDecreaseInInventories", "change_inventory", Cf),
    (
        "us-gaap:IncreaseDecreaseInPrepaidDeferredExpenseAndOtherAssets",
        "change_prepaid_expenses",
        Cf,
    ),
    ("us-gaap:IncreaseDecreaseInOtherOperatingAssets", "change_other_assets", Cf),
    ("us-gaap:IncreaseDecreaseInAccountsPayable", "change_accounts_payable", Cf),
    ("us-gaap:IncreaseDecreaseInAccruedLiabilities", "change_accrued_expenses", Cf),
    ("us-gaap:IncreaseDecreaseInContractWithCustomerLiability", "change_deferred_revenue", Cf),
    ("us-gaap:IncreaseDecreaseInDeferredRevenue", "change_deferred_revenue", Cf),
    ("us-gaap:IncreaseDecreaseInOtherOperatingLiabilities", "change_other_liabilities", Cf),
    ("us-gaap:IncreaseDecreaseInOperatingCapital", "change_working_capital", Cf),
    ("us-gaap:NetCashProvidedByUsedInOperatingActivities", "cfo", Cf),
    ("us-gaap:NetCashProvidedByUsedInOperatingActivitiesContinuingOperations", "cfo", Cf),
    ("us-gaap:PaymentsToAcquirePropertyPlantAndEquipment", "capex", Cf),
    ("us-gaap:PaymentsToAcquireProductiveAssets", "capex", Cf),
    ("us-gaap:PaymentsToAcquireBusinessesNetOfCashAcquired", "acquisitions", Cf),
    ("us-gaap:PaymentsToAcquireBusinessesAndIntangibles", "acquisitions", Cf),
    ("us-gaap:NetCashProvidedByUsedInInvestingActivities", "cfi", Cf),
    ("us-gaap:NetCashProvidedByUsedInInvestingActivitiesContinuingOperations", "cfi", Cf),
    ("us-gaap:PaymentsOfDividends", "dividends_paid", Cf),
    ("us-gaap:PaymentsOfDividendsCommonStock", "dividends_paid", Cf),
    ("us-gaap:PaymentsForRepurchaseOfCommonStock", "share_repurchases", Cf),
    ("us-gaap:ProceedsFromIssuanceOfLongTermDebt", "debt_issued", Cf),
    ("us-gaap:ProceedsFromIssuanceOfDebt", "debt_issued", Cf),
    ("us-gaap:RepaymentsOfLongTermDebt", "debt_repaid", Cf),
    ("us-gaap:RepaymentsOfDebt", "debt_repaid", Cf),
    ("us-gaap:NetCashProvidedByUsedInFinancingActivities", "cff", Cf),
    ("us-gaap:NetCashProvidedByUsedInFinancingActivitiesContinuingOperations", "cff", Cf),
    (
        "us-gaap:EffectOfExchangeRateOnCashCashEquivalentsRestrictedCashAndRestrictedCashEquivalents",
        "fx_on_cash",
        Cf,
    ),
    ("us-gaap:EffectOfExchangeRateOnCashAndCashEquivalents", "fx_on_cash", Cf),
    (
        "us-gaap:CashCashEquivalentsRestrictedCashAndRestrictedCashEquivalentsPeriodIncreaseDecreaseIncludingExchangeRateEffect",
        "change_in_cash",
        Cf,
    ),
    ("us-gaap:CashAndCashEquivalentsPeriodIncreaseDecrease", "change_in_cash", Cf),
];

/// One canonical destination for an XBRL concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagMapping {
    /// Canonical line item
    pub line_item: String,
    /// Statement the line item lands on
    pub statement: Statement,
}

/// Lookup service from XBRL concept names to canonical line items.
///
/// Built once and shared by reference with every extractor.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    mappings: HashMap<String, Vec<TagMapping>>,
}

#[derive(Debug, Deserialize)]
struct TagRow {
    xbrl_tag: String,
    line_item: String,
    statement: String,
}

impl TagMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map holding the standard US-GAAP vocabulary.
    pub fn standard() -> Self {
        let mut map = Self::new();
        for (tag, line_item, statement) in STANDARD_TAGS {
            map.push(tag, line_item, *statement);
        }
        map
    }

    /// Adds a mapping after checking it against the canonical schema.
    pub fn insert(&mut self, tag: &str, line_item: &str, statement: Statement) -> Result<()> {
        if !schema::is_allowed(statement, line_item) {
            return Err(DataError::DisallowedFact {
                statement: statement.to_string(),
                line_item: line_item.to_string(),
            });
        }
        self.push(tag, line_item, statement);
        Ok(())
    }

    fn push(&mut self, tag: &str, line_item: &str, statement: Statement) {
        let entry = self.mappings.entry(tag.trim().to_string()).or_default();
        let mapping = TagMapping {
            line_item: line_item.to_string(),
            statement,
        };
        if !entry.contains(&mapping) {
            entry.push(mapping);
        }
    }

    /// Extends the map from CSV rows of `xbrl_tag,line_item,statement`.
    ///
    /// Rows that fall outside the schema are skipped with a warning. Returns
    /// the number of rows accepted.
    pub fn extend_from_csv<R: Read>(&mut self, reader: R) -> Result<usize> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut accepted = 0;
        for row in rdr.deserialize::<TagRow>() {
            let row = row?;
            let statement = match row.statement.parse::<Statement>() {
                Ok(statement) => statement,
                Err(err) => {
                    warn!(tag = %row.xbrl_tag, %err, "skipping tag override");
                    continue;
                }
            };
            match self.insert(&row.xbrl_tag, &row.line_item, statement) {
                Ok(()) => accepted += 1,
                Err(err) => warn!(tag = %row.xbrl_tag, %err, "skipping tag override"),
            }
        }
        Ok(accepted)
    }

    /// Returns every mapping for `tag`, empty when the concept is not curated.
    pub fn lookup(&self, tag: &str) -> &[TagMapping] {
        self.mappings
            .get(tag.trim())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of distinct concepts.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if no concept is mapped.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("us-gaap:TotalRevenues", "revenue", Statement::IncomeStatement)]
    #[case("us-gaap:CostOfSales", "cogs", Statement::IncomeStatement)]
    #[case("us-gaap:AccountsReceivableNet", "accounts_receivable", Statement::BalanceSheet)]
    #[case("us-gaap:DeferredRevenueCurrent", "deferred_revenue_current", Statement::BalanceSheet)]
    #[case("us-gaap:AccruedLiabilitiesAndOtherCurrent", "accrued_expenses", Statement::BalanceSheet)]
    #[case("us-gaap:NoncontrollingInterest", "minority_interest", Statement::BalanceSheet)]
    #[case("us-gaap:DepreciationAndAmortization", "depreciation_amortization", Statement::CashFlow)]
    #[case("us-gaap:PaymentsToAcquireBusinessesAndIntangibles", "acquisitions", Statement::CashFlow)]
    #[case(
        "us-gaap:CashCashEquivalentsRestrictedCashAndRestrictedCashEquivalentsPeriodIncreaseDecreaseIncludingExchangeRateEffect",
        "change_in_cash",
        Statement::CashFlow
    )]
    fn test_synonyms(#[case] tag: &str, #[case] line_item: &str, #[case] statement: Statement) {
        let map = TagMap::standard();
        let expected = TagMapping {
            line_item: line_item.to_string(),
            statement,
        };
        assert!(map.lookup(tag).contains(&expected), "{tag}");
    }

    #[test]
    fn test_net_income_maps_to_two_statements() {
        let map = TagMap::standard();
        let statements: Vec<_> = map
            .lookup("us-gaap:NetIncomeLoss")
            .iter()
            .map(|m| m.statement)
            .collect();
        assert_eq!(
            statements,
            vec![Statement::IncomeStatement, Statement::CashFlow]
        );
    }

    #[test]
    fn test_unknown_tag_is_empty() {
        let map = TagMap::standard();
        assert!(map.lookup("custom:SegmentWidgetSales").is_empty());
    }

    #[test]
    fn test_standard_vocabulary_respects_schema() {
        for (tag, line_item, statement) in STANDARD_TAGS {
            assert!(schema::is_allowed(*statement, line_item), "{tag}");
        }
    }

    #[test]
    fn test_extend_from_csv() {
        let csv = "xbrl_tag,line_item,statement\n\
                   acme:NetProductSales,revenue,income_statement\n\
                   acme:Widgets,widgets,income_statement\n\
                   acme:Other,revenue,footnote\n";
        let mut map = TagMap::new();
        let accepted = map.extend_from_csv(csv.as_bytes()).unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(map.lookup("acme:NetProductSales").len(), 1);
        assert!(map.lookup("acme:Widgets").is_empty());
    }

    #[test]
    fn test_insert_rejects_disallowed() {
        let mut map = TagMap::new();
        let err = map
            .insert("acme:Revenue", "revenue", Statement::BalanceSheet)
            .unwrap_err();
        assert!(matches!(err, DataError::DisallowedFact { .. }));
    }
}
