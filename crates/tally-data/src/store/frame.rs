//! Polars views of stored facts.

use crate::error::Result;
use crate::facts::CanonicalFact;
use polars::prelude::*;

/// Builds a long-format `DataFrame` of canonical facts.
///
/// Columns: `period_end` (Date), `period_start` (Date), `statement`,
/// `line_item`, `value`, `unit`, `derived`.
pub fn canonical_frame(facts: &[CanonicalFact]) -> Result<DataFrame> {
    let mut period_ends = Vec::with_capacity(facts.len());
    let mut period_starts = Vec::with_capacity(facts.len());
    let mut statements = Vec::with_capacity(facts.len());
    let mut line_items = Vec::with_capacity(facts.len());
    let mut values = Vec::with_capacity(facts.len());
    let mut units = Vec::with_capacity(facts.len());
    let mut derived = Vec::with_capacity(facts.len());

    for fact in facts {
        period_ends.push(fact.period_end.to_string());
        period_starts.push(fact.period_start.map(|d| d.to_string()));
        statements.push(fact.statement.as_str());
        line_items.push(fact.line_item.as_str());
        values.push(fact.value);
        units.push(fact.unit.as_str());
        derived.push(fact.is_derived());
    }

    let df = DataFrame::new(vec![
        Series::new("period_end".into(), period_ends).into(),
        Series::new("period_start".into(), period_starts).into(),
        Series::new("statement".into(), statements).into(),
        Series::new("line_item".into(), line_items).into(),
        Series::new("value".into(), values).into(),
        Series::new("unit".into(), units).into(),
        Series::new("derived".into(), derived).into(),
    ])?;

    let df = df
        .lazy()
        .with_columns([
            col("period_end").cast(DataType::Date),
            col("period_start").cast(DataType::Date),
        ])
        .collect()?;

    Ok(df)
}
