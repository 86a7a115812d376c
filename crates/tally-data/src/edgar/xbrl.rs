//! Inline XBRL extraction for SEC EDGAR filings (10-K, 10-Q).
//!
//! A filing's primary document is XHTML with `ix:nonFraction` elements wrapped
//! around the numbers a reader sees. Each element names a concept, a context
//! (period plus dimensional scope) and a unit. Extraction runs in two stages:
//!
//! 1. A single streaming pass with `quick-xml` collects context declarations,
//!    unit declarations and every numeric fact candidate. Contexts can appear
//!    after the facts that reference them, so nothing is resolved yet.
//! 2. Candidates are resolved against the [`TagMap`], admissible contexts and
//!    units, then filtered to the contexts used by each statement's anchor
//!    line items.
//!
//! The extractor never fails on bad input. Malformed amounts and dangling
//! references degrade to skipped facts or `unknown` periods, and a document
//! with no curated facts yields an empty [`Extraction`].

use super::tags::TagMap;
use crate::facts::{PeriodType, RawFact, Statement, normalize_cik};
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Filing metadata attached to every extracted fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingMeta {
    /// Ticker symbol
    pub ticker: String,
    /// SEC central index key
    pub cik: String,
    /// Accession number of the filing
    pub accession: String,
    /// Path of the document on disk
    pub source_path: Option<String>,
}

impl FilingMeta {
    /// Creates metadata for a filing with no recorded path.
    pub fn new(ticker: &str, cik: &str, accession: &str) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            cik: normalize_cik(cik),
            accession: accession.trim().to_string(),
            source_path: None,
        }
    }

    /// Records where the document was read from.
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// Dimensional allow-lists for context admissibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Axes a context may carry and still describe the whole company
    pub allowed_axes: Vec<String>,
    /// Per-axis member allow-lists; an axis without an entry accepts any member
    pub allowed_members: BTreeMap<String, Vec<String>>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let consolidated = vec![
            "srt:ConsolidatedEntitiesMember".to_string(),
            "us-gaap:ConsolidatedEntitiesMember".to_string(),
            "us-gaap:CorporateNonSegmentMember".to_string(),
        ];
        let mut allowed_members = BTreeMap::new();
        allowed_members.insert("srt:ConsolidationItemsAxis".to_string(), consolidated.clone());
        allowed_members.insert("us-gaap:ConsolidationItemsAxis".to_string(), consolidated);
        Self {
            allowed_axes: vec![
                "dei:LegalEntityAxis".to_string(),
                "us-gaap:StatementClassOfStockAxis".to_string(),
                "us-gaap:StatementEquityComponentsAxis".to_string(),
                "srt:ConsolidationItemsAxis".to_string(),
                "us-gaap:ConsolidationItemsAxis".to_string(),
            ],
            allowed_members,
        }
    }
}

impl ExtractorConfig {
    fn admits(&self, context: &Context) -> bool {
        if context.typed_member {
            return false;
        }
        context.members.iter().all(|(axis, member)| {
            let axis_allowed = self
                .allowed_axes
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(axis));
            if !axis_allowed {
                return false;
            }
            self.allowed_members
                .iter()
                .find(|(allowed_axis, _)| allowed_axis.eq_ignore_ascii_case(axis))
                .is_none_or(|(_, members)| {
                    members.iter().any(|m| m.eq_ignore_ascii_case(member))
                })
        })
    }
}

/// Result of extracting one filing.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Extracted facts, ready for persistence
    pub facts: Vec<RawFact>,
    /// Contexts declared in the document
    pub contexts: usize,
    /// Contexts rejected by the dimension allow-lists
    pub rejected_contexts: usize,
    /// Numeric facts whose concept is not curated
    pub unmapped: usize,
    /// Curated facts dropped for null values, rejected contexts or anchor mismatch
    pub skipped: usize,
}

/// Extracts curated numeric facts from inline XBRL documents.
#[derive(Debug, Clone, Copy)]
pub struct XbrlExtractor<'a> {
    tags: &'a TagMap,
    config: &'a ExtractorConfig,
}

impl<'a> XbrlExtractor<'a> {
    /// Creates an extractor over a tag vocabulary and dimension allow-lists.
    pub const fn new(tags: &'a TagMap, config: &'a ExtractorConfig) -> Self {
        Self { tags, config }
    }

    /// Extracts facts from the raw bytes of one filing document.
    pub fn extract(&self, content: &[u8], meta: &FilingMeta) -> Extraction {
        let document = scan(content);
        let mut extraction = Extraction {
            contexts: document.contexts.len(),
            ..Extraction::default()
        };

        let rejected: HashSet<&str> = document
            .contexts
            .iter()
            .filter(|(_, context)| !self.config.admits(context))
            .map(|(id, _)| id.as_str())
            .collect();
        extraction.rejected_contexts = rejected.len();

        let mut mapped = Vec::new();
        for candidate in &document.facts {
            let mappings = self.tags.lookup(&candidate.name);
            if mappings.is_empty() {
                extraction.unmapped += 1;
                continue;
            }
            if candidate
                .context_ref
                .as_deref()
                .is_some_and(|id| rejected.contains(id))
            {
                extraction.skipped += mappings.len();
                continue;
            }
            let Some(value) = candidate.value() else {
                extraction.skipped += mappings.len();
                continue;
            };
            let context = candidate
                .context_ref
                .as_deref()
                .and_then(|id| document.contexts.get(id));
            let unit = resolve_unit(candidate.unit_ref.as_deref(), &document.units);
            for mapping in mappings {
                mapped.push(MappedFact {
                    line_item: &mapping.line_item,
                    statement: mapping.statement,
                    tag: &candidate.name,
                    context_ref: candidate.context_ref.as_deref(),
                    context,
                    unit: unit.clone(),
                    value,
                });
            }
        }

        let anchors = anchor_contexts(&mapped);
        let mut seen = HashSet::new();
        for fact in mapped {
            if !fact.matches_anchor(&anchors) {
                extraction.skipped += 1;
                continue;
            }
            let key = (
                fact.line_item,
                fact.statement,
                fact.context_ref,
                fact.unit.clone(),
                fact.value.to_bits(),
            );
            if !seen.insert(key) {
                continue;
            }
            extraction.facts.push(fact.into_raw(meta));
        }

        debug!(
            accession = %meta.accession,
            facts = extraction.facts.len(),
            contexts = extraction.contexts,
            rejected_contexts = extraction.rejected_contexts,
            unmapped = extraction.unmapped,
            skipped = extraction.skipped,
            "extracted inline XBRL"
        );
        extraction
    }
}

struct MappedFact<'d> {
    line_item: &'d str,
    statement: Statement,
    tag: &'d str,
    context_ref: Option<&'d str>,
    context: Option<&'d Context>,
    unit: String,
    value: f64,
}

impl MappedFact<'_> {
    fn is_anchor(&self) -> bool {
        self.statement.anchor_items().contains(&self.line_item)
    }

    fn matches_anchor(&self, anchors: &HashMap<Statement, HashSet<&str>>) -> bool {
        if self.is_anchor() {
            return true;
        }
        match (anchors.get(&self.statement), self.context_ref) {
            (Some(contexts), Some(id)) => contexts.contains(id),
            _ => true,
        }
    }

    fn into_raw(self, meta: &FilingMeta) -> RawFact {
        let (period_start, period_end, period_type) = self
            .context
            .map_or((None, None, PeriodType::Unknown), Context::period);
        RawFact {
            id: None,
            ticker: meta.ticker.clone(),
            cik: meta.cik.clone(),
            accession: Some(meta.accession.clone()),
            line_item: self.line_item.to_string(),
            statement: self.statement,
            value: self.value,
            unit: self.unit,
            period_start,
            period_end,
            period_type,
            source_xbrl_tag: Some(self.tag.to_string()),
            source_context_ref: self.context_ref.map(str::to_string),
            source_path: meta.source_path.clone(),
        }
    }
}

fn anchor_contexts<'d>(facts: &[MappedFact<'d>]) -> HashMap<Statement, HashSet<&'d str>> {
    let mut anchors: HashMap<Statement, HashSet<&'d str>> = HashMap::new();
    for fact in facts.iter().filter(|fact| fact.is_anchor()) {
        if let Some(id) = fact.context_ref {
            anchors.entry(fact.statement).or_default().insert(id);
        }
    }
    anchors
}

/// A declared `xbrli:context`.
#[derive(Debug, Clone, Default, PartialEq)]
struct Context {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    instant: Option<NaiveDate>,
    members: Vec<(String, String)>,
    typed_member: bool,
}

impl Context {
    fn period(&self) -> (Option<NaiveDate>, Option<NaiveDate>, PeriodType) {
        if let Some(instant) = self.instant {
            return (None, Some(instant), PeriodType::Instant);
        }
        match (self.start, self.end) {
            (start, Some(end)) if start.is_some() => (start, Some(end), PeriodType::Duration),
            (None, Some(end)) => (None, Some(end), PeriodType::Unknown),
            _ => (None, None, PeriodType::Unknown),
        }
    }
}

/// A numeric `ix:nonFraction` before resolution.
#[derive(Debug, Clone, Default)]
struct Candidate {
    name: String,
    context_ref: Option<String>,
    unit_ref: Option<String>,
    scale: Option<String>,
    sign: Option<String>,
    format: Option<String>,
    nil: bool,
    text: String,
}

impl Candidate {
    fn value(&self) -> Option<f64> {
        if self.nil {
            return None;
        }
        let format = self.format.as_deref().unwrap_or_default().to_ascii_lowercase();
        let parsed = if format.contains("zero") {
            Some(0.0)
        } else if format.contains("commadecimal") {
            parse_amount(&self.text.replace(['.', ' '], "").replace(',', "."))
        } else {
            parse_amount(&self.text)
        }?;
        let scale = self
            .scale
            .as_deref()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(0);
        let scaled = parsed * 10f64.powi(scale);
        if self.sign.as_deref().map(str::trim) == Some("-") {
            Some(-scaled.abs())
        } else {
            Some(scaled)
        }
    }
}

/// Parses displayed amount text such as `1,234`, `$ 56.7` or `(89)`.
///
/// Dashes and empty text mean "no value".
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '$' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| matches!(c, '-' | '\u{2013}' | '\u{2014}')) {
        return None;
    }
    let (negative, body) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };
    let value = body.parse::<f64>().ok()?;
    Some(if negative { -value } else { value })
}

#[derive(Debug, Default)]
struct Document {
    contexts: HashMap<String, Context>,
    units: HashMap<String, String>,
    facts: Vec<Candidate>,
}

#[derive(Debug, Clone)]
enum Field {
    StartDate,
    EndDate,
    Instant,
    Member(String),
    Measure,
}

#[derive(Debug, Default)]
struct UnitBuilder {
    id: String,
    measures: Vec<String>,
    numerator: Vec<String>,
    denominator: Vec<String>,
    in_numerator: bool,
    in_denominator: bool,
}

impl UnitBuilder {
    fn resolve(&self) -> String {
        if self.numerator.is_empty() && self.denominator.is_empty() {
            return self
                .measures
                .iter()
                .map(|m| normalize_measure(m))
                .collect::<Vec<_>>()
                .join("*");
        }
        let numerator = self
            .numerator
            .iter()
            .map(|m| normalize_measure(m))
            .collect::<String>();
        let denominator = self
            .denominator
            .iter()
            .map(|m| normalize_measure(m))
            .collect::<String>();
        if denominator == "SHARES" {
            format!("{numerator}PERSHARE")
        } else {
            format!("{numerator}PER{denominator}")
        }
    }
}

#[derive(Debug, Default)]
struct ScanState {
    context: Option<(String, Context)>,
    unit: Option<UnitBuilder>,
    field: Option<Field>,
    text: String,
    pending: Vec<Candidate>,
}

impl ScanState {
    fn open(&mut self, element: &BytesStart<'_>, empty: bool, document: &mut Document) {
        let name = lower_local_name(element.local_name().as_ref());
        match name.as_str() {
            "context" => {
                let id = attribute(element, "id").unwrap_or_default();
                self.context = Some((id, Context::default()));
            }
            "startdate" | "enddate" | "instant" if self.context.is_some() => {
                self.field = Some(match name.as_str() {
                    "startdate" => Field::StartDate,
                    "enddate" => Field::EndDate,
                    _ => Field::Instant,
                });
                self.text.clear();
            }
            "explicitmember" if self.context.is_some() => {
                let dimension = attribute(element, "dimension").unwrap_or_default();
                self.field = Some(Field::Member(dimension));
                self.text.clear();
            }
            "typedmember" => {
                if let Some((_, context)) = self.context.as_mut() {
                    context.typed_member = true;
                }
            }
            "unit" => {
                self.unit = Some(UnitBuilder {
                    id: attribute(element, "id").unwrap_or_default(),
                    ..UnitBuilder::default()
                });
            }
            "unitnumerator" => {
                if let Some(unit) = self.unit.as_mut() {
                    unit.in_numerator = true;
                }
            }
            "unitdenominator" => {
                if let Some(unit) = self.unit.as_mut() {
                    unit.in_denominator = true;
                }
            }
            "measure" if self.unit.is_some() => {
                self.field = Some(Field::Measure);
                self.text.clear();
            }
            "nonfraction" => {
                let candidate = Candidate {
                    name: attribute(element, "name").unwrap_or_default(),
                    context_ref: attribute(element, "contextref"),
                    unit_ref: attribute(element, "unitref"),
                    scale: attribute(element, "scale"),
                    sign: attribute(element, "sign"),
                    format: attribute(element, "format"),
                    nil: attribute(element, "nil").is_some_and(|v| v.eq_ignore_ascii_case("true")),
                    text: String::new(),
                };
                if empty {
                    document.facts.push(candidate);
                } else {
                    self.pending.push(candidate);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.field.is_some() {
            self.text.push_str(text);
        }
        for candidate in &mut self.pending {
            candidate.text.push_str(text);
        }
    }

    fn close(&mut self, name: &str, document: &mut Document) {
        match name {
            "startdate" | "enddate" | "instant" | "explicitmember" | "measure" => {
                self.finish_field();
            }
            "unitnumerator" => {
                if let Some(unit) = self.unit.as_mut() {
                    unit.in_numerator = false;
                }
            }
            "unitdenominator" => {
                if let Some(unit) = self.unit.as_mut() {
                    unit.in_denominator = false;
                }
            }
            "context" => {
                if let Some((id, context)) = self.context.take() {
                    if id.is_empty() {
                        warn!("context without id ignored");
                    } else {
                        document.contexts.insert(id, context);
                    }
                }
            }
            "unit" => {
                if let Some(unit) = self.unit.take() {
                    document.units.insert(unit.id.clone(), unit.resolve());
                }
            }
            "nonfraction" => {
                if let Some(candidate) = self.pending.pop() {
                    document.facts.push(candidate);
                }
            }
            _ => {}
        }
    }

    fn finish_field(&mut self) {
        let Some(field) = self.field.take() else {
            return;
        };
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        match field {
            Field::StartDate | Field::EndDate | Field::Instant => {
                let date = parse_date(text);
                if date.is_none() {
                    debug!(text, "unparseable context date");
                }
                if let Some((_, context)) = self.context.as_mut() {
                    match field {
                        Field::StartDate => context.start = date,
                        Field::EndDate => context.end = date,
                        _ => context.instant = date,
                    }
                }
            }
            Field::Member(dimension) => {
                if let Some((_, context)) = self.context.as_mut() {
                    context.members.push((dimension, text.to_string()));
                }
            }
            Field::Measure => {
                if let Some(unit) = self.unit.as_mut() {
                    let measure = text.to_string();
                    if unit.in_numerator {
                        unit.numerator.push(measure);
                    } else if unit.in_denominator {
                        unit.denominator.push(measure);
                    } else {
                        unit.measures.push(measure);
                    }
                }
            }
        }
    }
}

fn scan(content: &[u8]) -> Document {
    let mut reader = Reader::from_reader(content);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;

    let mut document = Document::default();
    let mut state = ScanState::default();
    let mut buf = Vec::new();
    loop {
        let position = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(element)) => state.open(&element, false, &mut document),
            Ok(Event::Empty(element)) => state.open(&element, true, &mut document),
            Ok(Event::End(element)) => {
                let name = lower_local_name(element.local_name().as_ref());
                state.close(&name, &mut document);
            }
            Ok(Event::Text(text)) => state.text(&decode_text(&text)),
            Ok(_) => {}
            Err(err) => {
                warn!(%err, position = reader.buffer_position(), "malformed markup");
                if reader.buffer_position() <= position {
                    break;
                }
            }
        }
        buf.clear();
    }
    // Flush facts left open by truncated documents.
    document.facts.append(&mut state.pending);
    document
}

fn lower_local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_ascii_lowercase()
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Option<String> {
    element.attributes().flatten().find_map(|attr| {
        let local = attr.key.local_name();
        if !String::from_utf8_lossy(local.as_ref()).eq_ignore_ascii_case(key) {
            return None;
        }
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            |v| v.into_owned(),
        );
        Some(value.trim().to_string())
    })
}

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&#160;", " "),
    ("&mdash;", "\u{2014}"),
    ("&ndash;", "\u{2013}"),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
];

fn decode_text(text: &BytesText<'_>) -> String {
    text.unescape().map_or_else(
        |_| {
            let mut raw = String::from_utf8_lossy(text).into_owned();
            for (entity, replacement) in HTML_ENTITIES {
                raw = raw.replace(entity, replacement);
            }
            raw
        },
        |decoded| decoded.into_owned(),
    )
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.get(..10).unwrap_or(text), "%Y-%m-%d").ok()
}

fn normalize_measure(measure: &str) -> String {
    let local = measure.rsplit(':').next().unwrap_or(measure);
    let upper: String = local
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_uppercase();
    if upper == "SHARE" {
        "SHARES".to_string()
    } else {
        upper
    }
}

fn resolve_unit(unit_ref: Option<&str>, units: &HashMap<String, String>) -> String {
    let Some(unit_ref) = unit_ref.filter(|r| !r.is_empty()) else {
        return "USD".to_string();
    };
    if let Some(unit) = units.get(unit_ref).filter(|u| !u.is_empty()) {
        return unit.clone();
    }
    let normalized = normalize_measure(unit_ref);
    if normalized.is_empty() {
        "USD".to_string()
    } else {
        normalized
    }
}
