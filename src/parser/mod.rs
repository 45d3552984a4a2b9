pub mod charges;
pub mod court;
pub mod detail;
pub mod labels;
pub mod roster;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::db::CourtCaseRecord;
use detail::ParsedDetail;
use labels::Field;
use roster::RosterEntry;

static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static DT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dt").unwrap());
static LABEL_CLASS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[class*=label], [class*=Label]").unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());

/// Which page layout the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHint {
    Detail,
    Roster,
    CourtSearch,
}

#[derive(Debug)]
pub enum ParsedPage {
    Detail(ParsedDetail),
    Roster(Vec<RosterEntry>),
    CourtSearch(Vec<CourtCaseRecord>),
}

/// Best-effort parse; never fails, missing fields stay `None`.
pub fn parse(html: &str, hint: RecordHint, page_url: &str, detail_link: &Regex) -> ParsedPage {
    match hint {
        RecordHint::Detail => ParsedPage::Detail(detail::parse_detail(html)),
        RecordHint::Roster => ParsedPage::Roster(roster::parse_roster(html, page_url, detail_link)),
        RecordHint::CourtSearch => {
            ParsedPage::CourtSearch(court::parse_court_search(html, page_url))
        }
    }
}

pub(crate) fn document(html: &str) -> Html {
    let doc = Html::parse_document(html);
    if !doc.errors.is_empty() {
        debug!(errors = doc.errors.len(), first = %doc.errors[0], "malformed markup recovered");
    }
    doc
}

/// Text on one line, whitespace collapsed.
pub(crate) fn element_text(el: ElementRef) -> String {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text keeping `<br>` and block boundaries as newlines.
pub(crate) fn element_lines(el: ElementRef) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                if matches!(
                    e.name(),
                    "br" | "p" | "div" | "li" | "tr" | "table" | "dt" | "dd" | "h1" | "h2"
                        | "h3" | "h4" | "h5" | "h6" | "section"
                ) {
                    out.push('\n');
                } else if matches!(e.name(), "td" | "th") {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
    out.lines()
        .map(|l| SPACES_RE.replace_all(l, " ").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn body_text(doc: &Html) -> String {
    doc.select(&BODY)
        .next()
        .map(element_lines)
        .unwrap_or_else(|| element_lines(doc.root_element()))
}

fn child_elements(el: ElementRef) -> impl Iterator<Item = ElementRef> {
    el.children().filter_map(ElementRef::wrap)
}

pub(crate) fn cells(row: ElementRef) -> Vec<ElementRef> {
    child_elements(row)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

pub(crate) fn is_header_row(row: ElementRef) -> bool {
    let in_thead = row
        .parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|p| p.value().name() == "thead");
    let cs = cells(row);
    in_thead || (!cs.is_empty() && cs.iter().all(|c| c.value().name() == "th"))
}

/// Label/value pairs in document order: two-cell rows, `dt`/`dd`, then
/// elements classed as labels followed by a sibling value.
pub(crate) fn label_pairs(doc: &Html) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for row in doc.select(&TR) {
        let cs = cells(row);
        if cs.len() == 2 && !is_header_row(row) {
            pairs.push((element_text(cs[0]), element_lines(cs[1])));
        }
    }

    for dt in doc.select(&DT) {
        if let Some(dd) = dt
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "dd")
        {
            pairs.push((element_text(dt), element_lines(dd)));
        }
    }

    for label in doc.select(&LABEL_CLASS) {
        if matches!(label.value().name(), "td" | "th" | "tr" | "table") {
            continue;
        }
        if let Some(value) = label.next_siblings().find_map(ElementRef::wrap) {
            pairs.push((element_text(label), element_lines(value)));
        }
    }

    pairs
}

/// A table whose header row maps columns onto fields.
pub(crate) struct HeaderTable<'a> {
    pub columns: Vec<Option<Field>>,
    pub rows: Vec<Vec<ElementRef<'a>>>,
}

impl<'a> HeaderTable<'a> {
    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(field))
    }

    pub fn cell(&self, row: &[ElementRef<'a>], field: Field) -> Option<String> {
        let idx = self.column(field)?;
        row.get(idx).map(|c| element_text(*c)).filter(|t| !t.is_empty())
    }
}

fn table_rows(table: ElementRef) -> Vec<ElementRef> {
    let mut rows = Vec::new();
    for child in child_elements(table) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(child_elements(child).filter(|r| r.value().name() == "tr"))
            }
            _ => {}
        }
    }
    rows
}

/// Tables with a recognisable header row, data rows following it.
pub(crate) fn header_tables(doc: &Html) -> Vec<HeaderTable<'_>> {
    let mut tables = Vec::new();
    for table in doc.select(&TABLE) {
        let rows = table_rows(table);
        let Some(header_idx) = rows.iter().position(|r| is_header_row(*r)) else {
            continue;
        };
        let columns: Vec<Option<Field>> = cells(rows[header_idx])
            .into_iter()
            .map(|c| labels::match_label(&element_text(c)))
            .collect();
        if columns.iter().filter(|c| c.is_some()).count() < 2 {
            continue;
        }
        let data = rows[header_idx + 1..]
            .iter()
            .filter(|r| !is_header_row(**r))
            .map(|r| cells(*r))
            .filter(|cs| cs.len() >= columns.len().min(2))
            .collect();
        tables.push(HeaderTable { columns, rows: data });
    }
    tables
}

/// `None` for empty or placeholder values.
pub(crate) fn clean_value(raw: &str) -> Option<String> {
    let v = raw.trim();
    if v.is_empty() || matches!(v.to_lowercase().as_str(), "n/a" | "na" | "none" | "-" | "--") {
        None
    } else {
        Some(v.to_string())
    }
}
