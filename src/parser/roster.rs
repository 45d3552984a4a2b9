use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Selector};
use tracing::warn;

use super::labels::{match_label, Field};
use super::{cells, clean_value, document, element_text, is_header_row};

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static ID_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&](?:[a-z_]*id|docket[a-z_]*|booking[a-z_]*|bk[a-z_]*)=([^&#]+)").unwrap()
});

/// One inmate row on the roster listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub inmate_id: String,
    pub name: Option<String>,
    pub booking_date: Option<String>,
    pub detail_url: String,
}

/// Rows linking to a detail page. Columns come from the nearest header row
/// above; the inmate id falls back to the link's query string.
pub fn parse_roster(html: &str, page_url: &str, detail_link: &Regex) -> Vec<RosterEntry> {
    let doc = document(html);
    let base = Url::parse(page_url).ok();
    let mut entries: Vec<RosterEntry> = Vec::new();
    let mut columns: Vec<Option<Field>> = Vec::new();

    for row in doc.select(&ROW) {
        if is_header_row(row) {
            columns = cells(row)
                .into_iter()
                .map(|c| match_label(&element_text(c)))
                .collect();
            continue;
        }
        let Some((link, href)) = detail_anchor(row, detail_link) else {
            continue;
        };
        let row_cells = cells(row);
        let column = |field: Field| {
            columns
                .iter()
                .position(|c| *c == Some(field))
                .and_then(|i| row_cells.get(i))
                .and_then(|c| clean_value(&element_text(*c)))
        };

        let Some(detail_url) = resolve(base.as_ref(), &href) else {
            warn!(href, "unresolvable detail link");
            continue;
        };
        let Some(inmate_id) = column(Field::InmateId).or_else(|| id_from_href(&href)) else {
            warn!(href, "roster row without inmate id");
            continue;
        };
        let entry = RosterEntry {
            inmate_id,
            name: column(Field::Name).or_else(|| clean_value(&element_text(link))),
            booking_date: column(Field::BookingDate),
            detail_url,
        };
        push_unique(&mut entries, entry);
    }

    if entries.is_empty() {
        for link in doc.select(&LINK) {
            let href = link.value().attr("href").unwrap_or_default();
            if !detail_link.is_match(href) {
                continue;
            }
            if let (Some(detail_url), Some(inmate_id)) = (resolve(base.as_ref(), href), id_from_href(href)) {
                push_unique(
                    &mut entries,
                    RosterEntry {
                        inmate_id,
                        name: clean_value(&element_text(link)),
                        booking_date: None,
                        detail_url,
                    },
                );
            }
        }
    }

    entries
}

fn detail_anchor<'a>(row: ElementRef<'a>, detail_link: &Regex) -> Option<(ElementRef<'a>, String)> {
    row.select(&LINK).find_map(|a| {
        let href = a.value().attr("href")?;
        detail_link.is_match(href).then(|| (a, href.to_string()))
    })
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

fn id_from_href(href: &str) -> Option<String> {
    ID_PARAM_RE
        .captures(href)
        .map(|c| c[1].to_string())
        .and_then(|v| urlencoding::decode(&v).ok().map(|d| d.into_owned()))
        .and_then(|v| clean_value(&v))
}

fn push_unique(entries: &mut Vec<RosterEntry>, entry: RosterEntry) {
    if !entries.iter().any(|e| e.inmate_id == entry.inmate_id) {
        entries.push(entry);
    }
}
