use std::collections::HashSet;

use tracing::warn;

use super::labels::{match_label, Field};
use super::{charges, clean_value, document, label_pairs};
use crate::db::{ChargeRecord, InmateRecord};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedDetail {
    pub inmate: InmateRecord,
    pub charges: Vec<ChargeRecord>,
}

/// Inmate detail page → partially filled record. The page key is left
/// for the caller; a docket label lands in `docket_number`.
pub fn parse_detail(html: &str) -> ParsedDetail {
    let doc = document(html);
    let mut inmate = InmateRecord::default();
    let mut seen: HashSet<Field> = HashSet::new();
    let mut labelled_charges = Vec::new();

    for (label, raw) in label_pairs(&doc) {
        let Some(field) = match_label(&label) else {
            continue;
        };
        if field == Field::Charges {
            labelled_charges.push(raw);
            continue;
        }
        let Some(value) = clean_value(&raw) else {
            continue;
        };
        // The site repeats labels across layout variants; first one wins.
        if !seen.insert(field) {
            continue;
        }
        assign(&mut inmate, field, value);
    }

    if inmate.release_date.is_some() {
        inmate.in_jail = Some(false);
    }

    let charges = charges::extract(&doc, &labelled_charges);
    ParsedDetail { inmate, charges }
}

fn assign(inmate: &mut InmateRecord, field: Field, value: String) {
    match field {
        Field::InmateId => inmate.docket_number = Some(value),
        Field::Name => inmate.name = Some(value),
        Field::Age => inmate.age = parse_age(&value),
        Field::Sex => inmate.sex = Some(value),
        Field::Race => inmate.race = Some(value),
        Field::Height => inmate.height = Some(value),
        Field::Weight => inmate.weight = Some(value),
        Field::Hair => inmate.hair_color = Some(value),
        Field::Eyes => inmate.eye_color = Some(value),
        Field::BookingDate => inmate.booking_date = Some(value),
        Field::ReleaseDate => inmate.release_date = Some(value),
        Field::Bond => inmate.bond_amount = Some(value),
        Field::Status => inmate.in_jail = custody_flag(&value),
        Field::Agency => inmate.arresting_agency = Some(value),
        Field::Facility => inmate.facility = Some(value),
        _ => {}
    }
}

fn parse_age(value: &str) -> Option<i64> {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<i64>() {
        Ok(age) => Some(age),
        Err(_) => {
            warn!(value, "unparseable age, leaving empty");
            None
        }
    }
}

/// `Some(false)` once released, `Some(true)` while held, `None` if unclear.
pub fn custody_flag(status: &str) -> Option<bool> {
    let lower = status.to_lowercase();
    if lower.contains("release") || lower.contains("discharg") || lower.contains("bonded out") {
        Some(false)
    } else if lower.contains("custody")
        || lower.contains("in jail")
        || lower.contains("incarcerated")
        || lower.contains("booked")
        || lower.contains("held")
    {
        Some(true)
    } else {
        None
    }
}
