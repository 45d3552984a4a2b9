use std::sync::LazyLock;

use regex::Regex;

/// Record fields a page label can map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    InmateId,
    Name,
    Age,
    Sex,
    Race,
    Height,
    Weight,
    Hair,
    Eyes,
    BookingDate,
    ReleaseDate,
    Bond,
    Status,
    Agency,
    Facility,
    Charges,
    Level,
    CaseNumber,
    FilingDate,
    CaseType,
    Judge,
    Attorney,
}

/// Ordered: the first matching pattern decides the field.
/// "booking number" must be tried before "booking date".
static LABEL_PATTERNS: LazyLock<Vec<(Field, Regex)>> = LazyLock::new(|| {
    [
        (Field::CaseNumber, r"^case\s*(no\.?|num(ber)?|#)?$|^case\s*id$"),
        (Field::InmateId, r"docket|booking\s*(no\.?|num(ber)?|#|id)|inmate\s*(id|no\.?|num(ber)?|#)|^so\s*#|^jail\s*id$"),
        (Field::Name, r"^(inmate\s*|full\s*|defendant\s*|party\s*)?name$|^defendant$|^party$|^inmate$"),
        (Field::Age, r"^age$"),
        (Field::Sex, r"^(sex|gender)$"),
        (Field::Race, r"^race$|ethnicity"),
        (Field::Height, r"^height$|^hgt$"),
        (Field::Weight, r"^weight$|^wgt$"),
        (Field::Hair, r"hair"),
        (Field::Eyes, r"^eyes?(\s*color)?$"),
        (Field::BookingDate, r"booking.*date|^booked|date\s*booked|^book\s*date$|arrest\s*date"),
        (Field::ReleaseDate, r"release.*date|^released|date\s*released"),
        (Field::FilingDate, r"fil(ed|ing)(\s*date)?$|date\s*filed"),
        (Field::Bond, r"bond|bail"),
        (Field::CaseType, r"case\s*type|^type$"),
        (Field::Status, r"status|custody"),
        (Field::Agency, r"agency|arrested\s*by|arresting"),
        (Field::Facility, r"facility|housing|^location$"),
        (Field::Judge, r"judge"),
        (Field::Attorney, r"attorney|counsel|lawyer"),
        (Field::Level, r"^(level|degree|class|severity)$"),
        (Field::Charges, r"charges?|offen[cs]es?|description|statute"),
    ]
    .into_iter()
    .map(|(field, pat)| (field, Regex::new(pat).unwrap()))
    .collect()
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase, trim, strip trailing colons, collapse internal whitespace.
pub fn normalize_label(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let stripped = lower.trim_end_matches([':', ' ', '\u{a0}']);
    WHITESPACE_RE.replace_all(stripped, " ").trim().to_string()
}

pub fn match_label(raw: &str) -> Option<Field> {
    let label = normalize_label(raw);
    if label.is_empty() {
        return None;
    }
    LABEL_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&label))
        .map(|(field, _)| *field)
}
