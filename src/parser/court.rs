use super::labels::{match_label, Field};
use super::{clean_value, document, header_tables, label_pairs};
use crate::db::CourtCaseRecord;

/// Case rows from a name search. A single-case page laid out as
/// label/value pairs yields one record.
pub fn parse_court_search(html: &str, page_url: &str) -> Vec<CourtCaseRecord> {
    let doc = document(html);
    let mut cases: Vec<CourtCaseRecord> = Vec::new();

    for table in header_tables(&doc) {
        if table.column(Field::CaseNumber).is_none() {
            continue;
        }
        for row in &table.rows {
            let Some(case_number) = table.cell(row, Field::CaseNumber).and_then(|c| clean_value(&c))
            else {
                continue;
            };
            let get = |field| table.cell(row, field).and_then(|v| clean_value(&v));
            let case = CourtCaseRecord {
                case_number,
                defendant_name: get(Field::Name),
                filing_date: get(Field::FilingDate),
                case_type: get(Field::CaseType),
                case_status: get(Field::Status),
                judge: get(Field::Judge),
                attorneys: get(Field::Attorney),
                bond_amount: get(Field::Bond),
                source_url: Some(page_url.to_string()),
            };
            if !cases.iter().any(|c| c.case_number == case.case_number) {
                cases.push(case);
            }
        }
    }

    if cases.is_empty() {
        if let Some(case) = single_case(&doc, page_url) {
            cases.push(case);
        }
    }
    cases
}

fn single_case(doc: &scraper::Html, page_url: &str) -> Option<CourtCaseRecord> {
    let mut case = CourtCaseRecord {
        source_url: Some(page_url.to_string()),
        ..CourtCaseRecord::default()
    };
    let mut attorneys = Vec::new();

    for (label, raw) in label_pairs(doc) {
        let (Some(field), Some(value)) = (match_label(&label), clean_value(&raw)) else {
            continue;
        };
        let slot = match field {
            Field::CaseNumber if case.case_number.is_empty() => {
                case.case_number = value;
                continue;
            }
            Field::Attorney => {
                attorneys.push(value);
                continue;
            }
            Field::Name => &mut case.defendant_name,
            Field::FilingDate => &mut case.filing_date,
            Field::CaseType => &mut case.case_type,
            Field::Status => &mut case.case_status,
            Field::Judge => &mut case.judge,
            Field::Bond => &mut case.bond_amount,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    if !attorneys.is_empty() {
        case.attorneys = Some(attorneys.join("; "));
    }
    (!case.case_number.is_empty()).then_some(case)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_results_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/court_search.html").unwrap();
        let cases = parse_court_search(&html, "https://court.example.gov/search?last=SMITH");
        assert_eq!(cases.len(), 2);

        let first = &cases[0];
        assert_eq!(first.case_number, "24CR-0456");
        assert_eq!(first.defendant_name.as_deref(), Some("SMITH, JOHN A"));
        assert_eq!(first.filing_date.as_deref(), Some("03/20/2024"));
        assert_eq!(first.case_type.as_deref(), Some("Felony"));
        assert_eq!(first.case_status.as_deref(), Some("Open"));
        assert_eq!(first.judge.as_deref(), Some("Hon. M. Carter"));
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://court.example.gov/search?last=SMITH")
        );
        assert_eq!(cases[1].attorneys, None);
    }

    #[test]
    fn single_case_page() {
        let html = r#"<table>
            <tr><td>Case Number:</td><td>23M-1001</td></tr>
            <tr><td>Defendant:</td><td>DOE, JANE</td></tr>
            <tr><td>Attorney:</td><td>A. Public</td></tr>
            <tr><td>Attorney:</td><td>B. Defender</td></tr>
            <tr><td>Judge:</td><td>Hon. R. Lee</td></tr>
        </table>"#;
        let cases = parse_court_search(html, "https://court.example.gov/case/23M-1001");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].case_number, "23M-1001");
        assert_eq!(cases[0].defendant_name.as_deref(), Some("DOE, JANE"));
        assert_eq!(cases[0].attorneys.as_deref(), Some("A. Public; B. Defender"));
    }

    #[test]
    fn no_results() {
        let cases = parse_court_search(
            "<html><body><p>No records found.</p></body></html>",
            "https://court.example.gov/search",
        );
        assert!(cases.is_empty());
    }
}
