use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::Settings;
use crate::db::{self, DbResult, InmateName, LinkMethod, LinkRecord, LinkRole};
use crate::error::ScrapeError;

/// Candidates scored per case when every prefix match is considered.
const ALL_CANDIDATES_CAP: usize = 25;

/// Characters shared by two strings, counted the way PHP's `similar_text`
/// does: take the first longest common run, then recurse on both sides.
pub fn similar_text(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    common_chars(&a, &b)
}

fn common_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (mut best, mut pos_a, mut pos_b) = (0, 0, 0);
    for i in 0..a.len() {
        for j in 0..b.len() {
            let mut k = 0;
            while i + k < a.len() && j + k < b.len() && a[i + k] == b[j + k] {
                k += 1;
            }
            if k > best {
                best = k;
                pos_a = i;
                pos_b = j;
            }
        }
    }
    if best == 0 {
        return 0;
    }
    best + common_chars(&a[..pos_a], &b[..pos_b])
        + common_chars(&a[pos_a + best..], &b[pos_b + best..])
}

/// Lowercase, punctuation to spaces, tokens sorted. "Smith, John" and
/// "John Smith" both become "john smith".
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Percentage in 0..=100.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_name(a), normalize_name(b));
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 0.0;
    }
    similar_text(&a, &b) as f64 * 2.0 * 100.0 / total as f64
}

/// Inclusive: a score equal to the threshold links.
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score >= threshold
}

fn display_name(inmate: &InmateName) -> Option<String> {
    if let Some(name) = inmate.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return Some(name.to_string());
    }
    let parts: Vec<&str> = [inmate.first_name.as_deref(), inmate.last_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|p| !p.trim().is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Score one inmate against a defendant name and link on a match.
/// Returns the score when a new link was written.
pub fn link_if_similar(
    conn: &Connection,
    inmate: &InmateName,
    case_row: i64,
    defendant_name: &str,
    threshold: f64,
) -> DbResult<Option<f64>> {
    let Some(name) = display_name(inmate) else {
        return Ok(None);
    };
    let score = similarity(&name, defendant_name);
    if !meets_threshold(score, threshold) {
        debug!(inmate = inmate.id, case = case_row, score, "below link threshold");
        return Ok(None);
    }
    let created = db::create_link(
        conn,
        &LinkRecord {
            inmate_row: inmate.id,
            case_row,
            role: LinkRole::Defendant,
            confidence: score / 100.0,
            method: LinkMethod::Auto,
        },
    )?;
    Ok(created.then_some(score))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub cases: usize,
    pub linked: usize,
}

/// Match court cases nobody has linked yet against inmates sharing the
/// defendant's last-name prefix, newest booking first.
pub fn auto_link_pass(conn: &Connection, settings: &Settings) -> DbResult<LinkStats> {
    let mut stats = LinkStats::default();
    let per_case = if settings.link_all_candidates {
        ALL_CANDIDATES_CAP
    } else {
        1
    };
    let mut after_id = 0;

    loop {
        let cases = db::unlinked_cases(conn, after_id, settings.batch_size.max(1))?;
        let Some(last) = cases.last() else {
            break;
        };
        after_id = last.id;

        for case in &cases {
            stats.cases += 1;
            let Some(last_name) = db::split_name(&case.defendant_name).1 else {
                continue;
            };
            let candidates = db::inmates_by_last_name(conn, &last_name, per_case)?;
            for inmate in &candidates {
                if let Some(score) = link_if_similar(
                    conn,
                    inmate,
                    case.id,
                    &case.defendant_name,
                    settings.batch_link_threshold,
                )? {
                    info!(case = %case.case_number, inmate = inmate.id, score, "auto-linked");
                    stats.linked += 1;
                }
            }
        }
    }

    info!(cases = stats.cases, linked = stats.linked, "auto-link pass finished");
    Ok(stats)
}

/// Operator-asserted link; confidence 1.0.
pub fn manual_link(conn: &Connection, inmate_key: &str, case_number: &str, role: LinkRole) -> DbResult<bool> {
    let inmate_row = db::find_inmate_by_key(conn, inmate_key.trim())?
        .ok_or_else(|| ScrapeError::NotFound(format!("inmate {}", inmate_key)))?;
    let case_row = db::find_case_by_number(conn, case_number)?
        .ok_or_else(|| ScrapeError::NotFound(format!("court case {}", case_number)))?;
    db::create_link(
        conn,
        &LinkRecord {
            inmate_row,
            case_row,
            role,
            confidence: 1.0,
            method: LinkMethod::Manual,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_conn, upsert_court_case, upsert_inmate, CourtCaseRecord, InmateRecord};

    fn add_inmate(conn: &Connection, key: &str, name: &str, booked: &str) -> i64 {
        upsert_inmate(
            conn,
            &InmateRecord {
                inmate_id: Some(key.into()),
                name: Some(name.into()),
                booking_date: Some(booked.into()),
                ..InmateRecord::default()
            },
        )
        .unwrap()
        .0
    }

    fn add_case(conn: &Connection, number: &str, defendant: &str) -> i64 {
        upsert_court_case(
            conn,
            &CourtCaseRecord {
                case_number: number.into(),
                defendant_name: Some(defendant.into()),
                ..CourtCaseRecord::default()
            },
        )
        .unwrap()
        .0
    }

    fn links(conn: &Connection) -> Vec<(i64, i64, String, f64)> {
        let mut stmt = conn
            .prepare(
                "SELECT inmate_id, case_id, link_method, link_confidence
                 FROM inmate_court_cases ORDER BY id",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    #[test]
    fn similar_text_counts() {
        assert_eq!(similar_text("World", "Word"), 4);
        assert_eq!(similar_text("bafoobar", "barfoo"), 5);
        assert_eq!(similar_text("barfoo", "bafoobar"), 3);
        assert_eq!(similar_text("", "abc"), 0);
        assert_eq!(similar_text("abc", "abc"), 3);
    }

    #[test]
    fn similarity_percent() {
        let s = similarity("World", "Word");
        assert!((s - 800.0 / 9.0).abs() < 1e-9);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("ABC", "xyz"), 0.0);
    }

    #[test]
    fn name_order_does_not_matter() {
        assert!(similarity("John Smith", "Smith, John") > 70.0);
        assert_eq!(similarity("SMITH, JOHN", "john smith"), 100.0);
        assert!(similarity("SMITH, JOHN ALLEN", "SMITH, JOHN A") > 80.0);
        assert!(similarity("SMITH, JOHN", "JONES, MARY") < 70.0);
    }

    #[test]
    fn threshold_boundary_inclusive() {
        assert!(meets_threshold(70.0, 70.0));
        assert!(meets_threshold(80.0, 80.0));
        assert!(!meets_threshold(69.999, 70.0));
    }

    #[test]
    fn auto_link_picks_most_recent_booking() {
        let conn = test_conn();
        let older = add_inmate(&conn, "A1", "SMITH, JOHN", "2023-01-10");
        let newer = add_inmate(&conn, "A2", "SMITH, JOHN", "2024-03-14");
        let case = add_case(&conn, "24CR-0456", "SMITH, JOHN");

        let stats = auto_link_pass(&conn, &Settings::default()).unwrap();
        assert_eq!(stats, LinkStats { cases: 1, linked: 1 });
        let found = links(&conn);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].0, found[0].1), (newer, case));
        assert_eq!(found[0].2, "auto");
        assert!((found[0].3 - 1.0).abs() < 1e-9);
        assert_ne!(found[0].0, older);

        // Linked cases are not revisited.
        let again = auto_link_pass(&conn, &Settings::default()).unwrap();
        assert_eq!(again, LinkStats::default());
        assert_eq!(links(&conn).len(), 1);
    }

    #[test]
    fn single_candidate_below_threshold_is_skipped() {
        let conn = test_conn();
        // Newest SMITH* booking is a poor match; the good one is never scored.
        add_inmate(&conn, "A1", "SMITH, JOHN", "2023-01-10");
        add_inmate(&conn, "A2", "SMITHERS, WALDO Q", "2024-05-01");
        add_case(&conn, "24CR-1", "SMITH, JOHN");

        let stats = auto_link_pass(&conn, &Settings::default()).unwrap();
        assert_eq!(stats.linked, 0);

        let all = Settings {
            link_all_candidates: true,
            ..Settings::default()
        };
        assert_eq!(auto_link_pass(&conn, &all).unwrap().linked, 1);
    }

    #[test]
    fn same_request_link_is_idempotent() {
        let conn = test_conn();
        let inmate = add_inmate(&conn, "A1", "Smith, John", "2024-01-01");
        let case = add_case(&conn, "C1", "JOHN SMITH");
        let name = db::held_inmates(&conn, 0, 10).unwrap().remove(0);
        assert_eq!(name.id, inmate);

        assert_eq!(link_if_similar(&conn, &name, case, "JOHN SMITH", 80.0).unwrap(), Some(100.0));
        assert_eq!(link_if_similar(&conn, &name, case, "JOHN SMITH", 80.0).unwrap(), None);
        assert_eq!(links(&conn).len(), 1);
    }

    #[test]
    fn manual_links() {
        let conn = test_conn();
        add_inmate(&conn, "A1", "DOE, JANE", "2024-01-01");
        add_case(&conn, "23M-1001", "ROE, RICHARD");

        assert!(manual_link(&conn, "A1", "23M-1001", LinkRole::Witness).unwrap());
        assert!(!manual_link(&conn, "A1", "23M-1001", LinkRole::Victim).unwrap());
        let found = links(&conn);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].2, "manual");

        let err = manual_link(&conn, "nobody", "23M-1001", LinkRole::Other).unwrap_err();
        assert!(matches!(err, ScrapeError::NotFound(_)));
    }
}
