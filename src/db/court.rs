use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use super::{CourtCaseRecord, DbResult, LinkRecord, UpsertOutcome};
use crate::error::ScrapeError;

fn case_fields(case: &CourtCaseRecord) -> Vec<(&'static str, SqlValue)> {
    [
        ("defendant_name", &case.defendant_name),
        ("filing_date", &case.filing_date),
        ("case_type", &case.case_type),
        ("case_status", &case.case_status),
        ("judge", &case.judge),
        ("attorneys", &case.attorneys),
        ("bond_amount", &case.bond_amount),
        ("source_url", &case.source_url),
    ]
    .into_iter()
    .filter_map(|(col, v)| {
        let v = v.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((col, SqlValue::Text(v.to_string())))
    })
    .collect()
}

/// Upsert by case number; existing non-empty columns are kept.
pub fn upsert_court_case(conn: &Connection, case: &CourtCaseRecord) -> DbResult<(i64, UpsertOutcome)> {
    let case_number = case.case_number.trim();
    if case_number.is_empty() {
        return Err(ScrapeError::Parse("court case without case number".to_string()));
    }
    let fields = case_fields(case);

    if let Some(id) = find_case_by_number(conn, case_number)? {
        let mut sets: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{col} = COALESCE(NULLIF({col}, ''), ?{})", i + 1))
            .collect();
        sets.push("updated_at = datetime('now')".to_string());
        let mut values: Vec<SqlValue> = fields.into_iter().map(|(_, v)| v).collect();
        values.push(SqlValue::Integer(id));
        let sql = format!(
            "UPDATE court_cases SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len()
        );
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        conn.execute(&sql, params.as_slice())?;
        return Ok((id, UpsertOutcome::Updated));
    }

    let mut cols = vec!["case_number"];
    let mut values = vec![SqlValue::Text(case_number.to_string())];
    for (col, v) in fields {
        cols.push(col);
        values.push(v);
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO court_cases ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    conn.execute(&sql, params.as_slice())?;
    Ok((conn.last_insert_rowid(), UpsertOutcome::Created))
}

pub fn find_case_by_number(conn: &Connection, case_number: &str) -> DbResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM court_cases WHERE case_number = ?1",
            [case_number.trim()],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn link_exists(conn: &Connection, inmate_row: i64, case_row: i64) -> DbResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM inmate_court_cases WHERE inmate_id = ?1 AND case_id = ?2",
            params![inmate_row, case_row],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Returns false when the pair is already linked; the first link stands.
pub fn create_link(conn: &Connection, link: &LinkRecord) -> DbResult<bool> {
    if link_exists(conn, link.inmate_row, link.case_row)? {
        return Ok(false);
    }
    let n = conn.execute(
        "INSERT OR IGNORE INTO inmate_court_cases
             (inmate_id, case_id, relationship, link_confidence, link_method)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            link.inmate_row,
            link.case_row,
            link.role.as_str(),
            link.confidence.clamp(0.0, 1.0),
            link.method.as_str(),
        ],
    )?;
    Ok(n > 0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnlinkedCase {
    pub id: i64,
    pub case_number: String,
    pub defendant_name: String,
}

/// Cases with a defendant name and no link of any kind.
pub fn unlinked_cases(conn: &Connection, after_id: i64, limit: usize) -> DbResult<Vec<UnlinkedCase>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.case_number, c.defendant_name
         FROM court_cases c
         WHERE c.id > ?1
           AND c.defendant_name IS NOT NULL AND c.defendant_name != ''
           AND NOT EXISTS (SELECT 1 FROM inmate_court_cases l WHERE l.case_id = c.id)
         ORDER BY c.id
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![after_id, limit as i64], |row| {
            Ok(UnlinkedCase {
                id: row.get(0)?,
                case_number: row.get(1)?,
                defendant_name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
