use std::collections::HashSet;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use super::{split_name, ChargeRecord, DbResult, InmateRecord, UpsertOutcome};
use crate::error::ScrapeError;

// ── Inmates ──

fn text(v: &Option<String>) -> Option<SqlValue> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SqlValue::Text(s.to_string()))
}

/// Columns carried by the record, skipping empty values.
fn present_fields(record: &InmateRecord) -> Vec<(&'static str, SqlValue)> {
    let (split_first, split_last) = record
        .name
        .as_deref()
        .map(split_name)
        .unwrap_or((None, None));
    let first = record.first_name.clone().or(split_first);
    let last = record.last_name.clone().or(split_last);

    [
        ("inmate_id", text(&record.inmate_id)),
        ("docket_number", text(&record.docket_number)),
        ("name", text(&record.name)),
        ("first_name", text(&first)),
        ("last_name", text(&last)),
        ("age", record.age.map(SqlValue::Integer)),
        ("sex", text(&record.sex)),
        ("race", text(&record.race)),
        ("height", text(&record.height)),
        ("weight", text(&record.weight)),
        ("hair_color", text(&record.hair_color)),
        ("eye_color", text(&record.eye_color)),
        ("booking_date", text(&record.booking_date)),
        ("release_date", text(&record.release_date)),
        ("bond_amount", text(&record.bond_amount)),
        ("arresting_agency", text(&record.arresting_agency)),
        ("facility", text(&record.facility)),
    ]
    .into_iter()
    .filter_map(|(col, v)| v.map(|v| (col, v)))
    .collect()
}

/// Row id by natural key, then by docket number.
pub fn find_inmate(conn: &Connection, record: &InmateRecord) -> DbResult<Option<i64>> {
    if let Some(key) = record.inmate_id.as_deref().filter(|k| !k.trim().is_empty()) {
        let found = conn
            .query_row("SELECT id FROM inmates WHERE inmate_id = ?1", [key.trim()], |r| r.get(0))
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    if let Some(docket) = record.docket_number.as_deref().filter(|k| !k.trim().is_empty()) {
        let found = conn
            .query_row(
                "SELECT id FROM inmates WHERE docket_number = ?1 OR inmate_id = ?1
                 ORDER BY id LIMIT 1",
                [docket.trim()],
                |r| r.get(0),
            )
            .optional()?;
        return Ok(found);
    }
    Ok(None)
}

/// Fill empty columns of a known row; `in_jail` is overwritten when given.
pub fn update_inmate(conn: &Connection, id: i64, record: &InmateRecord) -> DbResult<()> {
    let fields = present_fields(record);
    let mut sets: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{col} = COALESCE(NULLIF({col}, ''), ?{})", i + 1))
        .collect();
    let mut values: Vec<SqlValue> = fields.into_iter().map(|(_, v)| v).collect();
    if let Some(in_jail) = record.in_jail {
        values.push(SqlValue::Integer(in_jail as i64));
        sets.push(format!("in_jail = ?{}", values.len()));
    }
    sets.push("updated_at = datetime('now')".to_string());
    values.push(SqlValue::Integer(id));

    let sql = format!(
        "UPDATE inmates SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    conn.execute(&sql, params.as_slice())?;
    Ok(())
}

/// Insert, or update the row found by natural key.
pub fn upsert_inmate(conn: &Connection, record: &InmateRecord) -> DbResult<(i64, UpsertOutcome)> {
    let has_key = [&record.inmate_id, &record.docket_number]
        .iter()
        .any(|k| k.as_deref().is_some_and(|k| !k.trim().is_empty()));
    if !has_key {
        return Err(ScrapeError::Parse(
            "inmate record has neither inmate id nor docket number".to_string(),
        ));
    }

    if let Some(id) = find_inmate(conn, record)? {
        update_inmate(conn, id, record)?;
        return Ok((id, UpsertOutcome::Updated));
    }

    let fields = present_fields(record);
    let mut cols: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
    let mut values: Vec<SqlValue> = fields.into_iter().map(|(_, v)| v).collect();
    cols.push("in_jail");
    values.push(SqlValue::Integer(record.in_jail.unwrap_or(true) as i64));

    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO inmates ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    conn.execute(&sql, params.as_slice())?;
    Ok((conn.last_insert_rowid(), UpsertOutcome::Created))
}

// ── Charges ──

/// Containment either way, case-insensitive. `existing` must be lowercase.
pub fn is_duplicate_charge(existing: &[String], description: &str) -> bool {
    let candidate = description.trim().to_lowercase();
    existing
        .iter()
        .any(|e| e.contains(&candidate) || candidate.contains(e.as_str()))
}

/// Insert charges not already on file for this inmate; returns how many.
pub fn insert_charges(conn: &Connection, inmate_row: i64, charges: &[ChargeRecord]) -> DbResult<usize> {
    let mut existing: Vec<String> = {
        let mut stmt = conn.prepare("SELECT description FROM charges WHERE inmate_id = ?1")?;
        let rows = stmt
            .query_map([inmate_row], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    };

    let mut stmt = conn.prepare(
        "INSERT INTO charges (inmate_id, description, charge_type, bond_amount, level)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut inserted = 0;
    for charge in charges {
        let description = charge.description.trim();
        if description.is_empty() || is_duplicate_charge(&existing, description) {
            continue;
        }
        stmt.execute(params![
            inmate_row,
            description,
            charge.charge_type.as_str(),
            charge.bond_amount,
            charge.level,
        ])?;
        existing.push(description.to_lowercase());
        inserted += 1;
    }
    Ok(inserted)
}

// ── Detail-url tasks ──

#[derive(Debug, Clone, PartialEq)]
pub struct DetailTask {
    pub id: i64,
    pub inmate_row: i64,
    pub inmate_key: String,
    pub detail_url: String,
    pub scrape_attempts: u32,
}

pub fn ensure_detail_task(conn: &Connection, inmate_row: i64, url: &str) -> DbResult<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO inmate_detail_urls (inmate_id, detail_url) VALUES (?1, ?2)",
        params![inmate_row, url],
    )?;
    Ok(n > 0)
}

/// Unscraped tasks under the attempt ceiling, after `after_id`, in id order.
pub fn pending_detail_tasks(
    conn: &Connection,
    after_id: i64,
    max_attempts: u32,
    limit: usize,
) -> DbResult<Vec<DetailTask>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.inmate_id, COALESCE(i.inmate_id, i.docket_number), t.detail_url, t.scrape_attempts
         FROM inmate_detail_urls t
         JOIN inmates i ON i.id = t.inmate_id
         WHERE t.scraped = 0 AND t.scrape_attempts < ?1 AND t.id > ?2
         ORDER BY t.id
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![max_attempts, after_id, limit as i64], |row| {
            Ok(DetailTask {
                id: row.get(0)?,
                inmate_row: row.get(1)?,
                inmate_key: row.get(2)?,
                detail_url: row.get(3)?,
                scrape_attempts: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_pending_tasks(conn: &Connection, after_id: i64, max_attempts: u32) -> DbResult<usize> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM inmate_detail_urls
         WHERE scraped = 0 AND scrape_attempts < ?1 AND id > ?2",
        params![max_attempts, after_id],
        |r| r.get(0),
    )?;
    Ok(n)
}

/// Tasks that hit the ceiling without success; never retried.
pub fn count_failed_tasks(conn: &Connection, max_attempts: u32) -> DbResult<usize> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM inmate_detail_urls WHERE scraped = 0 AND scrape_attempts >= ?1",
        [max_attempts],
        |r| r.get(0),
    )?;
    Ok(n)
}

pub fn mark_task_scraped(conn: &Connection, task_id: i64) -> DbResult<()> {
    conn.execute(
        "UPDATE inmate_detail_urls
         SET scraped = 1, scrape_attempts = scrape_attempts + 1, last_attempt = datetime('now')
         WHERE id = ?1",
        [task_id],
    )?;
    Ok(())
}

/// Bump the attempt counter; returns the new count.
pub fn record_task_failure(conn: &Connection, task_id: i64) -> DbResult<u32> {
    let attempts = conn.query_row(
        "UPDATE inmate_detail_urls
         SET scrape_attempts = scrape_attempts + 1, last_attempt = datetime('now')
         WHERE id = ?1
         RETURNING scrape_attempts",
        [task_id],
        |r| r.get(0),
    )?;
    Ok(attempts)
}

// ── Whole-record persistence ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persisted {
    pub inmate_row: i64,
    pub outcome: UpsertOutcome,
    pub charges_added: usize,
}

/// Inmate fields, charges and task bookkeeping commit together or not at all.
/// With a task the row is already known; without one it is upserted by key.
pub fn persist_detail(
    conn: &Connection,
    record: &InmateRecord,
    charges: &[ChargeRecord],
    task: Option<&DetailTask>,
) -> DbResult<Persisted> {
    let tx = conn.unchecked_transaction()?;
    let (inmate_row, outcome) = match task {
        Some(task) => {
            update_inmate(&tx, task.inmate_row, record)?;
            (task.inmate_row, UpsertOutcome::Updated)
        }
        None => upsert_inmate(&tx, record)?,
    };
    let charges_added = insert_charges(&tx, inmate_row, charges)?;
    if let Some(task) = task {
        mark_task_scraped(&tx, task.id)?;
    }
    tx.commit()?;
    Ok(Persisted {
        inmate_row,
        outcome,
        charges_added,
    })
}

/// Roster sighting: upsert as held and make sure a detail task exists.
pub fn persist_sighting(conn: &Connection, record: &InmateRecord, detail_url: &str) -> DbResult<(i64, UpsertOutcome)> {
    let tx = conn.unchecked_transaction()?;
    let (inmate_row, outcome) = upsert_inmate(&tx, record)?;
    ensure_detail_task(&tx, inmate_row, detail_url)?;
    tx.commit()?;
    Ok((inmate_row, outcome))
}

/// Flip held inmates missing from a complete roster to released. Rows are
/// matched on inmate id, or docket number when they have no inmate id.
pub fn mark_missing_released(conn: &Connection, seen: &HashSet<String>) -> DbResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let held: Vec<(i64, Option<String>)> = {
        let mut stmt =
            tx.prepare("SELECT id, COALESCE(inmate_id, docket_number) FROM inmates WHERE in_jail = 1")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    let mut released = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE inmates SET in_jail = 0, updated_at = datetime('now') WHERE id = ?1",
        )?;
        for (id, key) in held {
            if key.is_some_and(|k| !seen.contains(&k)) {
                released += stmt.execute([id])?;
            }
        }
    }
    tx.commit()?;
    Ok(released)
}

// ── Name lookups ──

#[derive(Debug, Clone, PartialEq)]
pub struct InmateName {
    pub id: i64,
    pub inmate_key: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

fn inmate_name(row: &rusqlite::Row) -> rusqlite::Result<InmateName> {
    Ok(InmateName {
        id: row.get(0)?,
        inmate_key: row.get(1)?,
        name: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
    })
}

/// Held inmates in row order; the court job pages through these by offset.
pub fn held_inmates(conn: &Connection, offset: usize, limit: usize) -> DbResult<Vec<InmateName>> {
    let mut stmt = conn.prepare(
        "SELECT id, COALESCE(inmate_id, docket_number), name, first_name, last_name
         FROM inmates WHERE in_jail = 1
         ORDER BY id LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], inmate_name)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_held_inmates(conn: &Connection) -> DbResult<usize> {
    let n = conn.query_row("SELECT COUNT(*) FROM inmates WHERE in_jail = 1", [], |r| r.get(0))?;
    Ok(n)
}

/// Inmates whose last name starts with `prefix`, most recent booking first.
pub fn inmates_by_last_name(conn: &Connection, prefix: &str, limit: usize) -> DbResult<Vec<InmateName>> {
    let escaped = prefix
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let mut stmt = conn.prepare(
        "SELECT id, COALESCE(inmate_id, docket_number), name, first_name, last_name
         FROM inmates
         WHERE last_name LIKE ?1 || '%' ESCAPE '\\'
         ORDER BY COALESCE(booking_date, '') DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![escaped, limit as i64], inmate_name)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_inmate_by_key(conn: &Connection, key: &str) -> DbResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM inmates WHERE inmate_id = ?1 OR docket_number = ?1 ORDER BY id LIMIT 1",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_conn, ChargeType};

    fn inmate(key: &str) -> InmateRecord {
        InmateRecord {
            inmate_id: Some(key.to_string()),
            ..InmateRecord::default()
        }
    }

    fn charge(description: &str) -> ChargeRecord {
        ChargeRecord {
            description: description.to_string(),
            charge_type: ChargeType::Unknown,
            bond_amount: None,
            level: None,
        }
    }

    fn column(conn: &Connection, id: i64, col: &str) -> Option<String> {
        conn.query_row(&format!("SELECT {col} FROM inmates WHERE id = ?1"), [id], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn insert_splits_name() {
        let conn = test_conn();
        let (id, outcome) = upsert_inmate(
            &conn,
            &InmateRecord {
                name: Some("Doe, Jane".into()),
                ..inmate("A1")
            },
        )
        .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(column(&conn, id, "first_name").as_deref(), Some("Jane"));
        assert_eq!(column(&conn, id, "last_name").as_deref(), Some("Doe"));
        let in_jail: bool = conn
            .query_row("SELECT in_jail FROM inmates WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert!(in_jail);
    }

    #[test]
    fn populated_fields_never_regress() {
        let conn = test_conn();
        let first = InmateRecord {
            sex: Some("F".into()),
            bond_amount: Some("$5,000.00".into()),
            ..inmate("A1")
        };
        let (id, _) = upsert_inmate(&conn, &first).unwrap();

        // Blank, missing and different values in later scrapes.
        let later = [
            InmateRecord {
                sex: Some("".into()),
                ..inmate("A1")
            },
            inmate("A1"),
            InmateRecord {
                sex: Some("M".into()),
                bond_amount: Some("$1.00".into()),
                race: Some("W".into()),
                ..inmate("A1")
            },
        ];
        for record in &later {
            let (same, outcome) = upsert_inmate(&conn, record).unwrap();
            assert_eq!(same, id);
            assert_eq!(outcome, UpsertOutcome::Updated);
            assert_eq!(column(&conn, id, "sex").as_deref(), Some("F"));
            assert_eq!(column(&conn, id, "bond_amount").as_deref(), Some("$5,000.00"));
        }
        // Empty columns still fill in.
        assert_eq!(column(&conn, id, "race").as_deref(), Some("W"));
    }

    #[test]
    fn empty_string_column_gets_filled() {
        let conn = test_conn();
        let (id, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        conn.execute("UPDATE inmates SET facility = '' WHERE id = ?1", [id]).unwrap();
        upsert_inmate(
            &conn,
            &InmateRecord {
                facility: Some("Annex".into()),
                ..inmate("A1")
            },
        )
        .unwrap();
        assert_eq!(column(&conn, id, "facility").as_deref(), Some("Annex"));
    }

    #[test]
    fn status_takes_latest() {
        let conn = test_conn();
        let (id, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        upsert_inmate(
            &conn,
            &InmateRecord {
                in_jail: Some(false),
                ..inmate("A1")
            },
        )
        .unwrap();
        let in_jail: bool = conn
            .query_row("SELECT in_jail FROM inmates WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert!(!in_jail);

        // Silence about status leaves it alone.
        upsert_inmate(&conn, &inmate("A1")).unwrap();
        let in_jail: bool = conn
            .query_row("SELECT in_jail FROM inmates WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert!(!in_jail);
    }

    #[test]
    fn falls_back_to_docket_number() {
        let conn = test_conn();
        let (id, _) = upsert_inmate(
            &conn,
            &InmateRecord {
                docket_number: Some("D-55".into()),
                ..InmateRecord::default()
            },
        )
        .unwrap();
        let (same, outcome) = upsert_inmate(
            &conn,
            &InmateRecord {
                docket_number: Some("D-55".into()),
                ..inmate("A9")
            },
        )
        .unwrap();
        assert_eq!(same, id);
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(column(&conn, id, "inmate_id").as_deref(), Some("A9"));
    }

    #[test]
    fn keyless_record_rejected() {
        let conn = test_conn();
        let err = upsert_inmate(&conn, &InmateRecord::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
    }

    #[test]
    fn charge_dedup_by_containment() {
        let conn = test_conn();
        let (id, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        assert_eq!(insert_charges(&conn, id, &[charge("THEFT BY TAKING")]).unwrap(), 1);

        assert_eq!(insert_charges(&conn, id, &[charge("theft by taking")]).unwrap(), 0);
        assert_eq!(
            insert_charges(&conn, id, &[charge("THEFT BY TAKING - FELONY")]).unwrap(),
            0
        );
        assert_eq!(insert_charges(&conn, id, &[charge("theft")]).unwrap(), 0);
        assert_eq!(
            insert_charges(&conn, id, &[charge("BURGLARY"), charge("burglary 2nd degree")]).unwrap(),
            1
        );

        let n: usize = conn
            .query_row("SELECT COUNT(*) FROM charges WHERE inmate_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn charges_scoped_per_inmate() {
        let conn = test_conn();
        let (a, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        let (b, _) = upsert_inmate(&conn, &inmate("B1")).unwrap();
        insert_charges(&conn, a, &[charge("DUI")]).unwrap();
        assert_eq!(insert_charges(&conn, b, &[charge("DUI")]).unwrap(), 1);
    }

    #[test]
    fn attempt_ceiling_excludes_task() {
        let conn = test_conn();
        let (a, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        let (b, _) = upsert_inmate(&conn, &inmate("B1")).unwrap();
        ensure_detail_task(&conn, a, "https://jail.example.gov/d?id=A1").unwrap();
        ensure_detail_task(&conn, b, "https://jail.example.gov/d?id=B1").unwrap();

        conn.execute(
            "UPDATE inmate_detail_urls SET scrape_attempts = 3 WHERE inmate_id = ?1",
            [a],
        )
        .unwrap();
        let pending = pending_detail_tasks(&conn, 0, 3, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].inmate_key, "B1");
        assert_eq!(count_failed_tasks(&conn, 3).unwrap(), 1);

        // Scraped tasks are done regardless of attempts.
        mark_task_scraped(&conn, pending[0].id).unwrap();
        assert!(pending_detail_tasks(&conn, 0, 3, 10).unwrap().is_empty());
    }

    #[test]
    fn failures_count_up() {
        let conn = test_conn();
        let (a, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        ensure_detail_task(&conn, a, "u").unwrap();
        assert!(!ensure_detail_task(&conn, a, "u2").unwrap());
        let task = &pending_detail_tasks(&conn, 0, 3, 10).unwrap()[0];
        assert_eq!(record_task_failure(&conn, task.id).unwrap(), 1);
        assert_eq!(record_task_failure(&conn, task.id).unwrap(), 2);
        assert_eq!(record_task_failure(&conn, task.id).unwrap(), 3);
        assert!(pending_detail_tasks(&conn, 0, 3, 10).unwrap().is_empty());
    }

    #[test]
    fn persist_detail_is_atomic() {
        let conn = test_conn();
        let (a, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        ensure_detail_task(&conn, a, "u").unwrap();
        let task = pending_detail_tasks(&conn, 0, 3, 10).unwrap().remove(0);

        // Break the charges table so the second statement fails mid-record.
        conn.execute_batch("DROP TABLE charges").unwrap();
        let err = persist_detail(
            &conn,
            &InmateRecord {
                sex: Some("M".into()),
                ..inmate("A1")
            },
            &[charge("DUI")],
            Some(&task),
        )
        .unwrap_err();
        assert!(err.is_fatal());

        assert_eq!(column(&conn, a, "sex"), None);
        assert_eq!(pending_detail_tasks(&conn, 0, 3, 10).unwrap().len(), 1);
    }

    #[test]
    fn persist_detail_commits_all() {
        let conn = test_conn();
        let (a, _) = upsert_inmate(&conn, &inmate("A1")).unwrap();
        ensure_detail_task(&conn, a, "u").unwrap();
        let task = pending_detail_tasks(&conn, 0, 3, 10).unwrap().remove(0);
        let saved = persist_detail(&conn, &InmateRecord::default(), &[charge("DUI")], Some(&task)).unwrap();
        assert_eq!(saved.inmate_row, a);
        assert_eq!(saved.charges_added, 1);
        assert!(pending_detail_tasks(&conn, 0, 3, 10).unwrap().is_empty());
    }

    #[test]
    fn release_missing_from_roster() {
        let conn = test_conn();
        persist_sighting(&conn, &inmate("A1"), "u1").unwrap();
        persist_sighting(&conn, &inmate("B1"), "u2").unwrap();
        let seen: HashSet<String> = ["A1".to_string()].into_iter().collect();
        assert_eq!(mark_missing_released(&conn, &seen).unwrap(), 1);
        assert_eq!(count_held_inmates(&conn).unwrap(), 1);
    }

    #[test]
    fn release_matches_docket_only_rows() {
        let conn = test_conn();
        for docket in ["D-100", "D-200"] {
            upsert_inmate(
                &conn,
                &InmateRecord {
                    docket_number: Some(docket.to_string()),
                    in_jail: Some(true),
                    ..InmateRecord::default()
                },
            )
            .unwrap();
        }
        let seen: HashSet<String> = ["D-100".to_string()].into_iter().collect();
        assert_eq!(mark_missing_released(&conn, &seen).unwrap(), 1);
        let held: String = conn
            .query_row("SELECT docket_number FROM inmates WHERE in_jail = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(held, "D-100");
    }

    #[test]
    fn last_name_prefix_prefers_recent_booking() {
        let conn = test_conn();
        for (key, name, booked) in [
            ("A1", "SMITH, JOHN", "2023-01-01"),
            ("A2", "SMITHERS, JOHN", "2024-02-01"),
            ("A3", "JONES, SAM", "2024-03-01"),
        ] {
            upsert_inmate(
                &conn,
                &InmateRecord {
                    name: Some(name.into()),
                    booking_date: Some(booked.into()),
                    ..inmate(key)
                },
            )
            .unwrap();
        }
        let found = inmates_by_last_name(&conn, "SMITH", 10).unwrap();
        let keys: Vec<_> = found.iter().filter_map(|i| i.inmate_key.as_deref()).collect();
        assert_eq!(keys, vec!["A2", "A1"]);
        assert!(inmates_by_last_name(&conn, "%", 10).unwrap().is_empty());
    }
}
