pub mod court;
pub mod inmates;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rusqlite::Connection;

use crate::error::ScrapeError;

pub use court::*;
pub use inmates::*;

pub type DbResult<T> = Result<T, ScrapeError>;

pub fn connect(path: &Path) -> DbResult<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            ScrapeError::Configuration(format!("cannot create database directory {:?}: {}", dir, e))
        })?;
    }
    let conn = Connection::open(path)
        .map_err(|e| ScrapeError::Configuration(format!("cannot open {:?}: {}", path, e)))?;
    // Web processes read while the batch job writes.
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS inmates (
            id               INTEGER PRIMARY KEY,
            inmate_id        TEXT UNIQUE,
            docket_number    TEXT,
            name             TEXT,
            first_name       TEXT,
            last_name        TEXT,
            age              INTEGER,
            sex              TEXT,
            race             TEXT,
            height           TEXT,
            weight           TEXT,
            hair_color       TEXT,
            eye_color        TEXT,
            booking_date     TEXT,
            release_date     TEXT,
            bond_amount      TEXT,
            in_jail          BOOLEAN NOT NULL DEFAULT 1,
            arresting_agency TEXT,
            facility         TEXT,
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_inmates_docket ON inmates(docket_number);
        CREATE INDEX IF NOT EXISTS idx_inmates_last_name ON inmates(last_name);
        CREATE INDEX IF NOT EXISTS idx_inmates_in_jail ON inmates(in_jail);

        CREATE TABLE IF NOT EXISTS charges (
            id          INTEGER PRIMARY KEY,
            inmate_id   INTEGER NOT NULL REFERENCES inmates(id),
            description TEXT NOT NULL,
            charge_type TEXT CHECK(charge_type IN ('Felony','Misdemeanor','Unknown')),
            bond_amount TEXT,
            level       TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_charges_inmate ON charges(inmate_id);

        CREATE TABLE IF NOT EXISTS court_cases (
            id             INTEGER PRIMARY KEY,
            case_number    TEXT UNIQUE NOT NULL,
            defendant_name TEXT,
            filing_date    TEXT,
            case_type      TEXT,
            case_status    TEXT,
            judge          TEXT,
            attorneys      TEXT,
            bond_amount    TEXT,
            source_url     TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS inmate_court_cases (
            id              INTEGER PRIMARY KEY,
            inmate_id       INTEGER NOT NULL REFERENCES inmates(id),
            case_id         INTEGER NOT NULL REFERENCES court_cases(id),
            relationship    TEXT NOT NULL DEFAULT 'Defendant'
                CHECK(relationship IN ('Defendant','Co-Defendant','Witness','Victim','Other')),
            link_confidence REAL,
            link_method     TEXT NOT NULL CHECK(link_method IN ('auto','manual')),
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(inmate_id, case_id)
        );
        CREATE INDEX IF NOT EXISTS idx_icc_case ON inmate_court_cases(case_id);

        CREATE TABLE IF NOT EXISTS inmate_detail_urls (
            id              INTEGER PRIMARY KEY,
            inmate_id       INTEGER NOT NULL UNIQUE REFERENCES inmates(id),
            detail_url      TEXT NOT NULL,
            scraped         BOOLEAN NOT NULL DEFAULT 0,
            scrape_attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt    TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_detail_pending ON inmate_detail_urls(scraped, scrape_attempts);
        ",
    )?;
    Ok(())
}

// ── Records ──

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InmateRecord {
    pub inmate_id: Option<String>,
    pub docket_number: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i64>,
    pub sex: Option<String>,
    pub race: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub hair_color: Option<String>,
    pub eye_color: Option<String>,
    pub booking_date: Option<String>,
    pub release_date: Option<String>,
    pub bond_amount: Option<String>,
    /// Status flag: always takes the latest value when present.
    pub in_jail: Option<bool>,
    pub arresting_agency: Option<String>,
    pub facility: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeType {
    Felony,
    Misdemeanor,
    Unknown,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Felony => "Felony",
            ChargeType::Misdemeanor => "Misdemeanor",
            ChargeType::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRecord {
    pub description: String,
    pub charge_type: ChargeType,
    pub bond_amount: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CourtCaseRecord {
    pub case_number: String,
    pub defendant_name: Option<String>,
    pub filing_date: Option<String>,
    pub case_type: Option<String>,
    pub case_status: Option<String>,
    pub judge: Option<String>,
    pub attorneys: Option<String>,
    pub bond_amount: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkRole {
    #[default]
    Defendant,
    CoDefendant,
    Witness,
    Victim,
    Other,
}

impl LinkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRole::Defendant => "Defendant",
            LinkRole::CoDefendant => "Co-Defendant",
            LinkRole::Witness => "Witness",
            LinkRole::Victim => "Victim",
            LinkRole::Other => "Other",
        }
    }
}

impl fmt::Display for LinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "defendant" => Ok(LinkRole::Defendant),
            "codefendant" => Ok(LinkRole::CoDefendant),
            "witness" => Ok(LinkRole::Witness),
            "victim" => Ok(LinkRole::Victim),
            "other" => Ok(LinkRole::Other),
            _ => Err(format!("unknown relationship role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
    Auto,
    Manual,
}

impl LinkMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMethod::Auto => "auto",
            LinkMethod::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub inmate_row: i64,
    pub case_row: i64,
    pub role: LinkRole,
    /// 0.0–1.0
    pub confidence: f64,
    pub method: LinkMethod,
}

/// "Last, First" splits on the first comma; otherwise the final token is
/// taken as the last name.
pub fn split_name(name: &str) -> (Option<String>, Option<String>) {
    let name = name.trim();
    if name.is_empty() {
        return (None, None);
    }
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    if let Some((last, first)) = name.split_once(',') {
        return (non_empty(first), non_empty(last));
    }
    match name.rsplit_once(char::is_whitespace) {
        Some((first, last)) => (non_empty(first), non_empty(last)),
        None => (None, non_empty(name)),
    }
}

// ── Stats ──

pub struct Stats {
    pub inmates: usize,
    pub in_jail: usize,
    pub charges: usize,
    pub court_cases: usize,
    pub links: usize,
    pub pending_tasks: usize,
    pub failed_tasks: usize,
}

pub fn get_stats(conn: &Connection, max_attempts: u32) -> DbResult<Stats> {
    let count = |sql: &str| -> rusqlite::Result<usize> { conn.query_row(sql, [], |r| r.get(0)) };
    Ok(Stats {
        inmates: count("SELECT COUNT(*) FROM inmates")?,
        in_jail: count("SELECT COUNT(*) FROM inmates WHERE in_jail = 1")?,
        charges: count("SELECT COUNT(*) FROM charges")?,
        court_cases: count("SELECT COUNT(*) FROM court_cases")?,
        links: count("SELECT COUNT(*) FROM inmate_court_cases")?,
        pending_tasks: count_pending_tasks(conn, 0, max_attempts)?,
        failed_tasks: count_failed_tasks(conn, max_attempts)?,
    })
}

/// Raw bond text of every inmate currently held.
pub fn held_bond_amounts(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT bond_amount FROM inmates
         WHERE in_jail = 1 AND bond_amount IS NOT NULL AND bond_amount != ''",
    )?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    init_schema(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = test_conn();
        init_schema(&conn).unwrap();
        let tables: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('inmates','charges','court_cases','inmate_court_cases','inmate_detail_urls')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn split_last_first() {
        assert_eq!(
            split_name("Doe, Jane"),
            (Some("Jane".to_string()), Some("Doe".to_string()))
        );
        assert_eq!(
            split_name("SMITH, JOHN ALLEN"),
            (Some("JOHN ALLEN".to_string()), Some("SMITH".to_string()))
        );
        assert_eq!(
            split_name("John Smith"),
            (Some("John".to_string()), Some("Smith".to_string()))
        );
        assert_eq!(split_name("Cher"), (None, Some("Cher".to_string())));
        assert_eq!(split_name("  "), (None, None));
    }

    #[test]
    fn roles_parse() {
        assert_eq!("co-defendant".parse::<LinkRole>().unwrap(), LinkRole::CoDefendant);
        assert_eq!("Witness".parse::<LinkRole>().unwrap(), LinkRole::Witness);
        assert!("judge".parse::<LinkRole>().is_err());
    }

    #[test]
    fn stats_on_empty_db() {
        let conn = test_conn();
        let s = get_stats(&conn, 3).unwrap();
        assert_eq!(s.inmates, 0);
        assert_eq!(s.failed_tasks, 0);
    }
}
