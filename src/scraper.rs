use std::collections::HashSet;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::db::{self, DbResult, DetailTask, InmateName, InmateRecord};
use crate::error::ScrapeError;
use crate::fetcher::Fetch;
use crate::linker;
use crate::parser::{self, ParsedPage, RecordHint};
use crate::progress::{JobKind, ProgressState, ProgressTracker, RunStatus};

/// Where a job is in its cycle; logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    FetchingBatch,
    ProcessingItem,
    Saved,
    Error,
}

/// Which parts of the pipeline a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSelection {
    All,
    Roster,
    Detail,
    Court,
    Link,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after this many items per job; progress stays resumable.
    pub limit: Option<usize>,
    pub show_progress: bool,
}

/// Counts for one invocation of a job.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub processed: usize,
    pub found: usize,
    pub saved: usize,
    pub failed: usize,
    pub completed: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ItemOutcome {
    pub found: usize,
    pub saved: usize,
}

/// A resumable unit of work over a database-backed record set.
trait Job {
    type Item;
    const HINT: RecordHint;

    fn kind(&self) -> JobKind;
    /// Size of the record set when a pass starts.
    fn total(&self, conn: &Connection) -> DbResult<usize>;
    fn next_batch(&self, conn: &Connection, state: &ProgressState, size: usize) -> DbResult<Vec<Self::Item>>;
    fn key(&self, item: &Self::Item) -> i64;
    fn url(&self, item: &Self::Item) -> Result<String, ScrapeError>;
    fn handle(&self, conn: &Connection, item: &Self::Item, url: &str, page: ParsedPage) -> Result<ItemOutcome, ScrapeError>;
    fn on_failure(&self, conn: &Connection, item: &Self::Item, err: &ScrapeError) -> DbResult<()>;
}

struct StateLog {
    job: JobKind,
    state: JobState,
}

impl StateLog {
    fn new(job: JobKind) -> Self {
        StateLog {
            job,
            state: JobState::Idle,
        }
    }

    fn enter(&mut self, next: JobState) {
        if self.state != next {
            debug!(job = %self.job, from = ?self.state, to = ?next, "state");
            self.state = next;
        }
    }
}

fn progress_bar(total: usize, position: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_position(position as u64);
    pb
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Load saved progress, or begin a new pass if the last one finished.
fn resume_state<J: Job>(job: &J, conn: &Connection, tracker: &ProgressTracker) -> DbResult<ProgressState> {
    let mut saved = tracker.load();
    let started = saved.current_offset > 0 || saved.last_key.is_some() || saved.total_count > 0;
    if saved.status == RunStatus::Running && started {
        if saved.total_count == 0 {
            saved.total_count = job.total(conn)?.max(saved.current_offset);
        }
        info!(
            job = %job.kind(),
            offset = saved.current_offset,
            total = saved.total_count,
            "resuming"
        );
        return Ok(saved);
    }
    let total = job.total(conn)?;
    info!(job = %job.kind(), total, "starting pass");
    Ok(ProgressState {
        total_count: total,
        ..ProgressState::default()
    })
}

/// Drive a job item by item until the record set is exhausted or the limit
/// is reached. Items are fetched one at a time with a pause after each.
async fn drive<J: Job, F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    settings: &Settings,
    job: &J,
    opts: &RunOptions,
) -> Result<JobSummary, ScrapeError> {
    let detail_link = detail_link_pattern(settings)?;
    let tracker = ProgressTracker::new(&settings.state_dir, job.kind());
    let mut state = resume_state(job, conn, &tracker)?;
    let mut summary = JobSummary::default();
    let mut machine = StateLog::new(job.kind());
    let pb = progress_bar(state.total_count, state.current_offset, opts.show_progress);
    let mut last_save = Instant::now();

    'batches: loop {
        machine.enter(JobState::FetchingBatch);
        let batch = match job.next_batch(conn, &state, settings.batch_size.max(1)) {
            Ok(batch) => batch,
            Err(e) if e.is_fatal() => {
                machine.enter(JobState::Error);
                error!(job = %job.kind(), error = %e, "batch query failed, aborting");
                tracker.save(&mut state)?;
                pb.abandon();
                return Err(e);
            }
            Err(e) => {
                machine.enter(JobState::Error);
                warn!(job = %job.kind(), error = %e, "batch query failed, retrying");
                tracker.save(&mut state)?;
                pause(settings.batch_retry_delay()).await;
                continue;
            }
        };

        if batch.is_empty() {
            state.status = RunStatus::Completed;
            summary.completed = true;
            break;
        }

        for item in &batch {
            if opts.limit.is_some_and(|limit| summary.processed >= limit) {
                info!(job = %job.kind(), limit = summary.processed, "item limit reached");
                break 'batches;
            }
            machine.enter(JobState::ProcessingItem);

            let result = match job.url(item) {
                Ok(url) => {
                    let fetched = fetcher.fetch(&url).await;
                    pause(settings.request_delay()).await;
                    fetched.map_err(ScrapeError::from).and_then(|html| {
                        let page = parser::parse(&html, J::HINT, &url, &detail_link);
                        job.handle(conn, item, &url, page)
                    })
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    machine.enter(JobState::Saved);
                    summary.found += outcome.found;
                    summary.saved += outcome.saved;
                    state.total_found += outcome.found;
                    state.total_saved += outcome.saved;
                }
                Err(e) if e.is_fatal() => {
                    machine.enter(JobState::Error);
                    error!(job = %job.kind(), key = job.key(item), error = %e, "fatal error, aborting");
                    tracker.save(&mut state)?;
                    pb.abandon();
                    return Err(e);
                }
                Err(e) => {
                    machine.enter(JobState::Error);
                    warn!(job = %job.kind(), key = job.key(item), error = %e, "item failed");
                    if let Err(e) = job.on_failure(conn, item, &e) {
                        if e.is_fatal() {
                            tracker.save(&mut state)?;
                            pb.abandon();
                            return Err(e);
                        }
                        warn!(job = %job.kind(), error = %e, "could not record failure");
                    }
                    summary.failed += 1;
                    state.total_failed += 1;
                }
            }

            summary.processed += 1;
            state.total_processed += 1;
            state.current_offset += 1;
            state.last_key = Some(job.key(item));
            pb.inc(1);

            if last_save.elapsed() >= settings.save_interval() {
                tracker.save(&mut state)?;
                last_save = Instant::now();
            }
        }

        tracker.save(&mut state)?;
        last_save = Instant::now();
    }

    tracker.save(&mut state)?;
    machine.enter(JobState::Idle);
    pb.finish_and_clear();
    info!(
        job = %job.kind(),
        processed = summary.processed,
        saved = summary.saved,
        failed = summary.failed,
        completed = summary.completed,
        "job finished"
    );
    Ok(summary)
}

// ── Detail pages ──

struct DetailJob {
    max_attempts: u32,
}

impl Job for DetailJob {
    type Item = DetailTask;
    const HINT: RecordHint = RecordHint::Detail;

    fn kind(&self) -> JobKind {
        JobKind::Detail
    }

    fn total(&self, conn: &Connection) -> DbResult<usize> {
        db::count_pending_tasks(conn, 0, self.max_attempts)
    }

    fn next_batch(&self, conn: &Connection, state: &ProgressState, size: usize) -> DbResult<Vec<DetailTask>> {
        db::pending_detail_tasks(conn, state.last_key.unwrap_or(0), self.max_attempts, size)
    }

    fn key(&self, task: &DetailTask) -> i64 {
        task.id
    }

    fn url(&self, task: &DetailTask) -> Result<String, ScrapeError> {
        Ok(task.detail_url.clone())
    }

    fn handle(&self, conn: &Connection, task: &DetailTask, url: &str, page: ParsedPage) -> Result<ItemOutcome, ScrapeError> {
        let ParsedPage::Detail(parsed) = page else {
            return Err(ScrapeError::Parse(format!("expected a detail page at {}", url)));
        };
        if parsed.inmate == InmateRecord::default() && parsed.charges.is_empty() {
            return Err(ScrapeError::Parse(format!("no inmate fields on {}", url)));
        }
        let saved = db::persist_detail(conn, &parsed.inmate, &parsed.charges, Some(task))?;
        debug!(
            inmate = %task.inmate_key,
            charges_added = saved.charges_added,
            "detail saved"
        );
        Ok(ItemOutcome { found: 1, saved: 1 })
    }

    fn on_failure(&self, conn: &Connection, task: &DetailTask, _err: &ScrapeError) -> DbResult<()> {
        let attempts = db::record_task_failure(conn, task.id)?;
        if attempts >= self.max_attempts {
            warn!(inmate = %task.inmate_key, attempts, "detail page given up");
        }
        Ok(())
    }
}

// ── Court cross-reference ──

struct CourtJob<'a> {
    search_url: &'a str,
    link_threshold: f64,
}

impl CourtJob<'_> {
    fn name_parts(inmate: &InmateName) -> (Option<String>, Option<String>) {
        let (first, last) = inmate
            .name
            .as_deref()
            .map(db::split_name)
            .unwrap_or((None, None));
        (inmate.first_name.clone().or(first), inmate.last_name.clone().or(last))
    }
}

impl Job for CourtJob<'_> {
    type Item = InmateName;
    const HINT: RecordHint = RecordHint::CourtSearch;

    fn kind(&self) -> JobKind {
        JobKind::Court
    }

    fn total(&self, conn: &Connection) -> DbResult<usize> {
        db::count_held_inmates(conn)
    }

    fn next_batch(&self, conn: &Connection, state: &ProgressState, size: usize) -> DbResult<Vec<InmateName>> {
        db::held_inmates(conn, state.current_offset, size)
    }

    fn key(&self, inmate: &InmateName) -> i64 {
        inmate.id
    }

    fn url(&self, inmate: &InmateName) -> Result<String, ScrapeError> {
        let (first, last) = Self::name_parts(inmate);
        let last = last.ok_or_else(|| ScrapeError::Parse(format!("inmate row {} has no last name", inmate.id)))?;
        Ok(search_url(self.search_url, &last, first.as_deref().unwrap_or("")))
    }

    fn handle(&self, conn: &Connection, inmate: &InmateName, url: &str, page: ParsedPage) -> Result<ItemOutcome, ScrapeError> {
        let ParsedPage::CourtSearch(cases) = page else {
            return Err(ScrapeError::Parse(format!("expected court search results at {}", url)));
        };
        let mut outcome = ItemOutcome {
            found: cases.len(),
            saved: 0,
        };

        let tx = conn.unchecked_transaction()?;
        for case in &cases {
            let (case_row, _) = db::upsert_court_case(&tx, case)?;
            outcome.saved += 1;
            let Some(defendant) = case.defendant_name.as_deref() else {
                continue;
            };
            if let Some(score) = linker::link_if_similar(&tx, inmate, case_row, defendant, self.link_threshold)? {
                info!(case = %case.case_number, inmate = inmate.id, score, "linked");
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn on_failure(&self, _conn: &Connection, _inmate: &InmateName, _err: &ScrapeError) -> DbResult<()> {
        Ok(())
    }
}

/// Substitute url-encoded `{last}` and `{first}` into the search template.
pub fn search_url(template: &str, last: &str, first: &str) -> String {
    template
        .replace("{last}", &urlencoding::encode(last.trim()))
        .replace("{first}", &urlencoding::encode(first.trim()))
}

fn detail_link_pattern(settings: &Settings) -> Result<Regex, ScrapeError> {
    Regex::new(&settings.detail_link_pattern).map_err(|e| {
        ScrapeError::Configuration(format!("detail_link_pattern {:?}: {}", settings.detail_link_pattern, e))
    })
}

// ── Entry points ──

pub async fn run_detail_job<F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    settings: &Settings,
    opts: &RunOptions,
) -> Result<JobSummary, ScrapeError> {
    let job = DetailJob {
        max_attempts: settings.max_attempts,
    };
    drive(conn, fetcher, settings, &job, opts).await
}

pub async fn run_court_job<F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    settings: &Settings,
    opts: &RunOptions,
) -> Result<JobSummary, ScrapeError> {
    if settings.court_search_url.trim().is_empty() {
        return Err(ScrapeError::Configuration("court_search_url is not set".to_string()));
    }
    let job = CourtJob {
        search_url: &settings.court_search_url,
        link_threshold: settings.request_link_threshold,
    };
    drive(conn, fetcher, settings, &job, opts).await
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RosterSummary {
    pub pages: usize,
    pub seen: usize,
    pub created: usize,
    pub released: usize,
}

/// Record every inmate on the roster pages as held and queue their detail
/// pages. A clean sweep also releases whoever dropped off the roster.
pub async fn roster_sweep<F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    settings: &Settings,
) -> Result<RosterSummary, ScrapeError> {
    let detail_link = detail_link_pattern(settings)?;
    let mut summary = RosterSummary::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut complete = true;

    for url in &settings.roster_urls {
        let fetched = fetcher.fetch(url).await;
        pause(settings.request_delay()).await;
        let html = match fetched {
            Ok(html) => html,
            Err(e) => {
                warn!(url, error = %e, "roster page failed");
                complete = false;
                continue;
            }
        };
        summary.pages += 1;

        let ParsedPage::Roster(entries) = parser::parse(&html, RecordHint::Roster, url, &detail_link) else {
            continue;
        };
        for entry in entries {
            let record = InmateRecord {
                inmate_id: Some(entry.inmate_id.clone()),
                name: entry.name.clone(),
                booking_date: entry.booking_date.clone(),
                in_jail: Some(true),
                ..InmateRecord::default()
            };
            match db::persist_sighting(conn, &record, &entry.detail_url) {
                Ok((_, db::UpsertOutcome::Created)) => summary.created += 1,
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(inmate = %entry.inmate_id, error = %e, "roster entry not saved");
                    complete = false;
                    continue;
                }
            }
            seen.insert(entry.inmate_id);
        }
    }

    summary.seen = seen.len();
    if complete && !seen.is_empty() {
        summary.released = db::mark_missing_released(conn, &seen)?;
    } else if !complete {
        warn!("incomplete roster sweep, release flags left untouched");
    }
    info!(
        pages = summary.pages,
        seen = summary.seen,
        created = summary.created,
        released = summary.released,
        "roster sweep finished"
    );
    Ok(summary)
}

/// One pass over the selected jobs in pipeline order.
pub async fn run_pass<F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    settings: &Settings,
    selection: JobSelection,
    opts: &RunOptions,
) -> Result<(), ScrapeError> {
    let wants = |job: JobSelection| selection == JobSelection::All || selection == job;

    if wants(JobSelection::Roster) {
        if settings.roster_urls.is_empty() {
            warn!("no roster_urls configured, skipping roster sweep");
        } else {
            roster_sweep(conn, fetcher, settings).await?;
        }
    }
    if wants(JobSelection::Detail) {
        run_detail_job(conn, fetcher, settings, opts).await?;
    }
    if wants(JobSelection::Court) {
        if selection == JobSelection::All && settings.court_search_url.trim().is_empty() {
            warn!("no court_search_url configured, skipping court job");
        } else {
            run_court_job(conn, fetcher, settings, opts).await?;
        }
    }
    if wants(JobSelection::Link) {
        linker::auto_link_pass(conn, settings)?;
    }
    Ok(())
}

/// Repeat passes until killed; `once` stops after the first. In continuous
/// mode only a fatal error ends the loop.
pub async fn run<F: Fetch>(
    conn: &Connection,
    fetcher: &F,
    settings: &Settings,
    selection: JobSelection,
    once: bool,
    opts: &RunOptions,
) -> Result<(), ScrapeError> {
    loop {
        match run_pass(conn, fetcher, settings, selection, opts).await {
            Ok(()) => {}
            Err(e) if once || e.is_fatal() => return Err(e),
            Err(e) => {
                error!(error = %e, "pass failed, retrying");
                tokio::time::sleep(settings.batch_retry_delay()).await;
                continue;
            }
        }
        if once {
            return Ok(());
        }
        info!(secs = settings.idle_interval().as_secs(), "pass complete, sleeping");
        tokio::time::sleep(settings.idle_interval()).await;
    }
}
