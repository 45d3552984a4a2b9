mod config;
mod db;
mod error;
mod fetcher;
mod linker;
mod logging;
mod parser;
mod progress;
mod scraper;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use config::Settings;
use progress::{JobKind, ProgressTracker};
use scraper::{JobSelection, RunOptions};

#[derive(Parser)]
#[command(name = "jail_scraper", about = "County jail roster and court records scraper")]
struct Cli {
    /// Configuration file (TOML); JAIL_* environment variables override it
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum JobArg {
    All,
    Roster,
    Detail,
    Court,
    Link,
}

impl From<JobArg> for JobSelection {
    fn from(job: JobArg) -> Self {
        match job {
            JobArg::All => JobSelection::All,
            JobArg::Roster => JobSelection::Roster,
            JobArg::Detail => JobSelection::Detail,
            JobArg::Court => JobSelection::Court,
            JobArg::Link => JobSelection::Link,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressJob {
    Detail,
    Court,
}

impl From<ProgressJob> for JobKind {
    fn from(job: ProgressJob) -> Self {
        match job {
            ProgressJob::Detail => JobKind::Detail,
            ProgressJob::Court => JobKind::Court,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create database tables
    Init,
    /// Start or resume scraping (continuous unless --once)
    Run {
        #[arg(short, long, value_enum, default_value = "all")]
        job: JobArg,
        /// Single pass, then exit
        #[arg(long)]
        once: bool,
        /// Max items per job (progress is kept for the next run)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print each job's status object as JSON
    Status,
    /// Clear saved progress (database rows are untouched)
    Reset {
        /// Only this job (default: all)
        #[arg(short, long, value_enum)]
        job: Option<ProgressJob>,
    },
    /// Link an inmate to a court case by hand
    Link {
        /// Inmate id or docket number
        #[arg(long)]
        inmate: String,
        /// Court case number
        #[arg(long = "case")]
        case_number: String,
        /// Defendant, co-defendant, witness, victim or other
        #[arg(long, default_value = "defendant")]
        role: db::LinkRole,
    },
    /// Record counts and total bond of held inmates
    Stats,
    /// Report missing tables/columns mentioned in the log file
    CheckLog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    logging::init(&settings.log_file)?;

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.database_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {}", settings.database_path.display());
            Ok(())
        }
        Commands::Run { job, once, limit } => {
            let conn = db::connect(&settings.database_path)?;
            let fetcher = fetcher::HttpFetcher::new(&settings).context("Failed to build HTTP client")?;
            let opts = RunOptions {
                limit,
                show_progress: once,
            };
            scraper::run(&conn, &fetcher, &settings, job.into(), once, &opts).await?;
            Ok(())
        }
        Commands::Status => {
            let mut report = serde_json::Map::new();
            for job in JobKind::ALL {
                let status = ProgressTracker::new(&settings.state_dir, job).status();
                report.insert(job.to_string(), serde_json::to_value(status)?);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Reset { job } => {
            let jobs: Vec<JobKind> = match job {
                Some(job) => vec![job.into()],
                None => JobKind::ALL.to_vec(),
            };
            for job in jobs {
                let tracker = ProgressTracker::new(&settings.state_dir, job);
                if tracker.reset()? {
                    println!("{}: removed {}", job, tracker.path().display());
                } else {
                    println!("{}: no saved progress", job);
                }
            }
            Ok(())
        }
        Commands::Link {
            inmate,
            case_number,
            role,
        } => {
            let conn = db::connect(&settings.database_path)?;
            if linker::manual_link(&conn, &inmate, &case_number, role)? {
                println!("Linked {} to {} as {}", inmate, case_number, role);
            } else {
                println!("{} is already linked to {}", inmate, case_number);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.database_path)?;
            let s = db::get_stats(&conn, settings.max_attempts)?;
            let total_bond: f64 = db::held_bond_amounts(&conn)?
                .iter()
                .filter_map(|raw| parser::charges::bond_value(raw))
                .sum();
            println!("Inmates:       {}", s.inmates);
            println!("In jail:       {}", s.in_jail);
            println!("Charges:       {}", s.charges);
            println!("Court cases:   {}", s.court_cases);
            println!("Links:         {}", s.links);
            println!("Pending pages: {}", s.pending_tasks);
            println!("Failed pages:  {}", s.failed_tasks);
            println!("Total bond:    ${:.2}", total_bond);
            Ok(())
        }
        Commands::CheckLog => {
            let log = std::fs::read_to_string(&settings.log_file)
                .with_context(|| format!("Failed to read log file {:?}", settings.log_file))?;
            let issues = logging::scan_for_issues(&log);
            if issues.is_empty() {
                println!("No schema problems in {}", settings.log_file.display());
            }
            for issue in &issues {
                match issue {
                    logging::LogIssue::MissingColumn { table, column } => {
                        println!("missing column: {}.{}", table, column)
                    }
                    logging::LogIssue::UnknownColumn { column } => println!("missing column: {}", column),
                    logging::LogIssue::MissingTable { table } => println!("missing table: {}", table),
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Run time for the closing summary: "42.0s", "3m 07s", "1h 02m 05s".
fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{}m {:02}s", m, s),
        (h, m, s) => format!("{}h {:02}m {:02}s", h, m, s),
    }
}
