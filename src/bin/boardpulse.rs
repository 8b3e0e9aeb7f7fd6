use clap::{Parser, Subcommand};

use boardpulse::storage::repository;
use boardpulse::{
    BoardSession, Database, InsightsUpdate, MetricsResult, RecomputeTrigger, Snapshot, Task,
    TrendSummary,
};

#[derive(Parser)]
#[command(name = "boardpulse", about = "Task board insights engine CLI")]
struct Cli {
    /// Database path (default: ~/.boardpulse/boardpulse.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full insights round: aggregate, record this week's
    /// snapshot, and report week-over-week trends
    Insights {
        /// JSON file with the unfiltered task collection
        #[arg(long, value_name = "FILE")]
        tasks: String,
        /// JSON file with the tasks matching the board's active filter
        #[arg(long, value_name = "FILE")]
        filtered: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate a task file once, without touching history
    Compute {
        /// JSON file with the task collection
        #[arg(long, value_name = "FILE")]
        tasks: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and refresh the weekly snapshot history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show engine status
    Status,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored weekly snapshots with week-over-week deltas
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge the local cache with the remote store
    Sync,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };

    match cli.command {
        Commands::Insights {
            tasks,
            filtered,
            json,
        } => {
            handle_insights(db, &tasks, filtered.as_deref(), json).await?;
        }
        Commands::Compute { tasks, json } => {
            handle_compute(&db, &tasks, json).await?;
        }
        Commands::History { action } => {
            handle_history(db, action).await?;
        }
        Commands::Config { action } => {
            handle_config(&db, action).await?;
        }
        Commands::Status => {
            let db_label = match &cli.db {
                Some(path) => path.clone(),
                None => Database::default_path()?.display().to_string(),
            };
            print_status(&db, &db_label).await?;
        }
    }

    Ok(())
}

fn read_tasks(path: &str) -> anyhow::Result<Vec<Task>> {
    let body = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read task file {path}: {e}"))?;
    let tasks: Vec<Task> = serde_json::from_str(&body)
        .map_err(|e| anyhow::anyhow!("cannot parse task file {path}: {e}"))?;
    Ok(tasks)
}

async fn handle_insights(
    db: Database,
    tasks_path: &str,
    filtered_path: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let all = read_tasks(tasks_path)?;
    let filtered = filtered_path.map(read_tasks).transpose()?;
    let filter_active = filtered.is_some();

    let mut session = BoardSession::start(db).await?;
    let update = session
        .refresh(RecomputeTrigger::ViewShown, all, filtered)
        .await?
        .ok_or_else(|| anyhow::anyhow!("refresh produced no result"))?;

    if json {
        print_update_json(&update, filter_active)?;
    } else {
        let view = if filter_active {
            &update.metrics.filtered
        } else {
            &update.metrics.all
        };
        print_metrics(view);
        if filter_active {
            println!("\nUnfiltered total: {}", update.metrics.all.total);
        }
        print_trend(&update.trend);
        if let Some(recorded) = session.history().last() {
            println!("\nRecorded snapshot for week {}", recorded.bucket);
        }
    }

    session.shutdown().await;
    Ok(())
}

fn print_update_json(update: &InsightsUpdate, filter_active: bool) -> anyhow::Result<()> {
    let view = if filter_active {
        &update.metrics.filtered
    } else {
        &update.metrics.all
    };
    let payload = serde_json::json!({
        "metrics": view,
        "trend": update.trend,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn handle_compute(db: &Database, tasks_path: &str, json: bool) -> anyhow::Result<()> {
    let tasks = read_tasks(tasks_path)?;
    let lookups = db
        .reader()
        .call(|conn| repository::load_lookups(conn))
        .await?;
    let today = chrono::Local::now().date_naive();

    let metrics = boardpulse::compute(&tasks, &lookups, today);

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        print_metrics(&metrics);
    }
    Ok(())
}

async fn handle_history(db: Database, action: HistoryAction) -> anyhow::Result<()> {
    match action {
        HistoryAction::List { json } => {
            let session = BoardSession::start(db).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(session.history())?);
            } else if session.history().is_empty() {
                println!("No snapshots recorded.");
            } else {
                print_history(session.history());
            }
            session.shutdown().await;
        }
        HistoryAction::Sync => {
            let mut session = BoardSession::start(db).await?;
            let count = session.sync_history().await?.len();
            println!("{count} snapshots after merge.");
            session.shutdown().await;
        }
    }
    Ok(())
}

async fn handle_config(db: &Database, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let val: Option<String> = db
                .reader()
                .call({
                    let key = key.clone();
                    move |conn| repository::get_config(conn, &key)
                })
                .await?;
            match val {
                Some(v) => println!("{key} = {v}"),
                None => println!("{key} is not set"),
            }
        }
        ConfigAction::Set { key, value } => {
            db.writer()
                .call(move |conn| repository::set_config(conn, &key, &value))
                .await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items: Vec<(String, String)> = db
                .reader()
                .call(|conn| repository::list_config(conn))
                .await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(db: &Database, db_label: &str) -> anyhow::Result<()> {
    let (lookups, snapshots, remote) = db
        .reader()
        .call(|conn| {
            let lookups = repository::load_lookups(conn)?;
            let snapshots = repository::read_snapshot_cache(conn)?;
            let remote = repository::get_config(conn, repository::CONFIG_REMOTE_URL)?;
            Ok::<_, rusqlite::Error>((lookups, snapshots, remote))
        })
        .await?;

    println!("Engine Status");
    println!("  Database:     {db_label}");
    let status_keys = if lookups.status_keys.is_empty() {
        "(none configured)".to_string()
    } else {
        lookups.status_keys.join(", ")
    };
    println!("  Status keys:  {status_keys}");
    println!("  Roster size:  {}", lookups.internal_roster.len());
    println!("  Known labels: {}", lookups.assignee_labels.len());
    println!(
        "  Remote store: {}",
        remote.as_deref().unwrap_or("(not configured)")
    );
    println!("  Snapshots:    {}", snapshots.len());
    if let Some(last) = snapshots.last() {
        println!(
            "  Last capture: {} (week {})",
            last.captured_at.format("%Y-%m-%d %H:%M"),
            last.bucket
        );
    }
    Ok(())
}

fn print_metrics(m: &MetricsResult) {
    println!("Totals");
    println!("  Tasks:    {}", m.total);
    println!("  Overdue:  {}", m.overdue_count);
    println!("  Due soon: {}", m.due_soon_count);

    if !m.status_totals.is_empty() {
        println!("  By status:");
        for (key, count) in &m.status_totals {
            println!("    {key}: {count}");
        }
    }
    println!("  By sub-status:");
    println!("    on track: {}", m.substatus_totals.on_track);
    println!("    at risk:  {}", m.substatus_totals.at_risk);
    println!("    blocked:  {}", m.substatus_totals.blocked);
    println!("  By need:");
    println!("    info:     {}", m.need_totals.info);
    println!("    approval: {}", m.need_totals.approval);
    println!("    review:   {}", m.need_totals.review);
    println!("    none:     {}", m.need_totals.none);

    if !m.workload.is_empty() {
        println!("\nWorkload");
        for entry in &m.workload {
            println!("  {:3}  {} ({})", entry.count, entry.label, entry.team);
        }
    }
    if !m.upcoming_due.is_empty() {
        println!("\nUpcoming due dates");
        for entry in &m.upcoming_due {
            println!("  {}  {} tasks", entry.date, entry.count);
        }
    }
    if !m.segments.by_team.is_empty() {
        println!("\nBy team");
        for segment in &m.segments.by_team {
            println!("  {:3}  {}", segment.total, segment.label);
        }
    }
}

fn print_trend(t: &TrendSummary) {
    println!("\nWeek-over-week");
    println!("  Total:    {}", t.total);
    println!("  Due soon: {}", t.due_soon);
    println!("  Overdue:  {}", t.overdue);
    for (key, trend) in &t.statuses {
        println!("  {key}: {trend}");
    }
}

fn print_history(snapshots: &[Snapshot]) {
    println!("Weekly snapshots ({}):", snapshots.len());
    let mut previous: Option<&Snapshot> = None;
    for snapshot in snapshots {
        let delta = match previous {
            Some(prev) => {
                let diff = snapshot.total as i64 - prev.total as i64;
                format!(" ({diff:+})")
            }
            None => String::new(),
        };
        println!(
            "  {}  total {}{delta}, overdue {}, due soon {}  (captured {})",
            snapshot.bucket,
            snapshot.total,
            snapshot.overdue_count,
            snapshot.due_soon_count,
            snapshot.captured_at.format("%Y-%m-%d %H:%M"),
        );
        previous = Some(snapshot);
    }
}
