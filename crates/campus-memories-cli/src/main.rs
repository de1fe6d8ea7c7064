use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use campus_memories_core::{
    marker_icon, Category, CategoryFilter, Coordinate, GalleryKey, LoadReport, MarkerLayer,
    MemoryId, MemoryStore, Session,
};
use campus_memories_store_sqlite::SqliteKeyValueStore;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use time::UtcOffset;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod photos;

use config::AppConfig;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

type CliSession = Session<SqliteKeyValueStore, MarkerLayer>;

#[derive(Debug, Parser)]
#[command(name = "cm")]
#[command(about = "Campus Memories CLI")]
struct Cli {
    #[arg(long, default_value = "./campus_memories.sqlite3")]
    db: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Memory {
        #[command(subcommand)]
        command: Box<MemoryCommand>,
    },
    Map {
        #[command(subcommand)]
        command: Box<MapCommand>,
    },
    Gallery {
        #[command(subcommand)]
        command: Box<GalleryCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Backup(DbBackupArgs),
    Restore(DbRestoreArgs),
    IntegrityCheck,
    Keys,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbRestoreArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum MemoryCommand {
    Add(MemoryAddArgs),
    List(FilterArgs),
    Delete(MemoryDeleteArgs),
    Counts,
}

#[derive(Debug, Args)]
struct MemoryAddArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, value_enum)]
    category: Option<CategoryArg>,
    #[arg(long = "photo")]
    photos: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long, default_value = "all")]
    filter: CategoryFilter,
}

#[derive(Debug, Args)]
struct MemoryDeleteArgs {
    #[arg(long)]
    id: String,
    #[arg(long, default_value_t = false)]
    yes: bool,
}

#[derive(Debug, Subcommand)]
enum MapCommand {
    Markers(FilterArgs),
    Pin(MapPinArgs),
}

#[derive(Debug, Args)]
struct MapPinArgs {
    #[arg(long, value_enum)]
    category: CategoryArg,
}

#[derive(Debug, Subcommand)]
enum GalleryCommand {
    View(GalleryViewArgs),
}

#[derive(Debug, Args)]
struct GalleryViewArgs {
    #[arg(long)]
    id: String,
    #[arg(long = "key", value_enum)]
    keys: Vec<KeyArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryArg {
    Study,
    Fun,
    Friends,
    Food,
    Events,
    Sports,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Study => Category::Study,
            CategoryArg::Fun => Category::Fun,
            CategoryArg::Friends => Category::Friends,
            CategoryArg::Food => Category::Food,
            CategoryArg::Events => Category::Events,
            CategoryArg::Sports => Category::Sports,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyArg {
    Left,
    Right,
    Escape,
}

impl From<KeyArg> for GalleryKey {
    fn from(value: KeyArg) -> Self {
        match value {
            KeyArg::Left => GalleryKey::Left,
            KeyArg::Right => GalleryKey::Right,
            KeyArg::Escape => GalleryKey::Escape,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_writer(io::stderr).with_env_filter(filter).try_init().ok();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    // The local offset can only be read while the process is single-threaded.
    let display_offset = display_offset(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(cli, config, display_offset))
}

async fn run(cli: Cli, config: AppConfig, display_offset: UtcOffset) -> Result<()> {
    match cli.command {
        Command::Db { command } => {
            let mut store = SqliteKeyValueStore::open(&cli.db)?;
            run_db(*command, &mut store)
        }
        Command::Memory { command } => {
            let session = open_session(&cli.db, &config, display_offset)?;
            run_memory(*command, session).await
        }
        Command::Map { command } => run_map(*command, &cli.db, &config, display_offset),
        Command::Gallery { command } => {
            let session = open_session(&cli.db, &config, display_offset)?;
            run_gallery(*command, session)
        }
    }
}

fn display_offset(config: &AppConfig) -> Result<UtcOffset> {
    if let Some(offset) = config.fixed_offset()? {
        return Ok(offset);
    }
    Ok(UtcOffset::current_local_offset().unwrap_or_else(|err| {
        debug!(error = %err, "local UTC offset unavailable; showing dates in UTC");
        UtcOffset::UTC
    }))
}

fn open_session(db: &Path, config: &AppConfig, display_offset: UtcOffset) -> Result<CliSession> {
    let mut storage = SqliteKeyValueStore::open(db)?;
    storage.migrate()?;
    let (store, report) = MemoryStore::load_with_key(storage, config.storage_key.as_str());
    log_load_report(&report);
    let mut session = Session::start(store, MarkerLayer::new(), config.viewport());
    session.set_display_offset(display_offset);
    Ok(session)
}

fn log_load_report(report: &LoadReport) {
    if report.skipped.is_empty() {
        debug!(source = ?report.source, loaded = report.loaded, "memories loaded");
    } else {
        warn!(
            source = ?report.source,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "some stored memories could not be read and were dropped"
        );
    }
}

fn run_db(command: DbCommand, store: &mut SqliteKeyValueStore) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(store),
        DbCommand::Migrate(args) => run_db_migrate(&args, store),
        DbCommand::Backup(args) => run_db_backup(&args, store),
        DbCommand::Restore(args) => run_db_restore(&args, store),
        DbCommand::IntegrityCheck => run_db_integrity_check(store),
        DbCommand::Keys => run_db_keys(store),
    }
}

fn run_db_schema_version(store: &SqliteKeyValueStore) -> Result<()> {
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty()
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, store: &mut SqliteKeyValueStore) -> Result<()> {
    let before = store.schema_status()?;
    if args.dry_run {
        return emit_json(serde_json::json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions
        }));
    }

    store.migrate()?;
    let after = store.schema_status()?;
    emit_json(serde_json::json!({
        "dry_run": false,
        "before_version": before.current_version,
        "applied_versions": before.pending_versions,
        "after_version": after.current_version,
        "target_version": after.target_version,
        "up_to_date": after.pending_versions.is_empty()
    }))
}

fn run_db_backup(args: &DbBackupArgs, store: &mut SqliteKeyValueStore) -> Result<()> {
    store.migrate()?;
    let entries = store.backup_database(&args.out)?;
    emit_json(serde_json::json!({
        "backup_path": args.out,
        "entries": entries,
        "status": "ok"
    }))
}

fn run_db_restore(args: &DbRestoreArgs, store: &mut SqliteKeyValueStore) -> Result<()> {
    let entries = store.restore_database(&args.input)?;
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "restored_from": args.input,
        "entries": entries,
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions
    }))
}

fn run_db_integrity_check(store: &SqliteKeyValueStore) -> Result<()> {
    let report = store.integrity_check()?;
    emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
}

fn run_db_keys(store: &mut SqliteKeyValueStore) -> Result<()> {
    store.migrate()?;
    let entries = store.entries()?;
    emit_json(serde_json::json!({ "entries": entries }))
}

async fn run_memory(command: MemoryCommand, mut session: CliSession) -> Result<()> {
    match command {
        MemoryCommand::Add(args) => run_memory_add(args, &mut session).await,
        MemoryCommand::List(args) => {
            let memories = session.store().filter(args.filter);
            emit_json(serde_json::json!({
                "filter": args.filter,
                "memories": memories,
                "counts": session.counts()
            }))
        }
        MemoryCommand::Delete(args) => run_memory_delete(&args, &mut session),
        MemoryCommand::Counts => {
            emit_json(serde_json::to_value(session.counts()).context("failed to serialize counts")?)
        }
    }
}

async fn run_memory_add(args: MemoryAddArgs, session: &mut CliSession) -> Result<()> {
    session.on_map_click(Coordinate::new(args.lat, args.lng));
    if let Some(category) = args.category {
        session.select_category(category.into());
    }
    let failures = photos::attach_photos(session, &args.photos).await;
    for failure in &failures {
        warn!(file = failure.name(), error = %failure, "photo was not attached");
    }

    let memory = session.save_draft(&args.title, &args.description)?;
    emit_json(serde_json::json!({
        "memory": memory,
        "photo_failures": failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "markers": session.surface().len()
    }))
}

fn run_memory_delete(args: &MemoryDeleteArgs, session: &mut CliSession) -> Result<()> {
    let id = parse_memory_id(&args.id)?;
    let deleted = if args.yes {
        session.delete_memory(&id, &mut |_: &str| true)?
    } else {
        session.delete_memory(&id, &mut prompt_on_stdin)?
    };
    emit_json(serde_json::json!({
        "id": id,
        "deleted": deleted,
        "remaining": session.store().len()
    }))
}

/// Ask on stderr and read one line from stdin; anything but y/yes declines.
fn prompt_on_stdin(prompt: &str) -> bool {
    let mut stderr = io::stderr();
    if write!(stderr, "{prompt} [y/N] ").and_then(|()| stderr.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(err) => {
            warn!(error = %err, "failed to read confirmation from stdin");
            false
        }
    }
}

fn run_map(
    command: MapCommand,
    db: &Path,
    config: &AppConfig,
    display_offset: UtcOffset,
) -> Result<()> {
    match command {
        MapCommand::Markers(args) => {
            let mut session = open_session(db, config, display_offset)?;
            session.set_filter(args.filter);
            let surface = session.surface();
            emit_json(serde_json::json!({
                "viewport": surface.viewport(),
                "filter": args.filter,
                "markers": surface.markers().collect::<Vec<_>>()
            }))
        }
        MapCommand::Pin(args) => {
            let category = Category::from(args.category);
            emit_json(serde_json::json!({
                "category": category,
                "label": category.label(),
                "icon": marker_icon(category)
            }))
        }
    }
}

fn run_gallery(command: GalleryCommand, mut session: CliSession) -> Result<()> {
    match command {
        GalleryCommand::View(args) => {
            let id = parse_memory_id(&args.id)?;
            if !session.open_gallery(&id) {
                return emit_json(serde_json::json!({
                    "id": id,
                    "open": false,
                    "view": Value::Null
                }));
            }
            let mut view = session.gallery().view();
            for key in args.keys {
                view = session.gallery_key(key.into());
            }
            emit_json(serde_json::json!({
                "id": id,
                "open": view.is_some(),
                "view": view
            }))
        }
    }
}

fn parse_memory_id(value: &str) -> Result<MemoryId> {
    MemoryId::parse(value).ok_or_else(|| anyhow!("memory id must not be empty"))
}
