use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use lockbox_crypto::generator::{generate_password, password_strength, GeneratorOptions};
use lockbox_store::categories::{DEFAULT_COLOR, DEFAULT_ICON};
use lockbox_store::paths::{self, SETTINGS_FILE};
use lockbox_store::{
    CategoryUpdate, ConfirmWipe, Lockbox, NewCategory, NewRecord, RecordSecret, RecordUpdate,
    SecretRecord, Settings, Store, StoreError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(about = "Local encrypted password store", long_about = None, version)]
struct Cli {
    /// Data directory (defaults to $LOCKBOX_DATA_DIR, then the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, settings file and master key
    Init,

    /// Add a record; the secret is prompted for unless --generate is given
    Add {
        title: String,
        username: String,
        #[arg(short, long, default_value = "6")]
        category: String,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        favorite: bool,
        /// Generate a 20 character secret instead of prompting
        #[arg(long)]
        generate: bool,
    },

    /// List records, most recently updated first
    List {
        #[arg(short, long)]
        category: Option<String>,
        #[arg(long)]
        favorites: bool,
    },

    /// Show one record
    Show {
        id: String,
        /// Print the secret instead of a mask
        #[arg(long)]
        reveal: bool,
    },

    /// Change fields of a record
    Edit(EditArgs),

    /// Delete a record (no-op if it does not exist)
    Delete { id: String },

    /// Mark or unmark a record as favorite
    Favorite {
        id: String,
        #[arg(long)]
        off: bool,
    },

    /// Case-insensitive search in title, username and website
    Search { query: String },

    /// Manage categories
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },

    /// Generate a password without storing it
    Generate(GenerateArgs),

    /// Write a database snapshot to a new file
    Export { out: PathBuf },

    /// Recreate the database from an exported snapshot. Refuses to replace an
    /// existing database; the master key must be the one the snapshot was
    /// written with.
    Restore { snapshot: PathBuf },

    /// Run the legacy import now and print its state
    Migrate,

    /// Record and category counts, key slot and migration state
    Status,

    /// Delete every record
    Wipe {
        /// Must be exactly "wipe all records"
        #[arg(long)]
        confirm: String,
    },
}

#[derive(Args)]
struct EditArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long, conflicts_with = "clear_website")]
    website: Option<String>,
    #[arg(long)]
    clear_website: bool,
    #[arg(long, conflicts_with = "clear_notes")]
    notes: Option<String>,
    #[arg(long)]
    clear_notes: bool,
    #[arg(short, long)]
    category: Option<String>,
    /// Prompt for a new secret
    #[arg(long)]
    secret: bool,
}

#[derive(Subcommand)]
enum CategoryCommands {
    List,
    Add {
        name: String,
        #[arg(long, default_value = DEFAULT_COLOR)]
        color: String,
        #[arg(long, default_value = DEFAULT_ICON)]
        icon: String,
    },
    Rename {
        id: String,
        name: String,
    },
    /// Records keep their reference and show as uncategorized
    Remove {
        id: String,
    },
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(short, long, default_value = "16")]
    length: usize,
    #[arg(long)]
    no_upper: bool,
    #[arg(long)]
    no_lower: bool,
    #[arg(long)]
    no_digits: bool,
    #[arg(long)]
    symbols: bool,
    /// Keep look-alike characters such as 1, l and O
    #[arg(long)]
    allow_similar: bool,
}

impl GenerateArgs {
    fn options(&self) -> GeneratorOptions {
        GeneratorOptions {
            length: self.length,
            include_uppercase: !self.no_upper,
            include_lowercase: !self.no_lower,
            include_numbers: !self.no_digits,
            include_symbols: self.symbols,
            exclude_similar: !self.allow_similar,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => paths::data_dir().context("resolving data directory")?,
    };
    let settings = Settings::load(&data_dir)
        .with_context(|| format!("reading {}", data_dir.join(SETTINGS_FILE).display()))?;
    init_tracing(settings.log_filter.as_deref());

    match cli.command {
        Commands::Init => init(&data_dir, &settings).await,
        Commands::Restore { snapshot } => restore(&data_dir, &settings, &snapshot).await,
        Commands::Generate(args) => {
            let password = generate_password(&args.options())?;
            let strength = password_strength(&password);
            println!("{password}");
            eprintln!("strength: {:?} ({}/6)", strength.label, strength.score);
            Ok(())
        }
        command => {
            let lockbox = open(&data_dir, &settings).await?;
            lockbox.gate.unlock().await;
            let result = run(&lockbox, command).await;
            lockbox.store.close().await;
            result
        }
    }
}

fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn init(data_dir: &Path, settings: &Settings) -> Result<()> {
    paths::ensure_dir(data_dir)?;
    if !data_dir.join(SETTINGS_FILE).exists() {
        settings.save(data_dir)?;
        info!(dir = %data_dir.display(), "wrote default settings");
    }
    let lockbox = open(data_dir, settings).await?;
    lockbox
        .records
        .engine()
        .key_manager()
        .get_or_create_key()
        .await
        .context("creating master key")?;
    println!("data directory: {}", lockbox.data_dir().display());
    println!("database:       {}", lockbox.store.path().display());
    println!("key slot:       {}", lockbox.records.engine().key_manager().describe_slot());
    Ok(())
}

async fn restore(data_dir: &Path, settings: &Settings, snapshot: &Path) -> Result<()> {
    let bytes = tokio::fs::read(snapshot)
        .await
        .with_context(|| format!("reading {}", snapshot.display()))?;
    paths::ensure_dir(data_dir)?;
    let dest = settings.database_path(data_dir);
    let store = Store::restore_snapshot(&bytes, &dest)
        .await
        .with_context(|| format!("restoring into {}", dest.display()))?;
    let stats = store.stats().await?;
    store.close().await;
    println!("restored {} records into {}", stats.records, dest.display());
    Ok(())
}

/// Open the store and run the startup legacy import. A failed import leaves
/// the legacy data in place and does not block the command; only an
/// unusable database does.
async fn open(data_dir: &Path, settings: &Settings) -> Result<Lockbox> {
    let lockbox = Lockbox::open(data_dir, settings)
        .await
        .with_context(|| format!("opening store in {}", data_dir.display()))?;
    match lockbox.migration.run_if_needed().await {
        Ok(Some(report)) => info!(
            inserted = report.inserted,
            already_present = report.already_present,
            "legacy records imported"
        ),
        Ok(None) => {}
        Err(e @ (StoreError::StorageUnavailable(_) | StoreError::Schema(_))) => {
            return Err(e).context("legacy import")
        }
        Err(e) => warn!(error = %e, "legacy import failed, legacy data kept for retry"),
    }
    Ok(lockbox)
}

async fn run(lockbox: &Lockbox, command: Commands) -> Result<()> {
    if lockbox.gate.is_locked().await {
        bail!("store is locked");
    }
    let records = &lockbox.records;

    match command {
        Commands::Add {
            title,
            username,
            category,
            website,
            notes,
            favorite,
            generate,
        } => {
            let secret = if generate {
                generate_password(&GeneratorOptions {
                    length: 20,
                    include_symbols: true,
                    ..GeneratorOptions::default()
                })?
            } else {
                prompt_new_secret()?
            };
            let record = records
                .create(NewRecord {
                    title,
                    username,
                    secret,
                    website,
                    notes,
                    category_id: category,
                    is_favorite: favorite,
                })
                .await?;
            println!("{}", record.id);
        }
        Commands::List {
            category,
            favorites,
        } => {
            let listed = match (category, favorites) {
                (Some(c), false) => records.list_by_category(&c).await?,
                (None, true) => records.list_favorites().await?,
                (Some(c), true) => records
                    .list_by_category(&c)
                    .await?
                    .into_iter()
                    .filter(|r| r.is_favorite)
                    .collect(),
                (None, false) => records.list().await?,
            };
            print_table(lockbox, &listed).await?;
        }
        Commands::Search { query } => {
            let found = records.search(&query).await?;
            print_table(lockbox, &found).await?;
        }
        Commands::Show { id, reveal } => {
            let record = records.get(&id).await?;
            print_record(lockbox, &record, reveal).await?;
        }
        Commands::Edit(args) => {
            let secret = if args.secret {
                Some(prompt_new_secret()?)
            } else {
                None
            };
            let website = match (args.website, args.clear_website) {
                (_, true) => Some(None),
                (Some(w), false) => Some(Some(w)),
                (None, false) => None,
            };
            let notes = match (args.notes, args.clear_notes) {
                (_, true) => Some(None),
                (Some(n), false) => Some(Some(n)),
                (None, false) => None,
            };
            let record = records
                .update(
                    &args.id,
                    RecordUpdate {
                        title: args.title,
                        username: args.username,
                        secret,
                        website,
                        notes,
                        category_id: args.category,
                        is_favorite: None,
                    },
                )
                .await?;
            println!("updated {} at {}", record.id, record.updated_at.to_rfc3339());
        }
        Commands::Delete { id } => {
            if records.delete(&id).await? {
                println!("deleted {id}");
            } else {
                println!("no record {id}");
            }
        }
        Commands::Favorite { id, off } => {
            let record = records.set_favorite(&id, !off).await?;
            println!("{} favorite: {}", record.id, record.is_favorite);
        }
        Commands::Categories { command } => categories(lockbox, command).await?,
        Commands::Export { out } => {
            let bytes = lockbox.store.export_snapshot().await?;
            write_new_file(&out, &bytes)?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Commands::Migrate => {
            let result = lockbox.migration.run().await;
            let state = lockbox.migration.state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            let report = result?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status => {
            let stats = lockbox.store.stats().await?;
            let state = lockbox.migration.state().await?;
            println!("records:    {}", stats.records);
            println!("categories: {}", stats.categories);
            println!("key slot:   {}", records.engine().key_manager().describe_slot());
            match lockbox.gate.time_until_lock().await {
                Some(left) => println!("auto-lock:  in {}s", left.as_secs()),
                None => println!("auto-lock:  off"),
            }
            println!("migration:  {}", state.status);
            if let Some(err) = state.last_error {
                println!("last error: {err}");
            }
        }
        Commands::Wipe { confirm } => {
            let confirm = ConfirmWipe::from_phrase(&confirm)?;
            let removed = records.clear_all(confirm).await?;
            println!("removed {removed} records");
        }
        Commands::Init | Commands::Generate(_) | Commands::Restore { .. } => {
            bail!("command does not use an open store")
        }
    }
    lockbox.gate.touch().await;
    Ok(())
}

async fn categories(lockbox: &Lockbox, command: CategoryCommands) -> Result<()> {
    let categories = &lockbox.categories;
    match command {
        CategoryCommands::List => {
            for c in categories.list().await? {
                let marker = if c.is_default { " (default)" } else { "" };
                println!("{:<38} {:<16} {} {}{}", c.id, c.name, c.color, c.icon, marker);
            }
        }
        CategoryCommands::Add { name, color, icon } => {
            let added = categories.add(NewCategory { name, color, icon }).await?;
            println!("{}", added.id);
        }
        CategoryCommands::Rename { id, name } => {
            let renamed = categories
                .update(
                    &id,
                    CategoryUpdate {
                        name: Some(name),
                        ..CategoryUpdate::default()
                    },
                )
                .await?;
            println!("{} is now {}", renamed.id, renamed.name);
        }
        CategoryCommands::Remove { id } => {
            if categories.delete(&id).await? {
                println!("removed category {id}");
            } else {
                println!("no category {id}");
            }
        }
    }
    Ok(())
}

async fn print_table(lockbox: &Lockbox, records: &[SecretRecord]) -> Result<()> {
    for r in records {
        let category = lockbox.categories.resolve(&r.category_id).await?;
        let star = if r.is_favorite { "*" } else { " " };
        let flag = if r.secret.is_readable() { "" } else { "  [unreadable]" };
        println!(
            "{star} {:<36}  {:<24}  {:<28}  {}{flag}",
            r.id,
            r.title,
            r.username,
            category.display_name()
        );
    }
    if records.is_empty() {
        eprintln!("no records");
    }
    Ok(())
}

async fn print_record(lockbox: &Lockbox, r: &SecretRecord, reveal: bool) -> Result<()> {
    let category = lockbox.categories.resolve(&r.category_id).await?;
    let secret = match &r.secret {
        RecordSecret::Plain(s) if reveal => s.clone(),
        RecordSecret::Plain(_) => "********".to_owned(),
        RecordSecret::Unreadable(reason) => format!("<unreadable: {reason}>"),
    };
    println!("id:        {}", r.id);
    println!("title:     {}", r.title);
    println!("username:  {}", r.username);
    println!("secret:    {secret}");
    println!("website:   {}", r.website.as_deref().unwrap_or("-"));
    println!("notes:     {}", r.notes.as_deref().unwrap_or("-"));
    println!("category:  {}", category.display_name());
    println!("favorite:  {}", r.is_favorite);
    println!("created:   {}", r.created_at.to_rfc3339());
    println!("updated:   {}", r.updated_at.to_rfc3339());
    Ok(())
}

fn prompt_new_secret() -> Result<String> {
    let first = rpassword::prompt_password("Secret: ").context("reading secret")?;
    let second = rpassword::prompt_password("Repeat: ").context("reading secret")?;
    if first != second {
        return Err(anyhow!("secrets do not match"));
    }
    Ok(first)
}

fn write_new_file(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
