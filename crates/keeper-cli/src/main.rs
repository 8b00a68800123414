use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use keeper_core::account::{self, load_account, save_account, Account};
use keeper_core::consistency::{self, TableState};
use keeper_core::paths::{data_dir, DATABASE_FILE};
use keeper_core::session::clear_orphan_keys;
use keeper_core::settings::{load_settings, save_settings, SETTINGS_FILE};
use keeper_core::{DualTableStore, Field, Keeper, KeeperError, KeeperSettings, PlainRecord, Table};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod interactive;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Local credential manager", long_about = None)]
struct Cli {
    /// Data directory (defaults to the platform data dir or KEEPER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Login name (defaults to the account's username)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database, settings and master account
    Init {
        /// Username for the new account
        #[arg(long)]
        username: Option<String>,
    },

    /// Change the account's username and/or master password
    Passwd {
        #[arg(long)]
        username: Option<String>,
        /// Only change the username
        #[arg(long)]
        keep_password: bool,
    },

    /// Rate a password from very weak to very strong
    Strength,

    /// List stored records
    List {
        /// Maximum number of records to show (defaults to the display setting)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Add a record
    Add {
        #[arg(long)]
        site: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Change fields of a record; omitted fields are kept
    Edit {
        id: u32,
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Delete a record
    Remove { id: u32 },

    /// Case-insensitive search
    Search {
        query: String,
        /// Fields to search (all when omitted)
        #[arg(short, long, value_enum, value_delimiter = ',')]
        fields: Vec<FieldArg>,
    },

    /// Report whether the ciphertext and key tables line up
    Check,

    /// Empty a table
    Clear {
        #[arg(value_enum)]
        table: TableArg,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Save, then export all records to an unencrypted SQLite file
    ExportDb { path: PathBuf },

    /// Show recent login attempts
    Log {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show or change settings
    Settings {
        #[arg(long)]
        autosave_secs: Option<u64>,
        #[arg(long)]
        autosave: Option<bool>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        timeout: Option<bool>,
        #[arg(long)]
        records_shown: Option<usize>,
        #[arg(long)]
        logins_shown: Option<usize>,
    },

    /// Interactive session with autosave and idle logout
    Session,
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldArg {
    Site,
    Username,
    Password,
}

impl From<FieldArg> for Field {
    fn from(f: FieldArg) -> Self {
        match f {
            FieldArg::Site => Field::Site,
            FieldArg::Username => Field::Username,
            FieldArg::Password => Field::Password,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TableArg {
    Ciphertext,
    Keys,
    Log,
    /// Both record tables
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };

    match cli.command {
        Commands::Init { username } => init_command(&dir, username.as_deref()),
        Commands::Passwd {
            username,
            keep_password,
        } => passwd_command(&dir, username.as_deref(), keep_password),
        Commands::Strength => {
            let password = auth::read_password("Password to rate: ")?;
            let rating = account::strength(&password);
            println!("Password strength: {rating} ({}/5)", rating.score());
            match account::check_rules(&password) {
                Ok(()) => println!("Meets the master password rules."),
                Err(err) => println!("Not allowed as a master password: {err}."),
            }
            Ok(())
        }
        Commands::Settings {
            autosave_secs,
            autosave,
            timeout_secs,
            timeout,
            records_shown,
            logins_shown,
        } => {
            let mut settings = load_settings(&dir)?;
            let changed = autosave_secs.is_some()
                || autosave.is_some()
                || timeout_secs.is_some()
                || timeout.is_some()
                || records_shown.is_some()
                || logins_shown.is_some();
            if let Some(secs) = autosave_secs {
                settings.autosave.interval_secs = secs;
            }
            if let Some(enabled) = autosave {
                settings.autosave.enabled = enabled;
            }
            if let Some(secs) = timeout_secs {
                settings.timeout.idle_secs = secs;
            }
            if let Some(enabled) = timeout {
                settings.timeout.enabled = enabled;
            }
            if let Some(n) = records_shown {
                settings.display.records_shown = n;
            }
            if let Some(n) = logins_shown {
                settings.display.logins_shown = n;
            }
            if changed {
                save_settings(&dir, &settings)?;
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Check => {
            let store = open_store(&dir)?;
            let (cipher_rows, key_rows) = store.load_all()?;
            let state = consistency::check(&cipher_rows, &key_rows);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "state": state,
                    "ciphertextRows": cipher_rows.len(),
                    "keyRows": key_rows.len(),
                }))?
            );
            Ok(())
        }
        Commands::Clear { table, yes } => clear_command(&dir, cli.user.as_deref(), table, yes),
        Commands::Log { limit } => {
            let settings = load_settings(&dir)?;
            let store = open_store(&dir)?;
            let entries = store.read_log(Some(limit.unwrap_or(settings.display.logins_shown)))?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Commands::Session => {
            let keeper = open_keeper(&dir, cli.user.as_deref())?;
            interactive::run(keeper).await
        }
        command => {
            let keeper = open_keeper(&dir, cli.user.as_deref())?;
            let result = run_record_command(&keeper, command);
            // persist whatever succeeded, even if the command failed
            keeper.save()?;
            result
        }
    }
}

fn run_record_command(keeper: &Keeper, command: Commands) -> Result<()> {
    match command {
        Commands::List { limit } => {
            let limit = limit.unwrap_or(keeper.settings().display.records_shown);
            let records: Vec<PlainRecord> =
                keeper.with_records(|r| r.iter().take(limit).cloned().collect());
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Add {
            site,
            username,
            password,
        } => {
            let id = keeper.with_records_mut(|r| r.add(&site, &username, &password))?;
            println!("Record {id} saved.");
        }
        Commands::Edit {
            id,
            site,
            username,
            password,
        } => {
            keeper.with_records_mut(|r| {
                let current = r
                    .get(id)
                    .cloned()
                    .ok_or_else(|| anyhow!("no record with id {id}"))?;
                r.update(
                    id,
                    site.as_deref().unwrap_or(&current.site),
                    username.as_deref().unwrap_or(&current.username),
                    password.as_deref().unwrap_or(&current.password),
                )?;
                Ok::<_, anyhow::Error>(())
            })?;
            println!("Record {id} updated.");
        }
        Commands::Remove { id } => {
            keeper.with_records_mut(|r| r.remove(id))?;
            println!("Record {id} deleted.");
        }
        Commands::Search { query, fields } => {
            let fields: Vec<Field> = if fields.is_empty() {
                Field::ALL.to_vec()
            } else {
                fields.into_iter().map(Field::from).collect()
            };
            let hits: Vec<PlainRecord> =
                keeper.with_records(|r| r.search(&query, &fields).into_iter().cloned().collect());
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::ExportDb { path } => {
            let rows = keeper.export_plain_db(&path)?;
            println!("{rows} records exported to {}.", path.display());
        }
        _ => unreachable!("handled in main"),
    }
    Ok(())
}

fn init_command(dir: &Path, username: Option<&str>) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating data directory {}", dir.display()))?;
    open_store(dir)?;
    if !dir.join(SETTINGS_FILE).exists() {
        save_settings(dir, &KeeperSettings::default())?;
    }

    if let Some(existing) = load_account(dir)? {
        println!(
            "Account {} already exists; use `keeper passwd` to change it.",
            existing.username
        );
    } else {
        let username =
            username.ok_or_else(|| anyhow!("--username is required to create the account"))?;
        let (password, confirm) = auth::read_new_password(auth::PASSWORD_ENV)?;
        let account = Account::create(username, &password, &confirm)?;
        save_account(dir, &account)?;
        println!("Account {username} created.");
    }
    println!("Data directory ready: {}", dir.display());
    Ok(())
}

fn passwd_command(dir: &Path, username: Option<&str>, keep_password: bool) -> Result<()> {
    let mut account = load_account(dir)?
        .ok_or(KeeperError::NoAccount)
        .context("run `keeper init --username <name>` first")?;
    let current = auth::read_password("Current master password: ")?;
    let new_password = if keep_password {
        None
    } else {
        Some(auth::read_new_password(auth::NEW_PASSWORD_ENV)?)
    };
    account.change(
        &current,
        username,
        new_password
            .as_ref()
            .map(|(pw, confirm)| (pw.as_str(), confirm.as_str())),
    )?;
    save_account(dir, &account)?;
    println!("Account details updated.");
    Ok(())
}

fn clear_command(dir: &Path, user: Option<&str>, table: TableArg, yes: bool) -> Result<()> {
    let label = match table {
        TableArg::Ciphertext => "ciphertext",
        TableArg::Keys => "keys",
        TableArg::Log => "login log",
        TableArg::All => "all records",
    };
    // opened without loading, so this also works on inconsistent tables
    let store = open_store(dir)?;
    auth::login(dir, &store, user)?;
    if !yes && !confirm(&format!("Clear {label}? This cannot be undone."))? {
        println!("Nothing cleared.");
        return Ok(());
    }

    match table {
        TableArg::Ciphertext => {
            store.clear(Table::Ciphertext)?;
            println!("Ciphertext cleared. Clear the key table as well.");
            return Ok(());
        }
        TableArg::Keys => store.clear(Table::Keys)?,
        TableArg::Log => store.clear(Table::LoginLog)?,
        TableArg::All => store.clear_records()?,
    }
    println!("Cleared {label}.");
    Ok(())
}

fn open_store(dir: &Path) -> Result<DualTableStore> {
    std::fs::create_dir_all(dir)?;
    let db = dir.join(DATABASE_FILE);
    DualTableStore::open(&db).with_context(|| format!("opening {}", db.display()))
}

/// Logs in and opens the session, asking before clearing orphaned key rows.
fn open_keeper(dir: &Path, user: Option<&str>) -> Result<Keeper> {
    let settings = load_settings(dir)?;
    let store = open_store(dir)?;
    auth::login(dir, &store, user)?;

    let (cipher_rows, key_rows) = store.load_all()?;
    if consistency::check(&cipher_rows, &key_rows) == TableState::OrphanKeys {
        let confirmed = confirm(&format!(
            "The ciphertext table is empty, but the key table holds {} rows. Clear the key table?",
            key_rows.len()
        ))?;
        if !confirmed {
            return Err(anyhow!("key table not cleared; the store cannot be used until it is"));
        }
        clear_orphan_keys(&store, true)?;
        info!("orphaned key rows cleared");
    }

    Keeper::open(store, settings).map_err(|err| {
        let hint = if err.is_table_inconsistency() {
            "record tables are inconsistent (see `keeper check`)"
        } else {
            "loading records"
        };
        anyhow::Error::new(err).context(hint)
    })
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
