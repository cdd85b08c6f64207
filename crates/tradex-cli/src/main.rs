use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::info;

use tradex_store::audit::AuditFilter;
use tradex_store::models::Role;
use tradex_store::permissions::enforce_owner_only;
use tradex_store::{BackupTool, Config, Store};

#[derive(Parser)]
#[command(name = "tradex-db")]
#[command(about = "Backup, restore and maintain the Tradex database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, run migrations and seed demo data
    /// (seeding is skipped when TRADEX_ENV=production)
    Init,

    /// Write a consistent snapshot of the database to a file
    Backup {
        /// Destination backup file
        destination: PathBuf,
    },

    /// Restore the database from a backup file
    Restore {
        /// Path to the backup file
        backup_file: PathBuf,

        /// Optional destination (defaults to the live database path)
        destination: Option<PathBuf>,
    },

    /// Add a user with a hashed password
    AddUser {
        /// Username (prompted for when omitted)
        #[arg(long)]
        username: Option<String>,

        /// Role for the new user
        #[arg(long, default_value = "User")]
        role: String,
    },

    /// Export the audit log as CSV
    ExportAudit {
        /// Only entries by this actor
        #[arg(long)]
        actor: Option<String>,

        /// Only entries at or after this time (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS")
        #[arg(long)]
        start: Option<String>,

        /// Only entries at or before this time
        #[arg(long)]
        end: Option<String>,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Init => {
            let store = Store::open(&config).await?;
            store.close().await;
            println!("database ready at {}", config.db_path.display());
        }

        Commands::Backup { destination } => {
            BackupTool::new(&config).backup(&destination).await?;
            println!("{}", destination.display());
        }

        Commands::Restore {
            backup_file,
            destination,
        } => {
            let tool = BackupTool::new(&config);
            match destination {
                Some(destination) => tool.restore_to(&backup_file, &destination).await?,
                None => tool.restore(&backup_file).await?,
            }
        }

        Commands::AddUser { username, role } => {
            let role = Role::from_str(&role)?;
            let username = match username {
                Some(username) => username,
                None => prompt_username()?,
            };
            if username.is_empty() {
                return Err(anyhow!("username must not be empty"));
            }
            let password = prompt_password()?;

            let store = Store::open(&config).await?;
            let added = store.add_user(&username, &password, role).await;
            store.close().await;
            added?;
            info!(%username, "user added");
            println!("User {username} added");
        }

        Commands::ExportAudit {
            actor,
            start,
            end,
            output,
        } => {
            let filter = AuditFilter {
                actor,
                start: start.as_deref().map(parse_timestamp).transpose()?,
                end: end.as_deref().map(parse_timestamp).transpose()?,
            };

            let store = Store::open(&config).await?;
            let csv = store.export_audit_csv(&filter).await;
            store.close().await;
            let csv = csv?;

            match output {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    enforce_owner_only(&path)?;
                    println!("{}", path.display());
                }
                None => print!("{csv}"),
            }
        }
    }

    Ok(())
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Hidden prompt on a terminal; plain line read when stdin is piped.
fn prompt_password() -> Result<String> {
    use std::io::IsTerminal;

    if std::io::stdin().is_terminal() {
        rpassword::prompt_password("Password: ").context("cannot read password from terminal")
    } else {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN))
        })
        .map_err(|_| anyhow!("invalid time {value:?}, expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"))
}
