use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::migrate::{Migrate, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "interview-migrate",
    about = "Manage the interview service database schema",
    version
)]
struct Cli {
    /// Directory holding the `.up.sql` / `.down.sql` migration pairs
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the migrations directory and the bookkeeping table
    Init,
    /// Write an empty, timestamped migration pair
    Create {
        /// Short description, e.g. "add interview notes"
        name: String,
    },
    /// Apply every pending migration
    Upgrade,
    /// Revert the most recently applied migration
    Downgrade,
    /// List known migrations and whether they are applied
    History,
    /// Show the latest applied version
    Current,
}

async fn connect() -> anyhow::Result<PgPool> {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .context("failed to connect to the database")?;
    Ok(pool)
}

async fn applied_versions(pool: &PgPool) -> anyhow::Result<Vec<i64>> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let mut versions: Vec<i64> = conn
        .list_applied_migrations()
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();
    versions.sort_unstable();
    Ok(versions)
}

/// Reads the migration set from `dir` at run time, so freshly created
/// pairs are picked up without rebuilding this binary.
async fn load_migrator(dir: &Path) -> anyhow::Result<Migrator> {
    Migrator::new(dir.to_path_buf())
        .await
        .with_context(|| format!("failed to read migrations from {}", dir.display()))
}

fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn create(dir: &Path, name: &str) -> anyhow::Result<()> {
    let slug = slug(name);
    if slug.is_empty() {
        bail!("migration name must contain letters or digits");
    }
    std::fs::create_dir_all(dir)?;
    let version = Utc::now().format("%Y%m%d%H%M%S");
    for direction in ["up", "down"] {
        let path = dir.join(format!("{}_{}.{}.sql", version, slug, direction));
        std::fs::write(&path, format!("-- {} ({})\n", name.trim(), direction))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("created {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Init => {
            std::fs::create_dir_all(&cli.dir)?;
            let pool = connect().await?;
            applied_versions(&pool).await?;
            println!("migrations table ready, directory {}", cli.dir.display());
        }
        Command::Create { name } => create(&cli.dir, &name)?,
        Command::Upgrade => {
            let migrator = load_migrator(&cli.dir).await?;
            let pool = connect().await?;
            migrator.run(&pool).await?;
            let versions = applied_versions(&pool).await?;
            println!("database at version {}", versions.last().copied().unwrap_or(0));
        }
        Command::Downgrade => {
            let migrator = load_migrator(&cli.dir).await?;
            let pool = connect().await?;
            let versions = applied_versions(&pool).await?;
            let Some(latest) = versions.last().copied() else {
                println!("nothing to downgrade");
                return Ok(());
            };
            let target = versions.iter().rev().nth(1).copied().unwrap_or(0);
            migrator.undo(&pool, target).await?;
            println!("reverted {}, database at version {}", latest, target);
        }
        Command::History => {
            let migrator = load_migrator(&cli.dir).await?;
            let pool = connect().await?;
            let applied: HashSet<i64> = applied_versions(&pool).await?.into_iter().collect();
            for migration in migrator
                .iter()
                .filter(|m| !m.migration_type.is_down_migration())
            {
                let mark = if applied.contains(&migration.version) {
                    "applied"
                } else {
                    "pending"
                };
                println!("{} {:<8} {}", migration.version, mark, migration.description);
            }
        }
        Command::Current => {
            let pool = connect().await?;
            match applied_versions(&pool).await?.last() {
                Some(version) => println!("{}", version),
                None => println!("no migrations applied"),
            }
        }
    }
    Ok(())
}
