//! Walks a small Users/Tasks/Countries database through the collection API.

use anyhow::{Context, Result};
use clap::Parser;
use rust_collection::{all, Database, DatabaseConfig, Direction};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SEED: &str = r#"
    CREATE TABLE IF NOT EXISTS Countries (id INTEGER PRIMARY KEY, iso_code TEXT NOT NULL);
    CREATE TABLE IF NOT EXISTS Users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        age INTEGER,
        countriesId INTEGER REFERENCES Countries(id)
    );
    CREATE TABLE IF NOT EXISTS Tasks (id INTEGER PRIMARY KEY, description TEXT NOT NULL);
    CREATE TABLE IF NOT EXISTS TasksUsers (
        id INTEGER PRIMARY KEY,
        tasksId INTEGER NOT NULL,
        usersId INTEGER NOT NULL
    );
    INSERT INTO Countries (iso_code) VALUES ('IT'), ('DE');
    INSERT INTO Users (name, age, countriesId) VALUES ('Ann', 30, 1), ('Bo', 40, 2);
    INSERT INTO Tasks (description) VALUES ('write report'), ('review code');
    INSERT INTO TasksUsers (tasksId, usersId) VALUES (1, 1), (2, 1), (2, 2);
"#;

#[derive(Parser)]
#[command(name = "collection-demo")]
#[command(about = "Browse and link rows of a convention-named SQLite database")]
struct Cli {
    /// Path to the SQLite database file
    db_path: String,

    /// Create and fill the demo tables first
    #[arg(long)]
    seed: bool,

    /// Log verbosity when RUST_LOG is unset: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.verbosity.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::open(&DatabaseConfig::new(&cli.db_path))
        .with_context(|| format!("opening {}", cli.db_path))?;
    if cli.seed {
        db.connection()
            .execute_batch(SEED)
            .context("seeding demo tables")?;
        info!("seeded demo tables");
    }

    let mut users = all(&db, "Users")?.order("name", Direction::Asc);
    println!("{} users", users.count()?);

    for user in users.iter() {
        let user = user?;
        println!("{}:", user.value("name")?);
        let Some(mut tasks) = user.get("tasks")?.into_collection() else {
            continue;
        };
        for task in tasks.iter() {
            println!(" - {}", task?.value("description")?);
        }
    }

    let mut first = users.limit(1);
    if let Some(mut country) = first.get("countries")?.into_collection() {
        println!("first user's country: {}", country.value("iso_code")?);
    }

    let mut task = all(&db, "Tasks")?.filter("id", "=", 1);
    let mut bo = users.filter("name", "=", "Bo");
    if !bo.is_empty()? {
        bo.link(&mut task).context("linking Bo to task 1")?;
        info!("linked Bo to task 1");
    }

    users.save()?;
    Ok(())
}
