use anyhow::{anyhow, Context, Result};
use std::env;
use std::io;
use std::path::Path;
use todo_reminder_bot::config::Config;
use todo_reminder_bot::database::connection::DatabaseManager;
use todo_reminder_bot::database::legacy::import_legacy_tasks;

#[tokio::main]
async fn main() -> Result<()> {
    // sqlx reports through `log`
    env_logger::init();

    dotenvy::dotenv().ok();
    let database_url = Config::database_url_from_env();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("migrate");

    match command {
        "migrate" | "up" => run_migrations(&database_url).await,
        "check" => check_database(&database_url).await,
        "reset" => reset_database(&database_url).await,
        "import" => match args.get(2) {
            Some(file) => import_file(&database_url, file).await,
            None => {
                eprintln!("import needs the path of the legacy JSON file");
                print_help();
                std::process::exit(1);
            }
        },
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn sqlite_path(database_url: &str) -> Option<&str> {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
}

/// Connects, creating the SQLite directory first when needed.
async fn connect(database_url: &str) -> Result<DatabaseManager> {
    if let Some(parent) = sqlite_path(database_url).and_then(|path| Path::new(path).parent()) {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            println!("📁 Creating directory: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    DatabaseManager::new(database_url)
        .await
        .map_err(|e| anyhow!("Failed to connect to database: {}", e))
}

async fn run_migrations(database_url: &str) -> Result<()> {
    println!("🔧 Todo Reminder Bot - Database Migration Tool");
    println!("==============================================");
    println!("📊 Database URL: {}", mask_url(database_url));
    println!("🚀 Running database migrations...");

    let db_manager = connect(database_url).await?;

    match db_manager.run_migrations().await {
        Ok(_) => {
            println!("✅ Migrations completed successfully!");
        }
        Err(e) => {
            eprintln!("❌ Migration failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn check_database(database_url: &str) -> Result<()> {
    println!("🔍 Checking database connection and schema...");
    println!("📊 Database URL: {}", mask_url(database_url));

    let db_manager = connect(database_url).await?;

    match check_tables(&db_manager).await {
        Ok(tables) if tables.is_empty() => {
            println!("⚠️  Database is empty");
            println!("💡 Run 'migrate up' to create the schema");
        }
        Ok(tables) => {
            println!("✅ Database connection successful!");
            println!("📋 Found tables:");
            for (table, rows) in tables {
                println!("  • {table} ({rows} rows)");
            }
        }
        Err(e) => {
            println!("⚠️  Database check failed: {e}");
            println!("💡 Try running 'migrate up' to create the schema");
        }
    }

    Ok(())
}

async fn reset_database(database_url: &str) -> Result<()> {
    let Some(db_path) = sqlite_path(database_url) else {
        return Err(anyhow!("Reset is only supported for SQLite databases"));
    };

    println!("⚠️  WARNING: This will delete ALL tasks and reminders!");
    println!("🤔 Are you sure you want to continue? (yes/no)");

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    if input.trim().to_lowercase() != "yes" {
        println!("❌ Reset cancelled.");
        return Ok(());
    }

    for suffix in ["", "-wal", "-shm"] {
        let file = format!("{db_path}{suffix}");
        if Path::new(&file).exists() {
            std::fs::remove_file(&file)?;
            println!("🗑️  Deleted {file}");
        }
    }

    println!("🔄 Recreating database schema...");
    run_migrations(database_url).await?;

    println!("✅ Database reset completed!");
    Ok(())
}

async fn import_file(database_url: &str, file: &str) -> Result<()> {
    println!("📥 Importing legacy tasks from {file}");

    let json = std::fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))?;

    let db_manager = connect(database_url).await?;
    db_manager.run_migrations().await?;

    let report = import_legacy_tasks(&db_manager.pool, &json).await?;
    println!(
        "✅ Imported {} task(s) for {} user(s), skipped {}",
        report.imported, report.users, report.skipped
    );
    Ok(())
}

async fn check_tables(db_manager: &DatabaseManager) -> Result<Vec<(String, i64)>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
    )
    .fetch_all(&db_manager.pool)
    .await?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let rows = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM \"{name}\""))
            .fetch_one(&db_manager.pool)
            .await?;
        tables.push((name, rows));
    }
    Ok(tables)
}

fn mask_url(url: &str) -> String {
    match sqlite_path(url).and_then(|path| Path::new(path).file_name()) {
        Some(filename) => format!("sqlite:.../{}", filename.to_string_lossy()),
        None => url.to_string(),
    }
}

fn print_help() {
    println!("🔧 Todo Reminder Bot - Database Migration Tool");
    println!();
    println!("USAGE:");
    println!("    migrate [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    migrate, up    Run database migrations (default)");
    println!("    check          Check database connection and schema");
    println!("    reset          Reset database (SQLite only) - DESTRUCTIVE!");
    println!("    import <file>  Import tasks from the legacy tasks_data.json file");
    println!("    help           Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    DATABASE_URL   Database connection string (default: sqlite:./data/todo.db)");
    println!();
    println!("EXAMPLES:");
    println!("    migrate                          # Run migrations");
    println!("    migrate check                    # Check database status");
    println!("    migrate import tasks_data.json   # Bring over tasks from the old bot");
    println!();
}
