use std::path::PathBuf;

use tokio_postgres::NoTls;

/// Applies `schema/*.sql` in file-name order against `DATABASE_URL`.
/// Every file is written to be re-runnable.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let conn_str = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "host=127.0.0.1 user=postgres dbname=postgres".into());
    let schema_dir = std::env::var("SCHEMA_DIR").unwrap_or_else(|_| "schema".into());

    let pattern = format!("{}/*.sql", schema_dir.trim_end_matches('/'));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
    files.sort();

    if files.is_empty() {
        eprintln!("No schema files matched '{}'.", pattern);
        return Ok(());
    }

    println!("Connecting to Postgres to apply {} schema file(s)...", files.len());

    let (mut client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    for file in &files {
        let sql = std::fs::read_to_string(file)?;
        let tx = client.transaction().await?;
        match tx.batch_execute(&sql).await {
            Ok(()) => {
                tx.commit().await?;
                println!("Applied {}", file.display());
            }
            Err(e) => {
                eprintln!("Failed to apply {}: {}", file.display(), e);
                tx.rollback().await?;
                return Err(e.into());
            }
        }
    }

    println!("Schema is up to date.");
    Ok(())
}
