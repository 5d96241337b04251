use clap::{Parser, Subcommand};
use idbscan::{log, manifest, record_log, table, Catalog, Database, ReadOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "idbscan", version, about = "Inspect Chromium IndexedDB / LevelDB stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a LevelDB folder: merged entries after log overlay and purge
    Db { path: PathBuf },
    /// Inspect a Chromium IndexedDB folder: databases, stores, entries
    Idb {
        path: PathBuf,
        /// Decoded entries to print per object store
        #[arg(short, long, default_value = "3")]
        sample: usize,
    },
    /// Inspect a single table file (.ldb)
    Table { path: PathBuf },
    /// Inspect a single write-ahead log file (.log)
    Log { path: PathBuf },
    /// Inspect a manifest file
    Manifest { path: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {

        // ── Db ───────────────────────────────────────────────────────────────
        Commands::Db { path } => {
            let db = Database::open(&path)?;
            println!("── LevelDB snapshot ─────────────────────────────────────");
            println!("  Path             {}", db.path.display());
            println!("  Comparator       {}", db.manifest.comparator_name);
            println!("  Live tables      {}", db.manifest.live_files.len());
            println!("  Entries          {}", db.entries.len());
            println!("  Deleted entries  {}", db.deleted_entries.len());
            println!("  Meta entries     {}", db.meta_entries.len());
            warn_unused(&db);

            println!("First {} entries:", db.entries.len().min(10));
            for (key, value) in db.entries.iter().take(10) {
                println!("  {}: {}", preview(key), preview(value));
            }
        }

        // ── Idb ──────────────────────────────────────────────────────────────
        Commands::Idb { path, sample } => {
            let db = Database::open(&path)?;
            warn_unused(&db);
            let catalog = Catalog::new(&db);

            for idb_db in catalog.databases()? {
                println!("DB: name={}, id={}, origin={}", idb_db.name, idb_db.id, idb_db.origin);
                for store in &idb_db.stores {
                    let (live, deleted) = catalog.entries(idb_db.id, store.id)?;
                    println!(
                        "  Store: name={}, id={}  ({} entries, {} deleted)",
                        store.name, store.id, live.len(), deleted.len()
                    );
                    for entry in live.iter().take(sample) {
                        println!(
                            "    {} → {}",
                            serde_json::to_string(&entry.key)?,
                            serde_json::to_string(&entry.value)?
                        );
                    }
                }
            }
        }

        // ── Table ────────────────────────────────────────────────────────────
        Commands::Table { path } => {
            let contents = table::decode_table(&std::fs::read(&path)?, &ReadOptions::default())?;
            println!("── Table file ───────────────────────────────────────────");
            println!("  Entries          {}", contents.entries.len());
            println!("  Deleted entries  {}", contents.deleted_entries.len());
            println!("  Meta entries     {}", contents.meta_entries.len());
            for (key, value) in contents.entries.iter().take(10) {
                println!("  {}: {}", preview(key), preview(value));
            }
        }

        // ── Log ──────────────────────────────────────────────────────────────
        Commands::Log { path } => {
            let data = std::fs::read(&path)?;
            let records = record_log::read_records(&data)?;
            let contents = log::decode_log(&data)?;
            println!("── Log file ─────────────────────────────────────────────");
            println!("  Records          {}", records.len());
            println!("  Entries          {}", contents.live.len());
            println!("  Deletions        {}", contents.tombstones.len());
            for (key, value) in contents.live.iter().take(10) {
                println!("  {}: {}", preview(key), preview(value));
            }
        }

        // ── Manifest ─────────────────────────────────────────────────────────
        Commands::Manifest { path } => {
            let m = manifest::decode_manifest(&std::fs::read(&path)?)?;
            println!("── Manifest ─────────────────────────────────────────────");
            println!("  Comparator       {}", m.comparator_name);
            println!("  Log number       {}", fmt_missing(m.log_number));
            println!("  Prev log number  {}", fmt_missing(m.prev_log_number));
            println!("  Next file number {}", fmt_missing(m.next_file_number));
            println!("  Last sequence    {}", fmt_missing(m.last_sequence));
            println!(
                "  Deleted files    {:?}",
                m.deleted_files.iter().map(|f| (f.level, f.number)).collect::<Vec<_>>()
            );
            println!(
                "  New files        {:?}",
                m.new_files.iter().map(|f| (f.level, f.number, f.size)).collect::<Vec<_>>()
            );
            println!("  Live files       {:?}", m.live_files);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn warn_unused(db: &Database) {
    if !db.unused_files.is_empty() {
        eprintln!("warning: found but did not process: {:?}", db.unused_files);
    }
}

/// Short printable rendering of raw bytes: quoted when ASCII, hex otherwise.
fn preview(bytes: &[u8]) -> String {
    const LIMIT: usize = 48;
    let head = &bytes[..bytes.len().min(LIMIT)];
    let ellipsis = if bytes.len() > LIMIT { "…" } else { "" };
    if head.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        format!("\"{}\"{}", String::from_utf8_lossy(head), ellipsis)
    } else {
        format!("0x{}{}", hex::encode(head), ellipsis)
    }
}

fn fmt_missing(v: Option<u64>) -> String {
    v.map_or_else(|| "<missing>".to_owned(), |n| n.to_string())
}
