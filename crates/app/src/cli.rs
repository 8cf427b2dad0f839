use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::warn;

use services::{AppConfig, ProgressSettings};
use storage::tiered::StorageOptions;

/// Self-paced learning path checklist.
#[derive(Debug, Parser)]
#[command(name = "learnpath")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Curriculum file (YAML)
    #[arg(long, global = true, env = "LEARNPATH_CONTENT", default_value = "learning-path.yaml")]
    pub content: PathBuf,

    /// SQLite database for durable progress
    #[arg(long = "db", global = true, env = "LEARNPATH_DB_URL", default_value = "sqlite:learnpath.sqlite3")]
    pub db_url: String,

    /// Directory for the session fallback file (defaults to the temp dir)
    #[arg(long, global = true, env = "LEARNPATH_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Keep progress in memory only; nothing is written to disk
    #[arg(long, global = true)]
    pub memory_only: bool,

    /// Tick a chapter once all of its exercises are done
    #[arg(long, global = true, env = "LEARNPATH_AUTO_COMPLETE")]
    pub auto_complete_chapters: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the learning path with completion
    Show(ShowArgs),

    /// Mark or unmark a chapter or exercise
    #[command(subcommand)]
    Toggle(ToggleTarget),

    /// Completion statistics
    Stats,

    /// Write progress to a JSON file
    Export(ExportArgs),

    /// Replace progress with an exported file (`-` reads stdin)
    Import { file: PathBuf },

    /// Clear all progress (a backup is taken first)
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Replace progress with the last backup
    Restore {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Save a backup of the current progress
    Backup,

    /// List optional modules
    Optional,

    /// Show storage diagnostics
    Doctor,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Include chapters and exercises
    #[arg(long)]
    pub expand: bool,

    /// Only show this phase
    #[arg(long)]
    pub phase: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ToggleTarget {
    /// A chapter's own checkbox
    Chapter { module: String, chapter: String },
    /// One exercise, by 0-based position in its chapter
    Exercise {
        module: String,
        chapter: String,
        index: usize,
    },
    /// A raw progress key
    Key { key: String },
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Output file (defaults to fullstack-learning-progress-YYYY-MM-DD.json)
    #[arg(long, conflicts_with = "stdout")]
    pub out: Option<PathBuf>,

    /// Print to stdout instead of writing a file
    #[arg(long)]
    pub stdout: bool,
}

impl Cli {
    /// Turn flags into service configuration.
    ///
    /// A database path that cannot be prepared drops the durable tier with
    /// a warning rather than failing.
    pub fn app_config(&self) -> AppConfig {
        let storage = if self.memory_only {
            StorageOptions::memory_only()
        } else {
            let db_url = normalize_sqlite_url(&self.db_url);
            let db_url = match prepare_sqlite_file(&db_url) {
                Ok(()) => Some(db_url),
                Err(err) => {
                    warn!(db_url = %db_url, error = %err, "skipping durable storage");
                    None
                }
            };
            StorageOptions {
                db_url,
                session_dir: Some(
                    self.session_dir
                        .clone()
                        .unwrap_or_else(std::env::temp_dir),
                ),
            }
        };

        AppConfig {
            content_path: self.content.clone(),
            storage,
            progress: ProgressSettings::default(),
            auto_complete_chapters: self.auto_complete_chapters,
        }
    }
}

/// Rewrite `sqlite:relative/path` forms into absolute `sqlite://` URLs.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:"
        || trimmed.starts_with("sqlite://")
        || trimmed.contains("mode=memory")
    {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its parent directories if missing.
///
/// In-memory URLs are left alone.
///
/// # Errors
///
/// Returns an error if the URL has no file path or the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        anyhow::bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}
