//! docrag CLI - Command-line interface for document collections and
//! conversations.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ulid::Ulid;

use docrag_core::{FileType, RagConfig, UserId};
use docrag_service::{AskParams, CollectionParams, DocRagService, SendParams, ToolResult};

/// docrag - Ask questions about your documents
#[derive(Parser)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: user config dir, then ./docrag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User the command acts for
    #[arg(short, long, global = true, default_value = "1")]
    user: UserId,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories, databases and a default config file
    Init,

    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Upload a file (or the supported files of a directory) into a collection
    Upload {
        /// Collection ID
        collection: Ulid,

        /// File or directory to upload
        path: PathBuf,

        /// Recursively process directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Run ingestion again for a document
    Reingest {
        /// Document ID
        document: Ulid,
    },

    /// Delete a document
    DeleteDocument {
        /// Document ID
        document: Ulid,
    },

    /// Ask a question about a collection's documents
    Ask {
        /// Collection ID
        collection: Ulid,

        /// The question
        query: String,
    },

    /// Manage conversations
    Thread {
        #[command(subcommand)]
        action: ThreadAction,
    },

    /// Send a message to a conversation
    Send {
        /// Conversation ID
        thread: Ulid,

        /// Message text
        message: String,

        /// Answer from this collection's documents
        #[arg(long)]
        collection: Option<Ulid>,
    },

    /// Show statistics
    Stats {
        /// Include every user
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List collections
    List {
        /// Only collections with processed documents
        #[arg(long)]
        processed: bool,
    },

    /// Create a new collection
    Create {
        /// Collection name
        name: String,

        /// Description
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a collection and everything in it
    Delete {
        /// Collection ID
        id: Ulid,
    },

    /// Show a collection and its documents
    Show {
        /// Collection ID
        id: Ulid,
    },
}

#[derive(Subcommand)]
enum ThreadAction {
    /// Start a new conversation
    New,

    /// List recent conversations
    List,

    /// Show a conversation's messages
    Show {
        /// Conversation ID
        id: Ulid,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: Ulid,
    },

    /// Delete all conversations
    Clear,
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&Path>) -> Result<RagConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::load_default()?,
    })
}

/// Print a result, exiting with status 1 on failure.
fn report(result: ToolResult) {
    if result.success {
        println!("{}", result.message);
        if let Some(id) = result.id {
            println!("ID: {}", id);
        }
    } else {
        eprintln!("Error: {}", result.message);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let user = cli.user;

    if let Commands::Init = cli.command {
        return init(&config, cli.config.as_deref());
    }

    let service = DocRagService::open(&config)?;

    match cli.command {
        Commands::Init => {}
        Commands::Collection { action } => match action {
            CollectionAction::List { processed: false } => {
                report(service.list_collections(user).await);
            }
            CollectionAction::List { processed: true } => {
                report(service.list_collections_with_processed(user).await);
            }
            CollectionAction::Create { name, description } => {
                report(
                    service
                        .create_collection(user, CollectionParams { name, description })
                        .await,
                );
            }
            CollectionAction::Delete { id } => {
                report(service.delete_collection(user, id).await);
            }
            CollectionAction::Show { id } => {
                report(service.show_collection(user, id).await);
            }
        },
        Commands::Upload {
            collection,
            path,
            recursive,
        } => {
            upload(&service, user, collection, &path, recursive).await?;
        }
        Commands::Reingest { document } => {
            report(service.reingest(user, document).await);
        }
        Commands::DeleteDocument { document } => {
            report(service.delete_document(user, document).await);
        }
        Commands::Ask { collection, query } => {
            report(
                service
                    .ask(
                        user,
                        AskParams {
                            collection_id: collection,
                            query,
                        },
                    )
                    .await,
            );
        }
        Commands::Thread { action } => match action {
            ThreadAction::New => report(service.create_thread(user).await),
            ThreadAction::List => report(service.list_threads(user).await),
            ThreadAction::Show { id } => report(service.show_thread(user, id).await),
            ThreadAction::Delete { id } => report(service.delete_thread(user, id).await),
            ThreadAction::Clear => report(service.clear_threads(user).await),
        },
        Commands::Send {
            thread,
            message,
            collection,
        } => {
            report(
                service
                    .send_message(
                        user,
                        SendParams {
                            thread_id: thread,
                            content: message,
                            collection_id: collection,
                        },
                    )
                    .await,
            );
        }
        Commands::Stats { all } => {
            report(service.stats(if all { None } else { Some(user) }).await);
        }
    }

    Ok(())
}

fn init(config: &RagConfig, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let _service = DocRagService::open(config)?;
    println!("Database: {}", config.storage.database_path.display());
    println!("Index: {}", config.storage.index_path.display());
    println!("Files: {}", config.storage.blob_dir.display());

    let target = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => dirs::config_dir().map(|dir| dir.join("docrag").join("config.toml")),
    };

    if let Some(path) = target.filter(|p| !p.exists()) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(config)?)?;
        println!("Wrote config: {}", path.display());
    }

    Ok(())
}

async fn upload(
    service: &DocRagService,
    user: UserId,
    collection: Ulid,
    path: &Path,
    recursive: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = collect_files(path, recursive)?;

    if files.is_empty() {
        println!("No supported files found at: {}", path.display());
        return Ok(());
    }

    println!("Uploading {} file(s)...", files.len());

    let mut success_count = 0;
    let mut error_count = 0;

    for file_path in files {
        let bytes = match fs::read(&file_path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("  Error reading {}: {}", file_path.display(), e);
                error_count += 1;
                continue;
            }
        };

        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = service.upload_document(user, collection, &filename, &bytes).await;
        let id = result.id.map(|id| format!(" [{}]", id)).unwrap_or_default();
        if result.success {
            println!("  {}{} - {}", file_path.display(), id, result.message);
            success_count += 1;
        } else {
            eprintln!("  {}{} - Error: {}", file_path.display(), id, result.message);
            error_count += 1;
        }
    }

    println!("\nComplete: {} succeeded, {} failed", success_count, error_count);

    Ok(())
}

fn collect_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();

    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();

            if entry_path.is_file() && is_supported_file(&entry_path) {
                files.push(entry_path);
            } else if entry_path.is_dir() && recursive {
                files.extend(collect_files(&entry_path, recursive)?);
            }
        }
        files.sort();
    }

    Ok(files)
}

fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(FileType::from_extension)
        .is_some()
}
