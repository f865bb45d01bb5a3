mod config;
use clap::{Parser, Subcommand};
use config::Config;
use folio_core::{
    BookUpdate, ChapterUpdate, CreateBookRequest, CreateChapterRequest, FolioError, PageUpdate,
    Result, VersionStore,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Versioned page storage for books, chapters and pages")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage books
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },
    /// Manage chapters
    Chapter {
        #[command(subcommand)]
        command: ChapterCommand,
    },
    /// Manage pages and their versions
    Page {
        #[command(subcommand)]
        command: PageCommand,
    },
    /// Reconcile pages, versions and blobs
    Check {
        /// Delete orphan blobs and ledger entries of deleted pages
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Subcommand)]
enum BookCommand {
    /// Create a book with its index page
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Content of the index page
        #[arg(long)]
        index_content: Option<String>,
        /// Number of empty pages to create
        #[arg(long, default_value_t = 0)]
        initial_pages: usize,
        #[arg(long)]
        editor: Option<String>,
    },
    /// Show a book with its index page and chapters
    Show { id: String },
    List,
    /// Update title or description
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete the book record; its pages are kept
    Delete { id: String },
}

#[derive(Subcommand)]
enum ChapterCommand {
    Create {
        book_id: String,
        title: String,
        /// Position in the book; defaults to the end
        #[arg(long)]
        order: Option<i64>,
    },
    /// Show a chapter with its pages
    Show { id: String },
    List { book_id: String },
    /// Rename or move a chapter
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        order: Option<i64>,
    },
    /// Delete the chapter record; its pages are kept
    Delete { id: String },
}

#[derive(Subcommand)]
enum PageCommand {
    Create {
        book_id: String,
        title: String,
        #[arg(long)]
        chapter: Option<String>,
        #[arg(long)]
        index: bool,
        #[command(flatten)]
        content: ContentArgs,
        #[arg(long)]
        editor: Option<String>,
    },
    Show { id: String },
    List {
        #[arg(long, conflicts_with = "chapter")]
        book: Option<String>,
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Print the current content
    Content { id: String },
    /// Change title and/or content; content always creates a version
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        content: ContentArgs,
        #[arg(long)]
        editor: Option<String>,
    },
    Delete { id: String },
    /// List versions, newest first
    History { id: String },
    /// Print the content of one version
    Version { id: String, number: i64 },
    /// Copy an old version into a new one
    Restore {
        id: String,
        number: i64,
        #[arg(long)]
        editor: Option<String>,
    },
}

#[derive(clap::Args)]
struct ContentArgs {
    /// Inline content
    #[arg(long, conflicts_with = "file")]
    content: Option<String>,
    /// Read content from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ContentArgs {
    async fn resolve(self) -> Result<Option<String>> {
        match (self.content, self.file) {
            (Some(content), _) => Ok(Some(content)),
            (None, Some(path)) => Ok(Some(tokio::fs::read_to_string(path).await?)),
            (None, None) => Ok(None),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = Config::load(cli.config.as_deref());
    let log_level = match &cfg {
        Ok(cfg) => cfg.log_level.clone(),
        Err(_) => "folio=info".to_string(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = match cfg {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let store = match VersionStore::open_layout(&cfg.storage.layout()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &store, &cfg).await {
        tracing::error!("{}", e);
        std::process::exit(if e.is_not_found() { 2 } else { 1 });
    }
}

async fn run(command: Commands, store: &VersionStore, cfg: &Config) -> Result<()> {
    let editor = |name: Option<String>| name.unwrap_or_else(|| cfg.default_editor.clone());

    match command {
        Commands::Book { command } => run_book(command, store, editor).await,
        Commands::Chapter { command } => run_chapter(command, store),
        Commands::Page { command } => run_page(command, store, editor).await,
        Commands::Check { repair } => {
            let report = store.check_integrity(repair).await?;
            print_json(&report)
        }
    }
}

async fn run_book(
    command: BookCommand,
    store: &VersionStore,
    editor: impl Fn(Option<String>) -> String,
) -> Result<()> {
    let hierarchy = store.hierarchy();

    match command {
        BookCommand::Create {
            title,
            description,
            index_content,
            initial_pages,
            editor: editor_name,
        } => {
            let book = hierarchy
                .create_book(CreateBookRequest {
                    title,
                    description,
                    index_content,
                    initial_pages,
                    editor_name: editor(editor_name),
                })
                .await?;
            print_json(&book)
        }
        BookCommand::Show { id } => print_json(&hierarchy.get_book_details(&id)?),
        BookCommand::List => print_json(&hierarchy.list_books()?),
        BookCommand::Update {
            id,
            title,
            description,
        } => print_json(&hierarchy.update_book(&id, BookUpdate { title, description })?),
        BookCommand::Delete { id } => {
            let deleted = hierarchy.delete_book(&id)?;
            print_json(&json!({ "id": id, "deleted": deleted }))
        }
    }
}

fn run_chapter(command: ChapterCommand, store: &VersionStore) -> Result<()> {
    let hierarchy = store.hierarchy();

    match command {
        ChapterCommand::Create {
            book_id,
            title,
            order,
        } => print_json(&hierarchy.create_chapter(CreateChapterRequest {
            book_id,
            title,
            order,
        })?),
        ChapterCommand::Show { id } => print_json(&hierarchy.get_chapter_with_pages(&id)?),
        ChapterCommand::List { book_id } => print_json(&hierarchy.list_chapters(&book_id)?),
        ChapterCommand::Update { id, title, order } => {
            print_json(&hierarchy.update_chapter(&id, ChapterUpdate { title, order })?)
        }
        ChapterCommand::Delete { id } => {
            let deleted = hierarchy.delete_chapter(&id)?;
            print_json(&json!({ "id": id, "deleted": deleted }))
        }
    }
}

async fn run_page(
    command: PageCommand,
    store: &VersionStore,
    editor: impl Fn(Option<String>) -> String,
) -> Result<()> {
    match command {
        PageCommand::Create {
            book_id,
            title,
            chapter,
            index,
            content,
            editor: editor_name,
        } => {
            let content = content.resolve().await?.unwrap_or_default();
            let page = store
                .create_page(
                    &title,
                    &content,
                    &book_id,
                    chapter.as_deref(),
                    index,
                    &editor(editor_name),
                )
                .await?;
            print_json(&page)
        }
        PageCommand::Show { id } => print_json(&store.get_page(&id)?),
        PageCommand::List { book, chapter } => {
            let pages = match (book, chapter) {
                (Some(book_id), _) => store.list_pages_by_book(&book_id)?,
                (None, Some(chapter_id)) => store.list_pages_by_chapter(&chapter_id)?,
                (None, None) => store.list_pages()?,
            };
            print_json(&pages)
        }
        PageCommand::Content { id } => {
            let content = store.get_current_content(&id).await?;
            print_json(&json!({ "pageId": id, "content": content }))
        }
        PageCommand::Update {
            id,
            title,
            content,
            editor: editor_name,
        } => {
            let content = content.resolve().await?;
            if title.is_none() && content.is_none() {
                return Err(FolioError::InvalidRequest(
                    "nothing to update: pass --title, --content or --file".to_string(),
                ));
            }
            let page = store
                .update_page(&id, PageUpdate { title, content }, &editor(editor_name))
                .await?;
            print_json(&page)
        }
        PageCommand::Delete { id } => {
            let deleted = store.delete_page(&id).await?;
            print_json(&json!({ "id": id, "deleted": deleted }))
        }
        PageCommand::History { id } => print_json(&store.list_version_history(&id)?),
        PageCommand::Version { id, number } => {
            let content = store.get_version_content(&id, number).await?;
            print_json(&json!({ "pageId": id, "versionNumber": number, "content": content }))
        }
        PageCommand::Restore {
            id,
            number,
            editor: editor_name,
        } => {
            let restored = store
                .restore_version(&id, number, &editor(editor_name))
                .await?;
            print_json(&restored)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
