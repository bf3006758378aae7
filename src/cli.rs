use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use dfb_dict::{
    AssetBundle, Dictionary, DirBundle, EngineConfig, Entry, FsBlobStore, RenderedEntry,
    SearchOutcome, ZipBundle,
};
use directories::ProjectDirs;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dfb-dict", about = "Offline Dingfubao dictionary reader", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Asset bundle: an `assets.zip` archive or an unpacked directory.
    #[arg(long, global = true, default_value = "assets.zip")]
    bundle: PathBuf,

    /// Directory for the cached entry set and search history.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML file with engine settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build or load the entry set.
    Init {
        /// Rebuild from the bundle even if a valid cache exists.
        #[arg(long)]
        force: bool,
    },
    /// List entries whose form contains the keyword, shortest first.
    Search {
        keyword: String,
        /// 1-based page to print.
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Entries per page.
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Show the rendered definition of a form.
    Show { form: String },
    /// Show the entry at a 1-based position in the lexicon.
    Select { number: usize },
    /// Show a random entry.
    Random,
    /// List recent searches.
    History {
        /// Forget all recent searches.
        #[arg(long)]
        clear: bool,
    },
    /// Serve the dictionary over HTTP.
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Public base URL used in links.
        #[arg(long)]
        base_url: Option<String>,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(execute(cli))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn execute(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Command::Search {
        page_size: Some(size),
        ..
    } = &cli.command
    {
        config.page_size = (*size).max(1);
    }

    let store = Arc::new(FsBlobStore::new(data_dir(cli.data_dir.as_deref())));
    let bundle = open_bundle(&cli.bundle).await?;
    let dict = Dictionary::open(store, bundle, config).await;

    match cli.command {
        Command::Init { force } => handle_init(&dict, force, cli.json).await,
        Command::Search { keyword, page, .. } => handle_search(&dict, keyword, page, cli.json).await,
        Command::Show { form } => handle_show(&dict, &form, cli.json).await,
        Command::Select { number } => {
            let entry = dict.cache().entry_by_number(number).await?;
            print_entry(&dict.render_entry(&entry), cli.json)
        }
        Command::Random => {
            let entry = dict.cache().random_entry().await?;
            print_entry(&dict.render_entry(&entry), cli.json)
        }
        Command::History { clear } => handle_history(&dict, clear, cli.json).await,
        #[cfg(feature = "web")]
        Command::Serve { addr, base_url } => {
            let config = dfb_dict::web::WebConfig {
                addr,
                base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
            };
            dfb_dict::web::serve(Arc::new(dict), config).await?;
            Ok(())
        }
    }
}

fn data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    ProjectDirs::from("org", "dfb", "dfb-dict")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".dfb-dict"))
}

async fn open_bundle(path: &Path) -> Result<Arc<dyn AssetBundle>, Box<dyn Error>> {
    if path.is_dir() {
        return Ok(Arc::new(DirBundle::new(path)));
    }
    let bundle = ZipBundle::open(path)
        .await
        .map_err(|err| format!("failed to open bundle {}: {err}", path.display()))?;
    Ok(Arc::new(bundle))
}

async fn handle_init(dict: &Dictionary, force: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    let set = dict.cache().ensure_ready(force).await?;
    let rebuilt = dict.cache().builds() > 0;
    if as_json {
        let payload = json!({
            "entries": set.len(),
            "version": set.schema_version,
            "rebuilt": rebuilt,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let source = if rebuilt { "lexicon" } else { "cache" };
        println!(
            "{} entries ready (schema v{}, from {source})",
            set.len(),
            set.schema_version
        );
    }
    Ok(())
}

async fn handle_search(
    dict: &Dictionary,
    keyword: String,
    page: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if keyword.trim().is_empty() {
        return Err("Search keyword cannot be empty".into());
    }
    let session = dict.search_session();
    let total = match session.search(&keyword).await? {
        SearchOutcome::Ready { total } => total,
        other => return Err(format!("search was not run: {other:?}").into()),
    };
    dict.save_history().await?;

    let page = page.max(1);
    let mut rows = Vec::new();
    for _ in 0..page {
        rows = session.load_page().unwrap_or_default();
    }
    let more = session.has_more();

    if as_json {
        let payload = json!({
            "keyword": keyword,
            "page": page,
            "page_size": session.page_size(),
            "total": total,
            "more": more,
            "results": rows.iter().map(|entry| entry.form.as_str()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_search_table(&keyword, page, total, &rows, more);
    }
    Ok(())
}

async fn handle_show(dict: &Dictionary, form: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let rendered = dict.lookup(form).await?;
    print_entry(&rendered, as_json)
}

async fn handle_history(dict: &Dictionary, clear: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    if clear {
        dict.history().clear();
        dict.save_history().await?;
    }
    let keywords = dict.history().keywords();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&keywords)?);
    } else if keywords.is_empty() {
        println!("No recent searches.");
    } else {
        for (idx, keyword) in keywords.iter().enumerate() {
            println!("{:>2}. {keyword}", idx + 1);
        }
    }
    Ok(())
}

fn print_entry(entry: &RenderedEntry, as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        if entry.found {
            println!("{}", entry.form);
        }
        println!("{}", entry.html);
    }
    Ok(())
}

fn print_search_table(keyword: &str, page: usize, total: usize, rows: &[Entry], more: bool) {
    if rows.is_empty() {
        if total == 0 {
            println!("No entries contain \"{keyword}\".");
        } else {
            println!("Page {page} is past the last of {total} matches for \"{keyword}\".");
        }
        return;
    }
    println!("Matches for \"{keyword}\" ({total} total, page {page}):");
    for entry in rows {
        println!("  {}", entry.form);
    }
    if more {
        println!("… more with --page {}", page + 1);
    }
}
