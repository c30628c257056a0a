use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rollcall_core::{Member, OutputFormat, RollcallConfig, SortField, SortOrder};
use rollcall_extract::{build_filters, HybridExtractor};
use rollcall_providers::ProviderFactory;
use rollcall_query::{render, QueryOptions, QueryPipeline};
use rollcall_search::store::content_hash;
use rollcall_search::{embedding_texts, EmbeddingVariant, MemberIndex, SearchBackend};

#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "Natural-language search over a member directory",
    long_about = "Rollcall answers questions like \"1995 mechanical batch in Chennai\" or\n\
                   \"who runs a catering business in Madurai\" against a member directory.\n\n\
                   Queries are classified, turned into structured filters by pattern matching\n\
                   (with an LLM fallback for hard queries) and answered by hybrid vector +\n\
                   full-text retrieval.\n\n\
                   Examples:\n  \
                     rollcall init                             Create a .rollcall.toml config file\n  \
                     rollcall import members.json              Embed and index a directory export\n  \
                     rollcall explain 'python devs in chennai' Show how a query is understood\n  \
                     rollcall query '1995 mechanical batch'    Search the directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .rollcall.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .rollcall.toml configuration file
    #[command(long_about = "Create a default .rollcall.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .rollcall.toml already exists.")]
    Init,
    /// Embed and index members from a JSON export
    #[command(long_about = "Embed and index members from a JSON export.\n\n\
        The file must hold a JSON array of member objects (camelCase keys).\n\
        Members whose profile is unchanged since the last import are skipped.\n\
        Requires at least one [[embedding.providers]] entry.\n\n\
        Examples:\n  rollcall import members.json\n  rollcall import export.json --config prod.toml")]
    Import {
        /// JSON file with an array of members
        file: PathBuf,
    },
    /// Show how a query is understood, without calling any provider
    #[command(long_about = "Show how a query is understood, without calling any provider.\n\n\
        Prints the detected intent, the pattern-extracted entities, whether the\n\
        LLM fallback would run and why, and the resulting search filters.\n\n\
        Example:\n  rollcall explain 'mechanical engineers from 1995 in chennai'")]
    Explain {
        /// Natural-language query
        query: String,
    },
    /// Search the member directory
    #[command(long_about = "Search the member directory with a natural-language query.\n\n\
        Runs intent detection, hybrid extraction and hybrid retrieval against the\n\
        index built by `rollcall import`.\n\n\
        Examples:\n  rollcall query 'caterers in madurai'\n  \
        rollcall query 'python developers' --sort year --order asc\n  \
        rollcall query 'batchmates' --context 'earlier asked about 1995 mechanical'")]
    Query {
        /// Natural-language query
        query: String,

        /// Results per page (default: from config)
        #[arg(long)]
        limit: Option<usize>,

        /// Page number, 1-based (default: 1)
        #[arg(long, default_value = "1")]
        page: usize,

        /// Sort field: relevance, name, year or turnover
        #[arg(long, default_value = "relevance")]
        sort: SortField,

        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,

        /// Conversation context passed to the LLM fallback
        #[arg(long)]
        context: Option<String>,
    },
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("rollcall v{version} — natural-language search over a member directory\n");

    println!("Quick start:");
    println!("  rollcall init                  Create a .rollcall.toml config file");
    println!("  rollcall import members.json   Embed and index your directory");
    println!("  rollcall query 'caterers in madurai'\n");

    println!("All commands:");
    println!("  init      Create default configuration");
    println!("  import    Embed and index members from JSON");
    println!("  explain   Show intent, entities and filters for a query (offline)");
    println!("  query     Search the directory\n");

    println!("Run 'rollcall <command> --help' for details.");
}

const DEFAULT_CONFIG: &str = r#"# Rollcall Configuration

[llm]
# timeout_secs = 15
# temperature = 0.1
# max_tokens = 512

# Completion providers, tried in order. Used only for hard queries.
# [[llm.providers]]
# name = "openai"
# model = "gpt-4o-mini"
# base_url = "https://api.openai.com/v1"
# api_key_env = "OPENAI_API_KEY"

[embedding]
# dimensions = 1536
# timeout_secs = 10
# batch_size = 64

# Embedding providers, tried in order. All must return `dimensions` floats.
# [[embedding.providers]]
# name = "openai"
# model = "text-embedding-3-small"
# api_key_env = "OPENAI_API_KEY"

[extraction]
# regex_threshold = 0.5
# intent_threshold = 0.6
# regex_weight = 0.4
# llm_weight = 0.6
# recovery_factor = 0.8
# recovery_floor = 0.3
# cache_capacity = 256

[search]
# semantic_weight = 0.7
# keyword_weight = 0.3
# candidate_limit = 100
# per_page = 10

[breaker]
# failure_threshold = 5
# cooldown_secs = 60
# max_retries = 2
# base_delay_ms = 250
# max_delay_ms = 4000

[store]
# path = ".rollcall/members.db"
"#;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "rollcall=debug,rollcall_providers=debug,rollcall_extract=debug,rollcall_search=debug,rollcall_query=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RollcallConfig> {
    let path = match path {
        Some(path) => path,
        None => {
            let default_path = Path::new(".rollcall.toml");
            if !default_path.exists() {
                debug!("no .rollcall.toml, using defaults");
                return Ok(RollcallConfig::default());
            }
            default_path
        }
    };
    debug!(path = %path.display(), "loading configuration");
    Ok(RollcallConfig::from_file(path)?)
}

fn spinner(message: &str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

async fn run_import(config: &RollcallConfig, file: &Path, format: OutputFormat) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let members: Vec<Member> = serde_json::from_str(&raw)
        .into_diagnostic()
        .wrap_err("member file must be a JSON array of member objects")?;

    let factory = ProviderFactory::from_config(config)?;
    if !factory.has_embedding_providers() {
        miette::bail!(miette::miette!(
            help = "Add an [[embedding.providers]] entry to .rollcall.toml (see `rollcall init`).",
            "no embedding providers configured"
        ));
    }
    let index = MemberIndex::open(&config.store.path)?;
    index.set_dimensions(config.embedding.dimensions)?;

    let pb = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new(members.len() as u64);
        if let Ok(style) = indicatif::ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:30}] {pos}/{len} {msg}",
        ) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    } else {
        indicatif::ProgressBar::hidden()
    };

    let (mut indexed, mut unchanged) = (0usize, 0usize);
    for member in &members {
        pb.set_message(member.name.clone());
        if index.stored_hash(&member.id)?.as_deref() == Some(content_hash(member).as_str()) {
            unchanged += 1;
            pb.inc(1);
            continue;
        }
        let texts = embedding_texts(member);
        let inputs: Vec<String> = texts.iter().map(|(_, text)| text.clone()).collect();
        let vectors = factory
            .embed(&inputs)
            .await
            .inspect_err(|_| pb.abandon_with_message("embedding failed"))?;
        let variants: Vec<EmbeddingVariant> = texts
            .iter()
            .zip(vectors)
            .map(|((kind, _), vector)| EmbeddingVariant {
                kind: (*kind).to_string(),
                vector,
            })
            .collect();
        index.upsert_member(member, &variants)?;
        indexed += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    let stats = index.stats()?;
    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "indexed": indexed,
                "unchanged": unchanged,
                "stats": stats,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).into_diagnostic()?
            );
        }
        _ => {
            println!(
                "Indexed {indexed} members ({unchanged} unchanged). Index now holds {} members, {} embeddings.",
                stats.total_members, stats.total_embeddings
            );
        }
    }
    Ok(())
}

async fn run_explain(config: &RollcallConfig, query: &str, format: OutputFormat) -> Result<()> {
    let extractor = HybridExtractor::regex_only(config.extraction.clone());
    let outcome = extractor.extract(query, None).await;
    let filters = build_filters(&outcome.extraction.entities);

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "query": query,
                "outcome": outcome,
                "filters": filters,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).into_diagnostic()?
            );
        }
        _ => {
            let intent = &outcome.intent;
            println!("Query: {query}\n");
            print!(
                "Intent: {} ({:.0}%)",
                intent.primary,
                intent.confidence * 100.0
            );
            match intent.secondary {
                Some(secondary) => println!(", secondary {secondary}"),
                None => println!(),
            }
            if !intent.matched_patterns.is_empty() {
                println!("Matched: {}", intent.matched_patterns.join(", "));
            }
            let families: Vec<String> = outcome.families.iter().map(|f| f.to_string()).collect();
            println!(
                "Regex extraction: {:.0}% ({})",
                outcome.extraction.confidence * 100.0,
                if families.is_empty() {
                    "nothing matched".to_string()
                } else {
                    families.join(", ")
                }
            );
            match outcome.fallback {
                Some(reason) => println!("LLM fallback: would run ({reason})"),
                None => println!("LLM fallback: not needed"),
            }
            println!(
                "\nEntities:\n{}",
                serde_json::to_string_pretty(&outcome.extraction.entities).into_diagnostic()?
            );
            println!(
                "\nFilters:\n{}",
                serde_json::to_string_pretty(&filters).into_diagnostic()?
            );
        }
    }
    Ok(())
}

async fn run_query(
    config: &RollcallConfig,
    query: &str,
    options: QueryOptions,
    format: OutputFormat,
) -> Result<()> {
    let factory = Arc::new(ProviderFactory::from_config(config)?);
    if !factory.has_embedding_providers() {
        miette::bail!(miette::miette!(
            help = "Add an [[embedding.providers]] entry to .rollcall.toml (see `rollcall init`).",
            "no embedding providers configured"
        ));
    }
    if !config.store.path.exists() {
        miette::bail!(miette::miette!(
            help = "Run `rollcall import <members.json>` first.",
            "no member index at {}",
            config.store.path.display()
        ));
    }
    let backend: Arc<dyn SearchBackend> = Arc::new(MemberIndex::open(&config.store.path)?);
    let pipeline = QueryPipeline::from_config(config, factory, backend);

    let pb = spinner("Searching...");
    let response = pipeline.search_with(query, &options).await.inspect_err(|_| {
        if let Some(pb) = &pb {
            pb.finish_with_message("Failed");
        }
    })?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    print!("{}", render(&response, format));
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        None => print_welcome(),
        Some(Command::Init) => {
            let path = Path::new(".rollcall.toml");
            if path.exists() {
                miette::bail!(".rollcall.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .rollcall.toml with default configuration");
        }
        Some(Command::Import { ref file }) => {
            let config = load_config(cli.config.as_deref())?;
            run_import(&config, file, cli.format).await?;
        }
        Some(Command::Explain { ref query }) => {
            let config = load_config(cli.config.as_deref())?;
            run_explain(&config, query, cli.format).await?;
        }
        Some(Command::Query {
            ref query,
            limit,
            page,
            sort,
            order,
            ref context,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let options = QueryOptions {
                max_results: limit.unwrap_or(config.search.per_page),
                page,
                sort,
                order,
                context: context.clone(),
                session: None,
            };
            run_query(&config, query, options, cli.format).await?;
        }
    }

    Ok(())
}
