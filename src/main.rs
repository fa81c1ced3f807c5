use anyhow::{Context, Result, bail};
use clap::Parser;
use log::warn;
use pkgquery::config::{Config, Overrides};
use pkgquery::pattern::Attribute;
use pkgquery::runtime::{RealRuntime, Runtime};
use pkgquery::search::{Backend, RepositoryStats, SearchRequest, Summary};
use pkgquery::state::State;
use std::path::PathBuf;
use std::sync::Arc;

/// pkgquery - search installed, repository and remote packages
///
/// Queries are lists of alternatives separated by `|`. Each alternative is a
/// list of terms that must all match. Prefix a term with `~` to negate it,
/// `=` to match it exactly or `%` to treat it as a regular expression, and
/// group terms with parentheses.
///
/// Examples:
///   pkgquery --database db.json search 'python (qt | gtk)'
///   pkgquery --database db.json search --by name,files =usr/bin/vim
#[derive(Parser, Debug)]
#[command(author, version = env!("PKGQUERY_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON snapshot of the package databases
    #[arg(long, env = "PKGQUERY_DATABASE", value_name = "PATH", global = true)]
    database: Option<PathBuf>,

    /// Remote package database (defaults to https://aur.archlinux.org)
    #[arg(long, env = "PKGQUERY_REMOTE_URL", value_name = "URL", global = true)]
    remote_url: Option<String>,

    /// Package archive (defaults to https://archive.archlinux.org)
    #[arg(long, env = "PKGQUERY_ARCHIVE_URL", value_name = "URL", global = true)]
    archive_url: Option<String>,

    /// Directory holding file list, log and package cache archives
    #[arg(long, env = "PKGQUERY_CACHE_DIR", value_name = "PATH", global = true)]
    cache_dir: Option<PathBuf>,

    /// Never contact the network
    #[arg(long, env = "PKGQUERY_OFFLINE", global = true)]
    offline: bool,

    /// Log debug output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Search packages
    Search(SearchArgs),

    /// List packages of one repository or of all databases
    List(ListArgs),

    /// List package groups
    Groups(RepoArgs),

    /// List the members of a group
    Group(GroupArgs),

    /// List the configured databases
    Repos,

    /// Show installed package counts and sizes per repository
    Stats,

    /// Look packages up by name, provided name or replaced name
    Resolve(NamesArgs),

    /// List known package files of a package, newest first
    History(NameArgs),

    /// Show log entries mentioning a package
    Log(NameArgs),

    /// Show the file list of a package
    Files(NameArgs),
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// The query text
    #[arg(value_name = "QUERY")]
    query: String,

    /// Comma separated attributes to search (name, description, provides,
    /// replaces, depends, optdepends, maintainer, files)
    #[arg(long, value_name = "KEYS", default_value = "name")]
    by: String,

    /// Comma separated filters (installed, not-installed, upgrade, downgrade,
    /// update, foreign, explicit, dependency, orphan, remote, group)
    #[arg(long, value_name = "FILTERS", default_value = "")]
    filter: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    #[arg(long, value_name = "FILTERS", default_value = "")]
    filter: String,

    #[arg(long, value_name = "NAME")]
    repo: Option<String>,
}

#[derive(clap::Args, Debug)]
struct RepoArgs {
    #[arg(long, value_name = "NAME")]
    repo: Option<String>,
}

#[derive(clap::Args, Debug)]
struct GroupArgs {
    #[arg(value_name = "GROUP")]
    name: String,

    #[arg(long, value_name = "NAME")]
    repo: Option<String>,
}

#[derive(clap::Args, Debug)]
struct NamesArgs {
    #[arg(value_name = "NAME", required = true)]
    names: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct NameArgs {
    #[arg(value_name = "NAME")]
    name: String,
}

fn format_summary(summary: &Summary) -> String {
    let mut line = format!("{}/{}", summary.repository, summary.name);
    if !summary.version.is_empty() {
        line.push(' ');
        line.push_str(&summary.version);
    }
    line.push_str(&format!(" [{}]", summary.state));
    line
}

fn format_stats(stats: &RepositoryStats) -> String {
    format!("{} {} {}", stats.repository, stats.count, stats.size)
}

fn print_summaries(summaries: &[Summary]) {
    for summary in summaries {
        println!("{}", format_summary(summary));
    }
}

async fn initialize(backend: &Backend, offline: bool) {
    if offline {
        return;
    }
    if let Err(e) = backend.initialize().await {
        warn!("Could not load remote package metadata: {}", e);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let runtime: Arc<dyn Runtime> = Arc::new(RealRuntime);
    let overrides = Overrides {
        database: cli.database,
        remote_url: cli.remote_url,
        archive_url: cli.archive_url,
        cache_dir: cli.cache_dir,
        offline: cli.offline,
    };
    let config = Config::load(runtime.as_ref(), overrides)?;
    let backend = config.backend(runtime)?;

    match cli.command {
        Commands::Search(args) => {
            let keys = Attribute::parse_list(&args.by)?;
            let filter = State::parse_list(&args.filter)?;
            if keys.contains(&Attribute::Files)
                && filter.intersects(State::NON_INSTALLED)
                && !backend.cache().has_files()
            {
                warn!("No file list archives in the cache; only installed packages have file lists");
            }
            initialize(&backend, config.offline).await;
            let request = SearchRequest::new(args.query)
                .with_keys(keys)
                .with_filter(filter);
            let found = backend.search(request).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                print_summaries(&found);
            }
        }
        Commands::List(args) => {
            let filter = State::parse_list(&args.filter)?;
            initialize(&backend, config.offline).await;
            print_summaries(&backend.list_packages(filter, args.repo).await?);
        }
        Commands::Groups(args) => {
            print_summaries(&backend.list_groups(args.repo).await?);
        }
        Commands::Group(args) => {
            print_summaries(&backend.list_group(args.repo, Some(args.name)).await?);
        }
        Commands::Repos => {
            for repository in backend.list_repositories().await? {
                println!("{}", repository);
            }
        }
        Commands::Stats => {
            initialize(&backend, config.offline).await;
            for stats in backend.statistics().await? {
                println!("{}", format_stats(&stats));
            }
        }
        Commands::Resolve(args) => {
            initialize(&backend, config.offline).await;
            print_summaries(&backend.list_targets(args.names).await?);
        }
        Commands::History(args) => {
            let package = backend
                .resolve(&args.name)
                .await?
                .with_context(|| format!("Package not found: {}", args.name))?;
            let arch = if package.arch.is_empty() {
                "any"
            } else {
                package.arch.as_str()
            };
            let history = backend.cache().history(arch, &[package.name.clone()]).await;
            for path in history.into_iter().flatten() {
                println!("{}", path);
            }
        }
        Commands::Log(args) => match backend.cache().log(&[args.name.clone()]) {
            Some(log) => println!("{}", log),
            None => bail!("No log entries for {}", args.name),
        },
        Commands::Files(args) => {
            let package = backend
                .resolve(&args.name)
                .await?
                .with_context(|| format!("Package not found: {}", args.name))?;
            match backend.cache().files(&package) {
                Some(files) => println!("{}", files.trim_end()),
                None => bail!("No file list available for {}", args.name),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
    run(cli).await
}
