use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ftacrawl::types::{Direction, JurisdictionQuery, TaxonomyNode};
use ftacrawl::utils::{JurisdictionDirectory, default_output_path};
use ftacrawl::writer::write_csv;
use ftacrawl::{Crawler, FetchConfig, WebScraper};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "ftacrawl")]
#[command(about = "A fta.moit.gov.vn tariff schedule crawler", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        long,
        value_name = "DIR",
        default_value = ".data",
        global = true,
        help = "Directory for cached pages and listings"
    )]
    cache_dir: PathBuf,

    #[arg(
        long,
        default_value = "https://fta.moit.gov.vn",
        global = true,
        help = "Base URL of the tariff site"
    )]
    base_url: String,

    #[arg(
        long,
        value_name = "MS",
        default_value_t = 0,
        global = true,
        help = "Pause before every network request"
    )]
    delay_ms: u64,

    #[arg(long, env = "FTA_USER_AGENT", global = true, help = "User agent to send")]
    user_agent: Option<String>,

    #[arg(
        long,
        env = "FTA_COOKIE",
        hide_env_values = true,
        global = true,
        help = "Cookie header to send, e.g. copied from a browser session"
    )]
    cookie: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a commodity-code tree and export one CSV per jurisdiction and direction
    Crawl {
        #[arg(
            long,
            value_name = "FILE",
            help = "JSON listing of the tree's top nodes; '{dir}' and '{country}' are substituted"
        )]
        source: String,

        #[arg(short = 'e', long, help = "Process export schedules")]
        export: bool,

        #[arg(short = 'i', long, help = "Process import schedules")]
        import: bool,

        #[arg(long, value_name = "DIR", default_value = ".", help = "Where CSV files are written")]
        out_dir: PathBuf,

        #[arg(required = true, help = "Jurisdiction ids or names")]
        jurisdictions: Vec<JurisdictionQuery>,
    },
    /// Extract one saved detail page
    Parse {
        #[arg(help = "Path of the HTML file")]
        file: PathBuf,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// List the jurisdictions the site publishes schedules for
    Jurisdictions {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn load_roots(path: &Path) -> Result<Vec<TaxonomyNode>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid listing {}: {}", path.display(), e))
}

fn source_path(template: &str, direction: Direction, country: u32) -> PathBuf {
    PathBuf::from(
        template
            .replace("{dir}", direction.slug())
            .replace("{country}", &country.to_string()),
    )
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let defaults = FetchConfig::default();
    let config = FetchConfig {
        base_url: cli.base_url,
        cache_dir: cli.cache_dir,
        request_delay: Duration::from_millis(cli.delay_ms),
        user_agent: cli.user_agent.unwrap_or(defaults.user_agent.clone()),
        cookie: cli.cookie,
        ..defaults
    };

    let scraper = WebScraper::with_config(config).unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    let mut directory = JurisdictionDirectory::new();

    match cli.command {
        Commands::Crawl {
            source,
            export,
            import,
            out_dir,
            jurisdictions,
        } => {
            let directions: Vec<Direction> = [(export, Direction::Export), (import, Direction::Import)]
                .into_iter()
                .filter_map(|(wanted, direction)| wanted.then_some(direction))
                .collect();

            if directions.is_empty() {
                log::error!("Invalid args: pass --export and/or --import");
                process::exit(1);
            }

            for query in &jurisdictions {
                let jurisdiction = directory
                    .resolve(&scraper, query)
                    .await
                    .unwrap_or_else(|e| {
                        log::error!("Error resolving jurisdiction: {}", e);
                        process::exit(1);
                    });

                for direction in &directions {
                    let listing = source_path(&source, *direction, jurisdiction.id);
                    log::info!(
                        "Crawling {} schedule for {} from {}",
                        direction,
                        jurisdiction.name,
                        listing.display()
                    );

                    let roots = load_roots(&listing).unwrap_or_else(|e| {
                        log::error!("Error loading listing: {}", e);
                        process::exit(1);
                    });

                    let outcome = Crawler::new(&scraper).run(roots).await;

                    let path = out_dir.join(default_output_path(*direction, &jurisdiction));
                    write_csv(&outcome.result, &path).unwrap_or_else(|e| {
                        log::error!("Error writing {}: {}", path.display(), e);
                        process::exit(1);
                    });

                    println!("{} -> {}", jurisdiction.name, path.display());
                    print!("{}", outcome.stats);
                }
            }
        }

        Commands::Parse { file, format } => {
            let html = std::fs::read_to_string(&file).unwrap_or_else(|e| {
                log::error!("Error reading {}: {}", file.display(), e);
                process::exit(1);
            });

            let page = ftacrawl::parser::extract(&html).unwrap_or_else(|e| {
                log::error!("Error extracting {}: {}", file.display(), e);
                process::exit(1);
            });

            let code = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = page.into_record(code);

            match format {
                OutputFormat::Json => serialize_json(&record),
                OutputFormat::Text => print!("{}", record),
            }
        }

        Commands::Jurisdictions { format } => {
            let known = directory.list(&scraper).await.unwrap_or_else(|e| {
                log::error!("Error fetching jurisdictions: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&known),
                OutputFormat::Text => {
                    if known.is_empty() {
                        println!("No jurisdictions found.");
                    } else {
                        for jurisdiction in known {
                            println!("{}", jurisdiction);
                        }
                    }
                }
            }
        }
    }
}
