use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use skillminer::cli::{self, Overrides};

#[derive(Parser)]
#[command(name = "skillminer", version)]
#[command(about = "Mine structured IT skill and domain records from the web with an LLM", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to config file (defaults to ./skillminer.toml or ~/.config/skillminer/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override LLM model (e.g., "gpt-4o-mini", "llama3-8b-8192")
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override LLM provider (anthropic, openai, openai-compatible)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Override LLM base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Use mock LLM client and fixed search results
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a free-text query and extract a skill or a domain's skills
    Query {
        /// e.g. "what is python" or "essential skills for data science" (prompted if omitted)
        query: Option<String>,
    },

    /// Extract details for a single skill
    Skill {
        /// Skill name (prompted if omitted)
        name: Option<String>,

        /// Record schema: skill, subdomain, subdomain-skills
        #[arg(long, default_value = "skill")]
        schema: String,
    },

    /// Required skills of a domain, with details for the first few
    Domain {
        /// Domain name (prompted if omitted)
        domain: Option<String>,
    },

    /// Subdomains of a domain, with details, written to a report file
    Subdomains {
        /// Domain name (prompted if omitted)
        domain: Option<String>,

        /// Output file path
        #[arg(short = 'o', long, default_value = "final_subdomains_output.json")]
        output: PathBuf,
    },

    /// Refresh a domain's subdomains in the JSON store
    UpdateDomain {
        /// Domain name (prompted if omitted)
        domain: Option<String>,
    },

    /// Refresh a domain's required skills in the CSV store
    UpdateSkills {
        /// Domain name (prompted if omitted)
        domain: Option<String>,
    },

    /// Validate configuration without running anything
    ConfigCheck,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let overrides = cli.global.overrides();
    let config = cli.global.config;
    let dry_run = cli.global.dry_run;

    match cli.command {
        Commands::Query { query } => {
            cli::extract::run_query(query, config, overrides, dry_run).await?;
        }
        Commands::Skill { name, schema } => {
            cli::extract::run_skill(name, schema, config, overrides, dry_run).await?;
        }
        Commands::Domain { domain } => {
            cli::extract::run_domain(domain, config, overrides, dry_run).await?;
        }
        Commands::Subdomains { domain, output } => {
            cli::extract::run_subdomains(domain, output, config, overrides, dry_run).await?;
        }
        Commands::UpdateDomain { domain } => {
            cli::update::run_domain(domain, config, overrides, dry_run).await?;
        }
        Commands::UpdateSkills { domain } => {
            cli::update::run_skills(domain, config, overrides, dry_run).await?;
        }
        Commands::ConfigCheck => {
            cli::config_check::run(config)?;
        }
    }

    Ok(())
}
