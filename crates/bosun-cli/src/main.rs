//! Bosun CLI - Ordered Kubernetes deployments with live health status

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use commands::charts::ChartsArgs;
use commands::deploy::{DeployArgs, PullSecret};
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "bosun")]
#[command(author = "Bosun Contributors")]
#[command(version)]
#[command(about = "Ordered Kubernetes deployments with live health status", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Engine configuration file
    #[arg(long, global = true, env = "BOSUN_CONFIG")]
    config: Option<PathBuf>,

    /// Target namespace (overrides the configuration)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the creation (or deletion) plan for manifests
    Plan {
        /// Manifest files ('-' for stdin)
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Show the deletion plan instead
        #[arg(long)]
        deletion: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a new sequence would delete
    Diff {
        /// Manifests of the running sequence
        #[arg(long)]
        previous: PathBuf,

        /// Manifests of the new sequence
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deploy a new sequence of an application
    Deploy {
        /// Application ID
        app: String,

        /// Sequence number of this deploy
        #[arg(short, long)]
        sequence: i64,

        /// Manifest files ('-' for stdin)
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Manifests of the running sequence, used to delete what is gone
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Owner slug recorded on applied resources (defaults to the app ID)
        #[arg(long)]
        owner: Option<String>,

        /// Skip the server-side dry run
        #[arg(long)]
        no_dry_run: bool,

        /// Name of an image pull secret to create before applying
        #[arg(long, requires = "registry")]
        pull_secret: Option<String>,

        /// Registry host for the pull secret
        #[arg(long)]
        registry: Option<String>,

        /// Registry username for the pull secret
        #[arg(long, env = "BOSUN_REGISTRY_USERNAME")]
        registry_username: Option<String>,

        /// Registry password for the pull secret
        #[arg(long, env = "BOSUN_REGISTRY_PASSWORD", hide_env_values = true)]
        registry_password: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove an application
    Undeploy {
        /// Application ID
        app: String,

        /// Manifests of the running sequence
        #[arg(long)]
        previous: PathBuf,

        /// Namespaces to empty after deleting (repeatable)
        #[arg(long = "clear-namespace")]
        clear_namespaces: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream the health status of an application
    Watch {
        /// Application ID
        app: String,

        /// Informers as [namespace/]kind/name
        #[arg(required = true)]
        informers: Vec<String>,

        /// Sequence number being watched
        #[arg(short, long, default_value_t = 0)]
        sequence: i64,

        /// Delete finished hook Jobs while watching
        #[arg(long)]
        clean_hooks: bool,

        /// Exit once every object is ready
        #[arg(long)]
        until_ready: bool,

        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Match chart artifacts to declarations, and optionally install them
    Charts {
        /// Directory holding chart directories and archives
        chart_dir: PathBuf,

        /// Manifests carrying HelmChart declarations
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Manifests of the running sequence, used to uninstall removed charts
        #[arg(long)]
        previous: Option<PathBuf>,

        /// API version of the HelmChart declarations
        #[arg(long, default_value = "bosun.io/v1beta1")]
        api_version: String,

        /// Uninstall instead of install
        #[arg(long)]
        uninstall: bool,

        /// Run helm instead of only printing the order
        #[arg(long)]
        apply: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn pull_secret(
    name: Option<String>,
    registry: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<PullSecret>> {
    let Some(name) = name else {
        return Ok(None);
    };
    match (registry, username, password) {
        (Some(registry), Some(username), Some(password)) => Ok(Some(PullSecret {
            name,
            registry,
            username,
            password,
        })),
        _ => Err(CliError::usage(
            "--pull-secret needs --registry and credentials (--registry-username/--registry-password or BOSUN_REGISTRY_USERNAME/BOSUN_REGISTRY_PASSWORD)",
        )),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    let namespace = cli.namespace.as_deref();

    match cli.command {
        Commands::Plan {
            manifests,
            deletion,
            json,
        } => commands::plan::run(&manifests, config, namespace, deletion, json),

        Commands::Diff {
            previous,
            manifests,
            json,
        } => commands::diff::run(&previous, &manifests, config, namespace, json),

        Commands::Deploy {
            app,
            sequence,
            manifests,
            previous,
            owner,
            no_dry_run,
            pull_secret: secret_name,
            registry,
            registry_username,
            registry_password,
            json,
        } => {
            let args = DeployArgs {
                app_id: &app,
                sequence,
                owner_slug: owner.as_deref(),
                manifests: &manifests,
                previous: previous.as_deref(),
                no_dry_run,
                pull_secret: pull_secret(secret_name, registry, registry_username, registry_password)?,
                output_json: json,
            };
            commands::deploy::run(args, config, namespace).await
        }

        Commands::Undeploy {
            app,
            previous,
            clear_namespaces,
            json,
        } => commands::undeploy::run(&app, &previous, &clear_namespaces, config, namespace, json).await,

        Commands::Watch {
            app,
            informers,
            sequence,
            clean_hooks,
            until_ready,
            json,
        } => {
            commands::watch::run(
                &app,
                sequence,
                &informers,
                clean_hooks,
                until_ready,
                config,
                namespace,
                json,
            )
            .await
        }

        Commands::Charts {
            chart_dir,
            manifests,
            previous,
            api_version,
            uninstall,
            apply,
            json,
        } => {
            let args = ChartsArgs {
                chart_dir: &chart_dir,
                manifests: &manifests,
                previous: previous.as_deref(),
                api_version: &api_version,
                uninstall,
                apply,
                output_json: json,
            };
            commands::charts::run(args, config, namespace).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
