//! `dspace`: log in to a DSpace REST endpoint, run one command, print the
//! result as JSON and log out again.

use std::{fs::File, path::Path, path::PathBuf, process::ExitCode, sync::Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dspace_core::{ClientConfig, DSpaceClient};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dspace")]
#[command(about = "Browse and edit a DSpace repository over its REST API", long_about = None)]
struct Cli {
    /// REST root, e.g. https://demo.dspace.org/rest
    #[arg(long, env = "DSPACE_REST_URL")]
    rest_url: String,

    #[arg(long, env = "DSPACE_USER")]
    user: String,

    #[arg(long, env = "DSPACE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Records per page
    #[arg(long, default_value = "100")]
    limit: usize,

    #[arg(long, default_value = "0")]
    offset: usize,

    /// Load every item's metadata while listing
    #[arg(long)]
    with_metadata: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Keep an http:// REST root instead of upgrading it to https
    #[arg(long)]
    allow_http: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "DSPACE_TIMEOUT")]
    timeout: Option<u64>,

    /// Keep retrying failed GETs for this many seconds
    #[arg(long)]
    retry_for: Option<u64>,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "DSPACE_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// List every community
    Communities,
    /// List every item
    Items,
    /// List every collection
    Collections,
    /// Create a community, nested under --parent when given
    CreateCommunity {
        #[arg(long)]
        name: String,
        /// UUID of the parent community
        #[arg(long)]
        parent: Option<String>,
    },
    /// Items whose FIELD contains NEEDLE
    FindItems {
        #[arg(long)]
        field: String,
        #[arg(long)]
        needle: String,
    },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.user, &self.password, &self.rest_url)
            .page(self.offset, self.limit)
            .load_item_metadata(self.with_metadata)
            .verify_ssl(!self.insecure)
            .force_https(!self.allow_http);
        if let Some(secs) = self.timeout {
            config = config.timeout_secs(secs);
        }
        if let Some(secs) = self.retry_for {
            config = config.retry_max_elapsed_secs(secs);
        }
        config
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dspace_core=info,dspace=info".to_string()),
    );

    match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("could not open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn run(client: &DSpaceClient, command: &Command) -> Result<String> {
    let json = match command {
        Command::Communities => {
            serde_json::to_string_pretty(&client.communities().context("listing communities")?)?
        }
        Command::Items => serde_json::to_string_pretty(&client.items().context("listing items")?)?,
        Command::Collections => {
            serde_json::to_string_pretty(&client.collections().context("listing collections")?)?
        }
        Command::CreateCommunity { name, parent } => {
            let community = client
                .create_community(name, parent.as_deref())
                .with_context(|| format!("creating community {name:?}"))?;
            serde_json::to_string_pretty(&community)?
        }
        Command::FindItems { field, needle } => {
            let items = client
                .find_items_by(field, needle)
                .with_context(|| format!("searching items by {field}"))?;
            serde_json::to_string_pretty(&items)?
        }
    };
    Ok(json)
}

/// Log in, run `command`, print its JSON and log out again. Login failure
/// and command failure both exit with status 1.
fn execute(config: ClientConfig, command: &Command) -> ExitCode {
    let rest_url = config.rest_url.clone();
    let client = match DSpaceClient::connect(config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, %rest_url, "could not log in");
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(&client, command);
    client.logout();

    match outcome {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    execute(cli.client_config(), &cli.command)
}

#[cfg(test)]
mod tests {
    use mock_server::{AppState, DEMO_EMAIL, DEMO_PASSWORD};

    use super::*;

    const BASE: [&str; 7] = [
        "dspace",
        "--rest-url",
        "https://demo.dspace.org/rest",
        "--user",
        "admin@example.org",
        "--password",
        "secret",
    ];

    fn parse(extra: &[&str]) -> Cli {
        Cli::try_parse_from(BASE.iter().chain(extra)).unwrap()
    }

    #[test]
    fn parses_find_items() {
        let cli = parse(&["find-items", "--field", "name", "--needle", "Europe"]);
        assert_eq!(
            cli.command,
            Command::FindItems {
                field: "name".to_string(),
                needle: "Europe".to_string()
            }
        );
    }

    #[test]
    fn create_community_parent_is_optional() {
        let cli = parse(&["create-community", "--name", "Europe 2019"]);
        assert_eq!(
            cli.command,
            Command::CreateCommunity {
                name: "Europe 2019".to_string(),
                parent: None
            }
        );
    }

    #[test]
    fn flags_flow_into_config() {
        let cli = parse(&[
            "--limit",
            "5",
            "--offset",
            "10",
            "--insecure",
            "--allow-http",
            "--timeout",
            "30",
            "items",
        ]);
        let config = cli.client_config();
        assert_eq!(config.limit, 5);
        assert_eq!(config.offset, 10);
        assert!(!config.verify_ssl);
        assert!(!config.force_https);
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.retry_max_elapsed_secs, None);
    }

    #[test]
    fn defaults_match_client_defaults() {
        let config = parse(&["communities"]).client_config();
        assert_eq!(config.limit, dspace_core::config::DEFAULT_LIMIT);
        assert!(config.verify_ssl);
        assert!(config.force_https);
        assert!(!config.load_item_metadata);
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(BASE).is_err());
    }

    /// Spawn the mock server on its own thread and return its REST root.
    fn start_server(state: AppState) -> String {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run_with(listener, state).await
            })
            .unwrap();
        });

        format!("http://{addr}/rest")
    }

    fn mock_config(rest_url: &str, password: &str) -> ClientConfig {
        ClientConfig::new(DEMO_EMAIL, password, rest_url).force_https(false)
    }

    #[test]
    fn login_failure_exits_with_one() {
        let state = AppState::default();
        let rest_url = start_server(state.clone());
        let code = execute(mock_config(&rest_url, "wrong"), &Command::Communities);
        assert_eq!(code, ExitCode::FAILURE);
        assert_eq!(state.repo.blocking_read().session_count(), 0);
    }

    #[test]
    fn successful_command_logs_out() {
        let state = AppState::default();
        let rest_url = start_server(state.clone());
        let command = Command::CreateCommunity {
            name: "Europe 2019".to_string(),
            parent: None,
        };
        let code = execute(mock_config(&rest_url, DEMO_PASSWORD), &command);
        assert_eq!(code, ExitCode::SUCCESS);

        let repo = state.repo.blocking_read();
        assert_eq!(repo.communities.len(), 1);
        assert_eq!(repo.session_count(), 0);
    }

    #[test]
    fn failed_command_still_logs_out() {
        let state = AppState::default();
        let rest_url = start_server(state.clone());
        let command = Command::CreateCommunity {
            name: "Orphan".to_string(),
            parent: Some("00000000-0000-0000-0000-000000000000".to_string()),
        };
        let code = execute(mock_config(&rest_url, DEMO_PASSWORD), &command);
        assert_eq!(code, ExitCode::FAILURE);

        let repo = state.repo.blocking_read();
        assert!(repo.communities.is_empty());
        assert_eq!(repo.session_count(), 0);
    }
}
