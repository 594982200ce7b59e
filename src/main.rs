mod api;
mod cache;
mod cli;
mod config;
mod model;
mod mutation;
mod server;
mod store;
mod validate;
mod views;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cli::Session;
use model::{CreateIssue, IssueFilters, UpdateIssue};
use views::SortField;

#[derive(Parser, Debug)]
#[command(name = "trk")]
#[command(about = "A self-hosted issue tracker with a REST API and a caching CLI client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/trk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Print machine-readable JSON instead of tables
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the REST API server
  Serve {
    /// Insert sample issues into an empty database
    #[arg(long)]
    seed: bool,
    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<String>,
    /// Override the database path (use :memory: for ephemeral)
    #[arg(long)]
    database: Option<PathBuf>,
  },
  /// List issues, filtered and sorted locally
  List {
    /// Keep only issues with this status
    #[arg(long)]
    status: Option<String>,
    /// Case-insensitive search over title and description
    #[arg(long)]
    search: Option<String>,
    /// Sort field: title, description, progress, status, created_at, updated_at
    #[arg(long)]
    sort: Option<SortField>,
    /// Sort descending instead of ascending
    #[arg(long)]
    desc: bool,
    /// Group the listing by status
    #[arg(long)]
    group: bool,
  },
  /// Show a single issue
  Get { id: i64 },
  /// Create an issue
  Create {
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    progress: Option<i64>,
  },
  /// Update an issue; omitted fields stay unchanged
  Update {
    id: i64,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    progress: Option<i64>,
  },
  /// Delete an issue
  Delete { id: i64 },
  /// Quick status change with the matching progress value
  Status { id: i64, status: String },
  /// Show the analytics summary
  Analytics {
    /// Aggregate locally from the fetched collection instead of asking
    /// the server
    #[arg(long)]
    local: bool,
  },
  /// Check server liveness
  Health,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trk=info,tower_http=warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let mut config = config::Config::load(args.config.as_deref())?;

  match args.command {
    Command::Serve {
      seed,
      bind,
      database,
    } => {
      if let Some(bind) = bind {
        config.server.bind = bind;
      }
      if let Some(database) = database {
        config.server.database = Some(database);
      }
      server::serve(&config.server, seed).await
    }

    Command::List {
      status,
      search,
      sort,
      desc,
      group,
    } => {
      let filters = IssueFilters {
        status: status.as_deref().map(parse_status).transpose()?,
        search,
      };
      let session = Session::new(&config)?;
      let issues = session.list(&filters, cli::sort_config(sort, desc)).await?;
      if group {
        cli::print_grouped(&issues, args.json)
      } else {
        cli::print_issue_table(&issues, args.json)
      }
    }

    Command::Get { id } => {
      let session = Session::new(&config)?;
      match session.get(id).await {
        Ok(issue) => cli::print_issue(&issue, args.json),
        // Distinct exit code so scripts can tell "absent" from "broken".
        Err(err) if err.is_not_found() => {
          eprintln!("{}", err);
          std::process::exit(4);
        }
        Err(err) => Err(err.into()),
      }
    }

    Command::Create {
      title,
      description,
      status,
      progress,
    } => {
      let input = CreateIssue {
        title,
        description,
        status: status.as_deref().map(parse_status).transpose()?,
        progress,
      };
      let session = Session::new(&config)?;
      let issue = session.create(input).await?;
      eprintln!("created issue #{}", issue.id);
      cli::print_issue(&issue, args.json)
    }

    Command::Update {
      id,
      title,
      description,
      status,
      progress,
    } => {
      let input = UpdateIssue {
        title,
        description,
        status: status.as_deref().map(parse_status).transpose()?,
        progress,
      };
      let session = Session::new(&config)?;
      let issue = session.update(id, input).await?;
      cli::print_issue(&issue, args.json)
    }

    Command::Delete { id } => {
      let session = Session::new(&config)?;
      let issue = session.delete(id).await?;
      eprintln!("deleted issue #{}", issue.id);
      cli::print_issue(&issue, args.json)
    }

    Command::Status { id, status } => {
      let status = parse_status(&status)?;
      let session = Session::new(&config)?;
      let issue = session.set_status(id, status).await?;
      cli::print_issue(&issue, args.json)
    }

    Command::Analytics { local } => {
      let session = Session::new(&config)?;
      let analytics = if local {
        session.local_analytics().await?
      } else {
        session.analytics().await?
      };
      cli::print_analytics(&analytics, args.json)
    }

    Command::Health => {
      let session = Session::new(&config)?;
      let health = session.health().await?;
      if args.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
      } else {
        println!("{} (uptime {}s)", health.status, health.uptime);
      }
      Ok(())
    }
  }
}

fn parse_status(s: &str) -> Result<model::IssueStatus> {
  cli::parse_status(s).map_err(|message| eyre!(message))
}
