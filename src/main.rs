use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::warn;

use powerback::assets::{resolve_url, FetchSource};
use powerback::config::Config;
use powerback::db::Database;
use powerback::gateway::{
  high_priority_queue, incident_stats, Credentials, DataGateway, IncidentDraft, IncidentFilter,
  IncidentRecord, IncidentStatus, IncidentType, Officer, RegistrationProfile, Role,
};
use powerback::realtime::Handlers;
use powerback::session::ClientSession;

#[derive(Parser, Debug)]
#[command(name = "powerback")]
#[command(about = "Offline-first client for the PowerBack incident-reporting platform")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/powerback/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write logs to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Manage the offline asset cache
  #[command(subcommand)]
  Assets(AssetsCommand),
  /// Sign in
  Login {
    email: String,
    /// Password (falls back to POWERBACK_PASSWORD)
    #[arg(long)]
    password: Option<String>,
    /// Role to sign in as in local mode
    #[arg(long)]
    role: Option<Role>,
  },
  /// Create an account and sign in
  Register {
    email: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    role: Role,
    /// Password (falls back to POWERBACK_PASSWORD)
    #[arg(long)]
    password: Option<String>,
  },
  /// Sign out and forget the session
  Logout,
  /// Show the signed-in user
  Whoami,
  #[command(subcommand)]
  Incidents(IncidentsCommand),
  #[command(subcommand)]
  Notifications(NotificationsCommand),
  /// Print real-time updates until interrupted
  Listen,
}

#[derive(Subcommand, Debug)]
enum AssetsCommand {
  /// Pre-cache the manifest under the configured version
  Install,
  /// Fetch a URL cache-first
  Fetch {
    url: String,
    /// Write the body to stdout
    #[arg(long)]
    body: bool,
  },
  /// Make a version current and delete every other cache
  Activate { version: Option<String> },
  /// List caches and their entry counts
  Status,
}

#[derive(Subcommand, Debug)]
enum IncidentsCommand {
  List {
    #[arg(long, value_enum, default_value_t = FilterArg::All)]
    filter: FilterArg,
    /// Only incidents with this status (overrides --filter)
    #[arg(long)]
    status: Option<IncidentStatus>,
  },
  Show {
    id: u64,
  },
  /// Report a new incident
  Report {
    #[arg(long = "type")]
    incident_type: IncidentType,
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    address: String,
    #[arg(long)]
    lat: Option<f64>,
    #[arg(long)]
    lon: Option<f64>,
  },
  /// Assign an incident (to yourself unless an officer is given)
  Assign {
    id: u64,
    #[arg(long, requires = "officer_name")]
    officer_id: Option<String>,
    #[arg(long)]
    officer_name: Option<String>,
  },
  /// Change an incident's status
  Status {
    id: u64,
    status: IncidentStatus,
    #[arg(long)]
    notes: Option<String>,
  },
  /// Summary counts and the high-priority queue
  Stats,
}

#[derive(Subcommand, Debug)]
enum NotificationsCommand {
  List {
    #[arg(long)]
    unread: bool,
  },
  Read {
    id: u64,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FilterArg {
  All,
  Pending,
  Mine,
  Assigned,
}

impl From<FilterArg> for IncidentFilter {
  fn from(arg: FilterArg) -> Self {
    match arg {
      FilterArg::All => IncidentFilter::All,
      FilterArg::Pending => IncidentFilter::Pending,
      FilterArg::Mine => IncidentFilter::Mine,
      FilterArg::Assigned => IncidentFilter::Assigned,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = powerback::logging::init(&Database::data_dir()?.join("logs"), args.verbose)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let mut session = ClientSession::from_config(config)?;
  let result = run(&mut session, args.command).await;
  session.shutdown().await;

  result
}

async fn run(session: &mut ClientSession, command: Command) -> Result<()> {
  match command {
    Command::Assets(cmd) => run_assets(session, cmd).await,
    Command::Login {
      email,
      password,
      role,
    } => {
      let credentials = Credentials {
        email,
        password: password_or_env(password),
        role,
      };
      let user = session.gateway().login(&credentials).await?;
      println!("Signed in as {} ({})", user.display_name, user.role);
      track(session, "login", None).await;
      Ok(())
    }
    Command::Register {
      email,
      name,
      phone,
      role,
      password,
    } => {
      let profile = RegistrationProfile {
        email,
        password: password_or_env(password),
        full_name: name,
        phone,
        role: Some(role),
      };
      let user = session.gateway().register(&profile).await?;
      println!("Registered and signed in as {} ({})", user.display_name, user.role);
      Ok(())
    }
    Command::Logout => {
      session.gateway_mut().logout().await?;
      println!("Signed out");
      Ok(())
    }
    Command::Whoami => {
      match session.gateway().current_session().await? {
        Some(user) => println!(
          "{} ({}) id={}{}",
          user.display_name,
          user.role,
          user.user_id,
          user.email.map(|e| format!(" <{}>", e)).unwrap_or_default()
        ),
        None => println!("Not signed in"),
      }
      Ok(())
    }
    Command::Incidents(cmd) => run_incidents(session, cmd).await,
    Command::Notifications(cmd) => run_notifications(session, cmd).await,
    Command::Listen => listen(session).await,
  }
}

async fn run_assets(session: &mut ClientSession, command: AssetsCommand) -> Result<()> {
  match command {
    AssetsCommand::Install => {
      let count = session.assets().install().await?;
      println!("Cached {} assets in {}", count, session.assets().version());
    }
    AssetsCommand::Fetch { url, body } => {
      let url = resolve_url(&session.config().assets.origin, &url)?;
      let result = session.assets().handle_fetch(&url).await?;
      let source = match result.source {
        FetchSource::Cache => "cache",
        FetchSource::Network => "network",
      };
      eprintln!(
        "{} {} from {} ({} bytes)",
        result.data.status,
        url,
        source,
        result.data.body.len()
      );
      if body {
        use std::io::Write;
        std::io::stdout().write_all(&result.data.body)?;
      }
    }
    AssetsCommand::Activate { version } => {
      let version = version.unwrap_or_else(|| session.config().assets.version.clone());
      let removed = session.assets_mut().activate(&version)?;
      println!("Active cache: {}", version);
      for name in removed {
        println!("  deleted {}", name);
      }
    }
    AssetsCommand::Status => {
      let current = session.assets().version().to_string();
      let names = session.assets().cache_names()?;
      if names.is_empty() {
        println!("No caches installed");
      }
      for name in names {
        let entries = session.assets().entries(&name)?;
        let marker = if name == current { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, entries.len());
      }
    }
  }
  Ok(())
}

async fn run_incidents(session: &mut ClientSession, command: IncidentsCommand) -> Result<()> {
  let gateway = session.gateway();

  match command {
    IncidentsCommand::List { filter, status } => {
      let filter = match status {
        Some(status) => IncidentFilter::Status(status),
        None => filter.into(),
      };
      let mut incidents = gateway.list_incidents(filter).await?;
      incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
      if incidents.is_empty() {
        println!("No incidents");
      }
      for incident in &incidents {
        println!("{}", incident_line(incident));
      }
    }
    IncidentsCommand::Show { id } => {
      let incident = gateway
        .get_incident(id)
        .await?
        .ok_or_else(|| eyre!("No incident with id {}", id))?;
      print_incident(&incident);
    }
    IncidentsCommand::Report {
      incident_type,
      title,
      description,
      address,
      lat,
      lon,
    } => {
      let draft = IncidentDraft {
        description,
        address,
        latitude: lat,
        longitude: lon,
        ..IncidentDraft::new(incident_type, title)
      };
      let incident = gateway.submit_incident(&draft).await?;
      println!("Reported incident {}", incident.id);
      track(session, "incident_reported", Some(&incident.id.to_string())).await;
    }
    IncidentsCommand::Assign {
      id,
      officer_id,
      officer_name,
    } => {
      let officer = match (officer_id, officer_name) {
        (Some(id), Some(display_name)) => Officer { id, display_name },
        _ => {
          let user = gateway
            .current_session()
            .await?
            .ok_or_else(|| eyre!("Not signed in; pass --officer-id and --officer-name"))?;
          Officer::from_session(&user)
        }
      };
      gateway.assign_incident(id, &officer).await?;
      println!("Assigned incident {} to {}", id, officer.display_name);
    }
    IncidentsCommand::Status { id, status, notes } => {
      gateway
        .update_incident_status(id, status, notes.as_deref())
        .await?;
      println!("Incident {} is now {}", id, status);
    }
    IncidentsCommand::Stats => {
      let incidents = gateway.list_incidents(IncidentFilter::All).await?;
      let stats = incident_stats(&incidents, chrono::Utc::now());
      println!("Total:         {}", stats.total);
      println!("Last 30 days:  {}", stats.last_30_days);
      println!("Last 7 days:   {}", stats.last_7_days);
      println!("Pending:       {}", stats.pending);
      println!("In progress:   {}", stats.in_progress);
      println!("Resolved:      {}", stats.resolved);
      println!("High priority: {}", stats.high_priority);
      for (kind, count) in &stats.by_type {
        println!("  {:<20} {}", kind, count);
      }

      let queue = high_priority_queue(&incidents);
      if !queue.is_empty() {
        println!();
        println!("High-priority queue:");
        for incident in queue {
          println!("{}", incident_line(incident));
        }
      }
    }
  }
  Ok(())
}

async fn run_notifications(
  session: &mut ClientSession,
  command: NotificationsCommand,
) -> Result<()> {
  match command {
    NotificationsCommand::List { unread } => {
      let notifications = session.gateway().list_notifications().await?;
      let shown: Vec<_> = notifications
        .iter()
        .filter(|n| !unread || !n.read)
        .collect();
      if shown.is_empty() {
        println!("No notifications");
      }
      for n in shown {
        let marker = if n.read { " " } else { "*" };
        println!(
          "{} {:>14}  {}  {}: {}",
          marker,
          n.id,
          n.created_at.format("%Y-%m-%d %H:%M"),
          n.title,
          n.message
        );
      }
    }
    NotificationsCommand::Read { id } => {
      session.gateway().mark_notification_read(id).await?;
      println!("Marked {} as read", id);
    }
  }
  Ok(())
}

async fn listen(session: &mut ClientSession) -> Result<()> {
  if !session.gateway().is_remote() {
    println!("Real-time updates need remote mode");
    return Ok(());
  }

  let handlers = Handlers::new()
    .on_notification(|n| println!("[notification] {}: {}", n.title, n.message))
    .on_incident(|i| println!("[incident] {}", incident_line(&i)));

  session.gateway_mut().subscribe(handlers).await?;
  println!("Listening for updates, Ctrl-C to stop");
  tokio::signal::ctrl_c().await?;
  session.gateway_mut().disconnect().await;
  Ok(())
}

/// Record a usage event. Failures are logged, never fatal.
async fn track(session: &ClientSession, event_type: &str, event_data: Option<&str>) {
  if let Err(e) = session.gateway().track_event(event_type, event_data).await {
    warn!(event_type, error = %e, "failed to record usage event");
  }
}

fn password_or_env(password: Option<String>) -> String {
  password
    .or_else(|| std::env::var("POWERBACK_PASSWORD").ok())
    .unwrap_or_default()
}

fn incident_line(incident: &IncidentRecord) -> String {
  format!(
    "{:>14}  {:<11} {:<8} {:<19} {}",
    incident.id,
    incident.status.as_str(),
    incident.priority.as_str(),
    incident.incident_type.as_str(),
    incident.title
  )
}

fn print_incident(incident: &IncidentRecord) {
  println!("#{} {}", incident.id, incident.title);
  println!("  Type:     {}", incident.incident_type);
  println!("  Status:   {}", incident.status);
  println!("  Priority: {}", incident.priority);
  println!("  Reported: {}", incident.created_at.to_rfc3339());
  if !incident.address.is_empty() {
    println!("  Address:  {}", incident.address);
  }
  if let Some(reporter) = &incident.reporter_name {
    println!("  Reporter: {}", reporter);
  }
  if let Some(officer) = &incident.assigned_officer_name {
    println!("  Officer:  {}", officer);
  }
  if let Some(notes) = &incident.officer_notes {
    println!("  Notes:    {}", notes);
  }
  if let Some(resolved) = incident.resolved_at {
    println!("  Resolved: {}", resolved.to_rfc3339());
  }
  if !incident.description.is_empty() {
    println!();
    println!("{}", incident.description);
  }
}
