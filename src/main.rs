use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadboost_client::auth::AuthEvent;
use leadboost_client::config::Config;
use leadboost_client::lead_store::{LoadOutcome, DEFAULT_SKIP};
use leadboost_client::models::{Lead, LeadBatchRequest, LeadId, LeadUpdate, MessageStyle, PlanTier, PlanUsage};
use leadboost_client::{ApiClient, ClientError, LeadSession};

/// Exit status used when the session has expired and the user must log in again.
const EXIT_LOGIN_REQUIRED: i32 = 2;

#[derive(Parser)]
#[command(name = "leadctl")]
#[command(about = "LeadBoost command-line client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an access token for later commands
    Login {
        #[arg(long, env = "LEADBOOST_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Forget the stored access token
    Logout,
    /// Show the current plan and today's quota
    Usage,
    /// List available subscription plans
    Plans,
    /// Switch the organization to another plan
    Upgrade { plan: PlanTier },
    /// Cancel the subscription
    Cancel {
        /// Cancel now instead of at the end of the billing period
        #[arg(long)]
        immediate: bool,
    },
    /// Work with leads
    #[command(subcommand)]
    Leads(LeadsCommand),
}

#[derive(Subcommand)]
enum LeadsCommand {
    /// List leads
    List {
        #[arg(long, default_value_t = DEFAULT_SKIP)]
        skip: u32,
        /// Page size (defaults to LEADBOOST_PAGE_SIZE)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one lead
    Get { id: LeadId },
    /// Submit website URLs to the processing pipeline
    Submit {
        /// Outreach message style
        #[arg(long, default_value_t = MessageStyle::Professional)]
        style: MessageStyle,
        /// Read URLs from a file, one per line
        #[arg(long, conflicts_with = "urls")]
        file: Option<PathBuf>,
        urls: Vec<String>,
    },
    /// Edit lead fields, e.g. --set company_name="Acme"
    Update {
        id: LeadId,
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        fields: Vec<(String, String)>,
    },
    /// Delete a lead
    Delete { id: LeadId },
    /// Re-run scraping, enrichment, scoring and outreach for a lead
    Process { id: LeadId },
    /// Export the first page of leads as JSON
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = field.trim();
    if !LeadUpdate::FIELDS.contains(&field) {
        return Err(format!(
            "'{}' is not editable (editable: {})",
            field,
            LeadUpdate::FIELDS.join(", ")
        ));
    }
    Ok((field.to_string(), value.to_string()))
}

/// Main entry point for the command-line client.
///
/// Initializes tracing and configuration, runs the command, and watches for
/// session expiry: when the service rejects the token, the user is sent back
/// to `leadctl login`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadboost_client=warn,leadctl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let api = ApiClient::from_config(&config)?;
    let mut auth_events = api.auth_events().subscribe();
    let session = LeadSession::new(api);

    let result = tokio::select! {
        biased;
        Ok(AuthEvent::SessionExpired) = auth_events.recv() => redirect_to_login(),
        result = run(cli.command, &session, &config) => result,
    };

    if let Err(e) = &result {
        if e.downcast_ref::<ClientError>().is_some_and(ClientError::is_unauthorized) {
            redirect_to_login();
        }
    }

    result
}

fn redirect_to_login() -> ! {
    eprintln!("Your session has expired. Run `leadctl login --token <TOKEN>` to sign in again.");
    std::process::exit(EXIT_LOGIN_REQUIRED);
}

async fn run(command: Command, session: &LeadSession, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Login { token } => {
            session.api().tokens().save(&token)?;
            let usage = session.refresh_usage().await?;
            println!("Logged in ({} plan).", usage.plan_name);
        }
        Command::Logout => {
            session.api().tokens().clear()?;
            println!("Logged out.");
        }
        Command::Usage => print_usage(&session.refresh_usage().await?),
        Command::Plans => {
            for plan in session.plans().await? {
                println!(
                    "{:<12} {:>6} leads/day  ai={}  export={}",
                    plan.name, plan.max_leads_per_day, plan.can_use_ai, plan.can_export
                );
            }
        }
        Command::Upgrade { plan } => {
            let usage = session.upgrade(plan).await?;
            println!("Subscription is now on the {} plan.", usage.plan_name);
            print_usage(&usage);
        }
        Command::Cancel { immediate } => {
            let ack = session.cancel(immediate).await?;
            println!(
                "{}",
                ack.message
                    .unwrap_or_else(|| "Subscription cancelled.".to_string())
            );
        }
        Command::Leads(command) => run_leads(command, session, config).await?,
    }
    Ok(())
}

async fn run_leads(command: LeadsCommand, session: &LeadSession, config: &Config) -> anyhow::Result<()> {
    let store = session.store();
    match command {
        LeadsCommand::List { skip, limit } => {
            let limit = limit.unwrap_or(config.page_size);
            if let LoadOutcome::Applied(count) = store.load(skip, limit).await? {
                for lead in store.leads() {
                    print_lead_row(&lead);
                }
                println!("{} lead(s)", count);
            }
        }
        LeadsCommand::Get { id } => print_lead(&store.fetch(&id).await?),
        LeadsCommand::Submit { style, file, urls } => {
            let batch = match file {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    LeadBatchRequest::from_text(&text, style)?
                }
                None => LeadBatchRequest::from_text(&urls.join("\n"), style)?,
            };

            let created = session.submit_batch(&batch).await?;
            println!("Created {} lead(s):", created.len());
            for lead in &created {
                print_lead_row(lead);
            }
            if let Some(usage) = session.usage() {
                println!("{} lead(s) left today.", usage.remaining_daily_leads);
            }
        }
        LeadsCommand::Update { id, fields } => {
            let mut patch = LeadUpdate::default();
            for (field, value) in &fields {
                patch.set(field, value)?;
            }
            print_lead(&store.update(&id, &patch).await?);
        }
        LeadsCommand::Delete { id } => {
            let ack = store.remove(&id).await?;
            println!(
                "{}",
                ack.message
                    .unwrap_or_else(|| format!("Lead {} deleted.", id))
            );
        }
        LeadsCommand::Process { id } => {
            // the AI gate needs a snapshot; a failed fetch leaves it to the service
            if let Err(e) = session.refresh_usage().await {
                tracing::warn!("Usage unavailable: {}", e);
            }
            let outcome = session.reprocess(&id).await?;
            if let Some(message) = outcome.message {
                println!("{}", message);
            }
            match outcome.refreshed {
                Some(lead) => print_lead(&lead),
                None => println!("Lead {} reprocessed; run `leadctl leads get {}` to see the result.", id, id),
            }
        }
        LeadsCommand::Export { output } => {
            store.load(DEFAULT_SKIP, config.page_size).await?;
            let json = session.export().await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported {} lead(s) to {}", store.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
    }
    Ok(())
}

fn print_usage(usage: &PlanUsage) {
    println!("Plan:        {}", usage.plan_name);
    println!(
        "Today:       {} of {} leads used, {} remaining",
        usage.current_usage, usage.max_leads_per_day, usage.remaining_daily_leads
    );
    println!("AI features: {}", if usage.can_use_ai { "yes" } else { "no" });
    println!("Export:      {}", if usage.can_export { "yes" } else { "no" });
}

fn print_lead_row(lead: &Lead) {
    let score = lead
        .scoring()
        .map(|s| format!("{:>5.1} {}", s.score, s.label))
        .unwrap_or_else(|| "    - unscored".to_string());
    println!("{:>6}  {:<40}  {}", lead.id.to_string(), lead.display_name(), score);
}

fn print_lead(lead: &Lead) {
    match serde_json::to_string_pretty(lead) {
        Ok(json) => println!("{}", json),
        Err(_) => print_lead_row(lead),
    }
}
