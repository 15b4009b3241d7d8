use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use futures::future::join;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dealer_portal::error::ApiError;
use dealer_portal::leaderboard::Leaderboard;
use dealer_portal::models::{Appointment, Session, format_price};
use dealer_portal::store::{AppointmentState, AppointmentStore, BiddingStore, Viewer};
use dealer_portal::{ApiClient, Settings};

#[derive(Parser, Debug)]
#[command(name = "dealer-portal", about = "Appointments and reverse-bidding from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage appointments
    #[command(subcommand)]
    Appointments(AppointmentCommand),
    /// Take part in reverse-bidding sessions
    #[command(subcommand)]
    Bids(BidCommand),
    /// Appointments and live sessions side by side
    Dashboard,
}

#[derive(Subcommand, Debug)]
enum AppointmentCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        per_page: Option<u32>,
    },
    Schedule {
        #[arg(long)]
        customer: i64,
        /// Local time, "YYYY-MM-DD HH:MM"
        #[arg(long, value_parser = parse_local_time)]
        at: NaiveDateTime,
        #[arg(long)]
        notes: Option<String>,
    },
    Cancel {
        id: i64,
        #[arg(long)]
        notes: Option<String>,
    },
    Reschedule {
        id: i64,
        #[arg(long, value_parser = parse_local_time)]
        at: NaiveDateTime,
        #[arg(long)]
        notes: Option<String>,
    },
    Confirm {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum BidCommand {
    Sessions,
    Leaderboard {
        session: i64,
    },
    Submit {
        session: i64,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        perks: Option<String>,
    },
    Withdraw {
        session: i64,
        bid: i64,
    },
}

fn parse_local_time(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM\": {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration (also loads .env)
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| settings.log_filter.clone().into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(api_base_url = %settings.api_base_url, "Configuration loaded.");

    // One shared HTTP client for both stores
    let client = ApiClient::new(&settings).context("Failed to build API client")?;

    let outcome = match cli.command {
        Command::Appointments(command) => run_appointments(AppointmentStore::new(client), command, &settings).await,
        Command::Bids(command) => {
            run_bids(BiddingStore::new(client, Viewer::from_settings(&settings)), command).await
        }
        Command::Dashboard => run_dashboard(client, &settings).await,
    };

    if let Err(e) = outcome {
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}

fn report(err: &ApiError) {
    tracing::debug!(error = ?err, "Command failed");
    eprintln!("Error: {}", err.user_message());
    if let Some(tip) = err.code().and_then(|code| code.tip()) {
        eprintln!("Tip: {tip}");
    }
}

async fn run_appointments(
    store: AppointmentStore,
    command: AppointmentCommand,
    settings: &Settings,
) -> Result<(), ApiError> {
    match command {
        AppointmentCommand::List { page, per_page } => {
            store.fetch(page, per_page.unwrap_or(settings.per_page)).await?;
            print_appointments(&store.snapshot());
        }
        AppointmentCommand::Schedule { customer, at, notes } => {
            let appointment = store.create(customer, at, notes).await?;
            println!("Scheduled:");
            print_appointment(&appointment);
        }
        AppointmentCommand::Cancel { id, notes } => {
            let appointment = store.cancel(id, notes).await?;
            println!("Cancelled:");
            print_appointment(&appointment);
        }
        AppointmentCommand::Reschedule { id, at, notes } => {
            let appointment = store.reschedule(id, at, notes).await?;
            println!("Rescheduled:");
            print_appointment(&appointment);
        }
        AppointmentCommand::Confirm { id } => {
            let appointment = store.confirm(id).await?;
            println!("Confirmed:");
            print_appointment(&appointment);
        }
    }
    Ok(())
}

async fn run_bids(store: BiddingStore, command: BidCommand) -> Result<(), ApiError> {
    match command {
        BidCommand::Sessions => {
            let sessions = store.fetch_sessions().await?;
            print_sessions(&sessions);
        }
        BidCommand::Leaderboard { session } => {
            store.fetch_leaderboard(session).await?;
            let state = store.snapshot();
            if let Some(current) = &state.current_session {
                print_sessions(std::slice::from_ref(current));
            }
            print_leaderboard(&state.leaderboard);
        }
        BidCommand::Submit { session, amount, perks } => {
            // Load first so the new bid is ranked against the live leaderboard
            store.fetch_leaderboard(session).await?;
            let bid = store.submit_bid(session, amount, perks).await?;
            println!("Bid {} placed at {}; current rank #{}", bid.id, format_price(bid.price), bid.rank);
            print_leaderboard(&store.snapshot().leaderboard);
        }
        BidCommand::Withdraw { session, bid } => {
            store.fetch_leaderboard(session).await?;
            store.withdraw_bid(session, bid).await?;
            println!("Bid {bid} withdrawn.");
            print_leaderboard(&store.snapshot().leaderboard);
        }
    }
    Ok(())
}

async fn run_dashboard(client: ApiClient, settings: &Settings) -> Result<(), ApiError> {
    let appointments = AppointmentStore::new(client.clone());
    let bidding = BiddingStore::new(client, Viewer::from_settings(settings));

    let (appointments_result, sessions_result) =
        join(appointments.fetch(1, settings.per_page), bidding.fetch_sessions()).await;

    match appointments_result {
        Ok(_) => {
            let state = appointments.snapshot();
            let upcoming = state.upcoming(appointments.now());
            println!("Upcoming appointments: {}", upcoming.len());
            for appointment in upcoming {
                print_appointment(appointment);
            }
        }
        Err(e) => report(&e),
    }
    println!();
    match sessions_result {
        Ok(_) => print_sessions(&bidding.snapshot().active_sessions().into_iter().cloned().collect::<Vec<_>>()),
        Err(e) => report(&e),
    }
    Ok(())
}

// --- Rendering ---

fn print_appointments(state: &AppointmentState) {
    if !state.has_appointments {
        println!("No appointments yet.");
        return;
    }
    for appointment in &state.appointments {
        print_appointment(appointment);
    }
    let p = &state.pagination;
    println!("Page {} of {} ({} total)", p.current_page, p.last_page.max(1), p.total);
    if p.has_next_page() {
        println!("More available: --page {}", p.current_page + 1);
    }
}

fn print_appointment(appointment: &Appointment) {
    let counterpart = appointment
        .dealer_name
        .as_deref()
        .or(appointment.customer_name.as_deref())
        .unwrap_or("-");
    let reschedule = if appointment.can_reschedule { "" } else { " (locked)" };
    println!(
        "#{:<6} {:<10} {:<24} {}{}",
        appointment.id, appointment.status, appointment.start_time, counterpart, reschedule
    );
    if let Some(notes) = appointment.notes.as_deref().filter(|n| !n.is_empty()) {
        println!("        notes: {notes}");
    }
}

fn print_sessions(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("No bidding sessions.");
        return;
    }
    for session in sessions {
        let time_left = session
            .time_left
            .map(|secs| format!("{}h {:02}m left", secs / 3600, (secs % 3600) / 60))
            .unwrap_or_else(|| "-".to_string());
        let status = if session.is_active() { "active" } else { "ended" };
        println!(
            "Session {:<6} {:<32} {:<7} {:>3} bids  {}",
            session.id,
            session.vehicle_label(),
            status,
            session.bid_count,
            time_left
        );
    }
}

fn print_leaderboard(board: &Leaderboard) {
    if board.is_empty() {
        println!("No bids yet.");
        return;
    }
    for bid in board.bids() {
        let marker = if bid.is_current_dealer { "*" } else { " " };
        println!(
            "{marker}{:>3}. {:<24} {:>12}  {}",
            bid.rank,
            bid.dealer_name_anonymized,
            format_price(bid.price),
            bid.perks.as_deref().unwrap_or("")
        );
    }
}
