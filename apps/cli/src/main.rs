use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{EntryParams, HttpBackend, SessionController, SessionEvent, ViewKind};
use shared::domain::{current_hebrew_year, Emotion, ReferralCode};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod host;
mod render;

use config::{load_settings, Overrides};
use host::{SystemClipboard, TerminalNavigator};

#[derive(Parser, Debug)]
#[command(name = "dreamdecode", about = "Biblical dream interpretation in the terminal")]
struct Cli {
    /// Backend base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Site origin used in share links.
    #[arg(long, global = true)]
    site_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a dream and receive its teaser.
    Submit(SubmitArgs),
    /// Resume from a gift link or a payment return URL.
    Open(OpenArgs),
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    dream: String,
    #[arg(long)]
    emotion: Option<Emotion>,
    #[arg(long, default_value = "")]
    colors: String,
    #[arg(long, default_value = "")]
    symbols: String,
    /// Blessing code from a friend's gift link.
    #[arg(long)]
    code: Option<String>,
    /// Start checkout after the teaser.
    #[arg(long)]
    pay: bool,
    #[arg(long)]
    copy_link: bool,
}

#[derive(Args, Debug)]
struct OpenArgs {
    entry_url: String,
    #[arg(long)]
    download: bool,
    #[arg(long)]
    copy_link: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(Overrides {
        api_url: cli.api_url,
        site_url: cli.site_url,
    });
    let backend = HttpBackend::new(&settings.api_url)
        .with_context(|| format!("cannot use backend url '{}'", settings.api_url))?;
    let controller = SessionController::new_with_dependencies(
        Arc::new(backend),
        Arc::new(TerminalNavigator),
        Arc::new(SystemClipboard),
        settings.site_url()?,
    );
    let mut events = controller.subscribe_events();
    info!(api_url = %settings.api_url, "session started");

    match cli.command {
        Command::Submit(args) => submit(&controller, &mut events, args).await,
        Command::Open(args) => open(&controller, &mut events, args).await,
    }
}

async fn submit(
    controller: &Arc<SessionController>,
    events: &mut broadcast::Receiver<SessionEvent>,
    args: SubmitArgs,
) -> Result<()> {
    let entry = EntryParams {
        referral_code: args
            .code
            .filter(|code| !code.trim().is_empty())
            .map(ReferralCode::new),
        payment_return: None,
    };
    controller.resume(entry).await.join().await;
    print_notices(events);

    let session = controller.snapshot().await;
    if let Some(gift) = &session.gift {
        println!("{}\n", render::gift_banner(gift, session.price));
    }

    controller
        .update_draft(|draft| {
            draft.name = args.name;
            draft.email = args.email;
            draft.dream_text = args.dream;
            draft.emotion = args.emotion;
            draft.colors = args.colors;
            draft.symbols = args.symbols;
        })
        .await?;

    let submitted = controller.submit_teaser().await;
    print_notices(events);
    submitted.context("dream submission failed")?;

    let session = controller.snapshot().await;
    println!("{}", render::session(&session, current_hebrew_year()));

    if args.copy_link {
        copy_link(controller, events).await?;
    }
    if args.pay {
        let paid = controller.initiate_payment().await;
        print_notices(events);
        paid.context("checkout could not be started")?;
    }
    Ok(())
}

async fn open(
    controller: &Arc<SessionController>,
    events: &mut broadcast::Receiver<SessionEvent>,
    args: OpenArgs,
) -> Result<()> {
    let entry = EntryParams::parse(&args.entry_url)
        .with_context(|| format!("invalid entry url '{}'", args.entry_url))?;
    if entry.is_empty() {
        bail!("'{}' carries neither a gift code nor a payment return", args.entry_url);
    }

    controller.resume(entry).await.join().await;
    print_notices(events);

    let session = controller.snapshot().await;
    println!("{}", render::session(&session, current_hebrew_year()));

    if args.download {
        if session.view.kind() != ViewKind::Reveal {
            bail!("only a payment return URL has a report to download");
        }
        let opened = controller.download_report().await;
        print_notices(events);
        opened.context("report download failed")?;
    }
    if args.copy_link {
        copy_link(controller, events).await?;
    }
    Ok(())
}

async fn copy_link(
    controller: &SessionController,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<()> {
    let copied = controller.copy_share_link().await;
    print_notices(events);
    let link = copied.context("could not copy the blessing link")?;
    println!("{link}");
    Ok(())
}

/// Notices are emitted synchronously, so draining after each step sees all of them.
fn print_notices(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Notice(notice)) => eprintln!("{}", notice.message()),
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
