use anyhow::Context;
use clap::Parser;
use garp_core::analysis::scoring::ScoringMode;
use garp_core::config::Settings;
use garp_core::error::ConfigurationError;
use garp_core::ingest::fetcher::{PacingPolicy, ResilientFetcher, RetryPolicy};
use garp_core::ingest::google_sheets::GoogleSheetSource;
use garp_core::ingest::provider::MarketDataClient;
use garp_core::ingest::sheet::{CsvPortfolioSource, PortfolioSource};
use garp_core::ingest::yahoo::{YahooChartClient, YahooQuoteSummaryClient};
use garp_core::notify::{Dispatcher, OutgoingReport, SmtpNotifier, TelegramNotifier};
use garp_core::report::ReportSynthesizer;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "garp_worker")]
struct Args {
    /// Portfolio CSV path or URL. Overrides PORTFOLIO_CSV and the Sheets source.
    #[arg(long)]
    portfolio: Option<String>,

    /// Scoring mode: price_history or fundamentals. Overrides SCORING_MODE.
    #[arg(long)]
    mode: Option<ScoringMode>,

    /// Print the report instead of sending it.
    #[arg(long)]
    dry_run: bool,

    /// Skip text generation and send the raw listing.
    #[arg(long)]
    skip_ai: bool,

    /// Stop fetching after this many seconds. Overrides RUN_DEADLINE_SECS.
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args, settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "run aborted");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    let mode = match args.mode {
        Some(mode) => mode,
        None => settings.scoring_mode()?,
    };

    // Every credential is checked before the first upstream call.
    let source = portfolio_source(&args, &settings)?;
    let dispatcher = if args.dry_run {
        None
    } else {
        Some(build_dispatcher(&settings)?)
    };
    let generator = if args.skip_ai {
        None
    } else {
        garp_core::llm::from_settings(&settings)?
    };

    let entries = source.load().await?;
    tracing::info!(
        source = %source.describe(),
        %mode,
        tickers = entries.len(),
        text_provider = ?generator.as_ref().map(|g| g.provider().to_string()),
        dry_run = args.dry_run,
        "portfolio loaded"
    );

    let client: Arc<dyn MarketDataClient> = match mode {
        ScoringMode::PriceHistory => Arc::new(YahooChartClient::from_env()?),
        ScoringMode::Fundamentals => Arc::new(YahooQuoteSummaryClient::from_env()?),
    };
    let fetcher = ResilientFetcher::new(client, RetryPolicy::from_env(), PacingPolicy::from_env());
    let deadline = garp_core::pipeline::deadline_after(
        &fetcher,
        args.deadline_secs.or(settings.run_deadline_secs),
    );

    let ctx = garp_core::pipeline::run(&fetcher, mode, entries, deadline).await;
    if ctx.failed() > 0 {
        tracing::warn!(
            failed = ctx.failed(),
            tickers = ?ctx.failed_tickers(),
            "{} stocks failed",
            ctx.failed()
        );
    }

    let report = ReportSynthesizer::new(mode)
        .synthesize(&ctx.results, generator.as_deref())
        .await;

    let Some(dispatcher) = dispatcher else {
        println!("{}", report.body);
        tracing::info!(source = ?report.source, "dry run; notifications skipped");
        return Ok(());
    };

    let outgoing = OutgoingReport {
        report: &report,
        run_date: chrono::Local::now().date_naive(),
    };
    let outcomes = dispatcher.dispatch(&outgoing).await;
    let delivered = outcomes.iter().filter(|o| o.delivered()).count();

    tracing::info!(
        provider = ctx.provider,
        analyzed = ctx.succeeded(),
        failed = ctx.failed(),
        total = ctx.total(),
        report_source = ?report.source,
        delivered,
        channels = outcomes.len(),
        "run complete"
    );
    Ok(())
}

fn portfolio_source(args: &Args, settings: &Settings) -> anyhow::Result<Box<dyn PortfolioSource>> {
    if let Some(location) = args.portfolio.as_ref().or(settings.portfolio_csv.as_ref()) {
        return Ok(Box::new(CsvPortfolioSource::new(location.clone())));
    }
    if settings.portfolio_spreadsheet_id.is_some() {
        let source = GoogleSheetSource::from_settings(settings)
            .context("google sheets portfolio source")?;
        return Ok(Box::new(source));
    }
    Err(ConfigurationError::MissingCredential("PORTFOLIO_CSV or PORTFOLIO_SPREADSHEET_ID").into())
}

fn build_dispatcher(settings: &Settings) -> anyhow::Result<Dispatcher> {
    Ok(Dispatcher::new()
        .with_channel(Box::new(SmtpNotifier::from_settings(settings)?))
        .with_channel(Box::new(TelegramNotifier::from_settings(settings)?)))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
