mod api;
mod controller;
mod error;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;

use profilescan_core::{
    fallback_recommendations, score, LeadContact, PlacePhoto, PlaceRecord, RecommendationPayload,
    ScanRequest, ScanResult,
};

use crate::api::HttpScanApi;
use crate::controller::{ControllerConfig, Phase, ScanController, Snapshot};

#[derive(Debug, Parser)]
#[command(name = "profilescan")]
#[command(about = "Business profile scan command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan a business through the server and print its recommendations.
    Scan(ScanArgs),
    /// Score a listing locally from its attributes, without any network.
    Score(ScoreArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    location: String,
    /// Submit the lead form with this email once results are in.
    #[arg(long)]
    email: Option<String>,
    #[arg(long, requires = "email")]
    phone: Option<String>,
    #[arg(long, requires = "email")]
    postcode: Option<String>,
    #[arg(long, env = "PROFILESCAN_SERVER_URL", default_value = "http://localhost:3000")]
    server_url: String,
    /// Seconds to wait for recommendations before using the local fallback.
    #[arg(long, default_value_t = 15)]
    recommendation_timeout: u64,
    #[arg(long, env = "PROFILESCAN_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout: u64,
}

#[derive(Debug, Args)]
struct ScoreArgs {
    #[arg(long)]
    rating: Option<f64>,
    #[arg(long, default_value_t = 0)]
    reviews: u32,
    #[arg(long, default_value_t = 0)]
    photos: u32,
    #[arg(long)]
    phone: bool,
    #[arg(long)]
    website: bool,
    #[arg(long)]
    hours: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => run_scan(args).await,
        Commands::Score(args) => {
            run_score(&args)?;
            Ok(())
        }
    }
}

async fn run_scan(args: ScanArgs) -> anyhow::Result<()> {
    let api = HttpScanApi::new(&args.server_url, args.http_timeout)
        .context("failed to build scan client")?;
    let controller = ScanController::new(
        Arc::new(api),
        ControllerConfig {
            recommendation_timeout: Duration::from_secs(args.recommendation_timeout),
            ..ControllerConfig::default()
        },
    );

    let progress = tokio::spawn(report_progress(controller.subscribe()));
    let outcome = controller
        .submit(ScanRequest::new(args.name.trim(), args.location.trim()))
        .await;
    progress.abort();
    eprintln!();

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            let message = controller
                .snapshot()
                .error
                .unwrap_or_else(|| err.user_message());
            anyhow::bail!("{message}");
        }
    };
    print_scores(&result);

    let mut updates = controller.subscribe();
    let delivered = updates
        .wait_for(|s| s.recommendations.is_some())
        .await
        .context("scan controller stopped before recommendations arrived")?
        .recommendations
        .clone();
    if let Some(delivered) = delivered {
        println!("\nRecommendations ({}):", delivered.source.as_str());
        print_payload(&delivered.payload);
    }

    if let Some(email) = args.email {
        controller.open_lead_gate()?;
        let lead_id = controller
            .submit_lead(LeadContact {
                email,
                phone: args.phone,
                postcode: args.postcode,
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("\nThanks! We'll be in touch (lead {lead_id}).");
    }
    Ok(())
}

/// Redraws a one-line progress indicator on stderr while scanning.
async fn report_progress(mut updates: watch::Receiver<Snapshot>) {
    while updates.changed().await.is_ok() {
        let (phase, progress) = {
            let s = updates.borrow_and_update();
            (s.phase, s.progress)
        };
        if phase == Phase::Scanning {
            eprint!("\rScanning... {progress:>3.0}%");
        }
    }
}

fn run_score(args: &ScoreArgs) -> anyhow::Result<()> {
    if let Some(rating) = args.rating {
        anyhow::ensure!(
            (0.0..=5.0).contains(&rating),
            "--rating must be between 0 and 5, got {rating}"
        );
    }
    let place = PlaceRecord {
        place_id: String::new(),
        name: String::new(),
        rating: args.rating,
        review_count: args.reviews,
        address: String::new(),
        phone: args.phone.then(|| "on file".to_owned()),
        website: args.website.then(|| "on file".to_owned()),
        opening_hours: args.hours.then(|| vec!["on file".to_owned()]),
        photos: (0..args.photos)
            .map(|i| PlacePhoto {
                reference: format!("photo-{i}"),
                width: None,
                height: None,
            })
            .collect(),
        location: None,
    };
    let scores = score(&place);
    let payload = fallback_recommendations(&scores);
    let out = serde_json::json!({ "scores": scores, "recommendations": payload });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_scores(result: &ScanResult) {
    let summary = &result.place_summary;
    println!("{}, {}", summary.name, summary.address);
    println!("Scan {}", result.scan_id);
    let s = result.scores;
    println!("  Overall       {:>3}", s.overall);
    println!("  Reviews       {:>3}", s.reviews);
    println!("  Engagement    {:>3}", s.engagement);
    println!("  Photos        {:>3}", s.photos);
    println!("  Completeness  {:>3}", s.completeness);
}

fn print_payload(payload: &RecommendationPayload) {
    println!("  Priority: {}", payload.priority);
    for rec in &payload.recommendations {
        println!(
            "  - [{}] {} ({}, {}; {})",
            rec.category, rec.action, rec.timeframe, rec.difficulty, rec.impact
        );
    }
    if !payload.quick_wins.is_empty() {
        println!("  Quick wins:");
        for win in &payload.quick_wins {
            println!("    * {win}");
        }
    }
    println!("  Revenue impact: {}", payload.revenue_impact);
    if let Some(risk) = &payload.competitive_risk {
        println!("  Competitive risk: {risk}");
    }
}
