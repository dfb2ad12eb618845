use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;

mod config;
mod db;
mod error;
mod evidence;
mod fallback;
mod local;
mod lock;
mod models;
mod notify;
mod rank;
mod report;
mod review;
mod scoring;
mod store;
mod submit;

use config::Config;
use db::PgStore;
use evidence::DirEvidenceStore;
use fallback::FallbackStore;
use local::LocalStore;
use models::{Perspective, Stage1Decision, VoteChoice};
use notify::{Attachment, PostmarkNotifier};
use store::{RecordKey, RecordStore};

#[derive(Parser)]
#[command(name = "excellence-awards")]
#[command(about = "Quality & Excellence Awards submission and review desk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Recommend,
    Reject,
}

impl From<DecisionArg> for Stage1Decision {
    fn from(value: DecisionArg) -> Self {
        match value {
            DecisionArg::Recommend => Stage1Decision::RecommendForFinals,
            DecisionArg::Reject => Stage1Decision::Reject,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum VoteArg {
    Winner,
    RunnerUp,
    Shortlist,
    Reject,
}

impl From<VoteArg> for VoteChoice {
    fn from(value: VoteArg) -> Self {
        match value {
            VoteArg::Winner => VoteChoice::Winner,
            VoteArg::RunnerUp => VoteChoice::RunnerUp,
            VoteArg::Shortlist => VoteChoice::Shortlist,
            VoteArg::Reject => VoteChoice::Reject,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Load realistic sample submissions
    Seed,
    /// Submit an award entry from a JSON form file
    Submit {
        #[arg(long)]
        form: PathBuf,
    },
    /// Bulk-import submissions from a CSV export
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Set or clear the submission deadline (RFC 3339)
    SetDeadline {
        #[arg(long, conflicts_with = "clear")]
        deadline: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    /// Show the submission deadline currently in force
    ShowDeadline,
    /// Take the edit lock on one submission
    Lock {
        #[arg(long)]
        name: String,
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        #[arg(long)]
        holder: String,
        #[arg(long, default_value_t = lock::DEFAULT_TTL_SECS)]
        ttl: i64,
        #[arg(long)]
        password: String,
    },
    /// Release a held edit lock
    Unlock {
        #[arg(long)]
        name: String,
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        #[arg(long)]
        token: String,
        #[arg(long)]
        password: String,
    },
    /// Record the stage-1 recommend/reject decision (requires a held lock)
    Stage1 {
        #[arg(long)]
        name: String,
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        #[arg(long)]
        token: String,
        #[arg(long, value_enum)]
        decision: DecisionArg,
        #[arg(long, default_value = "")]
        comment: String,
        #[arg(long)]
        password: String,
    },
    /// Record a stage-2 committee vote (requires a held lock)
    Vote {
        #[arg(long)]
        name: String,
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        #[arg(long)]
        token: String,
        #[arg(long)]
        evaluator: String,
        #[arg(long, value_enum)]
        vote: VoteArg,
        #[arg(long)]
        password: String,
    },
    /// Print the current final ranking
    Rank {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(serde::Deserialize)]
struct FormFile {
    candidate_name: String,
    #[serde(default)]
    perspectives: BTreeMap<Perspective, FormPerspective>,
}

#[derive(Default, serde::Deserialize)]
struct FormPerspective {
    #[serde(default)]
    action: String,
    #[serde(default)]
    files: Vec<PathBuf>,
}

fn load_form(path: &Path) -> anyhow::Result<submit::SubmissionInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read form file {}", path.display()))?;
    let form: FormFile = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid submission form", path.display()))?;

    let mut perspectives = BTreeMap::new();
    for (perspective, slice) in form.perspectives {
        let mut attachments = Vec::new();
        for file in &slice.files {
            let bytes = std::fs::read(file)
                .with_context(|| format!("cannot read evidence file {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string());
            let content_type = evidence::content_type_for(&file_name).to_string();
            attachments.push(Attachment {
                file_name,
                content_type,
                bytes,
            });
        }
        perspectives.insert(
            perspective,
            submit::PerspectiveInput {
                action: slice.action,
                attachments,
            },
        );
    }

    Ok(submit::SubmissionInput {
        candidate_name: form.candidate_name,
        perspectives,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();

    if let Commands::InitDb = cli.command {
        let database_url = cfg
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to initialise the database schema")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        db::init_db(&pool).await?;
        println!("Schema ready.");
        return Ok(());
    }

    let local = LocalStore::new(&cfg.data_dir)?;
    let store: Box<dyn RecordStore> = match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            Box::new(FallbackStore::new(PgStore::new(pool), local))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using the local file store only");
            Box::new(local)
        }
    };

    match cli.command {
        Commands::InitDb => unreachable!("handled above"),
        Commands::Seed => {
            let inserted = submit::seed(store.as_ref()).await?;
            println!("Seeded {inserted} sample submissions.");
        }
        Commands::Submit { form } => {
            let input = load_form(&form)?;
            let notifier = PostmarkNotifier::new(cfg.postmark_token()?);
            let evidence_store = DirEvidenceStore::new(cfg.data_dir.join("evidence"));
            let receipt = submit::submit(
                store.as_ref(),
                &evidence_store,
                &notifier,
                cfg.awards_email()?,
                input,
                Utc::now(),
            )
            .await?;

            println!(
                "Submission received for {} at {} (total score {:.1}).",
                receipt.candidate_name,
                receipt.submitted_at.to_rfc3339(),
                receipt.total_score
            );
            for warning in &receipt.warnings {
                println!("WARNING: {warning}");
            }
        }
        Commands::Import { csv } => {
            let inserted = submit::import_csv(store.as_ref(), &csv).await?;
            println!("Imported {inserted} submissions from {}.", csv.display());
        }
        Commands::SetDeadline { deadline, clear } => {
            if clear {
                store.set_setting(submit::DEADLINE_KEY, "").await?;
                println!("Deadline cleared; submissions are open.");
            } else {
                let value = deadline.context("pass --deadline <RFC 3339 timestamp> or --clear")?;
                let parsed = DateTime::parse_from_rfc3339(value.trim())
                    .with_context(|| format!("'{value}' is not a valid RFC 3339 timestamp"))?
                    .with_timezone(&Utc);
                store
                    .set_setting(submit::DEADLINE_KEY, &parsed.to_rfc3339())
                    .await?;
                println!("Submissions close at {}.", parsed.to_rfc3339());
            }
        }
        Commands::ShowDeadline => {
            match submit::submissions_open_at(store.as_ref(), Utc::now()).await {
                Ok(Some(deadline)) => {
                    println!("Submissions close at {}.", deadline.to_rfc3339());
                }
                Ok(None) => println!("No deadline set; submissions are open."),
                Err(err) => println!("Submissions are closed: {err}"),
            }
        }
        Commands::Lock {
            name,
            timestamp,
            holder,
            ttl,
            password,
        } => {
            review::verify_evaluator(&password, cfg.evaluator_password.as_deref())?;
            let key = RecordKey::new(&name, timestamp);
            match lock::acquire(store.as_ref(), &key, &holder, ttl).await? {
                Some(grant) => {
                    println!("Lock acquired on {key}.");
                    println!("  token:   {}", grant.token);
                    println!("  expires: {}", grant.expires_at.to_rfc3339());
                }
                None => {
                    println!("{key} is locked by another evaluator; retry after the lock expires.");
                }
            }
        }
        Commands::Unlock {
            name,
            timestamp,
            token,
            password,
        } => {
            review::verify_evaluator(&password, cfg.evaluator_password.as_deref())?;
            let key = RecordKey::new(&name, timestamp);
            if lock::release(store.as_ref(), &key, &token).await? {
                println!("Lock released on {key}.");
            } else {
                println!("Token does not hold the lock on {key}; nothing changed.");
            }
        }
        Commands::Stage1 {
            name,
            timestamp,
            token,
            decision,
            comment,
            password,
        } => {
            review::verify_evaluator(&password, cfg.evaluator_password.as_deref())?;
            let key = RecordKey::new(&name, timestamp);
            let decision = Stage1Decision::from(decision);
            review::record_stage1(store.as_ref(), &key, &token, decision, &comment).await?;
            println!("Stage 1 decision '{decision}' recorded for {key}.");
        }
        Commands::Vote {
            name,
            timestamp,
            token,
            evaluator,
            vote,
            password,
        } => {
            review::verify_evaluator(&password, cfg.evaluator_password.as_deref())?;
            let key = RecordKey::new(&name, timestamp);
            let choice = VoteChoice::from(vote);
            let count =
                review::record_vote(store.as_ref(), &key, &token, &evaluator, choice).await?;
            println!("Vote '{choice}' recorded for {key}; {count} vote(s) on record.");
        }
        Commands::Rank { limit } => {
            let records = store.list_all().await?;
            let ranked = rank::rank_candidates(&records);

            if ranked.is_empty() {
                println!("No candidates recommended for the finals yet.");
                return Ok(());
            }

            println!("Final ranking:");
            for (position, candidate) in ranked.iter().take(limit).enumerate() {
                println!(
                    "{}. {} - final rank {:.1} (system score {:.1}, committee weight {:.2}, {} vote(s))",
                    position + 1,
                    candidate.candidate_name,
                    candidate.final_rank,
                    candidate.total_score,
                    candidate.committee_weight,
                    candidate.vote_count,
                );
            }
        }
        Commands::Report { out } => {
            let records = store.list_all().await?;
            let report = report::build_report(&records, Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
