//! Command-line client for the sync engine.
//!
//! Exit codes: 0 success, 2 usage error, 3 storage fault, 4 validation
//! failure, 5 network failure or timeout.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use repsync_client::{
    AccountMerge, AuthState, AuthStateChannel, EventQueue, HttpSyncTransport, SequenceGenerator,
    SqliteEventQueue, SqliteQueueConfig, SyncCoordinator, SyncTransport, TransportConfig,
};
use repsync_core::payload::{
    SetCompletedPayload, WorkoutEndedPayload, WorkoutStartedPayload,
};
use repsync_core::{EventPayload, EventRecord, RebuildResponse, SyncError, SyncResult};

#[derive(Parser)]
#[command(name = "repsync", about = "Offline-first workout sync client", version)]
struct Cli {
    /// Path of the local queue database
    #[arg(long, default_value = "repsync-queue.db")]
    db: String,

    /// Base URL of the sync server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Request deadline in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show queue counts by status
    Status,
    /// Drive one sync attempt for the identity pair
    Sync {
        #[arg(long)]
        device_id: Uuid,
        #[arg(long)]
        user_id: Uuid,
    },
    /// Stage a sample workout locally (no network involved)
    Seed {
        #[arg(long)]
        device_id: Uuid,
        #[arg(long)]
        user_id: Uuid,
        /// Number of completed sets to stage
        #[arg(long, default_value_t = 3)]
        sets: usize,
    },
    /// Return parked events to pending and zero their retry counts
    ResetFailed {
        #[arg(long)]
        user_id: Option<Uuid>,
    },
    /// Fold an anonymous identity into an authenticated one
    Merge {
        #[arg(long)]
        device_id: Uuid,
        #[arg(long)]
        anonymous_user_id: Uuid,
        #[arg(long)]
        authenticated_user_id: Uuid,
    },
    /// Ask the server to rebuild its projections
    Rebuild,
}

fn exit_code_for(error: &SyncError) -> u8 {
    match error {
        SyncError::StorageFault { .. } | SyncError::Serialization { .. } => 3,
        SyncError::ValidationRejected { .. } | SyncError::EventTypeUnknown { .. } => 4,
        SyncError::NetworkUnavailable { .. } | SyncError::Timeout { .. } => 5,
        _ => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {}", error);
            ExitCode::from(exit_code_for(&error))
        }
    }
}

async fn run(cli: Cli) -> SyncResult<()> {
    let queue: Arc<dyn EventQueue> = Arc::new(SqliteEventQueue::open(SqliteQueueConfig {
        database_path: cli.db.clone(),
        ..SqliteQueueConfig::default()
    })?);
    let transport: Arc<dyn SyncTransport> = Arc::new(HttpSyncTransport::new(TransportConfig {
        base_url: cli.server.clone(),
        request_timeout: Duration::from_secs(cli.timeout_secs),
    })?);
    let coordinator = Arc::new(SyncCoordinator::new(queue.clone(), transport.clone()));

    match cli.command {
        Command::Status => {
            let stats = queue.stats().await?;
            println!(
                "pending: {}\nsyncing: {}\nfailed: {}",
                stats.pending, stats.syncing, stats.failed
            );
        }
        Command::Sync { device_id, user_id } => {
            coordinator.recover().await?;
            let outcome = coordinator.sync(device_id, user_id).await?;
            println!("{}", outcome.message);
        }
        Command::Seed {
            device_id,
            user_id,
            sets,
        } => {
            let records = sample_workout(&queue, device_id, user_id, sets).await?;
            queue.enqueue(&records).await?;
            println!("saved locally; will sync when online");
        }
        Command::ResetFailed { user_id } => {
            let restored = queue.reset_failed(user_id).await?;
            println!("restored {} events to pending", restored);
        }
        Command::Merge {
            device_id,
            anonymous_user_id,
            authenticated_user_id,
        } => {
            let auth = Arc::new(AuthStateChannel::new(AuthState::anonymous(
                anonymous_user_id,
                device_id,
            )));
            let merge = AccountMerge::new(queue.clone(), coordinator, transport, auth);
            let outcome = merge
                .merge(device_id, anonymous_user_id, authenticated_user_id)
                .await?;
            println!(
                "merged {} server events; rewrote {} queued events",
                outcome.merged_event_count, outcome.queue_rows_rewritten
            );
        }
        Command::Rebuild => {
            let response = trigger_rebuild(&cli.server, cli.timeout_secs).await?;
            println!(
                "rebuilt projections: {} workouts, {} sets in {}ms",
                response.workouts_written, response.sets_written, response.duration_ms
            );
        }
    }

    Ok(())
}

/// Stage one complete workout: started, `sets` completed sets, ended.
async fn sample_workout(
    queue: &Arc<dyn EventQueue>,
    device_id: Uuid,
    user_id: Uuid,
    sets: usize,
) -> SyncResult<Vec<EventRecord>> {
    let sequences = SequenceGenerator::new(queue.clone());
    let workout_id = Uuid::new_v4();
    let exercise_id = Uuid::new_v4();
    let correlation_id = Uuid::new_v4();
    let mut records = Vec::with_capacity(sets + 2);

    let mut push = |payload: EventPayload, sequence: i64| -> SyncResult<()> {
        records.push(
            EventRecord::from_payload(&payload, user_id, device_id, sequence)?
                .with_correlation_id(correlation_id),
        );
        Ok(())
    };

    push(
        EventPayload::WorkoutStarted(WorkoutStartedPayload {
            workout_id,
            started_at: Utc::now(),
        }),
        sequences.next(device_id).await?,
    )?;
    for i in 0..sets {
        push(
            EventPayload::SetCompleted(SetCompletedPayload {
                workout_id,
                exercise_id,
                set_id: Uuid::new_v4(),
                reps: 10,
                weight: 60.0 + (i as f64) * 2.5,
                completed_at: Utc::now(),
            }),
            sequences.next(device_id).await?,
        )?;
    }
    push(
        EventPayload::WorkoutEnded(WorkoutEndedPayload {
            workout_id,
            ended_at: Utc::now(),
        }),
        sequences.next(device_id).await?,
    )?;

    Ok(records)
}

async fn trigger_rebuild(server: &str, timeout_secs: u64) -> SyncResult<RebuildResponse> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SyncError::NetworkUnavailable {
            message: format!("failed to build http client: {}", e),
        })?;

    let response = client
        .post(format!(
            "{}/api/v1/projections/rebuild",
            server.trim_end_matches('/')
        ))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout {
                    timeout_ms: timeout_secs * 1000,
                }
            } else {
                SyncError::NetworkUnavailable {
                    message: e.to_string(),
                }
            }
        })?;

    if !response.status().is_success() {
        return Err(SyncError::NetworkUnavailable {
            message: format!("rebuild endpoint returned {}", response.status()),
        });
    }

    response
        .json::<RebuildResponse>()
        .await
        .map_err(|e| SyncError::Serialization {
            message: format!("malformed rebuild response: {}", e),
        })
}
