//! The pipeline glue (C8): wires [`crate::frame`] and [`crate::eval`]
//! together into a cancellable, three-stage asynchronous pipeline over the
//! counter reader's live output.
//!
//! - **Stage A** reads raw lines off a [`LineSource`] and forwards them
//!   unmodified.
//! - **Stage B** batches lines by timestamp (a line whose leading field
//!   differs from the batch in progress starts a new one, and an idle gap
//!   with no new line also flushes) and hands each batch to
//!   [`crate::frame::assemble_frames`].
//! - **Stage C** evaluates every configured metric against each assembled
//!   frame.
//!
//! The three stages run as independent tasks connected by bounded
//! `tokio::sync::mpsc` channels, so a slow consumer naturally applies
//! backpressure to the reader instead of the pipeline buffering without
//! bound. [`PipelineHandle::cancel`] stops all three stages at their next
//! await point via a shared [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::MetricDefinition;
use crate::eval::{self, MetricFrame};
use crate::frame::{self, EventFrame, FrameError};
use crate::group::GroupDefinition;
use crate::metadata::{Granularity, Metadata, Scope};

/// Anything Stage A can read lines from: a `perf stat -x, --interval` child
/// process's stdout, or a file/pipe/in-memory buffer in tests.
///
/// Blanket-implemented for any `AsyncBufRead + Unpin + Send`; callers never
/// implement it directly, only name it as a bound.
pub trait LineSource: AsyncBufRead + Unpin + Send {}
impl<T: AsyncBufRead + Unpin + Send> LineSource for T {}

/// A pipeline-phase defect, surfaced in-band on
/// [`PipelineHandle::receiver`] rather than terminating the run: one bad
/// batch doesn't invalidate the ones before or after it (SPEC_FULL.md §7,
/// "Pipeline errors").
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A batch of lines failed to assemble into frames.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Tunables for [`spawn_pipeline`].
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Whose activity Stage B assembles frames for.
    pub scope: Scope,
    /// Aggregation granularity Stage B assembles frames at.
    pub granularity: Granularity,
    /// Bound on each inter-stage channel.
    pub channel_capacity: usize,
    /// How long Stage B waits for the next line of an in-progress batch
    /// before flushing it anyway.
    pub batch_idle_timeout: Duration,
    /// Total wall-clock time Stage A keeps reading before stopping on its
    /// own, regardless of cancellation. `None` reads until EOF or
    /// cancellation.
    pub collection_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            scope: Scope::System,
            granularity: Granularity::System,
            channel_capacity: 64,
            batch_idle_timeout: Duration::from_millis(200),
            collection_timeout: None,
        }
    }
}

/// The running pipeline: a receiver for its output and a handle to cancel
/// or join it.
pub struct PipelineHandle {
    /// Evaluated metric frames, in assembly order. A [`PipelineError`]
    /// here means one batch failed to assemble; earlier and later frames
    /// are unaffected.
    pub receiver: mpsc::Receiver<Result<MetricFrame, PipelineError>>,
    cancellation: CancellationToken,
    stage_a: JoinHandle<()>,
    stage_b: JoinHandle<()>,
    stage_c: JoinHandle<()>,
}

impl PipelineHandle {
    /// Signal all three stages to stop at their next await point.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Wait for all three stages to finish (after EOF or [`cancel`]).
    ///
    /// [`cancel`]: PipelineHandle::cancel
    pub async fn join(self) {
        let _ = tokio::join!(self.stage_a, self.stage_b, self.stage_c);
    }
}

/// Spawn the three-stage pipeline over `source`, evaluating `metrics`
/// against frames assembled from `schedule`.
pub fn spawn_pipeline<S>(
    source: S,
    metadata: Arc<Metadata>,
    metrics: Arc<Vec<MetricDefinition>>,
    schedule: Arc<Vec<GroupDefinition>>,
    config: PipelineConfig,
) -> PipelineHandle
where
    S: LineSource + 'static,
{
    let cancellation = CancellationToken::new();
    let (line_tx, line_rx) = mpsc::channel::<String>(config.channel_capacity);
    let (frame_tx, frame_rx) = mpsc::channel::<EventFrame>(config.channel_capacity);
    let (metric_tx, metric_rx) = mpsc::channel::<Result<MetricFrame, PipelineError>>(config.channel_capacity);

    let stage_a = tokio::spawn(run_stage_a(
        source,
        line_tx,
        cancellation.clone(),
        config.collection_timeout,
    ));
    let stage_b = tokio::spawn(run_stage_b(
        line_rx,
        frame_tx,
        metric_tx.clone(),
        metadata.clone(),
        schedule,
        config.scope,
        config.granularity,
        config.batch_idle_timeout,
        cancellation.clone(),
    ));
    let stage_c = tokio::spawn(run_stage_c(frame_rx, metric_tx, metrics, metadata, cancellation.clone()));

    PipelineHandle {
        receiver: metric_rx,
        cancellation,
        stage_a,
        stage_b,
        stage_c,
    }
}

async fn run_stage_a<S: LineSource>(
    source: S,
    line_tx: mpsc::Sender<String>,
    cancellation: CancellationToken,
    collection_timeout: Option<Duration>,
) {
    let mut lines = source.lines();
    let deadline = collection_timeout.map(|d| tokio::time::Instant::now() + d);

    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = sleep_until_or_forever(deadline) => break,
            line = lines.next_line() => line,
        };
        match next {
            Ok(Some(line)) => {
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
}

/// Sleeps until `deadline` if set, otherwise never resolves — lets Stage A
/// share one `select!` arm whether or not a collection timeout is
/// configured.
async fn sleep_until_or_forever(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stage_b(
    mut line_rx: mpsc::Receiver<String>,
    frame_tx: mpsc::Sender<EventFrame>,
    error_tx: mpsc::Sender<Result<MetricFrame, PipelineError>>,
    metadata: Arc<Metadata>,
    schedule: Arc<Vec<GroupDefinition>>,
    scope: Scope,
    granularity: Granularity,
    idle_timeout: Duration,
    cancellation: CancellationToken,
) {
    let mut buffer: Vec<String> = Vec::new();
    let mut current_timestamp: Option<String> = None;

    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => {
                flush_batch(&mut buffer, &mut current_timestamp, &frame_tx, &error_tx, &metadata, &schedule, &scope, granularity).await;
                break;
            }
            _ = tokio::time::sleep(idle_timeout), if !buffer.is_empty() => {
                flush_batch(&mut buffer, &mut current_timestamp, &frame_tx, &error_tx, &metadata, &schedule, &scope, granularity).await;
                continue;
            }
            line = line_rx.recv() => line,
        };

        match next {
            Some(line) => {
                let timestamp = frame::peek_timestamp(&line).unwrap_or_default();
                if current_timestamp.as_deref().is_some_and(|current| current != timestamp) {
                    flush_batch(&mut buffer, &mut current_timestamp, &frame_tx, &error_tx, &metadata, &schedule, &scope, granularity).await;
                }
                current_timestamp = Some(timestamp);
                buffer.push(line);
            }
            None => {
                flush_batch(&mut buffer, &mut current_timestamp, &frame_tx, &error_tx, &metadata, &schedule, &scope, granularity).await;
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn flush_batch(
    buffer: &mut Vec<String>,
    current_timestamp: &mut Option<String>,
    frame_tx: &mpsc::Sender<EventFrame>,
    error_tx: &mpsc::Sender<Result<MetricFrame, PipelineError>>,
    metadata: &Metadata,
    schedule: &[GroupDefinition],
    scope: &Scope,
    granularity: Granularity,
) {
    if buffer.is_empty() {
        return;
    }
    let text = buffer.join("\n");
    buffer.clear();
    *current_timestamp = None;

    match frame::assemble_frames(&text, metadata, schedule, scope, granularity) {
        Ok(frames) => {
            for frame in frames {
                if frame_tx.send(frame).await.is_err() {
                    return;
                }
            }
        }
        Err(err) => {
            let _ = error_tx.send(Err(PipelineError::from(err))).await;
        }
    }
}

async fn run_stage_c(
    mut frame_rx: mpsc::Receiver<EventFrame>,
    metric_tx: mpsc::Sender<Result<MetricFrame, PipelineError>>,
    metrics: Arc<Vec<MetricDefinition>>,
    metadata: Arc<Metadata>,
    cancellation: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancellation.cancelled() => break,
            frame = frame_rx.recv() => frame,
        };
        match next {
            Some(frame) => {
                for metric in metrics.iter() {
                    let evaluated = eval::evaluate_frame(metric, &frame, &metadata);
                    if metric_tx.send(Ok(evaluated)).await.is_err() {
                        return;
                    }
                }
            }
            None => break,
        }
    }
}
