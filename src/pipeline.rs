use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::coerce::{Coerce, ObjectCoercer};
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::ingest::{
    BatchDispatcher, CoalescingBuffer, FlushOutcome, Intake, IntakeOutcome, Normalizer,
};
use crate::network::ConnectionManager;
use crate::network::connection::shutdown_signal;
use crate::queue::{HttpJobQueue, JobQueue};
use crate::telemetry::{StatusSnapshot, Telemetry};

/// The change-ingestion pipeline.
///
/// Owns the buffer, the dedup state, the dispatcher and the telemetry.
/// Nothing runs until [`IngestPipeline::start`]; [`IngestPipeline::stop`]
/// tears every timer down and submits whatever is still buffered.
pub struct IngestPipeline {
    config: PipelineConfig,
    telemetry: Arc<Telemetry>,
    buffer: Arc<Mutex<CoalescingBuffer>>,
    dispatcher: Arc<BatchDispatcher>,
    // Parked here while the pipeline is stopped so dedup state survives restarts
    intake: Option<Intake>,
    shutdown: Option<watch::Sender<bool>>,
    listener: Option<JoinHandle<()>>,
    ingest: Option<JoinHandle<Intake>>,
}

impl IngestPipeline {
    /// Create a pipeline that submits batches to `queue`.
    pub fn new(config: PipelineConfig, queue: Arc<dyn JobQueue>) -> Self {
        let telemetry = Arc::new(Telemetry::new());
        let buffer = Arc::new(Mutex::new(CoalescingBuffer::new()));
        let dispatcher = Arc::new(BatchDispatcher::new(
            Arc::clone(&buffer),
            queue,
            Arc::clone(&telemetry),
        ));
        let intake = Intake::new(
            Normalizer::new(config.object_type.clone()),
            Arc::new(ObjectCoercer),
            Arc::clone(&buffer),
            Arc::clone(&telemetry),
        );

        Self {
            config,
            telemetry,
            buffer,
            dispatcher,
            intake: Some(intake),
            shutdown: None,
            listener: None,
            ingest: None,
        }
    }

    /// Create a pipeline that posts batches to `config.queue_url`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, IngestError> {
        let queue_url = config
            .queue_url
            .clone()
            .ok_or_else(|| IngestError::ConfigError("queue url is not set".to_string()))?;
        let queue = HttpJobQueue::new(&queue_url, config.queue_timeout)?;
        Ok(Self::new(config, Arc::new(queue)))
    }

    /// Replace the document coercer (default: [`ObjectCoercer`]).
    pub fn with_coercer(mut self, coercer: impl Coerce + 'static) -> Self {
        self.intake = Some(Intake::new(
            Normalizer::new(self.config.object_type.clone()),
            Arc::new(coercer),
            Arc::clone(&self.buffer),
            Arc::clone(&self.telemetry),
        ));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Connect to the stream and start ingesting.
    pub fn start(&mut self) -> Result<(), IngestError> {
        self.config.validate()?;
        if self.is_running() {
            return Err(IngestError::AlreadyRunning);
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.frame_channel_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);

        let manager = ConnectionManager::new(
            &self.config.stream_url,
            frame_tx,
            stop_rx.clone(),
            Arc::clone(&self.telemetry),
            self.config.heartbeat_interval,
            self.config.reconnect_delay,
        )?;

        self.listener = Some(tokio::spawn(manager.run()));
        self.spawn_ingest(frame_rx, stop_rx)?;
        self.shutdown = Some(stop_tx);
        info!("Pipeline started for {}", self.config.stream_url);
        Ok(())
    }

    /// Start ingesting from an already established frame source instead
    /// of the websocket listener.
    pub fn start_with_frames(&mut self, frames: mpsc::Receiver<String>) -> Result<(), IngestError> {
        if self.is_running() {
            return Err(IngestError::AlreadyRunning);
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        self.spawn_ingest(frames, stop_rx)?;
        self.shutdown = Some(stop_tx);
        Ok(())
    }

    /// Stop listening, ingest frames still queued, wait for in-flight
    /// flushes, then flush once more.
    pub async fn stop(&mut self) {
        let Some(stop_tx) = self.shutdown.take() else {
            return;
        };
        let _ = stop_tx.send(true);

        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                warn!("Stream listener task failed: {}", e);
            }
        }
        if let Some(ingest) = self.ingest.take() {
            match ingest.await {
                Ok(intake) => self.intake = Some(intake),
                Err(e) => warn!("Ingestion task failed: {}", e),
            }
        }
        info!("Pipeline stopped: {}", self.status().await);
    }

    /// Flush the buffer now.
    pub async fn flush(&self) -> FlushOutcome {
        self.dispatcher.flush().await
    }

    /// Snapshot of telemetry plus the current buffer size.
    pub async fn status(&self) -> StatusSnapshot {
        let (buffer_size, stats) = {
            let buffer = self.buffer.lock().await;
            (buffer.len(), buffer.stats().clone())
        };
        let mut snapshot = self.telemetry.snapshot(buffer_size);
        snapshot.payloads_coalesced = stats.payloads_coalesced;
        snapshot.payloads_restored = stats.payloads_restored;
        snapshot
    }

    fn spawn_ingest(
        &mut self,
        frames: mpsc::Receiver<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        // Only missing if a previous ingestion task panicked.
        let intake = self.intake.take().ok_or_else(|| {
            IngestError::ConnectionError("ingestion state lost by a failed task".to_string())
        })?;

        self.ingest = Some(tokio::spawn(ingest_loop(
            intake,
            Arc::clone(&self.dispatcher),
            frames,
            shutdown,
            self.config.batch_size,
            self.config.batch_timeout,
        )));
        Ok(())
    }
}

/// Single consumer of inbound frames. Flushes run as separate tasks so
/// queue I/O never stalls intake.
async fn ingest_loop(
    mut intake: Intake,
    dispatcher: Arc<BatchDispatcher>,
    mut frames: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
    batch_size: usize,
    batch_timeout: Duration,
) -> Intake {
    let mut ticker = interval_at(Instant::now() + batch_timeout, batch_timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut flushes: JoinSet<FlushOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_signal(&mut shutdown) => break,
            _ = ticker.tick() => spawn_flush(&mut flushes, &dispatcher),
            frame = frames.recv() => match frame {
                Some(raw) => {
                    if let IntakeOutcome::Buffered(len) = intake.handle_frame(&raw).await {
                        if len >= batch_size {
                            debug!("Buffer reached {} ids, flushing", len);
                            spawn_flush(&mut flushes, &dispatcher);
                        }
                    }
                }
                None => {
                    info!("Frame source closed");
                    break;
                }
            },
            Some(_) = flushes.join_next(), if !flushes.is_empty() => {}
        }
    }

    // Frames already taken off the socket still go into the final flush.
    frames.close();
    let mut drained = 0;
    while let Some(raw) = frames.recv().await {
        intake.handle_frame(&raw).await;
        drained += 1;
    }
    if drained > 0 {
        debug!("Took {} queued frames into the final flush", drained);
    }

    while flushes.join_next().await.is_some() {}
    if let FlushOutcome::Requeued(n) = dispatcher.flush().await {
        warn!("Final flush failed, {} payloads left in buffer", n);
    }
    intake
}

fn spawn_flush(flushes: &mut JoinSet<FlushOutcome>, dispatcher: &Arc<BatchDispatcher>) {
    if dispatcher.is_flushing() {
        return;
    }
    let dispatcher = Arc::clone(dispatcher);
    flushes.spawn(async move { dispatcher.flush().await });
}
