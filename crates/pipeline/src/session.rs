//! Session lifecycle and the task boundary between ingestion and analysis
//!
//! A [`Session`] owns the [`Ingestor`] and feeds two worker tasks, one per
//! analysis engine. Each worker exclusively owns its engine state and
//! receives copied snapshots through a single-slot channel. When a request
//! is still waiting, the newer snapshot evicts it (latest wins), so a worker
//! never has more than one request pending and one in flight.
//!
//! Stopping a session cancels its token and joins the workers. A worker
//! checks the token before publishing and races its event send against it,
//! so a result computed across the stop is discarded rather than delivered
//! and a full event channel cannot hold the stop up.

use biosignal_types::{FilteredSample, PipelineConfig, PipelineEvent, SessionStats};
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::band_power::{SpectralEngine, SpectralRequest};
use crate::cardiac::{BeatEngine, BeatRequest};
use crate::error::PipelineResult;
use crate::ingest::Ingestor;

/// Single-slot request queue where a newer request replaces a pending one.
pub struct LatestSlot<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
    dropped: u64,
}

impl<T> LatestSlot<T> {
    /// Create the slot and the receiving end handed to a worker.
    pub fn new() -> (Self, Receiver<T>) {
        let (tx, rx) = flume::bounded(1);
        (Self { tx, evict: rx.clone(), dropped: 0 }, rx)
    }

    /// Queue `item`, evicting a stale pending request if there is one.
    pub fn offer(&mut self, item: T) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                match self.evict.try_recv() {
                    Ok(_stale) => self.dropped += 1,
                    // The worker picked it up in the meantime.
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {}
                }
                if self.tx.try_send(item).is_err() {
                    self.dropped += 1;
                }
            }
            Err(TrySendError::Disconnected(_)) => self.dropped += 1,
        }
    }

    /// Requests that were replaced or could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// A running pipeline session.
pub struct Session {
    id: Uuid,
    ingestor: Ingestor,
    spectral: LatestSlot<SpectralRequest>,
    beat: LatestSlot<BeatRequest>,
    events: Sender<PipelineEvent>,
    shutdown: CancellationToken,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    _guard: DropGuard,
}

impl Session {
    /// Validate `config`, create all per-session state and spawn the
    /// analysis workers on the current tokio runtime.
    pub fn start(config: &PipelineConfig, events: Sender<PipelineEvent>) -> PipelineResult<Self> {
        let id = Uuid::new_v4();
        let ingestor = Ingestor::new(id, config)?;
        let shutdown = CancellationToken::new();

        let (spectral, spectral_rx) = LatestSlot::new();
        let (beat, beat_rx) = LatestSlot::new();

        let mut spectral_engine = SpectralEngine::new(&config.spectral);
        let spectral_task = tokio::spawn(run_worker(
            "spectral",
            spectral_rx,
            events.clone(),
            shutdown.clone(),
            move |req: SpectralRequest| PipelineEvent::BandPower(spectral_engine.process(&req)),
        ));

        let mut beat_engine = BeatEngine::new(&config.cardiac);
        let beat_task = tokio::spawn(run_worker(
            "beat",
            beat_rx,
            events.clone(),
            shutdown.clone(),
            move |req: BeatRequest| PipelineEvent::HeartRate(beat_engine.process(&req)),
        ));

        info!(session = %id, sample_rate = config.sample_rate_hz, layout = ?config.packet_layout, "Session started");
        let session = Self {
            id,
            ingestor,
            spectral,
            beat,
            events,
            _guard: shutdown.clone().drop_guard(),
            shutdown,
            workers: vec![("spectral", spectral_task), ("beat", beat_task)],
        };
        session.publish(PipelineEvent::SessionStarted { session_id: id, sample_rate_hz: config.sample_rate_hz });
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Push one sensor payload through the ordered path.
    ///
    /// Never waits: analysis requests go through the latest-wins slots and
    /// events to the consumer are dropped if its channel is full.
    pub fn ingest(&mut self, payload: &[u8]) -> Vec<FilteredSample> {
        let out = self.ingestor.ingest(payload);

        for request in out.spectral {
            self.spectral.offer(request);
        }
        for request in out.beat {
            self.beat.offer(request);
        }
        if let Some(loss) = out.loss {
            self.publish(PipelineEvent::PacketLoss {
                session_id: self.id,
                sequence_losses: loss.sequence_losses,
                framing_errors: loss.framing_errors,
            });
        }
        out.samples
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            spectral_dropped: self.spectral.dropped(),
            beat_dropped: self.beat.dropped(),
            ..self.ingestor.stats()
        }
    }

    /// Tear the session down and wait for its workers to exit.
    ///
    /// A `Stopped` event is published after both workers have finished, so
    /// it is the last event this session emits. The send waits for room in
    /// the event channel and only fails once the consumer is gone.
    pub async fn stop(self) -> SessionStats {
        let stats = self.stats();
        let Session { id, spectral, beat, events, shutdown, workers, _guard, .. } = self;

        shutdown.cancel();
        drop(spectral);
        drop(beat);

        for (name, handle) in workers {
            if let Err(e) = handle.await {
                error!(session = %id, worker = name, error = %e, "Worker task failed");
            }
        }

        if events.send_async(PipelineEvent::Stopped { session_id: id, stats }).await.is_err() {
            warn!(session = %id, "Event consumer gone before stop event");
        }
        info!(
            session = %id,
            samples = stats.samples_filtered,
            sequence_losses = stats.decode.sequence_losses,
            framing_errors = stats.decode.framing_errors,
            "Session stopped"
        );
        stats
    }

    fn publish(&self, event: PipelineEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(session = %self.id, error = %e, "Dropping pipeline event");
        }
    }
}

async fn run_worker<Req, F>(
    name: &'static str,
    requests: Receiver<Req>,
    events: Sender<PipelineEvent>,
    shutdown: CancellationToken,
    mut handle: F,
) where
    Req: Send + 'static,
    F: FnMut(Req) -> PipelineEvent + Send + 'static,
{
    let mut processed = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = requests.recv_async() => {
                let Ok(request) = msg else { break };
                let event = handle(request);
                if shutdown.is_cancelled() {
                    debug!(worker = name, "Discarding result computed across shutdown");
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!(worker = name, "Discarding result blocked on a full event channel");
                        break;
                    }
                    sent = events.send_async(event) => {
                        if sent.is_err() {
                            debug!(worker = name, "Event consumer gone");
                            break;
                        }
                    }
                }
                processed += 1;
            }
        }
    }
    debug!(worker = name, processed, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_slot_keeps_newest() {
        let (mut slot, rx) = LatestSlot::new();
        slot.offer(1);
        slot.offer(2);
        slot.offer(3);
        assert_eq!(slot.dropped(), 2);
        assert_eq!(rx.try_recv(), Ok(3));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_latest_slot_no_drop_when_consumed() {
        let (mut slot, rx) = LatestSlot::new();
        slot.offer("a");
        assert_eq!(rx.try_recv(), Ok("a"));
        slot.offer("b");
        assert_eq!(rx.try_recv(), Ok("b"));
        assert_eq!(slot.dropped(), 0);
    }

    #[test]
    fn test_latest_slot_outlives_worker_receiver() {
        let (mut slot, rx) = LatestSlot::<u8>::new();
        drop(rx);
        // The slot holds its own receiver clone, so offers keep evicting.
        slot.offer(1);
        slot.offer(2);
        assert_eq!(slot.dropped(), 1);
    }
}
