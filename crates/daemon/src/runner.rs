//! Wires a sensor source to a pipeline session and drains its events.

use std::io::Write;

use biosignal_types::{PipelineEvent, SessionStats};
use bytes::Bytes;
use pipeline::Session;
use sensors::SensorSource;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;

/// Run one session until `shutdown` fires or the source ends.
///
/// Payloads are ingested in arrival order on this task. Events go to
/// `events`; the session's final `Stopped` event is the last one sent.
pub async fn run_session<S>(
    config: &DaemonConfig,
    mut source: S,
    events: flume::Sender<PipelineEvent>,
    shutdown: CancellationToken,
) -> anyhow::Result<SessionStats>
where
    S: SensorSource + 'static,
{
    let mut session = Session::start(&config.pipeline, events)?;
    let session_id = session.id();

    let (payload_tx, payload_rx) = flume::bounded::<Bytes>(config.payload_queue_capacity);
    let source_token = shutdown.child_token();
    let source_name = source.name().to_string();
    let source_task = {
        let token = source_token.clone();
        tokio::spawn(async move { source.run(payload_tx, token).await })
    };
    info!(session = %session_id, source = %source_name, "Sensor source started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(session = %session_id, "Shutdown requested");
                break;
            }
            payload = payload_rx.recv_async() => match payload {
                Ok(payload) => {
                    session.ingest(&payload);
                }
                Err(_) => {
                    warn!(session = %session_id, source = %source_name, "Sensor source ended");
                    break;
                }
            }
        }
    }

    source_token.cancel();
    drop(payload_rx);
    match source_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(source = %source_name, error = %e, "Sensor source stopped with error"),
        Err(e) => error!(source = %source_name, error = %e, "Sensor task failed"),
    }

    Ok(session.stop().await)
}

/// Write every event as one JSON line until all senders are gone.
///
/// Blocking; run it on a dedicated thread.
pub fn write_events<W: Write>(events: flume::Receiver<PipelineEvent>, mut out: W) -> std::io::Result<u64> {
    let mut written = 0u64;
    for event in events.iter() {
        serde_json::to_writer(&mut out, &event)?;
        out.write_all(b"\n")?;
        out.flush()?;
        written += 1;
    }
    Ok(written)
}
