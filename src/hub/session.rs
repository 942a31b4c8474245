//! Per-connection read and write pumps.
//!
//! A session is two cooperative tasks sharing nothing but a bounded
//! outbox: the read pump owns the inbound direction and the hub/writer
//! handles, the write pump owns the outbound direction and the transport's
//! write half. Neither touches the other's state directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::Config;
use crate::location::{valid_lat_lng, LocationMessage};
use crate::lossy::LossyChannel;
use crate::metrics::Metrics;
use crate::store::Location;
use crate::transport::{WsEvent, WsReader, WsWriter};
use crate::writer::WriterPool;

use super::Hub;

/// Spawn a session's read pump and write pump for an already-upgraded
/// transport, after registering it with the hub.
///
/// `user_id` is the session's authenticated identity, established by the
/// upgrade handler before this is called; it is never re-derived from
/// client-supplied data after this point.
pub async fn spawn(
    hub: Hub,
    cfg: Arc<Config>,
    writer: Arc<WriterPool>,
    metrics: Arc<Metrics>,
    user_id: String,
    reader: Box<dyn WsReader>,
    writer_half: Box<dyn WsWriter>,
) {
    let id = hub.next_session_id();
    let (outbox, outbox_rx) = LossyChannel::new(cfg.send_buffer);
    hub.register(id, outbox).await;

    let write_cfg = Arc::clone(&cfg);
    tokio::spawn(write_pump(writer_half, outbox_rx, write_cfg, Arc::clone(&metrics)));

    tokio::spawn(read_pump(reader, hub, cfg, writer, metrics, id, user_id));
}

/// Ingest inbound frames, validate, and feed the writer pool and the hub's
/// broadcast channel. Terminates on any transport error or protocol
/// timeout; always posts an unregister on the way out.
async fn read_pump(
    mut reader: Box<dyn WsReader>,
    hub: Hub,
    cfg: Arc<Config>,
    writer: Arc<WriterPool>,
    metrics: Arc<Metrics>,
    session_id: u64,
    user_id: String,
) {
    let mut deadline = Instant::now() + cfg.pong_wait;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match tokio::time::timeout(remaining, reader.recv()).await {
            Ok(Some(Ok(event))) => event,
            // Timeout, stream end, or transport error: all terminate the
            // session identically, per the reference's "errors are not
            // distinguished" read-pump contract.
            Ok(Some(Err(_)) | None) | Err(_) => break,
        };

        match event {
            WsEvent::Close => break,
            WsEvent::Pong => {
                deadline = Instant::now() + cfg.pong_wait;
            }
            WsEvent::Text(text) => {
                metrics.record_message_in();
                handle_frame(&text, &user_id, &hub, &writer);
            }
        }
    }

    hub.unregister(session_id).await;
}

fn handle_frame(text: &str, user_id: &str, hub: &Hub, writer: &WriterPool) {
    let Ok(mut msg) = serde_json::from_str::<LocationMessage>(text) else {
        return;
    };
    if !msg.is_location() {
        return;
    }
    if !valid_lat_lng(msg.lat, msg.lng) {
        return;
    }

    // Persisted record uses the authenticated identity; the broadcast below
    // still carries the client's original bytes (see the crate's recorded
    // decision on broadcast payload identity).
    msg.user_id = user_id.to_string();

    writer.enqueue(Location {
        user_id: msg.user_id,
        lat: msg.lat,
        lng: msg.lng,
        accuracy: msg.accuracy,
        ts: msg.ts,
    });

    hub.broadcast(text.as_bytes().to_vec());
}

/// Drain the outbox to the transport, coalescing bursts into a single
/// frame and keeping the connection alive with periodic pings.
async fn write_pump(
    mut sender: Box<dyn WsWriter>,
    mut outbox_rx: mpsc::Receiver<Vec<u8>>,
    cfg: Arc<Config>,
    metrics: Arc<Metrics>,
) {
    let mut ticker = tokio::time::interval(cfg.ping_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = outbox_rx.recv() => {
                match maybe {
                    None => {
                        let _ = tokio::time::timeout(cfg.write_wait, sender.close()).await;
                        break;
                    }
                    Some(first) => {
                        // Bound the drain to what was already buffered when
                        // this receive fired, so it cannot race with frames
                        // appended to the outbox after the drain begins.
                        let pending = outbox_rx.len();
                        let mut buf = first;
                        for _ in 0..pending {
                            match outbox_rx.try_recv() {
                                Ok(next) => {
                                    buf.push(b'\n');
                                    buf.extend_from_slice(&next);
                                }
                                Err(_) => break,
                            }
                        }

                        let text = String::from_utf8_lossy(&buf).into_owned();
                        match tokio::time::timeout(cfg.write_wait, sender.send_text(text)).await {
                            Ok(Ok(())) => metrics.record_message_out(),
                            _ => break,
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                match tokio::time::timeout(cfg.write_wait, sender.send_ping()).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::store::memory::MemoryStore;
    use crate::transport::mock::{MockReader, MockWriter};
    use std::sync::Arc;
    use tokio::sync::mpsc as tmpsc;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            addr: "127.0.0.1:0".into(),
            write_wait: Duration::from_millis(200),
            pong_wait: Duration::from_millis(200),
            ping_period: Duration::from_millis(50),
            max_message_bytes: 2048,
            send_buffer: 8,
            broadcast_buf: 64,
            register_buf: 16,
            unregister_buf: 16,
            redis_addr: String::new(),
            redis_password: String::new(),
            redis_db: 0,
            redis_workers: 0,
            redis_queue_size: 16,
            location_ttl_seconds: 120,
        })
    }

    #[tokio::test]
    async fn valid_frame_is_persisted_and_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(WriterPool::spawn(store.clone(), 16, 1));
        let metrics = Arc::new(Metrics::new());
        let hub = Hub::spawn(16, 16, 16, Arc::clone(&metrics));

        // A second, passive session to observe the broadcast.
        let (observer_outbox, mut observer_rx) = LossyChannel::new(8);
        hub.register(hub.next_session_id(), observer_outbox).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (event_tx, event_rx) = tmpsc::unbounded_channel();
        let raw = r#"{"type":"location","userId":"spoofed","lat":1.0,"lng":2.0,"accuracy":3.0,"ts":42}"#;
        event_tx
            .send(Ok(WsEvent::Text(raw.to_string())))
            .unwrap();
        drop(event_tx);

        let (sent_tx, _sent_rx) = tmpsc::unbounded_channel();
        let reader: Box<dyn WsReader> = Box::new(MockReader { rx: event_rx });
        let writer_half: Box<dyn WsWriter> = Box::new(MockWriter {
            tx: sent_tx,
            fail_after: None,
            sent: 0,
        });

        spawn(
            hub.clone(),
            test_config(),
            Arc::clone(&writer),
            Arc::clone(&metrics),
            "authenticated-a".to_string(),
            reader,
            writer_half,
        )
        .await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(observer_rx.try_recv().unwrap(), raw.as_bytes());
        assert!(store.contains("authenticated-a"));
        assert!(!store.contains("spoofed"));
    }

    #[tokio::test]
    async fn malformed_frame_is_discarded_without_disconnect() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(WriterPool::spawn(store, 16, 1));
        let metrics = Arc::new(Metrics::new());
        let hub = Hub::spawn(16, 16, 16, Arc::clone(&metrics));

        let (event_tx, event_rx) = tmpsc::unbounded_channel();
        event_tx.send(Ok(WsEvent::Text("not json".to_string()))).unwrap();
        drop(event_tx);

        let (sent_tx, _sent_rx) = tmpsc::unbounded_channel();
        let reader: Box<dyn WsReader> = Box::new(MockReader { rx: event_rx });
        let writer_half: Box<dyn WsWriter> = Box::new(MockWriter {
            tx: sent_tx,
            fail_after: None,
            sent: 0,
        });

        spawn(hub, test_config(), writer, Arc::clone(&metrics), "a".into(), reader, writer_half).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(metrics.snapshot(&Default::default()).messages_in, 1);
    }
}
