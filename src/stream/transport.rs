// src/stream/transport.rs
//! Inbound/outbound transport seams and the implementations shipped with the
//! crate.
//!
//! - [`ChannelInbound`] / [`ChannelPublisher`]: in-process tokio channels.
//! - [`JsonLinesInbound`] / [`JsonLinesPublisher`]: one JSON document per
//!   line over any async reader/writer (stdin, files, sockets).
//!
//! Delivery is at-least-once: a message is committed only after the processor
//! finished with it, so a restart may replay the last uncommitted message.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub offset: u64,
}

#[async_trait]
pub trait InboundStream: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Wait at most `timeout` for the next message. `Ok(None)` is a timeout.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, TransportError>;

    /// Mark everything up to and including `offset` as handled.
    async fn commit(&mut self, _offset: u64) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &Value,
    ) -> Result<(), TransportError>;

    fn name(&self) -> &'static str;
}

/// Add the `_published_at` / `_topic` envelope fields to an outbound object.
/// Non-object values are wrapped under `value`.
pub fn envelope(topic: &str, value: &Value) -> Value {
    let mut out = match value {
        Value::Object(map) => map.clone(),
        other => {
            let mut m = serde_json::Map::new();
            m.insert("value".into(), other.clone());
            m
        }
    };
    out.insert("_published_at".into(), Value::String(Utc::now().to_rfc3339()));
    out.insert("_topic".into(), Value::String(topic.to_string()));
    Value::Object(out)
}

// ------------------------------------------------------------
// In-process channels
// ------------------------------------------------------------

/// Inbound side of a tokio channel. Dropping every sender closes the stream.
#[derive(Debug)]
pub struct ChannelInbound {
    rx: mpsc::Receiver<Vec<u8>>,
    topic: Option<String>,
    next_offset: u64,
    committed: Option<u64>,
    closed: bool,
}

impl ChannelInbound {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            topic: None,
            next_offset: 0,
            committed: None,
            closed: false,
        }
    }

    /// A bounded channel and the inbound stream reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn committed(&self) -> Option<u64> {
        self.committed
    }
}

#[async_trait]
impl InboundStream for ChannelInbound {
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.topic.is_none() {
            return Err(TransportError::Fatal("poll before subscribe".into()));
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Err(TransportError::Closed),
            Ok(Some(payload)) => {
                let offset = self.next_offset;
                self.next_offset += 1;
                Ok(Some(InboundMessage {
                    key: None,
                    payload,
                    offset,
                }))
            }
        }
    }

    async fn commit(&mut self, offset: u64) -> Result<(), TransportError> {
        self.committed = Some(self.committed.map_or(offset, |c| c.max(offset)));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.rx.close();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// One outbound message as seen by a [`ChannelPublisher`] receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub key: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Published>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &Value,
    ) -> Result<(), TransportError> {
        self.tx
            .send(Published {
                topic: topic.to_string(),
                key: key.map(str::to_string),
                value: envelope(topic, value),
            })
            .map_err(|_| TransportError::Closed)
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

// ------------------------------------------------------------
// JSON lines
// ------------------------------------------------------------

/// Reads one JSON document per line. Blank lines are skipped. Lines are
/// handed on as raw bytes; decoding is the record parser's job.
///
/// At end of input the stream either closes (`stop_at_eof`) or idles like a
/// tail that has nothing new, returning timeouts.
pub struct JsonLinesInbound<R> {
    reader: R,
    // survives a timed-out read, which may already have consumed part of a line
    buf: Vec<u8>,
    stop_at_eof: bool,
    at_eof: bool,
    offset: u64,
    subscribed: bool,
    closed: bool,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesInbound<R> {
    pub fn new(reader: R, stop_at_eof: bool) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            stop_at_eof,
            at_eof: false,
            offset: 0,
            subscribed: false,
            closed: false,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> InboundStream for JsonLinesInbound<R> {
    async fn subscribe(&mut self, _topic: &str) -> Result<(), TransportError> {
        self.subscribed = true;
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.subscribed {
            return Err(TransportError::Fatal("poll before subscribe".into()));
        }
        if self.at_eof {
            if self.stop_at_eof {
                return Err(TransportError::Closed);
            }
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }

        match tokio::time::timeout(timeout, self.reader.read_until(b'\n', &mut self.buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(TransportError::Transient(format!("read failed: {e}"))),
            Ok(Ok(0)) => {
                tracing::debug!(target: "stream", offset = self.offset, "inbound reached end of input");
                self.at_eof = true;
                if self.stop_at_eof {
                    Err(TransportError::Closed)
                } else {
                    Ok(None)
                }
            }
            Ok(Ok(_)) => {
                let payload = self.buf.trim_ascii().to_vec();
                self.buf.clear();
                if payload.is_empty() {
                    return Ok(None);
                }
                let offset = self.offset;
                self.offset += 1;
                Ok(Some(InboundMessage {
                    key: None,
                    payload,
                    offset,
                }))
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// Writes every envelope as one JSON line and flushes.
pub struct JsonLinesPublisher<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Publisher for JsonLinesPublisher<W> {
    async fn publish(
        &self,
        topic: &str,
        _key: Option<&str>,
        value: &Value,
    ) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(&envelope(topic, value))
            .map_err(|e| TransportError::Transient(format!("encode failed: {e}")))?;
        line.push(b'\n');

        let mut w = self.writer.lock().await;
        w.write_all(&line)
            .await
            .map_err(|e| TransportError::Transient(format!("write failed: {e}")))?;
        w.flush()
            .await
            .map_err(|e| TransportError::Transient(format!("flush failed: {e}")))
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn channel_inbound_times_out_then_delivers_then_closes() {
        let (tx, mut inbound) = ChannelInbound::channel(4);
        inbound.subscribe("social.raw.posts").await.unwrap();
        assert_eq!(inbound.topic(), Some("social.raw.posts"));

        assert!(inbound.poll(SHORT).await.unwrap().is_none());

        tx.send(b"{}".to_vec()).await.unwrap();
        let msg = inbound.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(msg.offset, 0);
        inbound.commit(msg.offset).await.unwrap();
        assert_eq!(inbound.committed(), Some(0));

        drop(tx);
        assert!(matches!(inbound.poll(SHORT).await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn poll_requires_subscription() {
        let (_tx, mut inbound) = ChannelInbound::channel(1);
        assert!(matches!(
            inbound.poll(SHORT).await,
            Err(TransportError::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn jsonl_inbound_skips_blank_lines_and_stops_at_eof() {
        let data = "{\"id\":1}\n\n{\"id\":2}\n";
        let mut inbound = JsonLinesInbound::new(BufReader::new(data.as_bytes()), true);
        inbound.subscribe("raw").await.unwrap();

        let first = inbound.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(first.payload, b"{\"id\":1}");
        assert!(inbound.poll(SHORT).await.unwrap().is_none());
        let second = inbound.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert!(matches!(inbound.poll(SHORT).await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn jsonl_inbound_passes_invalid_utf8_through() {
        let data: &[u8] = b"{\"id\":\"\xff\"}\n{\"id\":3}";
        let mut inbound = JsonLinesInbound::new(BufReader::new(data), true);
        inbound.subscribe("raw").await.unwrap();

        let bad = inbound.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(bad.payload, b"{\"id\":\"\xff\"}");
        // last line has no trailing newline
        let good = inbound.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(good.payload, b"{\"id\":3}");
        assert_eq!(good.offset, 1);
        assert!(matches!(inbound.poll(SHORT).await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn jsonl_inbound_idles_at_eof_when_tailing() {
        let mut inbound = JsonLinesInbound::new(BufReader::new(&b""[..]), false);
        inbound.subscribe("raw").await.unwrap();
        assert!(inbound.poll(SHORT).await.unwrap().is_none());
        assert!(inbound.poll(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publishers_add_envelope_fields() {
        let (publisher, mut rx) = ChannelPublisher::channel();
        publisher
            .publish("social.alerts", Some("k"), &json!({"type": "viral"}))
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.topic, "social.alerts");
        assert_eq!(got.value["_topic"], "social.alerts");
        assert!(got.value["_published_at"].is_string());
        assert_eq!(got.value["type"], "viral");

        let jl = JsonLinesPublisher::new(Vec::new());
        jl.publish("social.processed.posts", None, &json!({"a": 1}))
            .await
            .unwrap();
        let out = String::from_utf8(jl.into_inner()).unwrap();
        let v: Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(v["_topic"], "social.processed.posts");
        assert!(out.ends_with('\n'));
    }
}
