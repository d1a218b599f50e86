//! Transport over a serial link to an MQTT bridge. Each direction carries one
//! JSON object per line, tagged by `op`.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex, PoisonError,
};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::transport::{ConnectInfo, InboundHandler, PublishOptions, PublishStatus, Transport};
use crate::{Error, Result};

/// Longest line accepted from the bridge.
pub const MAX_LINE_BYTES: usize = 4096;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Connect {
        client_id: &'a str,
        server: &'a str,
        keep_alive_s: u64,
    },
    Subscribe {
        filters: &'a [String],
        qos: u8,
    },
    Publish {
        id: u32,
        topic: &'a str,
        payload: &'a str,
        qos: u8,
    },
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Reply {
    Connack { ok: bool },
    Suback { ok: bool },
    Puback { id: u32 },
    Message { topic: String, payload: String },
}

type SharedHandler = Arc<Mutex<Option<InboundHandler>>>;

struct ReplyRoutes {
    connack: Sender<bool>,
    suback: Sender<bool>,
    puback: Sender<u32>,
    handler: SharedHandler,
}

pub struct SerialBridge {
    writer: Mutex<Box<dyn Write + Send>>,
    next_id: AtomicU32,
    connack: Receiver<bool>,
    suback: Receiver<bool>,
    puback: Receiver<u32>,
    handler: SharedHandler,
    closed: Arc<AtomicBool>,
}

impl SerialBridge {
    /// Open the serial device and start the reader thread.
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        if device.is_empty() {
            return Err(Error::InvalidArgs(
                "bridge device path cannot be empty".to_string(),
            ));
        }
        let port = serialport::new(device, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(PORT_READ_TIMEOUT)
            .open()
            .map_err(map_serial_error)?;
        let reader = port.try_clone().map_err(map_serial_error)?;
        log::info!("bridge opened on {device} at {baud} baud");
        Self::from_streams(Box::new(BufReader::new(reader)), Box::new(port))
    }

    /// Run the bridge protocol over arbitrary streams. The reader is drained
    /// on a background thread until EOF or until the bridge is dropped.
    pub fn from_streams(
        reader: Box<dyn BufRead + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Result<Self> {
        let (connack_tx, connack) = channel::unbounded();
        let (suback_tx, suback) = channel::unbounded();
        let (puback_tx, puback) = channel::unbounded();
        let handler: SharedHandler = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));

        let routes = ReplyRoutes {
            connack: connack_tx,
            suback: suback_tx,
            puback: puback_tx,
            handler: handler.clone(),
        };
        let reader_closed = closed.clone();
        thread::Builder::new()
            .name("bridge-reader".into())
            .spawn(move || read_loop(reader, routes, reader_closed))?;

        Ok(Self {
            writer: Mutex::new(writer),
            next_id: AtomicU32::new(1),
            connack,
            suback,
            puback,
            handler,
            closed,
        })
    }

    fn send_request(&self, request: &Request<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| Error::Parse(format!("encode bridge request: {e}")))?;
        line.push(b'\n');
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    fn await_puback(&self, id: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.puback.recv_timeout(remaining) {
                Ok(got) if got == id => return true,
                // Late ack for an earlier publish.
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }
}

impl Drop for SerialBridge {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl Transport for SerialBridge {
    fn connect(&self, info: &ConnectInfo) -> Result<()> {
        while self.connack.try_recv().is_ok() {}
        self.send_request(&Request::Connect {
            client_id: &info.client_id,
            server: &info.server,
            keep_alive_s: info.keep_alive.as_secs(),
        })?;
        match self.connack.recv_timeout(REPLY_TIMEOUT) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Transport("bridge refused connect".into())),
            Err(_) => Err(Error::Transport("no connack from bridge".into())),
        }
    }

    fn subscribe(&self, filters: &[String], handler: InboundHandler) -> Result<()> {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
        while self.suback.try_recv().is_ok() {}
        self.send_request(&Request::Subscribe { filters, qos: 1 })?;
        match self.suback.recv_timeout(REPLY_TIMEOUT) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Transport("bridge refused subscribe".into())),
            Err(_) => Err(Error::Transport("no suback from bridge".into())),
        }
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> Result<PublishStatus> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = String::from_utf8_lossy(payload);
        let request = Request::Publish {
            id,
            topic,
            payload: &payload,
            qos: options.qos,
        };
        if options.qos == 0 {
            self.send_request(&request)?;
            return Ok(PublishStatus::Pending);
        }
        for attempt in 0..=options.retry_limit {
            if attempt > 0 {
                log::debug!(
                    "resending publish {id} to {topic} ({attempt}/{})",
                    options.retry_limit
                );
            }
            self.send_request(&request)?;
            if self.await_puback(id, options.retry_interval) {
                return Ok(PublishStatus::Acknowledged);
            }
        }
        Err(Error::Transport(format!(
            "publish {id} to {topic} not acknowledged after {} attempts",
            options.retry_limit + 1
        )))
    }
}

fn read_loop(mut reader: Box<dyn BufRead + Send>, routes: ReplyRoutes, closed: Arc<AtomicBool>) {
    let mut line = Vec::new();
    // Set while skipping the rest of an overlong line.
    let mut discarding = false;
    while !closed.load(Ordering::Relaxed) {
        // `line` never holds more than MAX_LINE_BYTES here, so the budget is at least 1.
        let budget = (MAX_LINE_BYTES + 1 - line.len()) as u64;
        match reader.by_ref().take(budget).read_until(b'\n', &mut line) {
            Ok(0) => {
                log::warn!("bridge link closed");
                return;
            }
            Ok(_) => {}
            // Partial bytes stay in `line` across port timeouts.
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("bridge read failed: {e}");
                return;
            }
        }
        if line.last() != Some(&b'\n') {
            if line.len() > MAX_LINE_BYTES {
                if !discarding {
                    log::warn!("dropping bridge line over {MAX_LINE_BYTES} bytes");
                }
                discarding = true;
                line.clear();
            }
            continue;
        }
        if discarding {
            discarding = false;
        } else {
            route_line(&line, &routes);
        }
        line.clear();
    }
}

fn route_line(raw: &[u8], routes: &ReplyRoutes) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let reply: Reply = match serde_json::from_str(text) {
        Ok(reply) => reply,
        Err(e) => {
            log::debug!("ignoring bridge line {text:?}: {e}");
            return;
        }
    };
    match reply {
        Reply::Connack { ok } => {
            let _ = routes.connack.send(ok);
        }
        Reply::Suback { ok } => {
            let _ = routes.suback.send(ok);
        }
        Reply::Puback { id } => {
            let _ = routes.puback.send(id);
        }
        Reply::Message { topic, payload } => {
            let handler = routes
                .handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            match handler {
                Some(handler) => handler(&topic, payload.as_bytes()),
                None => log::debug!("message on {topic} before subscribe; dropped"),
            }
        }
    }
}

fn map_serial_error(err: serialport::Error) -> Error {
    use serialport::ErrorKind;

    let kind = match err.kind() {
        ErrorKind::NoDevice => io::ErrorKind::NotFound,
        ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
        ErrorKind::Io(inner) => inner,
        ErrorKind::Unknown => io::ErrorKind::Other,
    };

    Error::Io(io::Error::new(kind, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    /// Read side fed by a channel; returns EOF once every sender is gone. An
    /// empty chunk reads as a port timeout.
    struct ChannelReader {
        rx: Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv() {
                    Ok(chunk) if chunk.is_empty() => {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "port timeout"))
                    }
                    Ok(chunk) => self.pending = chunk,
                    Err(_) => return Ok(0),
                }
            }
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    /// Plays the bridge: answers each request line through `reply`.
    struct ScriptedBridge<F> {
        buf: Vec<u8>,
        requests: Arc<Mutex<Vec<Value>>>,
        reply: F,
        tx: Sender<Vec<u8>>,
    }

    impl<F: FnMut(&Value) -> Vec<String> + Send> Write for ScriptedBridge<F> {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(data);
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let request: Value = serde_json::from_slice(&line).unwrap();
                for answer in (self.reply)(&request) {
                    let _ = self.tx.send(format!("{answer}\n").into_bytes());
                }
                self.requests.lock().unwrap().push(request);
            }
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scripted<F>(reply: F) -> (SerialBridge, Arc<Mutex<Vec<Value>>>, Sender<Vec<u8>>)
    where
        F: FnMut(&Value) -> Vec<String> + Send + 'static,
    {
        let (tx, rx) = channel::unbounded();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let writer = ScriptedBridge {
            buf: Vec::new(),
            requests: requests.clone(),
            reply,
            tx: tx.clone(),
        };
        let reader = BufReader::new(ChannelReader {
            rx,
            pending: Vec::new(),
        });
        let bridge = SerialBridge::from_streams(Box::new(reader), Box::new(writer)).unwrap();
        (bridge, requests, tx)
    }

    fn ack_everything(request: &Value) -> Vec<String> {
        match request["op"].as_str() {
            Some("connect") => vec![r#"{"op":"connack","ok":true}"#.into()],
            Some("subscribe") => vec![r#"{"op":"suback","ok":true}"#.into()],
            Some("publish") => vec![format!(r#"{{"op":"puback","id":{}}}"#, request["id"])],
            _ => Vec::new(),
        }
    }

    fn connect_info() -> ConnectInfo {
        ConnectInfo {
            client_id: "Thing_00".into(),
            server: "broker".into(),
            keep_alive: Duration::from_secs(60),
        }
    }

    #[test]
    fn connect_subscribe_and_publish_are_acknowledged() {
        let (bridge, requests, _tx) = scripted(ack_everything);
        bridge.connect(&connect_info()).unwrap();
        bridge
            .subscribe(&["r/+/shadow/get/accepted".into()], Arc::new(|_: &str, _: &[u8]| {}))
            .unwrap();
        let status = bridge
            .publish("r/Thing_00/shadow/update", b"{}", PublishOptions::default())
            .unwrap();
        assert_eq!(status, PublishStatus::Acknowledged);

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0]["op"], "connect");
        assert_eq!(requests[0]["keep_alive_s"], 60);
        assert_eq!(requests[1]["filters"][0], "r/+/shadow/get/accepted");
        assert_eq!(requests[2]["op"], "publish");
        assert_eq!(requests[2]["id"], 1);
        assert_eq!(requests[2]["payload"], "{}");
    }

    #[test]
    fn unacknowledged_publish_is_resent_then_fails() {
        let (bridge, requests, _tx) = scripted(|_| Vec::new());
        let options = PublishOptions {
            qos: 1,
            retry_limit: 2,
            retry_interval: Duration::from_millis(20),
        };
        let err = bridge.publish("t", b"{}", options).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn late_ack_for_other_id_is_skipped() {
        let (bridge, _requests, _tx) = scripted(|request| {
            let id = request["id"].as_u64().unwrap_or(0);
            vec![
                format!(r#"{{"op":"puback","id":{}}}"#, id + 100),
                format!(r#"{{"op":"puback","id":{id}}}"#),
            ]
        });
        let status = bridge.publish("t", b"{}", PublishOptions::default()).unwrap();
        assert_eq!(status, PublishStatus::Acknowledged);
    }

    #[test]
    fn inbound_messages_reach_handler() {
        let (bridge, _requests, tx) = scripted(ack_everything);
        let (seen_tx, seen_rx) = channel::unbounded();
        bridge
            .subscribe(
                &["r/#".into()],
                Arc::new(move |topic: &str, payload: &[u8]| {
                    let _ = seen_tx.send((topic.to_string(), payload.to_vec()));
                }),
            )
            .unwrap();
        tx.send(b"garbage\n".to_vec()).unwrap();
        tx.send(br#"{"op":"message","topic":"r/Thing_02/shadow/get/accepted","payload":"{\"state\":{}}"}"#.to_vec())
            .unwrap();
        tx.send(b"\n".to_vec()).unwrap();
        let (topic, payload) = seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(topic, "r/Thing_02/shadow/get/accepted");
        assert_eq!(payload, br#"{"state":{}}"#.to_vec());
    }

    #[test]
    fn overlong_line_split_by_timeouts_is_dropped_whole() {
        let (bridge, _requests, tx) = scripted(ack_everything);
        let (seen_tx, seen_rx) = channel::unbounded();
        bridge
            .subscribe(
                &["r/#".into()],
                Arc::new(move |topic: &str, _payload: &[u8]| {
                    let _ = seen_tx.send(topic.to_string());
                }),
            )
            .unwrap();

        for _ in 0..5 {
            tx.send(vec![b' '; 1024]).unwrap();
            tx.send(Vec::new()).unwrap();
        }
        // Tail of the overlong line parses on its own; it must still be skipped.
        tx.send(br#"{"op":"message","topic":"r/tail","payload":"{}"}"#.to_vec())
            .unwrap();
        tx.send(b"\n".to_vec()).unwrap();
        tx.send(b"{\"op\":\"message\",\"topic\":\"r/Thing_04/shadow/get/accepted\",\"payload\":\"{}\"}\n".to_vec())
            .unwrap();

        let topic = seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(topic, "r/Thing_04/shadow/get/accepted");
        assert!(seen_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn refused_connect_is_an_error() {
        let (bridge, _requests, _tx) = scripted(|_| vec![r#"{"op":"connack","ok":false}"#.into()]);
        assert!(matches!(
            bridge.connect(&connect_info()),
            Err(Error::Transport(_))
        ));
    }
}
