// Copyright (c) 2024 Lattice Wallet Contributors

//! WebSocket runner (spec §4.9): a single I/O thread owns the socket and
//! drives connect / read / reconnect, draining an outbound
//! `crossbeam-channel` queue between reads so `Transport::send` callers
//! never touch the socket directly. Grounded on the teacher's
//! `sync.rs` worker, which hands work to its thread pool over a
//! `crossbeam_channel::Sender`/`Receiver` pair and shuts it down with a
//! `Stop` sentinel message rather than a separate atomic flag.

use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde_json::Value;
use slog::{debug, error, info, o, warn, Logger};
use tungstenite::{stream::MaybeTlsStream, Message, WebSocket};
use url::Url;

use crate::observer::{ConnectionStatus, Observers};

/// Abstracts over "send a JSON frame to the remote node" so `SyncEngine` can
/// be driven against a fake in tests (spec §4.9, `original_source`'s
/// transport boundary).
pub trait Transport: Send + Sync {
    fn send(&self, json: Value) -> Result<(), String>;
}

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const OUTBOUND_POLL: Duration = Duration::from_millis(100);

type Socket = WebSocket<MaybeTlsStream<std::net::TcpStream>>;

enum OutboundMsg {
    Send(Value),
    Stop,
}

/// Runs the WebSocket event loop on its own thread (spec §5 "I/O-runner
/// thread"). `on_message` and `on_connected` are invoked from that thread;
/// callers should hand off to the action queue rather than do any real work
/// inline, mirroring how `SyncEngine::handle_inbound` just parses and
/// enqueues.
pub struct WsRunner {
    outbound: Sender<OutboundMsg>,
    join_handle: std::sync::Mutex<Option<thread::JoinHandle<()>>>,
    logger: Logger,
}

impl WsRunner {
    pub fn start(
        url: Url,
        observers: Arc<Observers>,
        on_message: impl Fn(&str) + Send + Sync + 'static,
        on_connected: impl Fn() + Send + Sync + 'static,
        logger: Logger,
    ) -> Arc<Self> {
        let logger = logger.new(o!("component" => "ws"));
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();

        let thread_logger = logger.clone();
        let handle = thread::Builder::new()
            .name("ws-runner".to_string())
            .spawn(move || run(url, observers, outbound_rx, on_message, on_connected, thread_logger))
            .expect("failed to spawn ws-runner thread");

        Arc::new(Self {
            outbound: outbound_tx,
            join_handle: std::sync::Mutex::new(Some(handle)),
            logger,
        })
    }

    /// Cooperative shutdown (spec §5 "Stop()"): sends the `Stop` sentinel,
    /// which unwinds the current connection (if any) and ends the thread,
    /// then joins it.
    pub fn stop(&self) {
        let _ = self.outbound.send(OutboundMsg::Stop);
        if let Some(handle) = self.join_handle.lock().expect("ws join handle mutex poisoned").take() {
            if let Err(e) = handle.join() {
                error!(self.logger, "ws-runner thread panicked"; "error" => format!("{e:?}"));
            }
        }
    }
}

impl Transport for WsRunner {
    fn send(&self, json: Value) -> Result<(), String> {
        self.outbound.send(OutboundMsg::Send(json)).map_err(|_| "ws-runner has stopped".to_string())
    }
}

impl Drop for WsRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    url: Url,
    observers: Arc<Observers>,
    outbound: Receiver<OutboundMsg>,
    on_message: impl Fn(&str) + Send + Sync + 'static,
    on_connected: impl Fn() + Send + Sync + 'static,
    logger: Logger,
) {
    loop {
        observers.notify_connection_status(ConnectionStatus::Connecting);
        match tungstenite::connect(url.as_str()) {
            Ok((mut socket, _response)) => {
                set_read_timeout(&socket);
                observers.notify_connection_status(ConnectionStatus::Connected);
                info!(logger, "websocket connected");
                on_connected();
                if !read_loop(&mut socket, &outbound, &on_message, &logger) {
                    observers.notify_connection_status(ConnectionStatus::Disconnected);
                    debug!(logger, "ws-runner stopped");
                    return;
                }
            }
            Err(e) => {
                warn!(logger, "websocket connect failed"; "error" => format!("{e}"));
            }
        }
        observers.notify_connection_status(ConnectionStatus::Disconnected);
        match outbound.recv_timeout(RECONNECT_DELAY) {
            Ok(OutboundMsg::Stop) | Err(RecvTimeoutError::Disconnected) => {
                debug!(logger, "ws-runner stopped");
                return;
            }
            // A `Send` arriving during the reconnect backoff is dropped; the
            // next sync cycle will re-request anything that matters (spec
            // §4.9's periodic reconnect doesn't guarantee delivery).
            Ok(OutboundMsg::Send(_)) | Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

/// Drains outbound sends and inbound frames for one connection. Returns
/// `false` when the caller should stop entirely (a `Stop` sentinel was
/// received), `true` when the connection merely dropped and a reconnect
/// should be attempted.
fn read_loop(
    socket: &mut Socket,
    outbound: &Receiver<OutboundMsg>,
    on_message: &(impl Fn(&str) + Send + Sync + 'static),
    logger: &Logger,
) -> bool {
    loop {
        match outbound.try_recv() {
            Ok(OutboundMsg::Send(json)) => {
                if let Err(e) = socket.write_message(Message::Text(json.to_string())) {
                    warn!(logger, "websocket write failed"; "error" => format!("{e}"));
                    return true;
                }
            }
            Ok(OutboundMsg::Stop) => return false,
            Err(crossbeam_channel::TryRecvError::Empty) => {}
            Err(crossbeam_channel::TryRecvError::Disconnected) => return false,
        }

        match socket.read_message() {
            Ok(Message::Text(text)) => on_message(&text),
            Ok(Message::Close(_)) => {
                debug!(logger, "websocket closed by peer");
                return true;
            }
            Ok(_) => {} // ping/pong/binary: nothing this protocol needs (spec §6)
            Err(tungstenite::Error::Io(ref e))
                if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                // Read timeout with no data; loop back around so outbound
                // sends and the stop sentinel keep getting checked promptly.
            }
            Err(e) => {
                error!(logger, "websocket read error"; "error" => format!("{e}"));
                return true;
            }
        }
    }
}

fn set_read_timeout(socket: &Socket) {
    if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
        let _ = stream.set_read_timeout(Some(OUTBOUND_POLL));
    }
}
