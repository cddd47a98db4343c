//! The network domain.
//!
//! A [`NetworkWorker`] owns a dedicated OS thread running a current-thread
//! tokio runtime. The thread owns the socket and is the only writer of the
//! connection state. The editing side talks to it through [`NetCommand`]s and
//! hears back through [`SurfaceEvent`]s; neither side calls into the other.

use bytes::BytesMut;
use covim_core::{ConnectionState, Message, Packet, codec};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

/// Called from the worker thread whenever a [`SurfaceEvent`] is queued, so the
/// host can schedule a [`Client::pump`](crate::Client::pump).
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Where a session connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub addr: String,
    pub port: u16,
}

/// Work for the network domain.
#[derive(Debug)]
pub(crate) enum NetCommand {
    /// Open a link and send the name handshake.
    Connect {
        target: SessionTarget,
        name: String,
        generation: u64,
        /// Fixed wait before dialing.
        settle: Option<Duration>,
        reconnect: bool,
    },
    /// Write one packet. Dropped when no link is open.
    Send(Packet),
    /// Close the link, or abandon a connect in flight.
    Disconnect,
    Shutdown,
}

/// Work for the editing-surface domain.
#[derive(Debug)]
pub(crate) enum SurfaceEvent {
    Packet(Packet),
    /// The link dropped after the handshake was accepted.
    TransportLost,
    /// The link could not be opened, or closed before the handshake was
    /// accepted.
    TransportFailed(String),
    /// A connect arrived while a link was already active.
    AlreadyConnected,
}

/// A [`SurfaceEvent`] tagged with the connect it belongs to.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub generation: u64,
    pub event: SurfaceEvent,
}

/// Handle to the network thread. Dropping it stops the thread.
pub(crate) struct NetworkWorker {
    commands: mpsc::UnboundedSender<NetCommand>,
    state: watch::Receiver<ConnectionState>,
    thread: Option<JoinHandle<()>>,
}

impl NetworkWorker {
    pub fn spawn(
        events: mpsc::UnboundedSender<Envelope>,
        waker: Option<Waker>,
    ) -> std::io::Result<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let thread = std::thread::Builder::new()
            .name("covim-network".to_string())
            .spawn(move || {
                let mut reactor = Reactor {
                    commands: commands_rx,
                    state: state_tx,
                    events,
                    waker,
                };
                runtime.block_on(reactor.run());
                tracing::debug!("network worker stopped");
            })?;

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: NetCommand) -> Result<(), crate::ClientError> {
        self.commands
            .send(command)
            .map_err(|_| crate::ClientError::WorkerGone)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(NetCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("network worker panicked");
            }
        }
    }
}

impl Drop for NetworkWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Link {
    stream: TcpStream,
    generation: u64,
    buf: BytesMut,
}

enum Wake {
    Command(Option<NetCommand>),
    Read(std::io::Result<usize>),
}

/// Outcome of an interrupted connect.
enum Abort {
    Cancelled,
    Shutdown,
}

struct Reactor {
    commands: mpsc::UnboundedReceiver<NetCommand>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<Envelope>,
    waker: Option<Waker>,
}

impl Reactor {
    async fn run(&mut self) {
        let mut link: Option<Link> = None;

        loop {
            let wake = match link.as_mut() {
                Some(l) => tokio::select! {
                    command = self.commands.recv() => Wake::Command(command),
                    read = l.stream.read_buf(&mut l.buf) => Wake::Read(read),
                },
                None => Wake::Command(self.commands.recv().await),
            };

            match wake {
                Wake::Read(read) => self.on_read(&mut link, read),
                Wake::Command(None | Some(NetCommand::Shutdown)) => break,
                Wake::Command(Some(NetCommand::Connect {
                    target,
                    name,
                    generation,
                    settle,
                    reconnect,
                })) => {
                    if self.current().is_active() {
                        self.emit(generation, SurfaceEvent::AlreadyConnected);
                        continue;
                    }
                    self.set_state(if reconnect {
                        ConnectionState::Reconnecting
                    } else {
                        ConnectionState::Connecting
                    });
                    match self.establish(&target, &name, generation, settle).await {
                        Ok(new_link) => link = Some(new_link),
                        Err(Abort::Cancelled) => {}
                        Err(Abort::Shutdown) => break,
                    }
                }
                Wake::Command(Some(NetCommand::Send(packet))) => {
                    self.write(&mut link, &packet).await;
                }
                Wake::Command(Some(NetCommand::Disconnect)) => {
                    if link.take().is_some() {
                        tracing::info!("disconnected");
                    }
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    /// Dial and send the handshake, while still honoring `Disconnect` and
    /// `Shutdown`.
    async fn establish(
        &mut self,
        target: &SessionTarget,
        name: &str,
        generation: u64,
        settle: Option<Duration>,
    ) -> Result<Link, Abort> {
        let attempt = async {
            if let Some(delay) = settle {
                tokio::time::sleep(delay).await;
            }
            let mut stream = TcpStream::connect((target.addr.as_str(), target.port)).await?;
            stream.write_all(&codec::encode_handshake(name)).await?;
            Ok::<_, std::io::Error>(stream)
        };
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(stream) => {
                            tracing::info!(addr = %target.addr, port = target.port, "link open, awaiting handshake reply");
                            Ok(Link { stream, generation, buf: BytesMut::with_capacity(4096) })
                        }
                        Err(e) => {
                            tracing::warn!(addr = %target.addr, port = target.port, "connect failed: {}", e);
                            self.set_state(ConnectionState::Disconnected);
                            self.emit(generation, SurfaceEvent::TransportFailed(e.to_string()));
                            Err(Abort::Cancelled)
                        }
                    };
                }
                command = self.commands.recv() => match command {
                    Some(NetCommand::Disconnect) => {
                        tracing::debug!("connect cancelled");
                        self.set_state(ConnectionState::Disconnected);
                        return Err(Abort::Cancelled);
                    }
                    None | Some(NetCommand::Shutdown) => return Err(Abort::Shutdown),
                    Some(NetCommand::Connect { generation, .. }) => {
                        self.emit(generation, SurfaceEvent::AlreadyConnected);
                    }
                    Some(NetCommand::Send(_)) => {
                        tracing::debug!("dropping packet, link not open yet");
                    }
                },
            }
        }
    }

    fn on_read(&mut self, link: &mut Option<Link>, read: std::io::Result<usize>) {
        let Some(l) = link.as_mut() else {
            return;
        };
        match read {
            Ok(0) => {
                tracing::info!("peer closed the link");
                self.close(link, None);
            }
            Err(e) => {
                tracing::warn!("read failed: {}", e);
                self.close(link, Some(e.to_string()));
            }
            Ok(_) => loop {
                match codec::decode(&mut l.buf) {
                    Ok(Some(packet)) => {
                        let generation = l.generation;
                        if !self.dispatch(generation, packet) {
                            *link = None;
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => tracing::debug!("dropping frame: {}", e),
                }
            },
        }
    }

    /// Apply the state side of an inbound packet and forward it to the
    /// editing surface. Returns false when the link must be torn down.
    fn dispatch(&mut self, generation: u64, packet: Packet) -> bool {
        let keep = match &packet {
            Packet::Message(Message::ConnectSuccess { collaborators, .. }) => {
                tracing::info!(collaborators = collaborators.len(), "connected");
                self.set_state(ConnectionState::Connected);
                true
            }
            Packet::Message(Message::ErrorNewnameTaken | Message::ErrorNewnameInvalid) => {
                tracing::info!("name rejected by server");
                self.set_state(ConnectionState::Disconnected);
                false
            }
            _ => true,
        };
        self.emit(generation, SurfaceEvent::Packet(packet));
        keep
    }

    async fn write(&mut self, link: &mut Option<Link>, packet: &Packet) {
        let Some(l) = link.as_mut() else {
            tracing::debug!("dropping packet, no link");
            return;
        };
        let bytes = match codec::encode(packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("{}", e);
                return;
            }
        };
        if let Err(e) = l.stream.write_all(&bytes).await {
            tracing::warn!("write failed: {}", e);
            self.close(link, Some(e.to_string()));
        }
    }

    /// The link dropped underneath us.
    fn close(&mut self, link: &mut Option<Link>, reason: Option<String>) {
        let Some(l) = link.take() else {
            return;
        };
        let event = if self.current() == ConnectionState::Connected {
            SurfaceEvent::TransportLost
        } else {
            SurfaceEvent::TransportFailed(
                reason.unwrap_or_else(|| "connection closed during handshake".to_string()),
            )
        };
        self.set_state(ConnectionState::Disconnected);
        self.emit(l.generation, event);
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "connection state");
        }
    }

    fn emit(&self, generation: u64, event: SurfaceEvent) {
        if self.events.send(Envelope { generation, event }).is_err() {
            return;
        }
        if let Some(waker) = &self.waker {
            waker();
        }
    }
}
