//! The editing-surface side of a session.
//!
//! [`Client`] lives on the editor's thread. It owns the buffer snapshot and
//! the roster, turns local edits into update packets, and applies whatever
//! the network worker hands back through [`Client::pump`].

use crate::config::Config;
use crate::error::ClientError;
use crate::roster::CollaboratorRegistry;
use crate::surface::EditorSurface;
use crate::worker::{Envelope, NetCommand, NetworkWorker, SessionTarget, SurfaceEvent, Waker};
use covim_core::{
    BufferSnapshot, ConnectionState, Message, Packet, Update, apply_inbound_patch,
    compute_outbound_patch,
};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::sync::mpsc;

const CONNECT_USAGE: &str = ":CoVim connect <server address> <port> <name>";
const START_USAGE: &str = ":CoVim start <port> <name>";

/// Arguments to [`Client::connect`]. Unset fields fall back to the saved
/// session target, then to the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectArgs {
    pub addr: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
}

impl ConnectArgs {
    pub fn new(addr: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            addr: Some(addr.into()),
            port: Some(port),
            name: Some(name.into()),
        }
    }
}

/// One connection target and everything synchronized over it.
struct Session {
    target: SessionTarget,
    name: String,
    snapshot: BufferSnapshot,
    roster: CollaboratorRegistry,
    worker: NetworkWorker,
    /// A connect has been issued and not yet ended.
    link_requested: bool,
    /// `connect_success` has been applied for the current link.
    accepted: bool,
    roster_view_open: bool,
    desynced: bool,
}

enum Plan {
    Open(SessionTarget, String),
    Reopen(String),
}

/// Collaborative session client.
pub struct Client<S> {
    config: Config,
    surface: S,
    session: Option<Session>,
    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    waker: Option<Waker>,
    generation: u64,
}

impl<S: EditorSurface> Client<S> {
    pub fn new(config: Config, surface: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            surface,
            session: None,
            events_tx,
            events_rx,
            waker: None,
            generation: 0,
        }
    }

    /// Install a callback run on the network thread whenever work is queued
    /// for [`pump`](Self::pump). Takes effect for sessions opened afterwards.
    pub fn with_waker(mut self, waker: Waker) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.worker.state())
    }

    /// The saved session target, if a session exists.
    pub fn target(&self) -> Option<&SessionTarget> {
        self.session.as_ref().map(|s| &s.target)
    }

    pub fn roster(&self) -> Option<&CollaboratorRegistry> {
        self.session.as_ref().map(|s| &s.roster)
    }

    /// The buffer content last agreed with the peers.
    pub fn snapshot(&self) -> Option<&BufferSnapshot> {
        self.session.as_ref().map(|s| &s.snapshot)
    }

    /// Whether a remote patch failed to apply since the last full buffer
    /// was received.
    pub fn is_desynced(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.desynced)
    }

    /// Connect, or reconnect to the saved target.
    pub fn connect(&mut self, args: ConnectArgs) -> Result<(), ClientError> {
        let plan = self.plan(args)?;
        self.open(plan, None)
    }

    /// Launch the companion server on localhost, then connect to it after
    /// the configured settle delay.
    pub fn start_and_connect(
        &mut self,
        port: Option<u16>,
        name: Option<String>,
    ) -> Result<(), ClientError> {
        let port = port
            .or(self.session.as_ref().map(|s| s.target.port))
            .or(self.config.default_port)
            .ok_or(ClientError::Usage(START_USAGE))?;
        let plan = self.plan(ConnectArgs {
            addr: Some("localhost".to_string()),
            port: Some(port),
            name,
        })?;

        self.spawn_server(port)?;
        let settle = self.config.settle_delay();
        self.open(plan, Some(settle))
    }

    /// Close the link and clear the roster. The session target is kept, so a
    /// later `connect` without arguments reconnects.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        let Some(session) = self.session.as_mut() else {
            return Err(ClientError::NotRunning);
        };
        self.generation += 1;
        session.link_requested = false;
        if let Err(e) = session.worker.send(NetCommand::Disconnect) {
            tracing::debug!("disconnect not delivered: {}", e);
        }
        teardown(session, &mut self.surface);
        self.surface
            .notify("Successfully disconnected from document!");
        Ok(())
    }

    /// Disconnect and stop the network worker, forgetting the session.
    pub fn quit(&mut self) -> Result<(), ClientError> {
        self.disconnect()?;
        if let Some(mut session) = self.session.take() {
            session.worker.shutdown();
        }
        self.surface.notify("Quit CoVim");
        Ok(())
    }

    /// The local cursor moved.
    pub fn on_cursor_moved(&mut self) {
        self.send_update();
    }

    /// The local buffer changed.
    pub fn on_buffer_changed(&mut self) {
        self.send_update();
    }

    /// Run every unit of work the network worker has queued, in order.
    /// Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            if envelope.generation != self.generation {
                tracing::debug!(
                    generation = envelope.generation,
                    current = self.generation,
                    "dropping stale event"
                );
                continue;
            }
            self.handle(envelope.event);
            applied += 1;
        }
        applied
    }

    fn plan(&self, args: ConnectArgs) -> Result<Plan, ClientError> {
        let saved = self.session.as_ref();
        let addr = non_empty(args.addr)
            .or_else(|| saved.map(|s| s.target.addr.clone()))
            .or_else(|| non_empty(Some(self.config.default_addr.clone())));
        let port = args
            .port
            .or(saved.map(|s| s.target.port))
            .or(self.config.default_port);
        let name = non_empty(args.name)
            .or_else(|| saved.map(|s| s.name.clone()))
            .or_else(|| non_empty(self.config.default_name.clone()));

        let (Some(addr), Some(port), Some(name)) = (addr, port, name) else {
            return Err(ClientError::Usage(CONNECT_USAGE));
        };

        match saved {
            None => Ok(Plan::Open(SessionTarget { addr, port }, name)),
            Some(s) if s.target.addr != addr || s.target.port != port => {
                Err(ClientError::ConflictingSession {
                    addr: s.target.addr.clone(),
                    port: s.target.port,
                })
            }
            Some(s) if s.link_requested => {
                Err(ClientError::AlreadyConnected)
            }
            Some(_) => Ok(Plan::Reopen(name)),
        }
    }

    fn open(&mut self, plan: Plan, settle: Option<Duration>) -> Result<(), ClientError> {
        let reconnect = matches!(plan, Plan::Reopen(_));
        let session = match plan {
            Plan::Open(target, name) => {
                let worker = NetworkWorker::spawn(self.events_tx.clone(), self.waker.clone())
                    .map_err(ClientError::WorkerStart)?;
                self.session.insert(Session {
                    target,
                    roster: CollaboratorRegistry::new(name.clone()),
                    name,
                    snapshot: BufferSnapshot::default(),
                    worker,
                    link_requested: false,
                    accepted: false,
                    roster_view_open: false,
                    desynced: false,
                })
            }
            Plan::Reopen(name) => {
                let Some(session) = self.session.as_mut() else {
                    return Err(ClientError::NotRunning);
                };
                teardown(session, &mut self.surface);
                session.roster.set_local_name(name.clone());
                session.name = name;
                session
            }
        };

        self.generation += 1;
        session.worker.send(NetCommand::Connect {
            target: session.target.clone(),
            name: session.name.clone(),
            generation: self.generation,
            settle,
            reconnect,
        })?;
        session.link_requested = true;
        tracing::info!(
            addr = %session.target.addr,
            port = session.target.port,
            name = %session.name,
            reconnect,
            "connecting"
        );
        self.surface.notify(if reconnect {
            "Reconnecting..."
        } else {
            "Connecting..."
        });
        Ok(())
    }

    fn spawn_server(&self, port: u16) -> Result<(), ClientError> {
        let command = &self.config.server_command;
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(ClientError::Usage(START_USAGE))?;
        let child = Command::new(program)
            .args(parts)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ClientError::Spawn {
                command: command.clone(),
                source,
            })?;
        tracing::info!(pid = child.id(), port, "launched companion server");
        Ok(())
    }

    fn send_update(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.accepted || session.worker.state() != ConnectionState::Connected {
            return;
        }

        let current = BufferSnapshot::new(self.surface.buffer_lines());
        let cursor = self.surface.cursor().clamped();
        let patch = compute_outbound_patch(&session.snapshot, &current, cursor.y);
        let changed = patch.is_some();
        let update = Update::cursor(session.name.clone(), cursor).with_patch(patch);

        if session
            .worker
            .send(NetCommand::Send(Packet::Update(update)))
            .is_ok()
            && changed
        {
            session.snapshot = current;
        }
    }

    fn handle(&mut self, event: SurfaceEvent) {
        let Self {
            session, surface, ..
        } = self;
        let Some(session) = session.as_mut() else {
            return;
        };

        match event {
            SurfaceEvent::Packet(Packet::Message(message)) => {
                handle_message(session, surface, message)
            }
            SurfaceEvent::Packet(Packet::Update(update)) => handle_update(session, surface, update),
            SurfaceEvent::TransportLost => {
                session.link_requested = false;
                teardown(session, surface);
                surface.notify("Lost connection");
            }
            SurfaceEvent::TransportFailed(reason) => {
                tracing::debug!("connection failed: {}", reason);
                session.link_requested = false;
                teardown(session, surface);
                surface.notify("Connection failed.");
            }
            SurfaceEvent::AlreadyConnected => {
                surface.notify(&ClientError::AlreadyConnected.to_string());
            }
        }
    }
}

fn handle_message<S: EditorSurface>(session: &mut Session, surface: &mut S, message: Message) {
    match message {
        Message::ErrorNewnameTaken => {
            session.link_requested = false;
            teardown(session, surface);
            surface.notify("ERROR: Name already in use. Please try a different name");
        }
        Message::ErrorNewnameInvalid => {
            session.link_requested = false;
            teardown(session, surface);
            surface.notify(
                "ERROR: Name contains illegal characters. Only numbers, letters, underscores, and dashes allowed. Please try a different name",
            );
        }
        Message::ConnectSuccess {
            collaborators,
            buffer,
        } => {
            if !session.roster_view_open {
                surface.open_roster_view();
                session.roster_view_open = true;
            }
            if let Some(lines) = buffer {
                surface.replace_buffer(&lines);
                session.snapshot = BufferSnapshot::new(lines);
                session.desynced = false;
            }
            session.accepted = true;
            for user in &collaborators {
                let collaborator = session.roster.add_user(user);
                if !collaborator.is_local() {
                    surface.show_cursor(collaborator);
                }
            }
            surface.roster_changed(&session.roster);
            surface.notify(&format!(
                "Success! You're now connected [Port {}]",
                session.target.port
            ));
            surface.redraw();
        }
        Message::UserConnected { user } => {
            let collaborator = session.roster.add_user(&user);
            if !collaborator.is_local() {
                surface.show_cursor(collaborator);
            }
            surface.roster_changed(&session.roster);
            surface.notify(&format!("{} connected to this document", user.name));
            surface.redraw();
        }
        Message::UserDisconnected { name } => {
            let Some(collaborator) = session.roster.remove_user(&name) else {
                tracing::debug!(%name, "disconnect for unknown collaborator");
                return;
            };
            if !collaborator.is_local() {
                surface.hide_cursor(&collaborator);
            }
            surface.roster_changed(&session.roster);
            surface.notify(&format!("{name} disconnected from this document"));
            surface.redraw();
        }
    }
}

fn handle_update<S: EditorSurface>(session: &mut Session, surface: &mut S, update: Update) {
    let from_self = update.name == session.name;

    if let Some(patch) = update.buffer.as_ref().filter(|_| !from_self) {
        let visible = BufferSnapshot::new(surface.buffer_lines());
        match apply_inbound_patch(&visible, patch) {
            Ok(next) => {
                if next.len() != patch.buffer_size {
                    tracing::warn!(
                        from = %update.name,
                        local = next.len(),
                        remote = patch.buffer_size,
                        "line count differs from sender after patch"
                    );
                }
                surface.replace_buffer(next.lines());
                session.snapshot = next;
            }
            Err(e) => {
                tracing::warn!(from = %update.name, "rejecting patch: {}", e);
                session.desynced = true;
            }
        }
    }

    if let Some(cursors) = &update.updated_cursors {
        // Own cursor first, before any remote marks are redrawn.
        if !from_self {
            if let Some(own) = cursors.iter().find(|c| c.name == session.name) {
                surface.set_cursor(own.cursor);
            }
        }
        for entry in cursors.iter().filter(|c| c.name != session.name) {
            match session.roster.update_cursor(&entry.name, entry.cursor) {
                Some(collaborator) => surface.show_cursor(collaborator),
                None => tracing::debug!(name = %entry.name, "cursor for unknown collaborator"),
            }
        }
    }

    surface.redraw();
}

/// Clear everything the editor shows for the session.
fn teardown<S: EditorSurface>(session: &mut Session, surface: &mut S) {
    session.accepted = false;
    session.snapshot = BufferSnapshot::default();
    let removed = session.roster.clear();
    for collaborator in removed.iter().filter(|c| !c.is_local()) {
        surface.hide_cursor(collaborator);
    }
    if session.roster_view_open {
        surface.close_roster_view();
        session.roster_view_open = false;
    }
    if !removed.is_empty() {
        surface.roster_changed(&session.roster);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
