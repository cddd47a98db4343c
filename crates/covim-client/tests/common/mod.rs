#![allow(dead_code)]

use bytes::BytesMut;
use covim_client::{Client, Collaborator, CollaboratorRegistry, EditorSurface};
use covim_core::{Cursor, Message, Packet, User, codec};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Every surface call, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ReplaceBuffer(Vec<String>),
    SetCursor(Cursor),
    OpenRosterView,
    CloseRosterView,
    RosterChanged(Vec<String>),
    ShowCursor(String, Cursor),
    HideCursor(String),
    Redraw,
}

#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub lines: Vec<String>,
    pub cursor: Cursor,
    pub notices: Vec<String>,
    pub calls: Vec<Call>,
}

impl RecordingSurface {
    pub fn with_lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn noticed(&self, message: &str) -> bool {
        self.notices.iter().any(|n| n == message)
    }
}

impl EditorSurface for RecordingSurface {
    fn buffer_lines(&self) -> Vec<String> {
        self.lines.clone()
    }

    fn replace_buffer(&mut self, lines: &[String]) {
        self.lines = lines.to_vec();
        self.calls.push(Call::ReplaceBuffer(lines.to_vec()));
    }

    fn cursor(&self) -> Cursor {
        self.cursor
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.calls.push(Call::SetCursor(cursor));
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn open_roster_view(&mut self) {
        self.calls.push(Call::OpenRosterView);
    }

    fn close_roster_view(&mut self) {
        self.calls.push(Call::CloseRosterView);
    }

    fn roster_changed(&mut self, roster: &CollaboratorRegistry) {
        self.calls.push(Call::RosterChanged(
            roster.names().map(str::to_string).collect(),
        ));
    }

    fn show_cursor(&mut self, collaborator: &Collaborator) {
        self.calls
            .push(Call::ShowCursor(collaborator.name.clone(), collaborator.cursor));
    }

    fn hide_cursor(&mut self, collaborator: &Collaborator) {
        self.calls.push(Call::HideCursor(collaborator.name.clone()));
    }

    fn redraw(&mut self) {
        self.calls.push(Call::Redraw);
    }
}

/// Pump the client until `done` holds, failing after a few seconds.
pub async fn pump_until<S: EditorSurface>(
    client: &mut Client<S>,
    mut done: impl FnMut(&Client<S>) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        client.pump();
        if done(client) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for client");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Pump for a fixed time, for asserting that nothing happens.
pub async fn pump_for<S: EditorSurface>(client: &mut Client<S>, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        client.pump();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client.pump();
}

pub fn user(name: &str) -> User {
    User {
        name: name.to_string(),
        cursor: Cursor::default(),
    }
}

pub fn connect_success(names: &[&str], buffer: Option<&[&str]>) -> Packet {
    Packet::Message(Message::ConnectSuccess {
        collaborators: names.iter().map(|n| user(n)).collect(),
        buffer: buffer.map(|b| b.iter().map(|l| l.to_string()).collect()),
    })
}

/// The server end of one client link, driven by the test.
pub struct Peer {
    stream: TcpStream,
    buf: BytesMut,
}

impl Peer {
    /// Accept one client and read its name handshake.
    pub async fn accept(listener: &TcpListener) -> (Peer, String) {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        let mut peer = Peer {
            stream,
            buf: BytesMut::new(),
        };
        loop {
            if let Some(name) = codec::decode_handshake(&mut peer.buf).unwrap() {
                return (peer, name);
            }
            peer.read_more().await;
        }
    }

    pub async fn send(&mut self, packet: &Packet) {
        let bytes = codec::encode(packet).unwrap();
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn recv(&mut self) -> Packet {
        loop {
            if let Some(packet) = codec::decode(&mut self.buf).unwrap() {
                return packet;
            }
            self.read_more().await;
        }
    }

    async fn read_more(&mut self) {
        let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
            .await
            .expect("client sent nothing")
            .unwrap();
        assert!(n > 0, "client closed the link");
    }
}

pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}
