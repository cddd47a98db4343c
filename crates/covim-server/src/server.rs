//! Relay server implementation.

use crate::document::{Document, JoinError};
use bytes::BytesMut;
use covim_core::{Message, Packet, codec};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};

type SharedDocument = Arc<RwLock<Document>>;

/// An encoded packet for every connection except `skip`.
#[derive(Debug, Clone)]
struct Relay {
    skip: Option<String>,
    frame: Arc<Vec<u8>>,
}

impl Relay {
    fn new(packet: &Packet, skip: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            skip,
            frame: Arc::new(codec::encode(packet)?),
        })
    }
}

pub async fn run(addr: SocketAddr, lines: Vec<String>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    serve_listener(listener, Arc::new(RwLock::new(Document::new(lines)))).await
}

async fn serve_listener(listener: TcpListener, document: SharedDocument) -> anyhow::Result<()> {
    let (relay_tx, _) = broadcast::channel::<Relay>(256);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let document = document.clone();
        let relay_tx = relay_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, document, relay_tx).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    document: SharedDocument,
    relay_tx: broadcast::Sender<Relay>,
) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(4096);

    tracing::debug!("New connection from {}", addr);

    // Wait for the name
    let requested = loop {
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
        if let Some(name) = codec::decode_handshake(&mut buf)? {
            break name;
        }
    };

    // Register, snapshot and announce under one lock so no update slips
    // between the welcome and the relay subscription.
    let joined = {
        let mut doc = document.write().await;
        doc.join(&requested).map(|user| {
            let relay_rx = relay_tx.subscribe();
            let welcome = Packet::Message(Message::ConnectSuccess {
                collaborators: doc.users().to_vec(),
                buffer: Some(doc.lines().to_vec()),
            });
            let joined = Packet::Message(Message::UserConnected { user: user.clone() });
            match Relay::new(&joined, Some(user.name.clone())) {
                Ok(relay) => {
                    let _ = relay_tx.send(relay);
                }
                Err(e) => tracing::warn!("Could not announce {}: {}", user.name, e),
            }
            (user.name, relay_rx, welcome)
        })
    };

    let (name, mut relay_rx, welcome) = match joined {
        Ok(joined) => joined,
        Err(reason) => {
            tracing::info!("Refused name {:?} from {}: {:?}", requested, addr, reason);
            let message = match reason {
                JoinError::Invalid => Message::ErrorNewnameInvalid,
                JoinError::Taken => Message::ErrorNewnameTaken,
            };
            return send(&mut writer, &Packet::Message(message)).await;
        }
    };
    tracing::info!("{} joined from {}", name, addr);

    let sent = send(&mut writer, &welcome).await;
    drop(welcome);
    let result = match sent {
        Ok(()) => {
            serve(
                &name,
                &mut reader,
                &mut writer,
                &mut buf,
                &document,
                &relay_tx,
                &mut relay_rx,
            )
            .await
        }
        Err(e) => Err(e),
    };

    document.write().await.leave(&name);
    let left = Packet::Message(Message::UserDisconnected { name: name.clone() });
    let _ = relay_tx.send(Relay::new(&left, None)?);
    tracing::info!("{} left", name);

    result
}

async fn serve(
    name: &str,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    buf: &mut BytesMut,
    document: &SharedDocument,
    relay_tx: &broadcast::Sender<Relay>,
    relay_rx: &mut broadcast::Receiver<Relay>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            read = reader.read_buf(buf) => {
                if read? == 0 {
                    return Ok(());
                }
                loop {
                    match codec::decode(buf) {
                        Ok(Some(Packet::Update(update))) => {
                            let relayed = document.write().await.apply_update(name, update);
                            let _ = relay_tx.send(Relay::new(&Packet::Update(relayed), None)?);
                        }
                        Ok(Some(Packet::Message(message))) => {
                            tracing::warn!("Unexpected message from {}: {:?}", name, message);
                        }
                        Ok(None) => break,
                        Err(e) => tracing::debug!("Dropping frame from {}: {}", name, e),
                    }
                }
            }

            relay = relay_rx.recv() => match relay {
                Ok(relay) if relay.skip.as_deref() == Some(name) => {}
                Ok(relay) => writer.write_all(&relay.frame).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("{} missed {} relayed packets", name, n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn send(writer: &mut OwnedWriteHalf, packet: &Packet) -> anyhow::Result<()> {
    writer.write_all(&codec::encode(packet)?).await?;
    Ok(())
}
