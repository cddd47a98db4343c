//! Client-side synchronization engine for CoVim.
//!
//! Keeps an editor buffer in sync with remote collaborators through a relay
//! server. Two domains cooperate:
//!
//! - the editing surface, where [`Client`] lives and which alone touches the
//!   editor buffer, cursor and roster display, and
//! - a network worker thread that owns the socket and the connection state.
//!
//! They exchange work only through queues. The host calls
//! [`Client::pump`] on its own thread to run whatever the network side has
//! queued, optionally prompted by a [`Waker`].

mod client;
mod config;
mod error;
pub mod roster;
mod surface;
mod worker;

pub use client::{Client, ConnectArgs};
pub use config::{Config, ConfigError};
pub use error::ClientError;
pub use roster::{Collaborator, CollaboratorRegistry, ColorSlot};
pub use surface::EditorSurface;
pub use worker::{SessionTarget, Waker};

pub use covim_core::{BufferSnapshot, ConnectionState, Cursor};
