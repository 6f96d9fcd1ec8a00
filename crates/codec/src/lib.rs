//! ## Control-plane message codec
//!
//! Every control message between a client and the directory server is a
//! single UDP datagram; there is no framing beyond datagram boundaries.
//! Acknowledgements are distinct string literals per request kind, so a
//! receiver can classify a payload without correlation ids: the client
//! socket carries both solicited acks and unsolicited view broadcasts,
//! and the payload alone decides where a datagram is routed.

pub mod view;

pub use self::view::{Contact, Key, View};

use std::str::Utf8Error;

use bytes::Bytes;

/// Sent by the server when a registration is accepted.
pub const WELCOME: &str = ">>> [Welcome, You are registered.]";

/// Sent by a client to confirm receipt of the initial offer view.
pub const ACK_VIEW: &[u8] = b"ACK";

/// Sent by the server to confirm an offer.
pub const ACK_OFFER: &[u8] = b"ACK_OFFER";

/// Sent by the server to confirm a deregistration.
pub const ACK_DEREG: &[u8] = b"ACK_DEREG";

/// Sent by a client to leave the network.
pub const DEREG: &[u8] = b"DEREG";

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The payload matches no known message shape. Callers drop these
    /// datagrams silently.
    Malformed,
    /// A name or filename carries a comma, which the composite view key
    /// cannot represent (there is no escaping).
    EmbeddedComma,
    /// A port field is not an integer in [1024, 65535].
    InvalidPort,
    Utf8(Utf8Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(_: serde_json::Error) -> Self {
        Self::Malformed
    }
}

/// The rejection sent instead of [`WELCOME`] when a name is taken.
///
/// Deregistration is terminal, so the rejection covers both a live owner
/// and a retired name.
pub fn rejection(name: &str) -> String {
    format!("Client {} already registered.", name)
}

/// The REGISTER payload: `"<name>,<tcp_port>"`.
///
/// The TCP port is where the registering client accepts file-fetch
/// connections from its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub tcp_port: u16,
}

impl Registration {
    pub fn encode(&self) -> Bytes {
        format!("{},{}", self.name, self.tcp_port).into()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let payload = std::str::from_utf8(buf)?;
        let (name, port) = payload.split_once(',').ok_or(Error::Malformed)?;
        if name.is_empty() {
            return Err(Error::Malformed);
        }

        let tcp_port = port.parse().map_err(|_| Error::InvalidPort)?;
        if tcp_port < 1024 {
            return Err(Error::InvalidPort);
        }

        Ok(Self {
            name: name.to_string(),
            tcp_port,
        })
    }
}

/// A datagram from an already-registered client, classified server-side.
///
/// Registration is recognized by the *absence* of the source endpoint in
/// the registry, not by payload shape, so it is not a variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uplink {
    /// A JSON array of filenames the sender now offers.
    Offer(Vec<String>),
    /// The `DEREG` literal.
    Dereg,
}

impl Uplink {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf == DEREG {
            return Ok(Self::Dereg);
        }

        let files: Vec<String> = serde_json::from_slice(buf)?;
        if files.iter().any(|file| file.contains(',')) {
            return Err(Error::EmbeddedComma);
        }

        Ok(Self::Offer(files))
    }
}

/// Encode an offer announcement as a JSON array of filenames.
pub fn encode_offer(files: &[String]) -> Bytes {
    serde_json::to_vec(files)
        .expect("a filename list always serializes")
        .into()
}

/// A datagram reaching a client's UDP socket after registration, the
/// tagged sum the single listener routes on: solicited acks go to their
/// per-kind queues, everything that parses as a view replaces the local
/// mirror wholesale.
#[derive(Debug, Clone, PartialEq)]
pub enum Downlink {
    AckOffer,
    AckDereg,
    View(View),
}

impl Downlink {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        match buf {
            b if b == ACK_OFFER => Ok(Self::AckOffer),
            b if b == ACK_DEREG => Ok(Self::AckDereg),
            b => Ok(Self::View(View::decode(b)?)),
        }
    }
}
