//! ## Retry/Ack coordinator
//!
//! Every confirmed exchange in the control plane is the same shape:
//! send a datagram, wait a bounded time for a matching acknowledgement,
//! retransmit a fixed number of times, then give up. The pattern is
//! extracted here once and parameterized by the matcher source instead
//! of being duplicated per call site.

use std::{io, time::Duration};

use bytes::Bytes;
use tokio::time::{self, Instant};

/// Per-attempt acknowledgement deadline.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Retransmissions after the initial attempt.
pub const ACK_RETRIES: usize = 2;

#[derive(Debug)]
pub enum Error {
    /// Every attempt expired without a matching acknowledgement.
    Timeout,
    Io(io::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "no acknowledgement after all retries"),
            Self::Io(e) => write!(f, "{}", e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// The pluggable source of a request/acknowledgement exchange.
///
/// The server's dispatcher owns its socket exclusively and reads
/// candidates straight off it with a receive deadline; a client's
/// command loop drains the per-kind ack queue its listener task feeds.
/// The coordinator only needs a way to transmit the payload and a way
/// to pull the next candidate.
pub trait AckTransport {
    /// Transmit the request payload once.
    fn send(&mut self) -> impl Future<Output = io::Result<()>>;

    /// Pull the next candidate acknowledgement.
    fn recv(&mut self) -> impl Future<Output = io::Result<Bytes>>;
}

/// Send a datagram and wait for an acknowledgement satisfying `matches`.
///
/// Bounded by [`ACK_TIMEOUT`] per attempt and [`ACK_RETRIES`]
/// retransmissions: at most three transmissions and 1.5 s of waiting in
/// total. Candidates failing the predicate are discarded without
/// resetting the attempt deadline.
pub async fn send_and_await<T, F>(transport: &mut T, matches: F) -> Result<(), Error>
where
    T: AckTransport,
    F: Fn(&[u8]) -> bool,
{
    for _ in 0..=ACK_RETRIES {
        transport.send().await?;

        let deadline = Instant::now() + ACK_TIMEOUT;
        loop {
            match time::timeout_at(deadline, transport.recv()).await {
                Ok(Ok(payload)) if matches(&payload) => return Ok(()),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => break,
            }
        }
    }

    Err(Error::Timeout)
}
