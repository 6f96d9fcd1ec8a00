//! ## Server dispatcher
//!
//! A single event loop on one UDP socket owns the registry. Datagrams
//! are classified by whether their source endpoint is already
//! registered: unknown endpoints can only be registering, known ones
//! can only be offering or deregistering. Acknowledgements go out
//! before the registry mutates; view broadcasts are fire-and-forget
//! UDP sends that are never retried. The view is absolute, so any
//! later broadcast a client does receive restores it completely.

use std::{
    io,
    io::ErrorKind::ConnectionReset,
    net::{Ipv4Addr, SocketAddr},
};

use bytes::Bytes;
use codec::{Registration, Uplink};
use service::{Admission, Registry};
use tokio::net::UdpSocket;

use crate::{
    config::ServerConfig,
    observer::Observer,
    retry::{self, AckTransport},
};

pub struct Server {
    socket: UdpSocket,
    registry: Registry<Observer>,
}

impl Server {
    /// Bind the dispatcher's UDP socket on all interfaces.
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
        log::info!("directory server listening: addr={}", socket.local_addr()?);

        Ok(Self {
            socket,
            registry: Registry::new(Observer),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The dispatcher loop. Runs until the socket fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 4096];

        loop {
            // An error is also reported here when a previous send hit a
            // closed remote port; those are not fatal for the listener.
            let (size, addr) = match self.socket.recv_from(&mut buf).await {
                Err(e) if e.kind() != ConnectionReset => return Err(e.into()),
                Ok(received) => received,
                _ => continue,
            };

            log::trace!("udp socket receive: size={}, addr={}", size, addr);
            self.dispatch(&buf[..size], addr).await;
        }
    }

    async fn dispatch(&self, payload: &[u8], addr: SocketAddr) {
        if !self.registry.is_registered(&addr) {
            self.admit(payload, addr).await;
            return;
        }

        match Uplink::decode(payload) {
            Ok(Uplink::Dereg) => {
                self.reply(Bytes::from_static(codec::ACK_DEREG), addr).await;
                if self.registry.deregister(&addr) {
                    self.broadcast().await;
                }
            }
            Ok(Uplink::Offer(files)) => {
                self.reply(Bytes::from_static(codec::ACK_OFFER), addr).await;
                if self.registry.add_offers(&addr, &files) {
                    self.broadcast().await;
                }
            }
            // Malformed datagrams draw no reply, so a buggy or malicious
            // peer cannot use the server as an error amplifier.
            Err(_) => log::trace!("datagram dropped: addr={}", addr),
        }
    }

    /// Handle a datagram from an endpoint the registry has never seen.
    async fn admit(&self, payload: &[u8], addr: SocketAddr) {
        let Ok(registration) = Registration::decode(payload) else {
            log::trace!("datagram dropped: addr={}", addr);
            return;
        };

        match self
            .registry
            .register(addr, &registration.name, registration.tcp_port)
        {
            Admission::AlreadyRegistered => {
                log::info!("registration rejected: addr={}, name={}", addr, registration.name);
                self.reply(codec::rejection(&registration.name).into(), addr)
                    .await;
            }
            Admission::Accepted => {
                self.reply(Bytes::from_static(codec::WELCOME.as_bytes()), addr)
                    .await;

                // Push the current view until the new client confirms
                // it. Delivery is best effort: a client that missed
                // every attempt catches up on the next broadcast.
                let mut push = ViewPush {
                    socket: &self.socket,
                    payload: self.registry.view().encode(),
                    dest: addr,
                };

                if retry::send_and_await(&mut push, |ack| ack == codec::ACK_VIEW)
                    .await
                    .is_err()
                {
                    log::warn!("initial view not acknowledged: addr={}", addr);
                }
            }
        }
    }

    async fn reply(&self, payload: Bytes, addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(&payload, addr).await {
            log::warn!("udp socket send error: addr={}, err={}", addr, e);
        }
    }

    /// Fan the current view out to every active client.
    async fn broadcast(&self) {
        let peers = self.registry.active_peers();
        let view = self.registry.view().encode();
        log::trace!("view broadcast: bytes={}, peers={}", view.len(), peers.len());

        for addr in peers {
            self.reply(view.clone(), addr).await;
        }
    }
}

/// The registration handshake's matcher source: the dispatcher owns
/// its socket exclusively, so acknowledgement candidates are read
/// straight off the socket under the coordinator's deadline. Datagrams
/// from other clients that arrive inside the window fail the predicate
/// and are discarded.
struct ViewPush<'a> {
    socket: &'a UdpSocket,
    payload: Bytes,
    dest: SocketAddr,
}

impl AckTransport for ViewPush<'_> {
    async fn send(&mut self) -> io::Result<()> {
        self.socket.send_to(&self.payload, self.dest).await?;
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Bytes> {
        let mut buf = vec![0u8; 4096];
        let (size, _) = self.socket.recv_from(&mut buf).await?;
        Ok(Bytes::copy_from_slice(&buf[..size]))
    }
}
