//! The sole reader of the client's UDP socket after registration.
//!
//! Solicited acknowledgements and unsolicited broadcasts share one
//! socket, so a single task classifies every datagram by payload and
//! routes it: ack literals to their per-kind queues, anything that
//! parses as a view into the shared mirror. Command-initiated exchanges
//! block on the matching queue and never see a broadcast.

use std::sync::Arc;

use bytes::Bytes;
use codec::Downlink;
use tokio::{net::UdpSocket, sync::mpsc::UnboundedSender};

use super::{SharedView, TABLE_UPDATED};

pub async fn run(
    socket: Arc<UdpSocket>,
    view: SharedView,
    offer_acks: UnboundedSender<Bytes>,
    dereg_acks: UnboundedSender<Bytes>,
) {
    let mut buf = vec![0u8; 4096];

    loop {
        let (size, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // The socket is gone; the client is shutting down.
                log::warn!("udp socket receive error: {}", e);
                break;
            }
        };

        match Downlink::decode(&buf[..size]) {
            Ok(Downlink::AckOffer) => {
                let _ = offer_acks.send(Bytes::copy_from_slice(&buf[..size]));
            }
            Ok(Downlink::AckDereg) => {
                let _ = dereg_acks.send(Bytes::copy_from_slice(&buf[..size]));
            }
            Ok(Downlink::View(update)) => {
                *view.write() = update;
                println!("{}", TABLE_UPDATED);
            }
            Err(_) => log::trace!("datagram dropped: addr={}, size={}", addr, size),
        }
    }
}
