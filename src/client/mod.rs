//! ## Client runtime
//!
//! After a synchronous registration handshake the client becomes three
//! cooperating tasks: the UDP listener (sole reader of the control
//! socket, routing solicited acks and unsolicited view broadcasts), the
//! TCP file server, and the interactive command loop on the main task.
//! They share the local view mirror, the offer directory and two
//! single-producer single-consumer ack queues.

mod commands;
mod listener;
pub mod transfer;

use std::{net::Ipv4Addr, path::PathBuf, sync::Arc};

use anyhow::bail;
use codec::{Registration, View};
use parking_lot::RwLock;
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::mpsc,
};

use crate::config::ClientConfig;

/// The local mirror of the server's offer view. Replaced wholesale by
/// the UDP listener on every broadcast; readers only need consistency
/// within one command.
pub type SharedView = Arc<RwLock<View>>;

/// The offer directory, set by `setdir` and read by the file server.
pub type SharedDir = Arc<RwLock<Option<PathBuf>>>;

pub const TABLE_UPDATED: &str = ">>> [Client table updated.]";

pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let socket = Arc::new(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.udp_port)).await?);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.tcp_port)).await?;

    let view = register(&socket, &config).await?;
    log::info!(
        "registered: name={}, server={}, tcp={}",
        config.name,
        config.server,
        config.tcp_port,
    );

    let view: SharedView = Arc::new(RwLock::new(view));
    let dir: SharedDir = Arc::new(RwLock::new(None));
    let (offer_acks, offer_queue) = mpsc::unbounded_channel();
    let (dereg_acks, dereg_queue) = mpsc::unbounded_channel();

    let udp_task = tokio::spawn(listener::run(
        socket.clone(),
        view.clone(),
        offer_acks,
        dereg_acks,
    ));
    let tcp_task = tokio::spawn(transfer::serve(listener, dir.clone()));

    let result = commands::run(commands::Session {
        name: config.name,
        server: config.server,
        socket,
        view,
        dir,
        offer_queue,
        dereg_queue,
        tcp_task,
        deregistered: false,
    })
    .await;

    udp_task.abort();
    result
}

/// The synchronous registration bootstrap, before any task is spawned:
/// REGISTER, check the welcome, receive the initial view, confirm it.
///
/// There are no client-side retries here; the server keeps resending
/// the view until it sees the confirmation.
async fn register(socket: &UdpSocket, config: &ClientConfig) -> anyhow::Result<View> {
    let registration = Registration {
        name: config.name.clone(),
        tcp_port: config.tcp_port,
    };

    socket.send_to(&registration.encode(), config.server).await?;

    let mut buf = vec![0u8; 4096];
    let (size, _) = socket.recv_from(&mut buf).await?;
    let welcome = String::from_utf8_lossy(&buf[..size]).into_owned();
    println!("{}", welcome);
    if welcome != codec::WELCOME {
        bail!("registration rejected by server");
    }

    let (size, _) = socket.recv_from(&mut buf).await?;
    let view = View::decode(&buf[..size])?;
    socket.send_to(codec::ACK_VIEW, config.server).await?;
    println!("{}", TABLE_UPDATED);

    Ok(view)
}
