//! Socket-level scenarios against a live dispatcher: registration and
//! the initial-view handshake, offer broadcasts, deregistration, and
//! the silent handling of malformed traffic.

use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use codec::View;
use fileapp::{config::ServerConfig, server::Server};
use tokio::{net::UdpSocket, time::timeout};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to listen before concluding the server sent nothing.
const SILENCE: Duration = Duration::from_millis(300);

async fn start_server() -> Result<SocketAddr> {
    let server = Server::bind(&ServerConfig { port: 0 }).await?;
    let addr = server.local_addr()?;
    tokio::spawn(server.run());
    Ok(addr)
}

struct TestClient {
    socket: UdpSocket,
    server: SocketAddr,
    name: &'static str,
    tcp_port: u16,
}

impl TestClient {
    async fn new(server: SocketAddr, name: &'static str, tcp_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;

        Ok(Self {
            socket,
            server,
            name,
            tcp_port,
        })
    }

    async fn send(&self, payload: &[u8]) -> Result<()> {
        self.socket.send_to(payload, self.server).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 4096];
        let (size, _) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf)).await??;
        buf.truncate(size);
        Ok(buf)
    }

    async fn recv_view(&self) -> Result<View> {
        Ok(View::decode(&self.recv().await?)?)
    }

    /// The server must stay silent; any datagram is a failure.
    async fn expect_silence(&self) {
        let mut buf = vec![0u8; 4096];
        let received = timeout(SILENCE, self.socket.recv_from(&mut buf)).await;
        assert!(received.is_err(), "expected no datagram from the server");
    }

    async fn register(&self) -> Result<Vec<u8>> {
        self.send(format!("{},{}", self.name, self.tcp_port).as_bytes())
            .await?;
        self.recv().await
    }

    /// The complete handshake: welcome, initial view, confirmation.
    async fn register_ok(&self) -> Result<View> {
        let welcome = self.register().await?;
        assert_eq!(welcome, codec::WELCOME.as_bytes());

        let view = self.recv_view().await?;
        self.send(codec::ACK_VIEW).await?;
        Ok(view)
    }
}

#[tokio::test]
async fn test_registration() -> Result<()> {
    let server = start_server().await?;

    let alice = TestClient::new(server, "alice", 6001).await?;
    let view = alice.register_ok().await?;
    assert!(view.is_empty());

    // The name is taken, from any endpoint, for the server's lifetime.
    let impostor = TestClient::new(server, "alice", 6003).await?;
    let rejection = impostor.register().await?;
    assert!(rejection.starts_with(b"Client alice already registered"));

    // Malformed registrations are dropped without a reply.
    let mumbler = TestClient::new(server, "mumbler", 6005).await?;
    mumbler.send(b"hello server").await?;
    mumbler.expect_silence().await;

    Ok(())
}

#[tokio::test]
async fn test_initial_view_is_retried_until_given_up() -> Result<()> {
    let server = start_server().await?;

    let alice = TestClient::new(server, "alice", 6001).await?;
    let welcome = alice.register().await?;
    assert_eq!(welcome, codec::WELCOME.as_bytes());

    // Withhold the confirmation: the view must arrive three times, then
    // the server gives up and goes back to its loop.
    for _ in 0..3 {
        assert!(alice.recv_view().await?.is_empty());
    }

    alice.expect_silence().await;

    // Let the final acknowledgement window lapse: datagrams arriving
    // inside it would be drained by the handshake, not dispatched.
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The dispatcher is still alive and serving.
    let bob = TestClient::new(server, "bob", 6003).await?;
    assert!(bob.register_ok().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_offer_acks_and_broadcasts() -> Result<()> {
    let server = start_server().await?;

    let alice = TestClient::new(server, "alice", 6001).await?;
    let bob = TestClient::new(server, "bob", 6003).await?;
    alice.register_ok().await?;
    bob.register_ok().await?;

    alice.send(br#"["x.txt"]"#).await?;

    // The ack comes before the broadcast, and every active client gets
    // the new view.
    assert_eq!(alice.recv().await?, codec::ACK_OFFER);
    let views = vec![alice.recv_view().await?, bob.recv_view().await?];
    for view in views {
        assert_eq!(view.len(), 1);
        let contact = view.get("x.txt", "alice").expect("pair advertised");
        assert_eq!(contact.tcp_port(), 6001);
    }

    // Re-offering the same file is acked but broadcasts nothing.
    alice.send(br#"["x.txt"]"#).await?;
    assert_eq!(alice.recv().await?, codec::ACK_OFFER);
    bob.expect_silence().await;

    // Malformed traffic from a registered endpoint is dropped silently.
    alice.send(b"{\"not\": \"an array\"}").await?;
    alice.expect_silence().await;

    Ok(())
}

#[tokio::test]
async fn test_deregistration_removes_offerings() -> Result<()> {
    let server = start_server().await?;

    let alice = TestClient::new(server, "alice", 6001).await?;
    let bob = TestClient::new(server, "bob", 6003).await?;
    alice.register_ok().await?;
    bob.register_ok().await?;

    alice.send(br#"["x.txt", "y.txt"]"#).await?;
    assert_eq!(alice.recv().await?, codec::ACK_OFFER);
    alice.recv_view().await?;
    assert_eq!(bob.recv_view().await?.len(), 2);

    alice.send(codec::DEREG).await?;
    assert_eq!(alice.recv().await?, codec::ACK_DEREG);

    // The shrunken view goes to the remaining active client only.
    assert!(bob.recv_view().await?.is_empty());
    alice.expect_silence().await;

    // A client registering afterwards sees the empty view, and the
    // retired name stays blocked.
    let carol = TestClient::new(server, "carol", 6005).await?;
    assert!(carol.register_ok().await?.is_empty());

    let impostor = TestClient::new(server, "alice", 6007).await?;
    let rejection = impostor.register().await?;
    assert!(rejection.starts_with(b"Client alice already registered"));

    // A repeated DEREG is acked but changes nothing for anyone else.
    alice.send(codec::DEREG).await?;
    assert_eq!(alice.recv().await?, codec::ACK_DEREG);
    bob.expect_silence().await;

    Ok(())
}
