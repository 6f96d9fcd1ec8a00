use std::net::SocketAddr;

use service::ServiceHandler;

/// Turns registry events into the server's log stream, keeping the
/// service crate itself free of logging concerns.
#[derive(Default)]
pub struct Observer;

impl ServiceHandler for Observer {
    fn on_registered(&self, addr: &SocketAddr, name: &str) {
        log::info!("register: addr={}, name={}", addr, name);
    }

    fn on_offered(&self, addr: &SocketAddr, name: &str, files: &[String]) {
        log::info!("offer: addr={}, name={}, files={:?}", addr, name, files);
    }

    fn on_deregistered(&self, addr: &SocketAddr, name: &str) {
        log::info!("deregister: addr={}, name={}", addr, name);
    }
}
