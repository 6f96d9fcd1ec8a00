//! ## Directory registry
//!
//! The authoritative record of every client that has ever registered,
//! keyed by the UDP source endpoint observed at registration, plus the
//! derived offer view that clients consume for file discovery.
//!
//! The registry is owned by the server's single dispatcher task; the
//! locks are only there so the registry can be shared with integration
//! tests and a future parallel dispatcher, operations are short and
//! never block.

use std::{collections::BTreeSet, net::SocketAddr};

use ahash::{HashMap, HashMapExt};
use codec::{Contact, Key, View};
use parking_lot::RwLock;

/// Registry event callbacks.
///
/// The registry stays free of logging and transport concerns; the server
/// decides what each event means (the binary implements this with log
/// lines).
pub trait ServiceHandler: Send + Sync {
    /// A new client joined the network.
    #[allow(unused_variables)]
    fn on_registered(&self, addr: &SocketAddr, name: &str) {}

    /// A client advertised files it did not previously offer.
    #[allow(unused_variables)]
    fn on_offered(&self, addr: &SocketAddr, name: &str, files: &[String]) {}

    /// An active client left the network.
    #[allow(unused_variables)]
    fn on_deregistered(&self, addr: &SocketAddr, name: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Offline,
}

/// One client record.
///
/// Records are never deleted: deregistration parks the record as
/// `Offline` with an empty file set, which keeps the name unavailable
/// for the rest of the server's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub status: Status,
    pub tcp_port: u16,
    pub files: BTreeSet<String>,
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    AlreadyRegistered,
}

pub struct Registry<T> {
    peers: RwLock<HashMap<SocketAddr, Peer>>,
    view: RwLock<View>,
    handler: T,
}

impl<T: ServiceHandler> Registry<T> {
    pub fn new(handler: T) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            view: RwLock::new(View::default()),
            handler,
        }
    }

    /// Admit a new client.
    ///
    /// Rejected when the name belongs to any existing record, active or
    /// offline, or when the endpoint is already bound to a record. A
    /// fresh client's view is pushed only to itself, so admission never
    /// triggers a broadcast.
    pub fn register(&self, addr: SocketAddr, name: &str, tcp_port: u16) -> Admission {
        {
            let mut peers = self.peers.write();
            if peers.contains_key(&addr) || peers.values().any(|peer| peer.name == name) {
                return Admission::AlreadyRegistered;
            }

            peers.insert(
                addr,
                Peer {
                    name: name.to_string(),
                    status: Status::Active,
                    tcp_port,
                    files: BTreeSet::new(),
                },
            );
        }

        self.handler.on_registered(&addr, name);
        Admission::Accepted
    }

    /// Merge `files` into the sender's offered set.
    ///
    /// Duplicates are silent no-ops. Returns whether the advertised
    /// (file, owner) pair set grew, in which case the caller owes every
    /// active client a broadcast. Offers from unknown or offline
    /// endpoints mutate nothing.
    pub fn add_offers(&self, addr: &SocketAddr, files: &[String]) -> bool {
        let name;
        let mut changed = false;

        {
            let mut peers = self.peers.write();
            let Some(peer) = peers.get_mut(addr) else {
                return false;
            };

            if peer.status != Status::Active {
                return false;
            }

            name = peer.name.clone();
            let contact = Contact(addr.ip(), peer.tcp_port);
            let mut view = self.view.write();
            for file in files {
                peer.files.insert(file.clone());
                changed |= view.insert(Key::new(file.clone(), name.clone()), contact);
            }
        }

        if changed {
            self.handler.on_offered(addr, &name, files);
        }

        changed
    }

    /// Transition an active client to offline and strip its entries
    /// from the view.
    ///
    /// Returns whether the peer was active; a repeated deregistration
    /// changes nothing. The record itself stays, blocking reuse of the
    /// name.
    pub fn deregister(&self, addr: &SocketAddr) -> bool {
        let name;

        {
            let mut peers = self.peers.write();
            let Some(peer) = peers.get_mut(addr) else {
                return false;
            };

            if peer.status != Status::Active {
                return false;
            }

            peer.status = Status::Offline;
            peer.files.clear();
            name = peer.name.clone();
            self.view.write().remove_owner(&name);
        }

        self.handler.on_deregistered(addr, &name);
        true
    }

    /// Snapshot of the current offer view.
    pub fn view(&self) -> View {
        self.view.read().clone()
    }

    /// The endpoints a view broadcast goes to.
    pub fn active_peers(&self) -> Vec<SocketAddr> {
        self.peers
            .read()
            .iter()
            .filter(|(_, peer)| peer.status == Status::Active)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Whether any record, active or offline, is bound to the endpoint.
    pub fn is_registered(&self, addr: &SocketAddr) -> bool {
        self.peers.read().contains_key(addr)
    }

    /// Snapshot of one record.
    pub fn peer(&self, addr: &SocketAddr) -> Option<Peer> {
        self.peers.read().get(addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
