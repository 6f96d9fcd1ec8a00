use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use codec::Contact;
use fileapp_service::{Admission, Registry, ServiceHandler, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Registered(String),
    Offered(String, Vec<String>),
    Deregistered(String),
}

#[derive(Default, Clone)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut self.0.lock().unwrap())
    }
}

impl ServiceHandler for Recorder {
    fn on_registered(&self, _: &SocketAddr, name: &str) {
        self.0.lock().unwrap().push(Event::Registered(name.to_string()));
    }

    fn on_offered(&self, _: &SocketAddr, name: &str, files: &[String]) {
        self.0
            .lock()
            .unwrap()
            .push(Event::Offered(name.to_string(), files.to_vec()));
    }

    fn on_deregistered(&self, _: &SocketAddr, name: &str) {
        self.0
            .lock()
            .unwrap()
            .push(Event::Deregistered(name.to_string()));
    }
}

fn offers(files: &[&str]) -> Vec<String> {
    files.iter().map(|file| file.to_string()).collect()
}

#[test]
fn test_admission() -> Result<()> {
    let recorder = Recorder::default();
    let registry = Registry::new(recorder.clone());
    let alice: SocketAddr = "10.0.0.1:6000".parse()?;
    let bob: SocketAddr = "10.0.0.2:6000".parse()?;

    assert_eq!(registry.register(alice, "alice", 6001), Admission::Accepted);
    assert_eq!(recorder.take(), vec![Event::Registered("alice".to_string())]);

    // The name is unique across all records.
    assert_eq!(
        registry.register(bob, "alice", 6003),
        Admission::AlreadyRegistered
    );

    // One record per endpoint.
    assert_eq!(
        registry.register(alice, "alice2", 6001),
        Admission::AlreadyRegistered
    );

    assert_eq!(registry.register(bob, "bob", 6003), Admission::Accepted);
    assert_eq!(registry.len(), 2);
    assert!(recorder.take().contains(&Event::Registered("bob".to_string())));

    let peer = registry.peer(&alice).unwrap();
    assert_eq!(peer.name, "alice");
    assert_eq!(peer.status, Status::Active);
    assert_eq!(peer.tcp_port, 6001);
    assert!(peer.files.is_empty());

    Ok(())
}

#[test]
fn test_offer_derives_view() -> Result<()> {
    let recorder = Recorder::default();
    let registry = Registry::new(recorder.clone());
    let alice: SocketAddr = "10.0.0.1:6000".parse()?;
    registry.register(alice, "alice", 6001);
    recorder.take();

    assert!(registry.add_offers(&alice, &offers(&["x.txt", "y.txt"])));

    let view = registry.view();
    assert_eq!(view.len(), 2);
    assert_eq!(
        view.get("x.txt", "alice"),
        Some(Contact("10.0.0.1".parse()?, 6001))
    );

    // Re-offering the same files adds no pair and owes no broadcast.
    assert!(!registry.add_offers(&alice, &offers(&["x.txt"])));
    assert_eq!(registry.view(), view);

    // A mixed batch still reports a change for its one new file.
    assert!(registry.add_offers(&alice, &offers(&["x.txt", "z.txt"])));
    assert_eq!(registry.view().len(), 3);

    assert_eq!(
        recorder.take(),
        vec![
            Event::Offered("alice".to_string(), offers(&["x.txt", "y.txt"])),
            Event::Offered("alice".to_string(), offers(&["x.txt", "z.txt"])),
        ]
    );

    // Offers from endpoints the registry has never seen are ignored.
    let stranger: SocketAddr = "10.9.9.9:6000".parse()?;
    assert!(!registry.add_offers(&stranger, &offers(&["w.txt"])));

    Ok(())
}

#[test]
fn test_deregistration() -> Result<()> {
    let recorder = Recorder::default();
    let registry = Registry::new(recorder.clone());
    let alice: SocketAddr = "10.0.0.1:6000".parse()?;
    let bob: SocketAddr = "10.0.0.2:6000".parse()?;
    registry.register(alice, "alice", 6001);
    registry.register(bob, "bob", 6003);
    registry.add_offers(&alice, &offers(&["x.txt"]));
    registry.add_offers(&bob, &offers(&["y.txt"]));
    recorder.take();

    assert!(registry.deregister(&alice));
    assert_eq!(
        recorder.take(),
        vec![Event::Deregistered("alice".to_string())]
    );

    // Only bob's offerings survive.
    let view = registry.view();
    assert_eq!(view.len(), 1);
    assert!(view.get("x.txt", "alice").is_none());
    assert!(view.get("y.txt", "bob").is_some());

    // The record is parked, not deleted: offline, empty, name blocked.
    let peer = registry.peer(&alice).unwrap();
    assert_eq!(peer.status, Status::Offline);
    assert!(peer.files.is_empty());
    assert_eq!(registry.active_peers(), vec![bob]);

    let carol: SocketAddr = "10.0.0.3:6000".parse()?;
    assert_eq!(
        registry.register(carol, "alice", 6005),
        Admission::AlreadyRegistered
    );

    // Repeat deregistration and post-dereg offers change nothing.
    assert!(!registry.deregister(&alice));
    assert!(!registry.add_offers(&alice, &offers(&["x.txt"])));
    assert!(registry.peer(&alice).unwrap().files.is_empty());
    assert!(recorder.take().is_empty());

    Ok(())
}
