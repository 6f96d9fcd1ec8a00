//! The offer view: the server-derived projection of the registry that
//! clients consume for file discovery.
//!
//! On the wire the view is a single JSON object mapping the composite
//! key `"<file>,<owner>"` to the pair `["<ip>", <tcp_port>]`. Neither
//! component may contain a comma; there is no escaping. The view is
//! absolute rather than a delta, so one received broadcast restores a
//! client's mirror regardless of how many earlier broadcasts were lost.

use std::{collections::BTreeMap, net::IpAddr};

use bytes::Bytes;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::SerializeMap,
};

use crate::Error;

/// Where a file can be fetched: the owner's IP address and the TCP port
/// where it accepts file-transfer connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact(pub IpAddr, pub u16);

impl Contact {
    pub fn ip(&self) -> IpAddr {
        self.0
    }

    pub fn tcp_port(&self) -> u16 {
        self.1
    }
}

/// One advertised (file, owner) pair.
///
/// Ordering is file then owner, which is also the order the client's
/// `list` command renders rows in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key {
    pub file: String,
    pub owner: String,
}

impl Key {
    pub fn new(file: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            owner: owner.into(),
        }
    }

    fn wire(&self) -> String {
        format!("{},{}", self.file, self.owner)
    }

    fn parse(key: &str) -> Result<Self, Error> {
        let (file, owner) = key.split_once(',').ok_or(Error::Malformed)?;
        if file.is_empty() || owner.is_empty() {
            return Err(Error::Malformed);
        }

        if owner.contains(',') {
            return Err(Error::EmbeddedComma);
        }

        Ok(Self::new(file, owner))
    }
}

/// The set of advertised files and their owners' contact information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View(BTreeMap<Key, Contact>);

impl View {
    /// Insert an entry, returning whether the advertised pair is new.
    /// Re-offering an existing pair leaves the view untouched.
    pub fn insert(&mut self, key: Key, contact: Contact) -> bool {
        match self.0.contains_key(&key) {
            true => false,
            false => {
                self.0.insert(key, contact);
                true
            }
        }
    }

    /// Drop every entry advertised by `owner`, returning whether any
    /// existed.
    pub fn remove_owner(&mut self, owner: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|key, _| key.owner != owner);
        self.0.len() != before
    }

    pub fn get(&self, file: &str, owner: &str) -> Option<Contact> {
        self.0.get(&Key::new(file, owner)).copied()
    }

    /// Entries in ascending (file, owner) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Contact)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> Bytes {
        serde_json::to_vec(self)
            .expect("a view always serializes")
            .into()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(buf)?)
    }
}

impl Serialize for View {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, contact) in &self.0 {
            map.serialize_entry(&key.wire(), contact)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for View {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Contact>::deserialize(deserializer)?;
        let mut entries = BTreeMap::new();
        for (key, contact) in raw {
            entries.insert(Key::parse(&key).map_err(D::Error::custom)?, contact);
        }

        Ok(Self(entries))
    }
}
