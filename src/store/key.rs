//! Buffer keys
//!
//! Local buffers are identified by name alone; remote buffers by name plus
//! the owning peer's request endpoint, since two peers may each own a buffer
//! with the same name.

use std::net::SocketAddrV4;

/// Key for a buffer owned by this server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalKey {
    pub name: String,
}

impl LocalKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Key for a replica of a buffer owned by a peer server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    pub name: String,
    /// The owning peer's request endpoint (address + request port)
    pub endpoint: SocketAddrV4,
}

impl RemoteKey {
    pub fn new(name: impl Into<String>, endpoint: SocketAddrV4) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }
}

impl std::fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    #[test]
    fn test_remote_key_identity() {
        let a = RemoteKey::new("x", SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 8888));
        let b = RemoteKey::new("x", SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 8889));
        let c = RemoteKey::new("x", SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 8888));

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(!set.contains(&b));
        assert!(set.contains(&c));
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
