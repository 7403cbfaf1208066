//! The client ↔ port attachment relation.
//!
//! Stored once and indexed both ways. `ports_of(client)` and
//! `clients_of(port)` always agree because every mutation updates both
//! indexes together. Empty entries are removed so presence in an index means
//! at least one attachment.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::identifiers::{ClientId, PortId};

// ============================================================================
// Attachments
// ============================================================================

/// Bidirectional attachment relation.
#[derive(Debug, Default, Clone)]
pub struct Attachments {
    /// Clients per port, in attachment order.
    by_port: FxHashMap<PortId, Vec<ClientId>>,
    /// Ports per client, in open order.
    by_client: FxHashMap<ClientId, Vec<PortId>>,
}

impl Attachments {
    /// Creates an empty relation.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `client` to `port`.
    ///
    /// Returns `false` if the pair was already attached.
    pub fn attach(&mut self, client: ClientId, port: &PortId) -> bool {
        if self.contains(client, port) {
            return false;
        }

        self.by_port.entry(port.clone()).or_default().push(client);
        self.by_client.entry(client).or_default().push(port.clone());
        true
    }

    /// Detaches `client` from `port`.
    ///
    /// Returns the number of clients still attached to `port`, or `None` if
    /// the pair was not attached.
    pub fn detach(&mut self, client: ClientId, port: &PortId) -> Option<usize> {
        let clients = self.by_port.get_mut(port)?;
        let index = clients.iter().position(|c| *c == client)?;
        clients.remove(index);
        let remaining = clients.len();
        if remaining == 0 {
            self.by_port.remove(port);
        }

        if let Some(ports) = self.by_client.get_mut(&client) {
            ports.retain(|p| p != port);
            if ports.is_empty() {
                self.by_client.remove(&client);
            }
        }

        Some(remaining)
    }

    /// Detaches `client` from every port.
    ///
    /// Returns each port the client held with its remaining attachment count,
    /// in the order the client opened them.
    pub fn detach_client(&mut self, client: ClientId) -> Vec<(PortId, usize)> {
        let ports = self.by_client.remove(&client).unwrap_or_default();

        ports
            .into_iter()
            .map(|port| {
                let remaining = match self.by_port.get_mut(&port) {
                    Some(clients) => {
                        clients.retain(|c| *c != client);
                        clients.len()
                    }
                    None => 0,
                };
                if remaining == 0 {
                    self.by_port.remove(&port);
                }
                (port, remaining)
            })
            .collect()
    }

    /// Detaches every client from `port`.
    ///
    /// Returns the clients that were attached, in attachment order.
    pub fn detach_port(&mut self, port: &PortId) -> Vec<ClientId> {
        let clients = self.by_port.remove(port).unwrap_or_default();

        for client in &clients {
            if let Some(ports) = self.by_client.get_mut(client) {
                ports.retain(|p| p != port);
                if ports.is_empty() {
                    self.by_client.remove(client);
                }
            }
        }

        clients
    }

    /// Returns `true` if `client` is attached to `port`.
    #[must_use]
    pub fn contains(&self, client: ClientId, port: &PortId) -> bool {
        self.by_client
            .get(&client)
            .is_some_and(|ports| ports.contains(port))
    }

    /// Clients attached to `port`, in attachment order.
    #[must_use]
    pub fn clients_of(&self, port: &PortId) -> &[ClientId] {
        self.by_port.get(port).map_or(&[], Vec::as_slice)
    }

    /// Ports `client` has open, in open order.
    #[must_use]
    pub fn ports_of(&self, client: ClientId) -> &[PortId] {
        self.by_client.get(&client).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of ports with at least one attachment.
    #[inline]
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.by_port.len()
    }

    /// Returns `true` if nothing is attached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }

    /// Checks that both indexes describe the same relation.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let forward = self
            .by_port
            .iter()
            .all(|(port, clients)| {
                !clients.is_empty() && clients.iter().all(|c| self.ports_of(*c).contains(port))
            });
        let backward = self
            .by_client
            .iter()
            .all(|(client, ports)| {
                !ports.is_empty() && ports.iter().all(|p| self.clients_of(p).contains(client))
            });
        forward && backward
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortId {
        PortId::new(name).expect("valid port")
    }

    #[test]
    fn test_attach_is_visible_both_ways() {
        let mut attachments = Attachments::new();
        let a = ClientId::next();
        let x = port("X");

        assert!(attachments.attach(a, &x));
        assert_eq!(attachments.clients_of(&x), &[a]);
        assert_eq!(attachments.ports_of(a), &[x.clone()]);
        assert!(attachments.contains(a, &x));
        assert!(attachments.is_consistent());
    }

    #[test]
    fn test_duplicate_attach_rejected() {
        let mut attachments = Attachments::new();
        let a = ClientId::next();
        let x = port("X");

        assert!(attachments.attach(a, &x));
        assert!(!attachments.attach(a, &x));
        assert_eq!(attachments.clients_of(&x).len(), 1);
    }

    #[test]
    fn test_attachment_order_is_preserved() {
        let mut attachments = Attachments::new();
        let (a, b, c) = (ClientId::next(), ClientId::next(), ClientId::next());
        let x = port("X");

        attachments.attach(b, &x);
        attachments.attach(a, &x);
        attachments.attach(c, &x);
        assert_eq!(attachments.clients_of(&x), &[b, a, c]);
    }

    #[test]
    fn test_detach_reports_remaining() {
        let mut attachments = Attachments::new();
        let (a, b) = (ClientId::next(), ClientId::next());
        let x = port("X");

        attachments.attach(a, &x);
        attachments.attach(b, &x);

        assert_eq!(attachments.detach(a, &x), Some(1));
        assert_eq!(attachments.detach(a, &x), None);
        assert_eq!(attachments.detach(b, &x), Some(0));
        assert!(attachments.is_empty());
        assert!(attachments.ports_of(b).is_empty());
    }

    #[test]
    fn test_detach_client_from_all_ports() {
        let mut attachments = Attachments::new();
        let (a, b) = (ClientId::next(), ClientId::next());
        let (x, y) = (port("X"), port("Y"));

        attachments.attach(a, &x);
        attachments.attach(a, &y);
        attachments.attach(b, &y);

        let released = attachments.detach_client(a);
        assert_eq!(released, vec![(x.clone(), 0), (y.clone(), 1)]);
        assert!(attachments.clients_of(&x).is_empty());
        assert_eq!(attachments.clients_of(&y), &[b]);
        assert!(attachments.is_consistent());
    }

    #[test]
    fn test_detach_port_from_all_clients() {
        let mut attachments = Attachments::new();
        let (a, b) = (ClientId::next(), ClientId::next());
        let (x, y) = (port("X"), port("Y"));

        attachments.attach(a, &x);
        attachments.attach(b, &x);
        attachments.attach(b, &y);

        assert_eq!(attachments.detach_port(&x), vec![a, b]);
        assert!(attachments.ports_of(a).is_empty());
        assert_eq!(attachments.ports_of(b), &[y]);
        assert!(attachments.is_consistent());
    }
}
