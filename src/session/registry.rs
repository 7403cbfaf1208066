//! Session registry.
//!
//! Owns every open [`SerialSession`], every connected [`ClientHandle`] and
//! the attachment relation between them. All mutations go through this type
//! so that after each call:
//!
//! - at most one session exists per port (map key)
//! - a session exists iff at least one client is attached to it
//! - a client lists a port iff the port's session lists the client
//!
//! Sessions whose last client detaches are removed and handed back to the
//! caller, which closes the device. The registry never performs I/O.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, PortId};

use super::attachments::Attachments;
use super::client::ClientHandle;
use super::serial::SerialSession;

// ============================================================================
// Registry
// ============================================================================

/// Port → session and client → handle maps plus their attachment relation.
#[derive(Debug, Default)]
pub struct Registry {
    /// Open sessions by port.
    sessions: FxHashMap<PortId, SerialSession>,
    /// Connected clients by id.
    clients: FxHashMap<ClientId, ClientHandle>,
    /// Which clients are attached to which ports.
    attachments: Attachments,
}

// ============================================================================
// Registry - Queries
// ============================================================================

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of connected clients.
    #[inline]
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Returns the number of open sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns a connected client.
    #[inline]
    #[must_use]
    pub fn client(&self, id: ClientId) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    /// Returns the open session for `port`.
    #[inline]
    #[must_use]
    pub fn session(&self, port: &PortId) -> Option<&SerialSession> {
        self.sessions.get(port)
    }

    /// Returns `true` if `port` has an open session.
    #[inline]
    #[must_use]
    pub fn has_session(&self, port: &PortId) -> bool {
        self.sessions.contains_key(port)
    }

    /// Returns `true` if `client` is attached to `port`.
    #[inline]
    #[must_use]
    pub fn is_attached(&self, client: ClientId, port: &PortId) -> bool {
        self.attachments.contains(client, port)
    }

    /// Ports `client` has open, in open order.
    #[inline]
    #[must_use]
    pub fn opened_ports(&self, client: ClientId) -> &[PortId] {
        self.attachments.ports_of(client)
    }

    /// Clients attached to `port`, in attachment order.
    pub fn attached_clients(&self, port: &PortId) -> impl Iterator<Item = &ClientHandle> {
        self.attachments
            .clients_of(port)
            .iter()
            .filter_map(|id| self.clients.get(id))
    }

    /// Ports with an open session.
    pub fn ports(&self) -> impl Iterator<Item = &PortId> {
        self.sessions.keys()
    }

    /// Checks the registry invariants.
    #[must_use]
    pub fn check_invariants(&self) -> bool {
        let sessions_attached = self
            .sessions
            .keys()
            .all(|port| !self.attachments.clients_of(port).is_empty());
        let attachments_have_sessions = self.attachments.port_count() == self.sessions.len();
        let clients_known = self.sessions.keys().all(|port| {
            self.attachments
                .clients_of(port)
                .iter()
                .all(|id| self.clients.contains_key(id))
        });

        sessions_attached
            && attachments_have_sessions
            && clients_known
            && self.attachments.is_consistent()
    }
}

// ============================================================================
// Registry - Clients
// ============================================================================

impl Registry {
    /// Registers a newly connected client.
    pub fn add_client(&mut self, client: ClientHandle) {
        debug!(client_id = %client.id(), "Client registered");
        self.clients.insert(client.id(), client);
    }

    /// Removes a client and detaches it from every port.
    ///
    /// Returns the handle and the sessions left without clients, which the
    /// caller must close. `None` if the client was not registered.
    pub fn remove_client(&mut self, id: ClientId) -> Option<(ClientHandle, Vec<SerialSession>)> {
        let orphaned = self.detach_all(id);
        let client = self.clients.remove(&id)?;
        debug!(client_id = %id, orphaned = orphaned.len(), "Client removed");
        Some((client, orphaned))
    }
}

// ============================================================================
// Registry - Sessions
// ============================================================================

impl Registry {
    /// Registers a freshly opened session with its first client attached.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if `client` is not registered
    /// - [`Error::AlreadyOpen`] if `port` already has a session
    ///
    /// On error the session is dropped, which closes its device.
    pub fn insert_session(&mut self, session: SerialSession, client: ClientId) -> Result<()> {
        let port = session.port().clone();

        if !self.clients.contains_key(&client) {
            return Err(Error::ConnectionClosed);
        }
        if self.sessions.contains_key(&port) {
            return Err(Error::already_open(port));
        }

        self.attachments.attach(client, &port);
        self.sessions.insert(port.clone(), session);
        debug!(port = %port, client_id = %client, "Session registered");
        Ok(())
    }

    /// Attaches `client` to the existing session for `port`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if `client` is not registered
    /// - [`Error::PortNotOpen`] if `port` has no session
    /// - [`Error::AlreadyOpen`] if `client` is already attached
    pub fn attach(&mut self, client: ClientId, port: &PortId) -> Result<()> {
        if !self.clients.contains_key(&client) {
            return Err(Error::ConnectionClosed);
        }
        if !self.sessions.contains_key(port) {
            return Err(Error::port_not_open(port.clone()));
        }
        if !self.attachments.attach(client, port) {
            return Err(Error::already_open(port.clone()));
        }

        debug!(
            port = %port,
            client_id = %client,
            clients = self.attachments.clients_of(port).len(),
            "Client attached"
        );
        Ok(())
    }

    /// Detaches `client` from `port`.
    ///
    /// Returns the session if this was its last client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortNotOpen`] if `client` is not attached to `port`.
    pub fn detach(&mut self, client: ClientId, port: &PortId) -> Result<Option<SerialSession>> {
        let remaining = self
            .attachments
            .detach(client, port)
            .ok_or_else(|| Error::port_not_open(port.clone()))?;

        debug!(port = %port, client_id = %client, remaining, "Client detached");

        if remaining == 0 {
            return Ok(self.sessions.remove(port));
        }
        Ok(None)
    }

    /// Detaches `client` from every port it holds.
    ///
    /// Returns the sessions left without clients.
    pub fn detach_all(&mut self, client: ClientId) -> Vec<SerialSession> {
        self.attachments
            .detach_client(client)
            .into_iter()
            .filter(|(_, remaining)| *remaining == 0)
            .filter_map(|(port, _)| self.sessions.remove(&port))
            .collect()
    }

    /// Removes a session regardless of attachments.
    ///
    /// Returns the session and the clients that were attached to it.
    pub fn remove_session(&mut self, port: &PortId) -> Option<(SerialSession, Vec<ClientId>)> {
        let session = self.sessions.remove(port)?;
        let clients = self.attachments.detach_port(port);
        Some((session, clients))
    }

    /// Empties the registry.
    ///
    /// Returns every session and every client handle.
    pub fn drain(&mut self) -> (Vec<SerialSession>, Vec<ClientHandle>) {
        self.attachments = Attachments::new();
        let sessions = self.sessions.drain().map(|(_, s)| s).collect();
        let clients = self.clients.drain().map(|(_, c)| c).collect();
        (sessions, clients)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::transport::Connection;

    fn port(name: &str) -> PortId {
        PortId::new(name).expect("valid port")
    }

    fn client(registry: &mut Registry) -> ClientId {
        let id = ClientId::next();
        let (connection, _) = Connection::channel(id);
        registry.add_client(ClientHandle::new(id, connection, None));
        id
    }

    #[test]
    fn test_first_open_creates_session() {
        let mut registry = Registry::new();
        let a = client(&mut registry);
        let x = port("X");

        registry
            .insert_session(SerialSession::detached(x.clone()), a)
            .expect("insert");

        assert!(registry.has_session(&x));
        assert_eq!(registry.opened_ports(a), &[x.clone()]);
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_second_session_for_same_port_rejected() {
        let mut registry = Registry::new();
        let (a, b) = (client(&mut registry), client(&mut registry));
        let x = port("X");

        registry
            .insert_session(SerialSession::detached(x.clone()), a)
            .expect("insert");
        let err = registry
            .insert_session(SerialSession::detached(x.clone()), b)
            .expect_err("duplicate session");

        assert!(matches!(err, Error::AlreadyOpen { .. }));
        assert_eq!(registry.session_count(), 1);
        assert!(!registry.is_attached(b, &x));
    }

    #[test]
    fn test_shared_attach_and_duplicate() {
        let mut registry = Registry::new();
        let (a, b) = (client(&mut registry), client(&mut registry));
        let x = port("X");

        registry
            .insert_session(SerialSession::detached(x.clone()), a)
            .expect("insert");
        registry.attach(b, &x).expect("attach");

        let err = registry.attach(b, &x).expect_err("duplicate attach");
        assert!(matches!(err, Error::AlreadyOpen { .. }));

        let ids: Vec<_> = registry.attached_clients(&x).map(ClientHandle::id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_attach_without_session_fails() {
        let mut registry = Registry::new();
        let a = client(&mut registry);

        let err = registry.attach(a, &port("X")).expect_err("no session");
        assert!(matches!(err, Error::PortNotOpen { .. }));
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_last_detach_returns_session() {
        let mut registry = Registry::new();
        let (a, b) = (client(&mut registry), client(&mut registry));
        let x = port("X");

        registry
            .insert_session(SerialSession::detached(x.clone()), a)
            .expect("insert");
        registry.attach(b, &x).expect("attach");

        assert!(registry.detach(a, &x).expect("detach").is_none());
        assert!(registry.has_session(&x));

        let closed = registry.detach(b, &x).expect("detach").expect("last client");
        assert_eq!(closed.port(), &x);
        assert!(!registry.has_session(&x));
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_remove_client_releases_only_orphans() {
        let mut registry = Registry::new();
        let (a, b) = (client(&mut registry), client(&mut registry));
        let (x, y) = (port("X"), port("Y"));

        registry
            .insert_session(SerialSession::detached(x.clone()), a)
            .expect("insert");
        registry
            .insert_session(SerialSession::detached(y.clone()), a)
            .expect("insert");
        registry.attach(b, &y).expect("attach");

        let (handle, orphaned) = registry.remove_client(a).expect("registered");
        assert_eq!(handle.id(), a);
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].port(), &x);
        assert!(registry.has_session(&y));
        assert!(registry.client(a).is_none());
        assert!(registry.check_invariants());
    }

    #[test]
    fn test_remove_session_detaches_everyone() {
        let mut registry = Registry::new();
        let (a, b) = (client(&mut registry), client(&mut registry));
        let x = port("X");

        registry
            .insert_session(SerialSession::detached(x.clone()), a)
            .expect("insert");
        registry.attach(b, &x).expect("attach");

        let (_, clients) = registry.remove_session(&x).expect("session");
        assert_eq!(clients, vec![a, b]);
        assert!(registry.opened_ports(a).is_empty());
        assert!(registry.check_invariants());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Open(usize, usize),
        Close(usize, usize),
        CloseAll(usize),
        Disconnect(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, 0..3usize).prop_map(|(c, p)| Op::Open(c, p)),
            (0..4usize, 0..3usize).prop_map(|(c, p)| Op::Close(c, p)),
            (0..4usize).prop_map(Op::CloseAll),
            (0..4usize).prop_map(Op::Disconnect),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_for_any_sequence(ops in proptest::collection::vec(op(), 0..60)) {
            let mut registry = Registry::new();
            let ports = [port("A"), port("B"), port("C")];
            let mut clients: Vec<ClientId> = (0..4).map(|_| client(&mut registry)).collect();

            for op in ops {
                match op {
                    Op::Open(c, p) => {
                        let (id, port) = (clients[c], &ports[p]);
                        if registry.client(id).is_none() {
                            continue;
                        }
                        if registry.has_session(port) {
                            let already = registry.is_attached(id, port);
                            let result = registry.attach(id, port);
                            prop_assert_eq!(result.is_err(), already);
                        } else {
                            registry
                                .insert_session(SerialSession::detached(port.clone()), id)
                                .expect("insert");
                        }
                    }
                    Op::Close(c, p) => {
                        let _ = registry.detach(clients[c], &ports[p]);
                    }
                    Op::CloseAll(c) => {
                        registry.detach_all(clients[c]);
                    }
                    Op::Disconnect(c) => {
                        registry.remove_client(clients[c]);
                        clients[c] = client(&mut registry);
                    }
                }

                prop_assert!(registry.check_invariants());
                prop_assert!(registry.session_count() <= ports.len());
                for port in &ports {
                    let attached = registry.attached_clients(port).count();
                    prop_assert_eq!(registry.has_session(port), attached > 0);
                    for handle in registry.attached_clients(port) {
                        prop_assert!(registry.opened_ports(handle.id()).contains(port));
                    }
                }
            }
        }
    }
}
