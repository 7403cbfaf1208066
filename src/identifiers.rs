//! Type-safe identifiers for clients, sessions and ports.
//!
//! Newtype wrappers keep connection ids, session incarnations and port
//! names from being mixed up.
//!
//! | Type | Source | Notes |
//! |------|--------|-------|
//! | [`ClientId`] | Process counter | One per accepted connection |
//! | [`SessionId`] | Process counter | One per device open; reopening yields a new id |
//! | [`PortId`] | Client request | Validated, non-empty port name |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Counters
// ============================================================================

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ClientId
// ============================================================================

/// Identifier of one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocates the next process-unique client id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Identifier of one open incarnation of a serial session.
///
/// Device events carry the id of the session that produced them so events
/// from a closed incarnation are never delivered to a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocates the next process-unique session id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// PortId
// ============================================================================

/// Name of a physical serial port, e.g. `/dev/ttyACM0` or `COM3`.
///
/// Surrounding whitespace is trimmed; an empty name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId(String);

impl PortId {
    /// Creates a port id, returning `None` for a blank name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Option<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Returns the port name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PortId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).ok_or_else(|| "serial port name must not be empty".to_string())
    }
}

impl From<PortId> for String {
    fn from(value: PortId) -> Self {
        value.0
    }
}

impl Borrow<str> for PortId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_unique() {
        let a = ClientId::next();
        let b = ClientId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::next(), SessionId::next());
    }

    #[test]
    fn test_port_id_trims_and_rejects_blank() {
        assert_eq!(PortId::new(" COM3 ").map(|p| p.to_string()), Some("COM3".into()));
        assert!(PortId::new("").is_none());
        assert!(PortId::new("   ").is_none());
    }

    #[test]
    fn test_port_id_deserialize() {
        let port: PortId = serde_json::from_str(r#""/dev/ttyUSB0""#).expect("parse");
        assert_eq!(port.as_str(), "/dev/ttyUSB0");

        assert!(serde_json::from_str::<PortId>(r#""""#).is_err());
    }
}
