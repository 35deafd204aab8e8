//! Protocol versioning.
//!
//! The Foxglove protocol is negotiated through the WebSocket subprotocol
//! header, which carries the major version.

/// WebSocket subprotocol offered by the client.
pub const SUBPROTOCOL: &str = "foxglove.websocket.v1";

/// Current protocol version.
pub const PROTOCOL_VERSION: Version = Version { major: 1 };

/// Protocol version information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version carried by the subprotocol name.
    pub major: u8,
}

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(major: u8) -> Self {
        Self { major }
    }

    /// Parse the version out of a negotiated subprotocol name.
    ///
    /// Returns `None` for subprotocols that are not Foxglove WebSocket ones.
    #[must_use]
    pub fn from_subprotocol(subprotocol: &str) -> Option<Self> {
        subprotocol
            .strip_prefix("foxglove.websocket.v")
            .and_then(|major| major.parse().ok())
            .map(Self::new)
    }

    /// Check if a server speaking this version can talk to this client.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "foxglove.websocket.v{}", self.major)
    }
}

impl Default for Version {
    fn default() -> Self {
        PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_subprotocol() {
        assert_eq!(Version::from_subprotocol(SUBPROTOCOL), Some(PROTOCOL_VERSION));
        assert_eq!(Version::from_subprotocol("foxglove.websocket.v2"), Some(Version::new(2)));
        assert_eq!(Version::from_subprotocol("graphql-ws"), None);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(PROTOCOL_VERSION.to_string(), SUBPROTOCOL);
        assert!(!PROTOCOL_VERSION.is_compatible_with(&Version::new(2)));
    }
}
