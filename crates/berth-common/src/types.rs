//! Domain primitive types used across the Berth workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BerthError, Result};

/// Unique identifier for one provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvisionId(String);

impl ProvisionId {
    /// Creates an ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this ID starts with `prefix`, for short-ID lookups.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }
}

impl fmt::Display for ProvisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hash digest used to fingerprint dependency manifests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BerthError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Transport protocol of a declared port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (the default when a recipe gives no suffix).
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// A port the service is declared to listen on.
///
/// Declaration is metadata only; nothing in Berth binds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port number, never zero.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortSpec {
    /// A TCP port declaration.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl FromStr for PortSpec {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        let (num, protocol) = match s.split_once('/') {
            Some((num, "tcp")) => (num, Protocol::Tcp),
            Some((num, "udp")) => (num, Protocol::Udp),
            Some((_, other)) => {
                return Err(BerthError::Config {
                    message: format!("unsupported port protocol: {other}"),
                });
            }
            None => (s, Protocol::Tcp),
        };
        let port: u16 = num.parse().map_err(|_| BerthError::Config {
            message: format!("port value out of range: {num}"),
        })?;
        if port == 0 {
            return Err(BerthError::Config {
                message: "port value out of range: 0".into(),
            });
        }
        Ok(Self { port, protocol })
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Lifecycle state of a provisioning attempt.
///
/// Progression is one-way:
/// `Unprovisioned -> RootEstablished -> DependenciesInstalled -> Running -> Exited`.
/// Any non-terminal state may drop to `Failed`, which is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionState {
    /// Nothing has been done yet.
    Unprovisioned,
    /// The root directory exists and is the working location.
    RootEstablished,
    /// The root is populated and every dependency is installed.
    DependenciesInstalled,
    /// The service process has been launched.
    Running,
    /// The service process terminated.
    Exited,
    /// A step failed; progression halted.
    Failed,
}

impl ProvisionState {
    /// Returns whether the machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unprovisioned, Self::RootEstablished)
                | (Self::RootEstablished, Self::DependenciesInstalled)
                | (Self::DependenciesInstalled, Self::Running)
                | (Self::Running, Self::Exited)
                | (
                    Self::Unprovisioned
                        | Self::RootEstablished
                        | Self::DependenciesInstalled
                        | Self::Running,
                    Self::Failed
                )
        )
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Failed)
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unprovisioned => "UNPROVISIONED",
            Self::RootEstablished => "ROOT_ESTABLISHED",
            Self::DependenciesInstalled => "DEPENDENCIES_INSTALLED",
            Self::Running => "RUNNING",
            Self::Exited => "EXITED",
            Self::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        use ProvisionState::*;
        assert!(Unprovisioned.can_transition_to(RootEstablished));
        assert!(RootEstablished.can_transition_to(DependenciesInstalled));
        assert!(DependenciesInstalled.can_transition_to(Running));
        assert!(Running.can_transition_to(Exited));
    }

    #[test]
    fn skipping_and_going_back_are_rejected() {
        use ProvisionState::*;
        assert!(!Unprovisioned.can_transition_to(DependenciesInstalled));
        assert!(!Unprovisioned.can_transition_to(Running));
        assert!(!Running.can_transition_to(RootEstablished));
        assert!(!DependenciesInstalled.can_transition_to(RootEstablished));
    }

    #[test]
    fn failed_is_permanent() {
        use ProvisionState::*;
        for next in [Unprovisioned, RootEstablished, DependenciesInstalled, Running, Exited, Failed] {
            assert!(!Failed.can_transition_to(next), "FAILED -> {next}");
        }
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn state_serializes_in_screaming_case() {
        let json = serde_json::to_string(&ProvisionState::DependenciesInstalled).unwrap();
        assert_eq!(json, "\"DEPENDENCIES_INSTALLED\"");
    }

    #[test]
    fn port_spec_defaults_to_tcp() {
        let spec: PortSpec = "5000".parse().unwrap();
        assert_eq!(spec, PortSpec::tcp(5000));
        assert_eq!(spec.to_string(), "5000/tcp");
    }

    #[test]
    fn port_spec_parses_udp_suffix() {
        let spec: PortSpec = "53/udp".parse().unwrap();
        assert_eq!(spec.protocol, Protocol::Udp);
    }

    #[test]
    fn port_spec_rejects_zero_and_overflow() {
        assert!("0".parse::<PortSpec>().is_err());
        assert!("70000".parse::<PortSpec>().is_err());
        assert!("80/sctp".parse::<PortSpec>().is_err());
    }

    #[test]
    fn sha256_rejects_short_input() {
        assert!(Sha256Hash::from_hex("abc").is_err());
        let ok = Sha256Hash::from_hex("A".repeat(64)).unwrap();
        assert_eq!(ok.as_hex(), "a".repeat(64));
    }

    #[test]
    fn provision_id_prefix_match() {
        let id = ProvisionId::new("3f2a9c10-aaaa");
        assert!(id.matches_prefix("3f2a"));
        assert!(!id.matches_prefix(""));
        assert!(!id.matches_prefix("ff"));
    }
}
