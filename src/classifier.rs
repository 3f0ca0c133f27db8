//! Method classification.
//!
//! Decides from a method's name and declared role marker whether it is a
//! remote procedure. Ordinary methods (no marker, no suffix) are skipped
//! silently so they can live next to procedures on the same type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::DeliveryMode;

/// Name suffix required on server procedures.
pub const SERVER_RPC_SUFFIX: &str = "ServerRpc";

/// Name suffix required on client procedures.
pub const CLIENT_RPC_SUFFIX: &str = "ClientRpc";

/// Which side executes a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Runs on the server/host; sent by clients.
    Server,
    /// Runs on clients; sent by the server/host.
    Client,
}

impl Role {
    /// Name suffix that goes with this role.
    pub fn suffix(self) -> &'static str {
        match self {
            Role::Server => SERVER_RPC_SUFFIX,
            Role::Client => CLIENT_RPC_SUFFIX,
        }
    }

    fn of_name(name: &str) -> Option<Role> {
        if name.ends_with(SERVER_RPC_SUFFIX) {
            Some(Role::Server)
        } else if name.ends_with(CLIENT_RPC_SUFFIX) {
            Some(Role::Client)
        } else {
            None
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Role marker declared on a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcAttribute {
    ServerRpc {
        require_ownership: bool,
        delivery: DeliveryMode,
    },
    ClientRpc {
        delivery: DeliveryMode,
    },
}

impl RpcAttribute {
    /// Reliable server marker that requires ownership.
    pub fn server() -> Self {
        RpcAttribute::ServerRpc {
            require_ownership: true,
            delivery: DeliveryMode::Reliable,
        }
    }

    /// Reliable client marker.
    pub fn client() -> Self {
        RpcAttribute::ClientRpc {
            delivery: DeliveryMode::Reliable,
        }
    }

    /// Same marker with ownership requirement replaced (no-op for client markers).
    pub fn require_ownership(self, required: bool) -> Self {
        match self {
            RpcAttribute::ServerRpc { delivery, .. } => RpcAttribute::ServerRpc {
                require_ownership: required,
                delivery,
            },
            other => other,
        }
    }

    /// Same marker with a different delivery mode.
    pub fn delivery(self, mode: DeliveryMode) -> Self {
        match self {
            RpcAttribute::ServerRpc { require_ownership, .. } => RpcAttribute::ServerRpc {
                require_ownership,
                delivery: mode,
            },
            RpcAttribute::ClientRpc { .. } => RpcAttribute::ClientRpc { delivery: mode },
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RpcAttribute::ServerRpc { .. } => Role::Server,
            RpcAttribute::ClientRpc { .. } => Role::Client,
        }
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        match self {
            RpcAttribute::ServerRpc { delivery, .. } | RpcAttribute::ClientRpc { delivery } => *delivery,
        }
    }

    /// Only server markers can require ownership.
    pub fn requires_ownership(&self) -> bool {
        matches!(
            self,
            RpcAttribute::ServerRpc {
                require_ownership: true,
                ..
            }
        )
    }
}

/// Why a method was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Name ends with the role suffix but the marker is missing.
    MissingRoleMarker(Role),
    /// Marker is present but the name lacks the suffix.
    MissingSuffix(Role),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::MissingRoleMarker(role) => {
                write!(f, "name ends with {} but the method is missing the {} marker", role.suffix(), role.suffix())
            }
            InvalidReason::MissingSuffix(role) => {
                write!(f, "method has the {} marker but its name doesn't end with {}", role.suffix(), role.suffix())
            }
        }
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NotAProcedure,
    Valid(Role),
    Invalid(InvalidReason),
}

/// Classify one method.
///
/// Rules, in order:
/// 1. no marker and no suffix: not a procedure
/// 2. suffix without the matching marker: missing role marker
/// 3. marker without the matching suffix: missing suffix
/// 4. otherwise valid
///
/// # Example
///
/// ```
/// use netcode_rpc::classifier::{classify, Classification, InvalidReason, Role, RpcAttribute};
///
/// let server = RpcAttribute::server();
/// assert_eq!(classify("PingServerRpc", Some(&server)), Classification::Valid(Role::Server));
/// assert_eq!(
///     classify("Ping", Some(&server)),
///     Classification::Invalid(InvalidReason::MissingSuffix(Role::Server))
/// );
/// assert_eq!(classify("Update", None), Classification::NotAProcedure);
/// ```
pub fn classify(method_name: &str, attribute: Option<&RpcAttribute>) -> Classification {
    let suffix_role = Role::of_name(method_name);
    let marker_role = attribute.map(RpcAttribute::role);

    match (suffix_role, marker_role) {
        (None, None) => Classification::NotAProcedure,
        (Some(suffix), Some(marker)) if suffix == marker => Classification::Valid(marker),
        (Some(suffix), _) => Classification::Invalid(InvalidReason::MissingRoleMarker(suffix)),
        (None, Some(marker)) => Classification::Invalid(InvalidReason::MissingSuffix(marker)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_server_and_client() {
        assert_eq!(
            classify("PingServerRpc", Some(&RpcAttribute::server())),
            Classification::Valid(Role::Server)
        );
        assert_eq!(
            classify("PongClientRpc", Some(&RpcAttribute::client())),
            Classification::Valid(Role::Client)
        );
    }

    #[test]
    fn test_ordinary_method_skipped() {
        assert_eq!(classify("Update", None), Classification::NotAProcedure);
        assert_eq!(classify("", None), Classification::NotAProcedure);
    }

    #[test]
    fn test_marker_without_suffix() {
        assert_eq!(
            classify("Foo", Some(&RpcAttribute::server())),
            Classification::Invalid(InvalidReason::MissingSuffix(Role::Server))
        );
        assert_eq!(
            classify("NoSuffix", Some(&RpcAttribute::client())),
            Classification::Invalid(InvalidReason::MissingSuffix(Role::Client))
        );
    }

    #[test]
    fn test_suffix_without_marker() {
        assert_eq!(
            classify("FooServerRpc", None),
            Classification::Invalid(InvalidReason::MissingRoleMarker(Role::Server))
        );
        assert_eq!(
            classify("FooClientRpc", None),
            Classification::Invalid(InvalidReason::MissingRoleMarker(Role::Client))
        );
    }

    #[test]
    fn test_wrong_marker_for_suffix() {
        assert_eq!(
            classify("WrongSuffixServerRpc", Some(&RpcAttribute::client())),
            Classification::Invalid(InvalidReason::MissingRoleMarker(Role::Server))
        );
        assert_eq!(
            classify("WrongSuffixClientRpc", Some(&RpcAttribute::server())),
            Classification::Invalid(InvalidReason::MissingRoleMarker(Role::Client))
        );
    }

    #[test]
    fn test_attribute_helpers() {
        let attr = RpcAttribute::server()
            .require_ownership(false)
            .delivery(DeliveryMode::Unreliable);
        assert_eq!(attr.role(), Role::Server);
        assert!(!attr.requires_ownership());
        assert_eq!(attr.delivery_mode(), DeliveryMode::Unreliable);

        let client = RpcAttribute::client().require_ownership(true);
        assert!(!client.requires_ownership());
        assert_eq!(client.delivery_mode(), DeliveryMode::Reliable);
    }

    #[test]
    fn test_reason_display() {
        let msg = InvalidReason::MissingSuffix(Role::Server).to_string();
        assert!(msg.contains("ServerRpc"));
    }
}
