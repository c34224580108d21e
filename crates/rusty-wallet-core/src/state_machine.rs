use serde::{Deserialize, Serialize};

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Begin,
    Commit,
    Fail,
    Disconnect,
    ProviderConnected,
    ProviderDisconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
    pub reason: &'static str,
}

pub fn connection_transition(
    from: ConnectionStatus,
    action: ConnectionAction,
) -> Result<(ConnectionStatus, StateTransition), PortError> {
    use ConnectionAction as A;
    use ConnectionStatus as S;

    let (to, reason) = match (from, action) {
        (_, A::Begin) => (S::Connecting, "connect_started"),
        (S::Connecting, A::Commit) => (S::Connected, "handshake_completed"),
        (S::Connecting, A::Fail) => (S::Disconnected, "handshake_failed"),
        (_, A::Disconnect) => (S::Disconnected, "disconnect_requested"),
        (S::Disconnected | S::Connected, A::ProviderConnected) => {
            (S::Connected, "provider_connect_event")
        }
        (S::Connecting, A::ProviderConnected) => (S::Connecting, "provider_connect_deferred"),
        (_, A::ProviderDisconnected) => (S::Disconnected, "provider_disconnect_event"),
        _ => {
            return Err(PortError::Validation(format!(
                "illegal connection transition: {from:?} via {action:?}"
            )))
        }
    };

    Ok((to, StateTransition { from, to, reason }))
}
