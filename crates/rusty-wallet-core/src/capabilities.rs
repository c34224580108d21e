use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::Asset;
use crate::ports::{EventEmitter, ProviderHandle, WalletRequests};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    Basic,
    EventEmitting,
    RequestCapable,
    EventEmittingAndRequestCapable,
}

impl ProviderKind {
    pub fn classify(handle: &dyn ProviderHandle) -> Self {
        match (
            handle.event_emitter().is_some(),
            handle.wallet_requests().is_some(),
        ) {
            (false, false) => Self::Basic,
            (true, false) => Self::EventEmitting,
            (false, true) => Self::RequestCapable,
            (true, true) => Self::EventEmittingAndRequestCapable,
        }
    }

    pub fn emits_events(self) -> bool {
        matches!(self, Self::EventEmitting | Self::EventEmittingAndRequestCapable)
    }

    pub fn accepts_requests(self) -> bool {
        matches!(self, Self::RequestCapable | Self::EventEmittingAndRequestCapable)
    }
}

/// A resolved provider tagged with the capabilities it had at resolution time.
#[derive(Clone)]
pub struct Provider {
    handle: Arc<dyn ProviderHandle>,
    kind: ProviderKind,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("label", &self.handle.label())
            .field("kind", &self.kind)
            .finish()
    }
}

impl Provider {
    pub fn new(handle: Arc<dyn ProviderHandle>) -> Self {
        let kind = ProviderKind::classify(handle.as_ref());
        Self { handle, kind }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        self.handle.label()
    }

    pub fn handle(&self) -> &Arc<dyn ProviderHandle> {
        &self.handle
    }

    pub fn event_emitter(&self) -> Option<&dyn EventEmitter> {
        if self.kind.emits_events() {
            self.handle.event_emitter()
        } else {
            None
        }
    }

    pub fn wallet_requests(&self) -> Option<&dyn WalletRequests> {
        if self.kind.accepts_requests() {
            self.handle.wallet_requests()
        } else {
            None
        }
    }
}

pub fn is_event_emitting_provider(provider: &Provider) -> bool {
    provider.kind().emits_events()
}

pub fn is_request_capable(provider: &Provider) -> bool {
    provider.kind().accepts_requests()
}

pub fn is_token(asset: &Asset) -> bool {
    matches!(asset, Asset::Erc20(_))
}
