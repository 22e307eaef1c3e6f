use std::sync::Weak;

use async_trait::async_trait;
use recovery::SessionRecovery;

use crate::manager::{CommunicationManager, Inner};

/// Re-join hook handed to the recovery coordinator. Holds the manager
/// weakly since the coordinator is owned by it.
pub(crate) struct Rejoiner {
    inner: Weak<Inner>,
}

impl Rejoiner {
    pub(crate) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SessionRecovery for Rejoiner {
    async fn rejoin(&self) -> anyhow::Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            anyhow::bail!("communication manager dropped");
        };
        CommunicationManager::from_inner(inner).rejoin().await
    }
}
