//! Ordered group of acquired resources with a single release operation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ParleyError, ReleaseFailure};

/// Something acquired during connect that must be given back on close.
#[async_trait]
pub trait Releasable: Send + Sync {
    /// Label used when reporting release failures.
    fn label(&self) -> &str;

    async fn release(&self) -> Result<(), ParleyError>;
}

/// Tracks acquired handles in acquisition order.
///
/// [`ResourceGroup::release_all`] walks the handles newest-first and keeps
/// going past failures, reporting every one of them at the end.
#[derive(Default)]
pub struct ResourceGroup {
    handles: Vec<Arc<dyn Releasable>>,
}

impl ResourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, handle: Arc<dyn Releasable>) {
        debug!(resource = handle.label(), "tracking resource");
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release everything tracked, in reverse acquisition order.
    ///
    /// The group is empty afterwards regardless of outcome.
    pub async fn release_all(&mut self) -> Result<(), ParleyError> {
        let mut failures = Vec::new();
        while let Some(handle) = self.handles.pop() {
            if let Err(e) = handle.release().await {
                warn!(resource = handle.label(), error = %e, "failed to release resource");
                failures.push(ReleaseFailure {
                    resource: handle.label().to_string(),
                    message: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ParleyError::Release { failures })
        }
    }
}

impl std::fmt::Debug for ResourceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handles.iter().map(|h| h.label()))
            .finish()
    }
}
