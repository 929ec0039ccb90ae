mod calendly;

pub use calendly::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("scheduling API rejected the token")]
    Unauthorized,

    #[error("scheduling API error: {0}")]
    Api(String),

    #[error("unexpected scheduling API response: {0}")]
    Decode(String),
}

/// External scheduling service: single-use booking links and event cancellation.
#[async_trait]
pub trait SchedulingApi: Send + Sync {
    /// Create a link that can book exactly one event of `owner`'s event type.
    async fn create_single_use_link(
        &self,
        owner: &str,
        token: &str,
    ) -> Result<String, SchedulingError>;

    /// Cancel a scheduled event by URI or uuid.
    async fn cancel_event(
        &self,
        event: &str,
        token: &str,
        reason: &str,
    ) -> Result<(), SchedulingError>;
}

/// Best-effort link provisioning for a paid class.
///
/// Returns `None` when the teacher has no scheduling credentials or the
/// remote call fails; neither affects the purchase.
pub async fn provision_link(
    api: &dyn SchedulingApi,
    owner: Option<&str>,
    token: Option<&str>,
) -> Option<String> {
    let (Some(owner), Some(token)) = (
        owner.filter(|o| !o.trim().is_empty()),
        token.filter(|t| !t.trim().is_empty()),
    ) else {
        tracing::warn!("Skipping scheduling link: teacher has no scheduling credentials");
        return None;
    };

    match api.create_single_use_link(owner, token).await {
        Ok(link) => Some(link),
        Err(e) => {
            tracing::warn!("Failed to create scheduling link: {}", e);
            None
        }
    }
}
