//! Port to the managed document database that owns clubs, posts,
//! notifications and RSVPs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::post::{Club, Member, Notification, Post};

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PortalError>;

/// Reply to an RSVP submission. `success: false` carries the reason in
/// `error` when the service supplies one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RsvpOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl RsvpOutcome {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait PortalService: Send + Sync {
    async fn get_clubs(&self) -> Result<Vec<Club>>;

    /// Events and announcements together; callers split by kind.
    async fn get_posts(&self) -> Result<Vec<Post>>;

    async fn get_notifications(&self) -> Result<Vec<Notification>>;

    async fn get_club_members(&self, club_id: &str) -> Result<Vec<Member>>;

    /// Recounts a club's members and stores the count on the club.
    async fn sync_club_member_count(&self, club_id: &str) -> Result<u32>;

    async fn create_event_rsvp(
        &self,
        event_id: &str,
        name: &str,
        email: &str,
    ) -> Result<RsvpOutcome>;
}
