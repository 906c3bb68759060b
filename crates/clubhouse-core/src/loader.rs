use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::post::{Club, Member, Notification, Post};
use crate::service::{PortalService, Result};

/// Everything a view needs at mount time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortalSnapshot {
    pub clubs: Vec<Club>,
    pub posts: Vec<Post>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClubRoster {
    pub members: Vec<Member>,
    pub member_count: u32,
}

fn or_empty<T>(what: &str, result: Result<Vec<T>>) -> Vec<T> {
    match result {
        Ok(items) => {
            debug!(what, count = items.len(), "fetched collection");
            items
        }
        Err(err) => {
            error!(what, error = %err, "fetch failed; rendering empty collection");
            Vec::new()
        }
    }
}

/// Issues the three mount-time fetches together. A failed fetch is logged
/// and yields an empty collection; the others are unaffected.
#[instrument(skip(service))]
pub async fn load_snapshot<S>(service: &S) -> PortalSnapshot
where
    S: PortalService + ?Sized,
{
    let (clubs, posts, notifications) = tokio::join!(
        service.get_clubs(),
        service.get_posts(),
        service.get_notifications()
    );

    PortalSnapshot {
        clubs: or_empty("clubs", clubs),
        posts: or_empty("posts", posts),
        notifications: or_empty("notifications", notifications),
    }
}

/// Member list plus a freshly synced count. If the sync fails the count
/// falls back to the size of the fetched list.
#[instrument(skip(service))]
pub async fn load_club_roster<S>(service: &S, club_id: &str) -> ClubRoster
where
    S: PortalService + ?Sized,
{
    let (members, synced) = tokio::join!(
        service.get_club_members(club_id),
        service.sync_club_member_count(club_id)
    );
    let members = or_empty("members", members);

    let member_count = match synced {
        Ok(count) => count,
        Err(err) => {
            error!(club_id, error = %err, "member count sync failed");
            u32::try_from(members.len()).unwrap_or(u32::MAX)
        }
    };

    ClubRoster {
        members,
        member_count,
    }
}
