use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::post::{Club, Member, Notification, Post};
use crate::service::{PortalError, PortalService, Result, RsvpOutcome};

/// RSVP row as written to `rsvps.data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RsvpRecord {
    pub id: Uuid,
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

/// A directory of JSON-lines files standing in for the hosted document
/// database.
#[derive(Debug)]
pub struct FileService {
    pub data_dir: PathBuf,
    pub clubs_path: PathBuf,
    pub posts_path: PathBuf,
    pub notifications_path: PathBuf,
    pub members_path: PathBuf,
    pub rsvps_path: PathBuf,
    // Serialises read-modify-write cycles on the files.
    write_lock: Mutex<()>,
}

impl FileService {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let clubs_path = data_dir.join("clubs.data");
        let posts_path = data_dir.join("posts.data");
        let notifications_path = data_dir.join("notifications.data");
        let members_path = data_dir.join("members.data");
        let rsvps_path = data_dir.join("rsvps.data");

        for path in [
            &clubs_path,
            &posts_path,
            &notifications_path,
            &members_path,
            &rsvps_path,
        ] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(data_dir = %data_dir.display(), "opened portal datastore");

        Ok(Self {
            data_dir,
            clubs_path,
            posts_path,
            notifications_path,
            members_path,
            rsvps_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn load_clubs(&self) -> anyhow::Result<Vec<Club>> {
        load_jsonl(&self.clubs_path).context("failed to load clubs.data")
    }

    pub fn load_posts(&self) -> anyhow::Result<Vec<Post>> {
        load_jsonl(&self.posts_path).context("failed to load posts.data")
    }

    pub fn load_notifications(&self) -> anyhow::Result<Vec<Notification>> {
        load_jsonl(&self.notifications_path).context("failed to load notifications.data")
    }

    pub fn load_members(&self) -> anyhow::Result<Vec<Member>> {
        load_jsonl(&self.members_path).context("failed to load members.data")
    }

    pub fn load_rsvps(&self) -> anyhow::Result<Vec<RsvpRecord>> {
        load_jsonl(&self.rsvps_path).context("failed to load rsvps.data")
    }

    pub fn save_clubs(&self, clubs: &[Club]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.clubs_path, clubs).context("failed to save clubs.data")
    }

    pub fn save_posts(&self, posts: &[Post]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.posts_path, posts).context("failed to save posts.data")
    }

    pub fn save_notifications(&self, notifications: &[Notification]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.notifications_path, notifications)
            .context("failed to save notifications.data")
    }

    pub fn save_members(&self, members: &[Member]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.members_path, members).context("failed to save members.data")
    }

    fn save_rsvps(&self, rsvps: &[RsvpRecord]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.rsvps_path, rsvps).context("failed to save rsvps.data")
    }

    #[instrument(skip(self, name, email))]
    fn record_rsvp(&self, event_id: &str, name: &str, email: &str) -> anyhow::Result<RsvpOutcome> {
        let _guard = self.write_lock.lock();

        let previous_posts = self.load_posts()?;
        let mut posts = previous_posts.clone();
        let Some(post) = posts.iter_mut().find(|post| post.id() == event_id) else {
            return Ok(RsvpOutcome::rejected(format!("Event {event_id} was not found.")));
        };
        let Post::Event(event) = post else {
            return Ok(RsvpOutcome::rejected("Only events accept RSVPs."));
        };

        let mut rsvps = self.load_rsvps()?;
        let duplicate = rsvps
            .iter()
            .any(|r| r.event_id == event_id && r.email.eq_ignore_ascii_case(email));
        if duplicate {
            debug!(event_id, "duplicate rsvp");
            return Ok(RsvpOutcome::rejected(
                "You have already RSVP'd to this event.",
            ));
        }

        rsvps.push(RsvpRecord {
            id: Uuid::new_v4(),
            event_id: event_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: Utc::now().to_rfc3339(),
        });
        event.attendees = event.attendees.saturating_add(1);
        let attendees = event.attendees;

        self.commit_rsvp(&previous_posts, &posts, &rsvps)?;
        info!(event_id, attendees, "recorded rsvp");
        Ok(RsvpOutcome::accepted())
    }

    /// Writes the bumped attendee count, then the RSVP rows. If the RSVP
    /// write fails the previous posts are put back.
    fn commit_rsvp(
        &self,
        previous_posts: &[Post],
        posts: &[Post],
        rsvps: &[RsvpRecord],
    ) -> anyhow::Result<()> {
        self.save_posts(posts)?;

        if let Err(err) = self.save_rsvps(rsvps) {
            warn!(error = %err, "rsvp write failed; restoring attendee counts");
            if let Err(restore_err) = self.save_posts(previous_posts) {
                error!(error = %restore_err, "failed to restore posts.data");
            }
            return Err(err);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn recount_members(&self, club_id: &str) -> anyhow::Result<u32> {
        let _guard = self.write_lock.lock();

        let count = self
            .load_members()?
            .iter()
            .filter(|member| member.club_id == club_id)
            .count();
        let count = u32::try_from(count).map_err(|_| anyhow!("member count overflow"))?;

        let mut clubs = self.load_clubs()?;
        let club = clubs
            .iter_mut()
            .find(|club| club.id == club_id)
            .ok_or_else(|| PortalError::NotFound(format!("club {club_id}")))?;
        club.member_count = count;
        self.save_clubs(&clubs)?;

        debug!(club_id, count, "synced member count");
        Ok(count)
    }
}

#[async_trait]
impl PortalService for FileService {
    async fn get_clubs(&self) -> Result<Vec<Club>> {
        self.load_clubs().map_err(into_portal_error)
    }

    async fn get_posts(&self) -> Result<Vec<Post>> {
        self.load_posts().map_err(into_portal_error)
    }

    async fn get_notifications(&self) -> Result<Vec<Notification>> {
        self.load_notifications().map_err(into_portal_error)
    }

    async fn get_club_members(&self, club_id: &str) -> Result<Vec<Member>> {
        Ok(self
            .load_members()
            .map_err(into_portal_error)?
            .into_iter()
            .filter(|member| member.club_id == club_id)
            .collect())
    }

    async fn sync_club_member_count(&self, club_id: &str) -> Result<u32> {
        self.recount_members(club_id).map_err(into_portal_error)
    }

    async fn create_event_rsvp(
        &self,
        event_id: &str,
        name: &str,
        email: &str,
    ) -> Result<RsvpOutcome> {
        self.record_rsvp(event_id, name, email)
            .map_err(into_portal_error)
    }
}

/// Recovers a typed error raised under an `anyhow` context chain. Failed
/// file access means the store is unavailable.
fn into_portal_error(err: anyhow::Error) -> PortalError {
    match err.downcast::<PortalError>() {
        Ok(portal) => portal,
        Err(other) if other.downcast_ref::<io::Error>().is_some() => {
            PortalError::Unavailable(format!("{other:#}"))
        }
        Err(other) => PortalError::Other(other),
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed).map_err(|err| {
            PortalError::Malformed(format!("{} line {}: {err}", path.display(), idx + 1))
        })?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to persist {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{FileService, RsvpRecord};
    use crate::post::{EventPost, Post, PostBase, events};
    use crate::service::{PortalError, PortalService};

    fn meetup(attendees: u32) -> Post {
        Post::Event(EventPost {
            base: PostBase {
                id: "e1".to_string(),
                title: "Hack night".to_string(),
                description: String::new(),
                club_id: "acm".to_string(),
                club_name: "ACM".to_string(),
                date: "2025-01-10".to_string(),
                created_at: None,
            },
            time: None,
            location: None,
            registration_link: None,
            registration_end: None,
            registration_end_time: None,
            attendees,
        })
    }

    fn attendees(service: &FileService) -> Option<u32> {
        let posts = service.load_posts().expect("load posts");
        events(&posts).first().map(|event| event.attendees)
    }

    #[tokio::test]
    async fn failed_rsvp_write_restores_count_and_allows_retry() {
        let temp = tempdir().expect("tempdir");
        let mut service = FileService::open(temp.path()).expect("open datastore");
        service.save_posts(&[meetup(0)]).expect("save posts");

        let record = RsvpRecord {
            id: uuid::Uuid::new_v4(),
            event_id: "e1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.edu".to_string(),
            created_at: "2025-01-08T09:00:00Z".to_string(),
        };
        let rsvps_path = service.rsvps_path.clone();
        service.rsvps_path = temp.path().join("missing").join("rsvps.data");

        let result = service.commit_rsvp(&[meetup(0)], &[meetup(1)], &[record]);
        assert!(result.is_err());
        assert_eq!(attendees(&service), Some(0));

        service.rsvps_path = rsvps_path;
        assert!(service.load_rsvps().expect("load rsvps").is_empty());

        let outcome = service
            .create_event_rsvp("e1", "Ada", "ada@example.edu")
            .await
            .expect("store reachable");
        assert!(outcome.success);
        assert_eq!(attendees(&service), Some(1));
        assert_eq!(service.load_rsvps().expect("load rsvps").len(), 1);
    }

    #[tokio::test]
    async fn unreadable_file_is_unavailable() {
        let temp = tempdir().expect("tempdir");
        let mut service = FileService::open(temp.path()).expect("open datastore");
        service.posts_path = temp.path().join("gone").join("posts.data");

        assert!(matches!(
            service.get_posts().await,
            Err(PortalError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_line_surfaces_as_malformed() {
        let temp = tempdir().expect("tempdir");
        let service = FileService::open(temp.path()).expect("open datastore");
        fs::write(&service.clubs_path, "{\"id\":\"acm\",\"name\":\"ACM\"}\nnot json\n")
            .expect("write clubs");

        match service.get_clubs().await {
            Err(PortalError::Malformed(detail)) => assert!(detail.contains("line 2")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sync_for_unknown_club_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let service = FileService::open(temp.path()).expect("open datastore");

        assert!(matches!(
            service.sync_club_member_count("ghost").await,
            Err(PortalError::NotFound(_))
        ));
    }

    #[test]
    fn open_creates_empty_collections() {
        let temp = tempdir().expect("tempdir");
        let service = FileService::open(temp.path()).expect("open datastore");

        assert!(service.rsvps_path.exists());
        assert!(service.load_posts().expect("load posts").is_empty());
        assert!(service.load_rsvps().expect("load rsvps").is_empty());
    }
}
