use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::parse_event_date;

/// Fields shared by every post regardless of kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostBase {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub club_id: String,

    #[serde(default)]
    pub club_name: String,

    /// Calendar date as supplied, `YYYY-MM-DD`.
    pub date: String,

    #[serde(default)]
    pub created_at: Option<String>,
}

impl PostBase {
    /// `None` when the stored date is not a calendar date.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_event_date(&self.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventPost {
    #[serde(flatten)]
    pub base: PostBase,

    /// `"H:MM AM - H:MM PM"`; absent means all-day.
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub registration_link: Option<String>,

    #[serde(default)]
    pub registration_end: Option<String>,

    #[serde(default)]
    pub registration_end_time: Option<String>,

    #[serde(default)]
    pub attendees: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementPost {
    #[serde(flatten)]
    pub base: PostBase,

    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Post {
    Event(EventPost),
    Announcement(AnnouncementPost),
}

impl Post {
    pub fn base(&self) -> &PostBase {
        match self {
            Post::Event(event) => &event.base,
            Post::Announcement(announcement) => &announcement.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn as_event(&self) -> Option<&EventPost> {
        match self {
            Post::Event(event) => Some(event),
            Post::Announcement(_) => None,
        }
    }

    pub fn as_announcement(&self) -> Option<&AnnouncementPost> {
        match self {
            Post::Announcement(announcement) => Some(announcement),
            Post::Event(_) => None,
        }
    }
}

/// Splits a mixed post feed into its events, preserving order.
pub fn events(posts: &[Post]) -> Vec<&EventPost> {
    posts.iter().filter_map(Post::as_event).collect()
}

pub fn announcements(posts: &[Post]) -> Vec<&AnnouncementPost> {
    posts.iter().filter_map(Post::as_announcement).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub member_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,

    pub club_id: String,

    pub name: String,

    pub email: String,

    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub club_name: Option<String>,

    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::{Post, events};

    #[test]
    fn post_kind_comes_from_type_tag() {
        let raw = r#"[
            {"type":"event","id":"e1","title":"Hack Night","clubName":"ACM",
             "date":"2025-01-10","time":"6:00 PM - 9:00 PM","attendees":12},
            {"type":"announcement","id":"a1","title":"Elections","clubName":"ACM",
             "date":"2025-01-02","link":"https://example.edu/vote"}
        ]"#;
        let posts: Vec<Post> = serde_json::from_str(raw).expect("parse posts");

        assert_eq!(posts.len(), 2);
        let event = posts[0].as_event().expect("first post is an event");
        assert_eq!(event.time.as_deref(), Some("6:00 PM - 9:00 PM"));
        assert_eq!(event.attendees, 12);
        assert!(posts[1].as_event().is_none());
        assert_eq!(
            posts[1].as_announcement().and_then(|a| a.link.as_deref()),
            Some("https://example.edu/vote")
        );
        assert_eq!(events(&posts).len(), 1);
    }

    #[test]
    fn malformed_date_has_no_parsed_date() {
        let raw = r#"{"type":"event","id":"e2","title":"TBA","date":"soon"}"#;
        let post: Post = serde_json::from_str(raw).expect("parse post");
        assert!(post.base().parsed_date().is_none());
        assert_eq!(post.id(), "e2");
    }
}
