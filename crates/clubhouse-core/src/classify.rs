use chrono::{
  NaiveDate,
  NaiveDateTime
};
use serde::Serialize;
use tracing::trace;

use crate::datetime::{
  TimeSpan,
  event_start,
  parse_event_date,
  parse_time_span,
  registration_deadline
};
use crate::post::EventPost;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
  Upcoming,
  Past
}

impl EventStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      | EventStatus::Upcoming => {
        "upcoming"
      }
      | EventStatus::Past => "past"
    }
  }
}

/// An event dated before today is past;
/// one dated today stays upcoming until
/// local midnight. A missing date never
/// compares as earlier, so it stays
/// upcoming.
#[must_use]
pub fn classify(
  date: Option<NaiveDate>,
  now: NaiveDateTime
) -> EventStatus {
  match date {
    | Some(date) if date < now.date() => {
      EventStatus::Past
    }
    | _ => EventStatus::Upcoming
  }
}

#[must_use]
pub fn classify_event(
  event: &EventPost,
  now: NaiveDateTime
) -> EventStatus {
  classify(
    event.base.parsed_date(),
    now
  )
}

/// Whether the registration window is
/// still open at `now`.
///
/// Only the closing cutoff is checked;
/// whether the event has a registration
/// link at all is the caller's concern.
#[must_use]
pub fn registration_open(
  event: &EventPost,
  now: NaiveDateTime
) -> bool {
  let Some(raw_end) =
    event.registration_end.as_deref()
  else {
    return true;
  };

  let Some(end_date) =
    parse_event_date(raw_end)
  else {
    trace!(
      id = %event.base.id,
      registration_end = %raw_end,
      "unreadable registration end; leaving open"
    );
    return true;
  };

  let deadline = registration_deadline(
    end_date,
    event
      .registration_end_time
      .as_deref()
  );
  now < deadline
}

/// Link present and window open.
#[must_use]
pub fn shows_registration_cta(
  event: &EventPost,
  now: NaiveDateTime
) -> bool {
  event
    .registration_link
    .as_deref()
    .is_some_and(|link| {
      !link.trim().is_empty()
    })
    && registration_open(event, now)
}

/// Render-ready projection of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent<'a> {
  #[serde(flatten)]
  pub event:             &'a EventPost,
  pub status:            EventStatus,
  #[serde(skip)]
  pub attendees:         u32,
  #[serde(skip)]
  pub date:              Option<NaiveDate>,
  #[serde(skip)]
  pub span:              TimeSpan,
  pub registration_open: bool,
  pub show_registration: bool
}

impl<'a> DisplayEvent<'a> {
  #[must_use]
  pub fn project(
    event: &'a EventPost,
    now: NaiveDateTime
  ) -> Self {
    let date = event.base.parsed_date();
    Self {
      event,
      status: classify(date, now),
      attendees: event.attendees,
      date,
      span: parse_time_span(
        event.time.as_deref()
      ),
      registration_open:
        registration_open(event, now),
      show_registration:
        shows_registration_cta(
          event, now
        )
    }
  }

  /// Full start date-time, used for
  /// chronological ordering.
  #[must_use]
  pub fn starts_at(
    &self
  ) -> Option<NaiveDateTime> {
    self.date.map(|date| {
      event_start(
        date,
        self.event.time.as_deref()
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDateTime;

  use super::{
    DisplayEvent,
    EventStatus,
    classify_event,
    registration_open,
    shows_registration_cta
  };
  use crate::post::{
    EventPost,
    PostBase
  };

  fn at(
    raw: &str
  ) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(
      raw,
      "%Y-%m-%dT%H:%M:%S%.f"
    )
    .expect("valid datetime")
  }

  fn event(date: &str) -> EventPost {
    EventPost {
      base: PostBase {
        id:          "e1".to_string(),
        title:       "Robotics demo"
          .to_string(),
        description: String::new(),
        club_id:     "c1".to_string(),
        club_name:   "Robotics"
          .to_string(),
        date:        date.to_string(),
        created_at:  None
      },
      time: None,
      location: None,
      registration_link: None,
      registration_end: None,
      registration_end_time: None,
      attendees: 0
    }
  }

  #[test]
  fn earlier_date_is_past() {
    assert_eq!(
      classify_event(
        &event("2025-01-09"),
        at("2025-01-10T08:00:00")
      ),
      EventStatus::Past
    );
  }

  #[test]
  fn today_is_upcoming_until_midnight() {
    let today = event("2025-01-10");
    assert_eq!(
      classify_event(
        &today,
        at("2025-01-10T23:59:59.999")
      ),
      EventStatus::Upcoming
    );
    assert_eq!(
      classify_event(
        &today,
        at("2025-01-11T00:00:00")
      ),
      EventStatus::Past
    );
  }

  #[test]
  fn malformed_date_stays_upcoming() {
    assert_eq!(
      classify_event(
        &event("not a date"),
        at("2030-01-01T00:00:00")
      ),
      EventStatus::Upcoming
    );
  }

  #[test]
  fn open_without_registration_end() {
    let ev = event("2025-01-10");
    for now in [
      "1999-01-01T00:00:00",
      "2025-01-10T12:00:00",
      "2099-12-31T23:59:59"
    ] {
      assert!(registration_open(
        &ev,
        at(now)
      ));
    }
  }

  #[test]
  fn closes_at_end_time() {
    let mut ev = event("2025-01-12");
    ev.registration_end =
      Some("2025-01-10".to_string());
    ev.registration_end_time =
      Some("5:00 PM".to_string());

    assert!(registration_open(
      &ev,
      at("2025-01-10T16:59:59")
    ));
    assert!(!registration_open(
      &ev,
      at("2025-01-10T17:00:00")
    ));
  }

  #[test]
  fn closes_at_end_of_day_without_time()
  {
    let mut ev = event("2025-01-12");
    ev.registration_end =
      Some("2025-01-10".to_string());

    assert!(registration_open(
      &ev,
      at("2025-01-10T23:59:59.998")
    ));
    assert!(!registration_open(
      &ev,
      at("2025-01-10T23:59:59.999")
    ));
  }

  #[test]
  fn cta_needs_link_and_open_window() {
    let mut ev = event("2025-01-12");
    let now = at("2025-01-10T12:00:00");
    assert!(!shows_registration_cta(
      &ev, now
    ));

    ev.registration_link = Some(
      "https://forms.example.edu/r"
        .to_string()
    );
    assert!(shows_registration_cta(
      &ev, now
    ));

    ev.registration_end =
      Some("2025-01-09".to_string());
    assert!(!shows_registration_cta(
      &ev, now
    ));
  }

  #[test]
  fn projection_carries_status_and_span()
  {
    let mut ev = event("2025-01-12");
    ev.time = Some(
      "2:00 PM - 5:00 PM".to_string()
    );
    ev.attendees = 7;

    let display = DisplayEvent::project(
      &ev,
      at("2025-01-10T12:00:00")
    );
    assert_eq!(
      display.status,
      EventStatus::Upcoming
    );
    assert_eq!(display.attendees, 7);
    assert_eq!(
      display.span.start_minutes,
      840
    );
    assert_eq!(
      display.starts_at(),
      Some(at("2025-01-12T14:00:00"))
    );
    assert!(display.registration_open);
    assert!(!display.show_registration);
  }
}
