use chrono::{
  Days,
  NaiveDateTime,
  TimeDelta
};
use urlencoding::encode;

use crate::datetime::{
  parse_time_span,
  start_of_day
};
use crate::post::EventPost;

const CALENDAR_TEMPLATE_URL: &str =
  "https://calendar.google.com/calendar/render?action=TEMPLATE";

const TIMED_FORMAT: &str =
  "%Y%m%dT%H%M%S";
const ALL_DAY_FORMAT: &str = "%Y%m%d";

/// `dates` parameter: a timed range from
/// the parsed span, or an all-day range
/// ending the day after.
fn calendar_dates(
  event: &EventPost
) -> Option<String> {
  let date = event.base.parsed_date()?;

  let timed = event
    .time
    .as_deref()
    .map(str::trim)
    .filter(|time| !time.is_empty());

  match timed {
    | Some(time) => {
      let span =
        parse_time_span(Some(time));
      let midnight = start_of_day(date);
      let start: NaiveDateTime = midnight
        + TimeDelta::minutes(i64::from(
          span.start_minutes
        ));
      let end: NaiveDateTime = midnight
        + TimeDelta::minutes(i64::from(
          span.end_minutes
        ));
      Some(format!(
        "{}/{}",
        start.format(TIMED_FORMAT),
        end.format(TIMED_FORMAT)
      ))
    }
    | None => {
      let next_day = date
        .checked_add_days(Days::new(1))?;
      Some(format!(
        "{}/{}",
        date.format(ALL_DAY_FORMAT),
        next_day.format(ALL_DAY_FORMAT)
      ))
    }
  }
}

fn calendar_details(
  event: &EventPost
) -> String {
  let description =
    event.base.description.trim();
  let club = event.base.club_name.trim();

  match (description.is_empty(), club.is_empty()) {
    | (true, true) => String::new(),
    | (true, false) => {
      format!("Hosted by {club}")
    }
    | (false, true) => {
      description.to_string()
    }
    | (false, false) => {
      format!(
        "{description}\n\nHosted by \
         {club}"
      )
    }
  }
}

/// Add-to-calendar link for an event.
/// `None` when the event date cannot be
/// read.
#[must_use]
pub fn google_calendar_url(
  event: &EventPost
) -> Option<String> {
  let dates = calendar_dates(event)?;
  let details = calendar_details(event);
  let location = event
    .location
    .as_deref()
    .unwrap_or_default();

  Some(format!(
    "{CALENDAR_TEMPLATE_URL}&text={}&dates={}&details={}&location={}",
    encode(&event.base.title),
    encode(&dates),
    encode(&details),
    encode(location)
  ))
}
