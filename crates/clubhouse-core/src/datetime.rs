use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Days,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeDelta,
  Utc
};
use chrono_tz::Tz;
use regex::{
  Captures,
  Regex
};
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "clubhouse-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "CLUBHOUSE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "CLUBHOUSE_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "America/New_York";

/// Start used when an event carries no
/// readable clock time (9:00 AM).
pub const DEFAULT_START_MINUTES: u32 =
  9 * 60;
/// Length assumed when only a start
/// time is given.
pub const DEFAULT_SPAN_MINUTES: u32 =
  120;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Start and end of an event, in minutes
/// since local midnight.
///
/// `end_minutes` may run past 1440 when
/// the defaulted span crosses midnight.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct TimeSpan {
  pub start_minutes: u32,
  pub end_minutes:   u32
}

/// Inclusive wall-clock interval.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DateRange {
  pub start: NaiveDateTime,
  pub end:   NaiveDateTime
}

impl DateRange {
  #[must_use]
  pub fn contains(
    &self,
    at: NaiveDateTime
  ) -> bool {
    self.start <= at && at <= self.end
  }
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Wall-clock time in the project
/// timezone. Every classifier and filter
/// works on this naive local value.
#[must_use]
pub fn local_now(
  now: DateTime<Utc>
) -> NaiveDateTime {
  now
    .with_timezone(project_timezone())
    .naive_local()
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn clock_regex() -> Option<&'static Regex>
{
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>am|pm)\b",
      )
      .map_err(|err| {
        tracing::error!(
          error = %err,
          "internal clock regex compile failure"
        );
      })
      .ok()
    })
    .as_ref()
}

/// Reads the first `H:MM AM|PM` clock
/// time in `text` as minutes since
/// midnight.
#[must_use]
pub fn parse_clock_minutes(
  text: &str
) -> Option<u32> {
  let captures =
    clock_regex()?.captures(text)?;
  clock_minutes(&captures)
}

fn clock_minutes(
  captures: &Captures<'_>
) -> Option<u32> {
  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if raw_hour == 0
    || raw_hour > 12
    || minute > 59
  {
    return None;
  }

  let ampm = captures
    .name("ampm")?
    .as_str()
    .to_ascii_lowercase();
  let hour = match ampm.as_str() {
    | "pm" if raw_hour != 12 => {
      raw_hour + 12
    }
    | "am" if raw_hour == 12 => 0,
    | _ => raw_hour
  };

  Some(hour * 60 + minute)
}

/// Parses an event's free-text time span.
///
/// The first clock time in the text is
/// the start and the next one the end;
/// any other wording around them is
/// ignored. Never fails: an unreadable
/// start falls back to 9:00 AM and a
/// missing or unreadable end to two hours
/// after the start.
#[tracing::instrument(level = "trace")]
#[must_use]
pub fn parse_time_span(
  time: Option<&str>
) -> TimeSpan {
  let text = time.unwrap_or_default();
  let (start, end) = match clock_regex()
  {
    | Some(re) => {
      let mut clocks = re
        .captures_iter(text)
        .map(|captures| {
          clock_minutes(&captures)
        });
      (
        clocks.next().flatten(),
        clocks.next().flatten()
      )
    }
    | None => (None, None)
  };

  let start_minutes =
    start.unwrap_or(DEFAULT_START_MINUTES);
  let end_minutes = end.unwrap_or(
    start_minutes + DEFAULT_SPAN_MINUTES
  );

  TimeSpan {
    start_minutes,
    end_minutes
  }
}

fn end_of_day_time() -> NaiveTime {
  NaiveTime::from_hms_milli_opt(
    23, 59, 59, 999
  )
  .unwrap_or(NaiveTime::MIN)
}

#[must_use]
pub fn start_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

#[must_use]
pub fn end_of_day(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(end_of_day_time())
}

/// Instant at which a registration window
/// closes. Registration is closed once
/// `now >= deadline`.
#[must_use]
pub fn registration_deadline(
  end_date: NaiveDate,
  end_time: Option<&str>
) -> NaiveDateTime {
  match end_time
    .and_then(parse_clock_minutes)
  {
    | Some(minutes) => {
      start_of_day(end_date)
        + TimeDelta::minutes(i64::from(
          minutes
        ))
    }
    | None => end_of_day(end_date)
  }
}

#[must_use]
pub fn day_range(
  date: NaiveDate
) -> DateRange {
  DateRange {
    start: start_of_day(date),
    end:   end_of_day(date)
  }
}

/// Today through the coming Saturday.
///
/// The lower bound is today, not the
/// previous Sunday, so the window shrinks
/// as the week goes on.
#[must_use]
pub fn week_range(
  now: NaiveDateTime
) -> DateRange {
  let today = now.date();
  let weekday = today
    .weekday()
    .num_days_from_sunday();
  let saturday = today
    .checked_add_days(Days::new(
      u64::from(6 - weekday)
    ))
    .unwrap_or(today);

  DateRange {
    start: start_of_day(today),
    end:   end_of_day(saturday)
  }
}

/// Lenient `YYYY-MM-DD` parse; a longer
/// ISO timestamp contributes its date
/// prefix.
#[must_use]
pub fn parse_event_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
  {
    return Some(date);
  }

  trimmed.get(..10).and_then(|prefix| {
    NaiveDate::parse_from_str(
      prefix, "%Y-%m-%d"
    )
    .ok()
  })
}

/// Date plus parsed start time for timed
/// events, midnight for all-day ones.
#[must_use]
pub fn event_start(
  date: NaiveDate,
  time: Option<&str>
) -> NaiveDateTime {
  match time
    .map(str::trim)
    .filter(|t| !t.is_empty())
  {
    | Some(text) => {
      let span =
        parse_time_span(Some(text));
      start_of_day(date)
        + TimeDelta::minutes(i64::from(
          span.start_minutes
        ))
    }
    | None => start_of_day(date)
  }
}

/// Resolves the CLI `--now` override into
/// project-local wall-clock time.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_now_override(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();

  match token
    .to_ascii_lowercase()
    .as_str()
  {
    | "now" => return Ok(local_now(now)),
    | "today" => {
      return Ok(start_of_day(
        local_now(now).date()
      ));
    }
    | _ => {}
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(start_of_day(date));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt);
    }
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(local_now(
      dt.with_timezone(&Utc)
    ));
  }

  Err(anyhow!(
    "unrecognized time: {input} \
     (expected now, today, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM or RFC3339)"
  ))
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveDateTime,
    TimeZone,
    Utc
  };

  use super::{
    day_range,
    event_start,
    parse_event_date,
    parse_now_override,
    parse_time_span,
    registration_deadline,
    week_range
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

  fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(
      raw, "%Y-%m-%d"
    )
    .expect("valid date")
  }

  #[test]
  fn parses_afternoon_span() {
    let span = parse_time_span(Some(
      "2:00 PM - 5:00 PM"
    ));
    assert_eq!(span.start_minutes, 840);
    assert_eq!(span.end_minutes, 1020);
  }

  #[test]
  fn empty_span_uses_defaults() {
    let span =
      parse_time_span(Some(""));
    assert_eq!(span.start_minutes, 540);
    assert_eq!(span.end_minutes, 660);

    assert_eq!(
      parse_time_span(None),
      span
    );
  }

  #[test]
  fn single_time_gets_two_hours() {
    let span = parse_time_span(Some(
      "11:30 AM"
    ));
    assert_eq!(span.start_minutes, 690);
    assert_eq!(span.end_minutes, 810);
  }

  #[test]
  fn noon_and_midnight_conversion() {
    let span = parse_time_span(Some(
      "12:15 am \u{2013} 12:45 PM"
    ));
    assert_eq!(span.start_minutes, 15);
    assert_eq!(span.end_minutes, 765);
  }

  #[test]
  fn hyphenated_words_do_not_split_the_span()
  {
    let span = parse_time_span(Some(
      "Check-in 6:30 PM - 9:00 PM"
    ));
    assert_eq!(span.start_minutes, 1110);
    assert_eq!(span.end_minutes, 1260);

    let lone = parse_time_span(Some(
      "TBD - 5:00 PM"
    ));
    assert_eq!(lone.start_minutes, 1020);
    assert_eq!(lone.end_minutes, 1140);
  }

  #[test]
  fn unreadable_start_keeps_readable_end()
  {
    let span = parse_time_span(Some(
      "13:00 PM - 5:00 PM"
    ));
    assert_eq!(span.start_minutes, 540);
    assert_eq!(span.end_minutes, 1020);

    let free_text = parse_time_span(
      Some("after lunch")
    );
    assert_eq!(
      free_text.start_minutes,
      540
    );
    assert_eq!(
      free_text.end_minutes,
      660
    );
  }

  #[test]
  fn deadline_uses_clock_time_or_end_of_day()
   {
    assert_eq!(
      registration_deadline(
        day("2025-01-10"),
        Some("5:00 PM")
      ),
      at("2025-01-10T17:00:00")
    );
    assert_eq!(
      registration_deadline(
        day("2025-01-10"),
        None
      ),
      at("2025-01-10T23:59:59.999")
    );
    assert_eq!(
      registration_deadline(
        day("2025-01-10"),
        Some("whenever")
      ),
      at("2025-01-10T23:59:59.999")
    );
  }

  #[test]
  fn week_starts_today_and_ends_saturday()
  {
    // 2025-01-08 is a Wednesday.
    let range = week_range(at(
      "2025-01-08T15:30:00"
    ));
    assert_eq!(
      range.start,
      at("2025-01-08T00:00:00")
    );
    assert_eq!(
      range.end,
      at("2025-01-11T23:59:59.999")
    );
  }

  #[test]
  fn week_on_saturday_is_one_day() {
    let range = week_range(at(
      "2025-01-11T08:00:00"
    ));
    assert_eq!(
      range,
      day_range(day("2025-01-11"))
    );
  }

  #[test]
  fn week_on_sunday_runs_seven_days() {
    let range = week_range(at(
      "2025-01-05T08:00:00"
    ));
    assert_eq!(
      range.end,
      at("2025-01-11T23:59:59.999")
    );
  }

  #[test]
  fn day_range_is_inclusive() {
    let range =
      day_range(day("2025-03-01"));
    assert!(range.contains(at(
      "2025-03-01T00:00:00"
    )));
    assert!(range.contains(at(
      "2025-03-01T23:59:59.999"
    )));
    assert!(!range.contains(at(
      "2025-03-02T00:00:00"
    )));
  }

  #[test]
  fn event_dates_are_lenient() {
    assert_eq!(
      parse_event_date("2025-02-03"),
      Some(day("2025-02-03"))
    );
    assert_eq!(
      parse_event_date(
        "2025-02-03T10:00:00Z"
      ),
      Some(day("2025-02-03"))
    );
    assert_eq!(
      parse_event_date("next friday"),
      None
    );
  }

  #[test]
  fn event_start_applies_time_when_present()
  {
    assert_eq!(
      event_start(
        day("2025-02-03"),
        Some("6:30 PM - 8:00 PM")
      ),
      at("2025-02-03T18:30:00")
    );
    assert_eq!(
      event_start(
        day("2025-02-03"),
        None
      ),
      at("2025-02-03T00:00:00")
    );
  }

  #[test]
  fn now_override_accepts_plain_forms() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");

    assert_eq!(
      parse_now_override(
        "2025-01-08", now
      )
      .expect("date"),
      at("2025-01-08T00:00:00")
    );
    assert_eq!(
      parse_now_override(
        "2025-01-08T16:59", now
      )
      .expect("datetime"),
      at("2025-01-08T16:59:00")
    );
    assert!(
      parse_now_override(
        "someday", now
      )
      .is_err()
    );
  }
}
