use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  NaiveDate,
  NaiveDateTime
};
use serde::Serialize;
use tracing::{
  debug,
  trace
};

use crate::classify::DisplayEvent;
use crate::datetime::{
  day_range,
  start_of_day,
  week_range
};
use crate::post::{
  AnnouncementPost,
  EventPost
};

pub const DEFAULT_PAGE_SIZE: usize = 15;
pub const DEFAULT_PAGE_STEP: usize = 5;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum StatusFilter {
  #[default]
  All,
  Upcoming,
  Completed
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "upcoming" => Ok(Self::Upcoming),
      | "completed" | "past" => {
        Ok(Self::Completed)
      }
      | other => Err(anyhow!(
        "unknown status filter: \
         {other} (expected all, \
         upcoming or completed)"
      ))
    }
  }
}

/// Exact match on the club display
/// name; `All` bypasses.
#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub enum ClubFilter {
  #[default]
  All,
  Named(String)
}

impl ClubFilter {
  #[must_use]
  pub fn from_option(
    name: Option<&str>
  ) -> Self {
    match name {
      | Some(name)
        if !name
          .eq_ignore_ascii_case("all") =>
      {
        Self::Named(name.to_string())
      }
      | _ => Self::All
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DateWindow {
  /// Today through the coming Saturday.
  Week,
  Day(NaiveDate)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum ClubTab {
  #[default]
  Upcoming,
  Past
}

impl FromStr for ClubTab {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "upcoming" => Ok(Self::Upcoming),
      | "past" => Ok(Self::Past),
      | other => Err(anyhow!(
        "unknown club tab: {other} \
         (expected upcoming or past)"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortOrder {
  /// Events and announcements pages.
  #[default]
  NewestFirst,
  /// Club detail view.
  ClubTab(ClubTab),
  /// Weekly and single-day views.
  Chronological
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
  StatusUpcoming,
  StatusCompleted,
  ClubEq(String),
  OnDay(NaiveDate),
  ThisWeek
}

/// Conjunction of predicates over
/// projected events.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct Filter {
  preds: Vec<Pred>
}

impl Filter {
  #[must_use]
  pub fn new(
    status: StatusFilter,
    club: &ClubFilter,
    window: Option<DateWindow>
  ) -> Self {
    let mut preds = Vec::new();

    match status {
      | StatusFilter::All => {}
      | StatusFilter::Upcoming => {
        preds.push(Pred::StatusUpcoming);
      }
      | StatusFilter::Completed => {
        preds
          .push(Pred::StatusCompleted);
      }
    }

    if let ClubFilter::Named(name) = club
    {
      preds
        .push(Pred::ClubEq(name.clone()));
    }

    match window {
      | Some(DateWindow::Day(date)) => {
        preds.push(Pred::OnDay(date));
      }
      | Some(DateWindow::Week) => {
        preds.push(Pred::ThisWeek);
      }
      | None => {}
    }

    Self {
      preds
    }
  }

  pub fn preds(&self) -> &[Pred] {
    &self.preds
  }

  #[must_use]
  pub fn matches(
    &self,
    event: &DisplayEvent<'_>,
    now: NaiveDateTime
  ) -> bool {
    self
      .preds
      .iter()
      .all(|pred| eval_pred(pred, event, now))
  }
}

fn eval_pred(
  pred: &Pred,
  event: &DisplayEvent<'_>,
  now: NaiveDateTime
) -> bool {
  let today = now.date();

  let ok = match pred {
    | Pred::StatusUpcoming => {
      event
        .date
        .is_some_and(|date| date >= today)
    }
    | Pred::StatusCompleted => {
      event
        .date
        .is_some_and(|date| date < today)
    }
    | Pred::ClubEq(name) => {
      event.event.base.club_name == *name
    }
    | Pred::OnDay(day) => {
      let range = day_range(*day);
      event.date.is_some_and(|date| {
        range.contains(start_of_day(date))
      })
    }
    | Pred::ThisWeek => {
      let range = week_range(now);
      let on_or_after_today = event
        .date
        .is_some_and(|date| {
          start_of_day(date) >= range.start
        });
      let before_week_end = event
        .starts_at()
        .is_some_and(|start| {
          start <= range.end
        });
      on_or_after_today && before_week_end
    }
  };

  trace!(pred = ?pred, id = %event.event.base.id, ok, "filter predicate evaluation");
  ok
}

/// Projects and filters `events` in one
/// pass.
#[tracing::instrument(skip(events, filter, now), fields(preds = filter.preds.len()))]
pub fn filter_events<'a, I>(
  events: I,
  filter: &Filter,
  now: NaiveDateTime
) -> Vec<DisplayEvent<'a>>
where
  I: IntoIterator<Item = &'a EventPost>
{
  let out: Vec<DisplayEvent<'a>> = events
    .into_iter()
    .map(|event| {
      DisplayEvent::project(event, now)
    })
    .filter(|event| {
      filter.matches(event, now)
    })
    .collect();
  debug!(
    kept = out.len(),
    "filtered events"
  );
  out
}

/// Stable sort; events with unreadable
/// dates order before every real date.
pub fn sort_events(
  events: &mut [DisplayEvent<'_>],
  order: SortOrder
) {
  match order {
    | SortOrder::NewestFirst => {
      events.sort_by(|a, b| {
        b.date.cmp(&a.date)
      });
    }
    | SortOrder::ClubTab(
      ClubTab::Upcoming
    ) => {
      events.sort_by(|a, b| {
        compare_date_then_start(a, b)
      });
    }
    | SortOrder::ClubTab(ClubTab::Past) => {
      events.sort_by(|a, b| {
        compare_date_then_start(b, a)
      });
    }
    | SortOrder::Chronological => {
      events.sort_by_key(|event| {
        event.starts_at()
      });
    }
  }
}

fn compare_date_then_start(
  a: &DisplayEvent<'_>,
  b: &DisplayEvent<'_>
) -> Ordering {
  a.date.cmp(&b.date).then_with(|| {
    a.span
      .start_minutes
      .cmp(&b.span.start_minutes)
  })
}

/// Newest first by date, stable.
pub fn sort_announcements(
  announcements: &mut [&AnnouncementPost]
) {
  announcements.sort_by(|a, b| {
    b.base
      .parsed_date()
      .cmp(&a.base.parsed_date())
  });
}

/// Distinct club names, for the club
/// filter's options.
#[must_use]
pub fn club_names<'a, I>(
  events: I
) -> Vec<String>
where
  I: IntoIterator<Item = &'a EventPost>
{
  events
    .into_iter()
    .map(|event| {
      event.base.club_name.trim()
    })
    .filter(|name| !name.is_empty())
    .map(ToString::to_string)
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub items:         Vec<T>,
  pub total:         usize,
  pub visible_count: usize,
  pub has_more:      bool
}

#[must_use]
pub fn paginate<T>(
  mut items: Vec<T>,
  visible_count: usize
) -> Page<T> {
  let total = items.len();
  items.truncate(visible_count);
  Page {
    items,
    total,
    visible_count,
    has_more: visible_count < total
  }
}

/// "Load more" cursor.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct Pager {
  page_size:     usize,
  step:          usize,
  visible_count: usize
}

impl Default for Pager {
  fn default() -> Self {
    Self::new(
      DEFAULT_PAGE_SIZE,
      DEFAULT_PAGE_STEP
    )
  }
}

impl Pager {
  #[must_use]
  pub fn new(
    page_size: usize,
    step: usize
  ) -> Self {
    Self {
      page_size,
      step,
      visible_count: page_size
    }
  }

  pub fn visible_count(&self) -> usize {
    self.visible_count
  }

  pub fn load_more(&mut self) {
    self.visible_count = self
      .visible_count
      .saturating_add(self.step);
  }

  pub fn reset(&mut self) {
    self.visible_count = self.page_size;
  }
}

/// Filter state of one listing view.
///
/// Changing any filter puts the pager
/// back to its first page.
#[derive(Debug, Clone, Default)]
pub struct ListView {
  status: StatusFilter,
  club:   ClubFilter,
  window: Option<DateWindow>,
  order:  SortOrder,
  pager:  Pager
}

impl ListView {
  #[must_use]
  pub fn new(
    order: SortOrder,
    pager: Pager
  ) -> Self {
    Self {
      order,
      pager,
      ..Self::default()
    }
  }

  pub fn status(&self) -> StatusFilter {
    self.status
  }

  pub fn club(&self) -> &ClubFilter {
    &self.club
  }

  pub fn window(
    &self
  ) -> Option<DateWindow> {
    self.window
  }

  pub fn visible_count(&self) -> usize {
    self.pager.visible_count()
  }

  pub fn set_status_filter(
    &mut self,
    status: StatusFilter
  ) {
    self.status = status;
    self.pager.reset();
  }

  pub fn set_club_filter(
    &mut self,
    club: ClubFilter
  ) {
    self.club = club;
    self.pager.reset();
  }

  pub fn set_date_window(
    &mut self,
    window: Option<DateWindow>
  ) {
    self.window = window;
    self.pager.reset();
  }

  pub fn set_order(
    &mut self,
    order: SortOrder
  ) {
    self.order = order;
    self.pager.reset();
  }

  pub fn load_more(&mut self) {
    self.pager.load_more();
  }

  #[must_use]
  pub fn filter(&self) -> Filter {
    Filter::new(
      self.status,
      &self.club,
      self.window
    )
  }

  #[tracing::instrument(skip(self, events, now), fields(status = ?self.status, club = ?self.club, window = ?self.window))]
  pub fn apply<'a, I>(
    &self,
    events: I,
    now: NaiveDateTime
  ) -> Page<DisplayEvent<'a>>
  where
    I: IntoIterator<Item = &'a EventPost>
  {
    let mut rows = filter_events(
      events,
      &self.filter(),
      now
    );
    sort_events(&mut rows, self.order);
    paginate(
      rows,
      self.pager.visible_count()
    )
  }
}
