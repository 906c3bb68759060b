use anyhow::anyhow;
use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use crate::classify::{EventStatus, classify_event};
use crate::cli::Command;
use crate::config::Config;
use crate::filter::{
    ClubFilter, ClubTab, DateWindow, ListView, SortOrder, StatusFilter, club_names, paginate,
    sort_announcements,
};
use crate::loader::{load_club_roster, load_snapshot};
use crate::post::{announcements, events};
use crate::render::Renderer;
use crate::rsvp::{RsvpFlow, RsvpStep};
use crate::service::PortalService;

#[instrument(skip_all, fields(now = %now))]
pub async fn dispatch<S>(
    service: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    now: NaiveDateTime,
) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    match command {
        Command::Events { status, club, more } => {
            cmd_events(service, cfg, renderer, status, club.as_deref(), more, now).await
        }
        Command::Announcements { club, more } => {
            cmd_announcements(service, cfg, renderer, club.as_deref(), more).await
        }
        Command::Week { date } => cmd_week(service, cfg, renderer, date, now).await,
        Command::Club { name, tab, more } => {
            cmd_club(service, cfg, renderer, &name, tab, more, now).await
        }
        Command::Clubs => cmd_clubs(service, renderer).await,
        Command::Members { club_id } => cmd_members(service, renderer, &club_id).await,
        Command::Notifications => cmd_notifications(service, renderer).await,
        Command::Rsvp {
            event_id,
            name,
            email,
        } => cmd_rsvp(service, cfg, renderer, &event_id, name, email, now).await,
        Command::Config => cmd_config(cfg),
    }
}

#[instrument(skip(service, cfg, renderer, now))]
async fn cmd_events<S>(
    service: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    status: StatusFilter,
    club: Option<&str>,
    more: usize,
    now: NaiveDateTime,
) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command events");

    let snapshot = load_snapshot(service).await;
    let club = ClubFilter::from_option(club);
    if let ClubFilter::Named(name) = &club
        && !club_names(events(&snapshot.posts)).contains(name)
    {
        warn!(club = %name, "no events posted under that club name");
    }

    let mut view = ListView::new(SortOrder::NewestFirst, cfg.pager()?);
    view.set_status_filter(status);
    view.set_club_filter(club);
    for _ in 0..more {
        view.load_more();
    }

    let page = view.apply(events(&snapshot.posts), now);
    renderer.print_event_page(&page)
}

#[instrument(skip(service, cfg, renderer))]
async fn cmd_announcements<S>(
    service: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    club: Option<&str>,
    more: usize,
) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command announcements");

    let snapshot = load_snapshot(service).await;
    let club = ClubFilter::from_option(club);
    let mut rows: Vec<_> = announcements(&snapshot.posts)
        .into_iter()
        .filter(|announcement| match &club {
            ClubFilter::All => true,
            ClubFilter::Named(name) => announcement.base.club_name == *name,
        })
        .collect();
    sort_announcements(&mut rows);

    let mut pager = cfg.pager()?;
    for _ in 0..more {
        pager.load_more();
    }
    renderer.print_announcement_page(&paginate(rows, pager.visible_count()))
}

#[instrument(skip(service, cfg, renderer, now))]
async fn cmd_week<S>(
    service: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    date: Option<chrono::NaiveDate>,
    now: NaiveDateTime,
) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command week");

    let snapshot = load_snapshot(service).await;
    let mut view = ListView::new(SortOrder::Chronological, cfg.pager()?);
    view.set_date_window(Some(date.map_or(DateWindow::Week, DateWindow::Day)));

    let page = view.apply(events(&snapshot.posts), now);
    renderer.print_event_page(&page)
}

#[instrument(skip(service, cfg, renderer, now))]
async fn cmd_club<S>(
    service: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    name: &str,
    tab: ClubTab,
    more: usize,
    now: NaiveDateTime,
) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command club");

    let snapshot = load_snapshot(service).await;
    if !snapshot.clubs.iter().any(|club| club.name == name) {
        warn!(club = %name, "no club with that name in the directory");
    }

    let mut view = ListView::new(SortOrder::ClubTab(tab), cfg.pager()?);
    view.set_club_filter(ClubFilter::Named(name.to_string()));
    view.set_status_filter(match tab {
        ClubTab::Upcoming => StatusFilter::Upcoming,
        ClubTab::Past => StatusFilter::Completed,
    });
    for _ in 0..more {
        view.load_more();
    }

    let page = view.apply(events(&snapshot.posts), now);
    renderer.print_event_page(&page)
}

#[instrument(skip(service, renderer))]
async fn cmd_clubs<S>(service: &S, renderer: &mut Renderer) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command clubs");

    let mut clubs = load_snapshot(service).await.clubs;
    clubs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    renderer.print_clubs(&clubs)
}

#[instrument(skip(service, renderer))]
async fn cmd_members<S>(service: &S, renderer: &mut Renderer, club_id: &str) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command members");

    let roster = load_club_roster(service, club_id).await;
    renderer.print_roster(&roster)
}

#[instrument(skip(service, renderer))]
async fn cmd_notifications<S>(service: &S, renderer: &mut Renderer) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command notifications");

    let mut notifications = load_snapshot(service).await.notifications;
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    renderer.print_notifications(&notifications)
}

#[instrument(skip(service, cfg, renderer, name, email, now))]
async fn cmd_rsvp<S>(
    service: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    event_id: &str,
    name: Option<String>,
    email: Option<String>,
    now: NaiveDateTime,
) -> anyhow::Result<()>
where
    S: PortalService + ?Sized,
{
    info!("command rsvp");

    let snapshot = load_snapshot(service).await;
    let event = events(&snapshot.posts)
        .into_iter()
        .find(|event| event.base.id == event_id)
        .ok_or_else(|| anyhow!("no event with id {event_id}"))?;

    if classify_event(event, now) == EventStatus::Past {
        warn!(event_id, date = %event.base.date, "rsvp for an event that has already happened");
    }

    let entered = name.is_some() || email.is_some();
    let known = if entered { None } else { cfg.identity() };
    let mut flow = RsvpFlow::open(event_id, known);

    if flow.step() == RsvpStep::Form {
        if !entered {
            return Err(anyhow!(
                "pass --name and --email, or set identity.name and identity.email"
            ));
        }
        flow.submit(
            name.as_deref().unwrap_or_default(),
            email.as_deref().unwrap_or_default(),
        )?;
    }

    flow.confirm(service).await;
    let link = flow.calendar_link(event);
    renderer.print_rsvp_outcome(&flow, link.as_deref())?;

    if flow.step() != RsvpStep::Success {
        return Err(anyhow!(
            "{}",
            flow.error_message().unwrap_or("RSVP was not completed")
        ));
    }
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}
