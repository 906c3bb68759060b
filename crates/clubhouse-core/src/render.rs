use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::classify::{DisplayEvent, EventStatus};
use crate::config::Config;
use crate::filter::Page;
use crate::loader::ClubRoster;
use crate::post::{AnnouncementPost, Club, Notification};
use crate::rsvp::{RsvpFlow, RsvpStep};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, page))]
    pub fn print_event_page(&mut self, page: &Page<DisplayEvent<'_>>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Time".to_string(),
            "Club".to_string(),
            "Title".to_string(),
            "Going".to_string(),
            "Status".to_string(),
        ];

        let mut rows = Vec::with_capacity(page.items.len());
        for row in &page.items {
            let event = row.event;
            let status = match row.status {
                EventStatus::Upcoming => self.paint(row.status.as_str(), "32"),
                EventStatus::Past => self.paint(row.status.as_str(), "90"),
            };
            let title = if row.show_registration {
                format!("{} {}", event.base.title, self.paint("[register]", "36"))
            } else {
                event.base.title.clone()
            };

            rows.push(vec![
                self.paint(&event.base.id, "33"),
                event.base.date.clone(),
                event.time.clone().unwrap_or_else(|| "all day".to_string()),
                event.base.club_name.clone(),
                title,
                row.attendees.to_string(),
                status,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        write_page_footer(&mut out, page.items.len(), page.total, page.has_more)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, page))]
    pub fn print_announcement_page(
        &mut self,
        page: &Page<&AnnouncementPost>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Club".to_string(),
            "Title".to_string(),
        ];

        let rows = page
            .items
            .iter()
            .map(|announcement| {
                vec![
                    self.paint(&announcement.base.id, "33"),
                    announcement.base.date.clone(),
                    announcement.base.club_name.clone(),
                    announcement.base.title.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        write_page_footer(&mut out, page.items.len(), page.total, page.has_more)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, clubs))]
    pub fn print_clubs(&mut self, clubs: &[Club]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Category".to_string(),
            "Members".to_string(),
        ];
        let rows = clubs
            .iter()
            .map(|club| {
                vec![
                    self.paint(&club.id, "33"),
                    club.name.clone(),
                    club.category.clone().unwrap_or_default(),
                    club.member_count.to_string(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, roster))]
    pub fn print_roster(&mut self, roster: &ClubRoster) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec!["Name".to_string(), "Email".to_string(), "Role".to_string()];
        let rows = roster
            .members
            .iter()
            .map(|member| {
                vec![
                    member.name.clone(),
                    member.email.clone(),
                    member.role.clone().unwrap_or_default(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out, "{} member(s)", roster.member_count)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, notifications))]
    pub fn print_notifications(&mut self, notifications: &[Notification]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if notifications.is_empty() {
            writeln!(out, "No notifications.")?;
            return Ok(());
        }

        for notification in notifications {
            let marker = if notification.read {
                " ".to_string()
            } else {
                self.paint("*", "31")
            };
            let club = notification
                .club_name
                .as_deref()
                .map(|name| format!(" [{name}]"))
                .unwrap_or_default();
            writeln!(
                out,
                "{marker} {}{club} {}",
                notification.created_at, notification.title
            )?;
            if !notification.message.trim().is_empty() {
                writeln!(out, "    {}", notification.message.trim())?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, flow, calendar_link))]
    pub fn print_rsvp_outcome(
        &mut self,
        flow: &RsvpFlow,
        calendar_link: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        match flow.step() {
            RsvpStep::Success => {
                writeln!(
                    out,
                    "{} {} <{}> is going to {}.",
                    self.paint("RSVP confirmed:", "32"),
                    flow.name(),
                    flow.email(),
                    flow.event_id()
                )?;
                if let Some(link) = calendar_link {
                    writeln!(out, "Add to calendar: {link}")?;
                }
            }
            step => {
                let message = flow.error_message().unwrap_or("RSVP was not completed.");
                writeln!(out, "{} {message} ({step:?})", self.paint("RSVP failed:", "31"))?;
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_page_footer<W: Write>(
    mut writer: W,
    shown: usize,
    total: usize,
    has_more: bool,
) -> anyhow::Result<()> {
    if has_more {
        writeln!(writer, "showing {shown} of {total}; pass --more to load more")?;
    } else {
        writeln!(writer, "{total} total")?;
    }
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
