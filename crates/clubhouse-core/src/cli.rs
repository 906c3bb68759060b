use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::{ClubTab, StatusFilter};

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

fn parse_date_arg(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|err| anyhow!("expected YYYY-MM-DD, got {s}: {err}"))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "clubhouse",
    version,
    about = "Clubhouse: campus clubs, events and RSVPs from the terminal"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file", global = true)]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Evaluate as if the wall clock read this (e.g. 2025-01-08T09:00).
    #[arg(long = "now", global = true)]
    pub now: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List events, newest first.
    Events {
        #[arg(long, default_value = "all", value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusFilter>()))]
        status: StatusFilter,

        #[arg(long)]
        club: Option<String>,

        /// Number of "load more" steps past the first page.
        #[arg(long, default_value_t = 0)]
        more: usize,
    },

    /// List announcements, newest first.
    Announcements {
        #[arg(long)]
        club: Option<String>,

        #[arg(long, default_value_t = 0)]
        more: usize,
    },

    /// Events from today through Saturday, or on one day.
    Week {
        #[arg(long, value_parser = clap::builder::ValueParser::new(parse_date_arg))]
        date: Option<NaiveDate>,
    },

    /// A club's upcoming or past events.
    Club {
        name: String,

        #[arg(long, default_value = "upcoming", value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ClubTab>()))]
        tab: ClubTab,

        #[arg(long, default_value_t = 0)]
        more: usize,
    },

    /// List clubs.
    Clubs,

    /// Show a club's members and refresh its member count.
    Members { club_id: String },

    /// Notification feed.
    Notifications,

    /// RSVP to an event.
    Rsvp {
        event_id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Print the effective configuration.
    Config,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Command, GlobalCli};
    use crate::filter::{ClubTab, StatusFilter};

    #[test]
    fn parses_events_with_filters() {
        let cli = GlobalCli::try_parse_from([
            "clubhouse",
            "-v",
            "--now",
            "2025-01-08",
            "events",
            "--status",
            "upcoming",
            "--club",
            "ACM",
            "--more",
            "1",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.now.as_deref(), Some("2025-01-08"));
        match cli.command {
            Command::Events { status, club, more } => {
                assert_eq!(status, StatusFilter::Upcoming);
                assert_eq!(club.as_deref(), Some("ACM"));
                assert_eq!(more, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn club_tab_defaults_to_upcoming() {
        let cli = GlobalCli::try_parse_from(["clubhouse", "club", "Chess Club", "--rc", "color=off"])
            .expect("parse");
        assert_eq!(cli.rc_overrides[0].key, "color");
        match cli.command {
            Command::Club { name, tab, .. } => {
                assert_eq!(name, "Chess Club");
                assert_eq!(tab, ClubTab::Upcoming);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(GlobalCli::try_parse_from(["clubhouse", "events", "--status", "soon"]).is_err());
    }
}
