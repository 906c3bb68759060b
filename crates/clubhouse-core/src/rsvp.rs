//! RSVP flow: `Form -> Confirm -> Success`, with `Confirm -> Error -> Form`
//! as the retry loop.
//!
//! A host view opens one flow per event. Confirmation is split into
//! [`RsvpFlow::begin_confirm`] and [`RsvpFlow::finish_confirm`] so that the
//! in-flight guard is visible to the host while the service call is
//! outstanding; [`RsvpFlow::confirm`] drives both halves against a
//! [`PortalService`].

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::calendar::google_calendar_url;
use crate::post::EventPost;
use crate::service::{PortalError, PortalService, RsvpOutcome};

pub const SUBMIT_FALLBACK_MESSAGE: &str = "Failed to submit RSVP. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStep {
    Form,
    Confirm,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RsvpValidationError {
    #[error("Please enter your name.")]
    MissingName,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    /// `submit` outside the `Form` step; nothing changed.
    #[error("The RSVP form is not open.")]
    FormClosed,
}

/// Attendee identity the host already knows, e.g. from a signed-in profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// One confirmation attempt handed to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsvpRequest {
    pub event_id: String,
    pub name: String,
    pub email: String,
    attempt: u64,
}

#[derive(Debug, Clone)]
pub struct RsvpFlow {
    event_id: String,
    known_identity: Option<Identity>,
    name: String,
    email: String,
    step: RsvpStep,
    error_message: Option<String>,
    is_submitting: bool,
    attempt: u64,
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| {
            Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
                .map_err(|err| warn!(error = %err, "internal email regex compile failure"))
                .ok()
        })
        .as_ref()
}

/// Deliberately loose `local@domain.tld` check.
pub fn is_plausible_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

impl RsvpFlow {
    /// Starts at `Confirm` when the identity is already known, `Form`
    /// otherwise.
    pub fn open(event_id: impl Into<String>, known_identity: Option<Identity>) -> Self {
        let mut flow = Self {
            event_id: event_id.into(),
            known_identity,
            name: String::new(),
            email: String::new(),
            step: RsvpStep::Form,
            error_message: None,
            is_submitting: false,
            attempt: 0,
        };
        flow.enter();
        debug!(event_id = %flow.event_id, step = ?flow.step, "opened rsvp flow");
        flow
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn step(&self) -> RsvpStep {
        self.step
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub fn has_known_identity(&self) -> bool {
        self.known_identity.is_some()
    }

    fn entry_step(&self) -> RsvpStep {
        if self.known_identity.is_some() {
            RsvpStep::Confirm
        } else {
            RsvpStep::Form
        }
    }

    fn enter(&mut self) {
        self.step = self.entry_step();
        self.error_message = None;
        self.is_submitting = false;
        // Any outstanding confirmation now belongs to a closed session.
        self.attempt += 1;
        match &self.known_identity {
            Some(identity) => {
                self.name = identity.name.clone();
                self.email = identity.email.clone();
            }
            None => {
                self.name.clear();
                self.email.clear();
            }
        }
    }

    /// `Form --submit--> Confirm`. A failed check keeps the form open and
    /// records the message for inline display.
    #[instrument(skip(self, name, email), fields(event_id = %self.event_id))]
    pub fn submit(&mut self, name: &str, email: &str) -> Result<(), RsvpValidationError> {
        if self.step != RsvpStep::Form {
            debug!(step = ?self.step, "submit ignored outside form step");
            return Err(RsvpValidationError::FormClosed);
        }

        let name = name.trim();
        let email = email.trim();
        self.name = name.to_string();
        self.email = email.to_string();

        let checked = if name.is_empty() {
            Err(RsvpValidationError::MissingName)
        } else if !is_plausible_email(email) {
            Err(RsvpValidationError::InvalidEmail)
        } else {
            Ok(())
        };

        match &checked {
            Ok(()) => {
                self.error_message = None;
                self.step = RsvpStep::Confirm;
            }
            Err(err) => {
                debug!(error = %err, "rsvp form rejected");
                self.error_message = Some(err.to_string());
            }
        }
        checked
    }

    /// Claims the in-flight slot. `None` while a confirmation is already
    /// outstanding or outside the `Confirm` step.
    pub fn begin_confirm(&mut self) -> Option<RsvpRequest> {
        if self.step != RsvpStep::Confirm {
            debug!(step = ?self.step, "confirm ignored outside confirm step");
            return None;
        }
        if self.is_submitting {
            debug!(event_id = %self.event_id, "confirm already in flight");
            return None;
        }

        self.is_submitting = true;
        self.error_message = None;
        Some(RsvpRequest {
            event_id: self.event_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            attempt: self.attempt,
        })
    }

    /// Releases the in-flight slot and moves to `Success` or `Error`.
    /// Results for a session that was closed meanwhile are dropped.
    #[instrument(skip(self, request, result), fields(event_id = %self.event_id))]
    pub fn finish_confirm(
        &mut self,
        request: &RsvpRequest,
        result: Result<RsvpOutcome, PortalError>,
    ) {
        if request.attempt != self.attempt {
            debug!("discarding result for a closed rsvp session");
            return;
        }
        self.is_submitting = false;

        match result {
            Ok(outcome) if outcome.success => {
                info!("rsvp recorded");
                self.error_message = None;
                self.step = RsvpStep::Success;
            }
            Ok(outcome) => {
                let message = outcome
                    .error
                    .filter(|msg| !msg.trim().is_empty())
                    .unwrap_or_else(|| SUBMIT_FALLBACK_MESSAGE.to_string());
                warn!(reason = %message, "rsvp rejected");
                self.error_message = Some(message);
                self.step = RsvpStep::Error;
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "rsvp submission failed");
                self.error_message = Some(if message.trim().is_empty() {
                    SUBMIT_FALLBACK_MESSAGE.to_string()
                } else {
                    message
                });
                self.step = RsvpStep::Error;
            }
        }
    }

    /// `Confirm --confirm--> Success | Error` against `service`. A no-op
    /// while another confirmation is in flight.
    pub async fn confirm<S>(&mut self, service: &S) -> RsvpStep
    where
        S: PortalService + ?Sized,
    {
        let Some(request) = self.begin_confirm() else {
            return self.step;
        };
        let result = service
            .create_event_rsvp(&request.event_id, &request.name, &request.email)
            .await;
        self.finish_confirm(&request, result);
        self.step
    }

    /// `Error --retry--> Form`.
    pub fn retry(&mut self) {
        if self.step == RsvpStep::Error {
            self.step = RsvpStep::Form;
        } else {
            debug!(step = ?self.step, "retry ignored outside error step");
        }
    }

    /// Back to the entry step. Clears error text, and the entered identity
    /// when it was not supplied by the host.
    pub fn close(&mut self) {
        debug!(event_id = %self.event_id, step = ?self.step, "closing rsvp flow");
        self.reset();
    }

    /// Re-enters the flow for the same event and identity.
    pub fn reset(&mut self) {
        self.enter();
    }

    /// Explicit re-initialisation when the host's identity input changes.
    pub fn reset_identity(&mut self, known_identity: Option<Identity>) {
        self.known_identity = known_identity;
        self.enter();
    }

    /// Add-to-calendar link offered after a successful RSVP.
    pub fn calendar_link(&self, event: &EventPost) -> Option<String> {
        if self.step != RsvpStep::Success || event.base.id != self.event_id {
            return None;
        }
        google_calendar_url(event)
    }
}

#[cfg(test)]
mod tests {
    use super::{Identity, RsvpFlow, RsvpStep, RsvpValidationError, is_plausible_email};
    use crate::service::{PortalError, RsvpOutcome};

    fn known() -> Option<Identity> {
        Some(Identity {
            name: "Grace Hopper".to_string(),
            email: "grace@example.edu".to_string(),
        })
    }

    #[test]
    fn known_identity_opens_on_confirm() {
        let flow = RsvpFlow::open("e1", known());
        assert_eq!(flow.step(), RsvpStep::Confirm);
        assert_eq!(flow.email(), "grace@example.edu");

        let anonymous = RsvpFlow::open("e1", None);
        assert_eq!(anonymous.step(), RsvpStep::Form);
    }

    #[test]
    fn invalid_form_stays_put_with_message() {
        let mut flow = RsvpFlow::open("e1", None);

        assert_eq!(
            flow.submit("   ", "a@b.co"),
            Err(RsvpValidationError::MissingName)
        );
        assert_eq!(flow.step(), RsvpStep::Form);
        assert_eq!(flow.error_message(), Some("Please enter your name."));

        assert_eq!(
            flow.submit("Ada", "ada@localhost"),
            Err(RsvpValidationError::InvalidEmail)
        );
        assert_eq!(flow.step(), RsvpStep::Form);

        flow.submit(" Ada ", "ada@example.edu").expect("valid form");
        assert_eq!(flow.step(), RsvpStep::Confirm);
        assert_eq!(flow.name(), "Ada");
        assert!(flow.error_message().is_none());
    }

    #[test]
    fn submit_outside_form_is_refused() {
        let mut flow = RsvpFlow::open("e1", known());

        assert_eq!(
            flow.submit("Ada", "ada@example.edu"),
            Err(RsvpValidationError::FormClosed)
        );
        assert_eq!(flow.step(), RsvpStep::Confirm);
        assert_eq!(flow.name(), "Grace Hopper");
        assert!(flow.error_message().is_none());
    }

    #[test]
    fn reset_clears_error_and_reenters() {
        let mut flow = RsvpFlow::open("e1", None);
        flow.submit("Ada", "ada@example.edu").expect("valid form");
        let request = flow.begin_confirm().expect("claim");
        flow.finish_confirm(&request, Ok(RsvpOutcome::rejected("Event is full")));
        assert_eq!(flow.step(), RsvpStep::Error);

        flow.reset();
        assert_eq!(flow.step(), RsvpStep::Form);
        assert_eq!(flow.name(), "");
        assert!(flow.error_message().is_none());

        flow.finish_confirm(&request, Ok(RsvpOutcome::accepted()));
        assert_eq!(flow.step(), RsvpStep::Form);
    }

    #[test]
    fn email_check_is_permissive() {
        assert!(is_plausible_email("first.last+club@mail.example.edu"));
        assert!(is_plausible_email("x@y.z"));
        assert!(!is_plausible_email("no-at-sign.edu"));
        assert!(!is_plausible_email("spaced out@example.edu"));
        assert!(!is_plausible_email("a@@b.c"));
    }

    #[test]
    fn second_confirm_while_in_flight_is_noop() {
        let mut flow = RsvpFlow::open("e1", known());

        let first = flow.begin_confirm().expect("first claim");
        assert!(flow.is_submitting());
        assert!(flow.begin_confirm().is_none());

        flow.finish_confirm(&first, Ok(RsvpOutcome::accepted()));
        assert!(!flow.is_submitting());
        assert_eq!(flow.step(), RsvpStep::Success);
    }

    #[test]
    fn failure_goes_to_error_then_form() {
        let mut flow = RsvpFlow::open("e1", None);
        flow.submit("Ada", "ada@example.edu").expect("valid form");

        let request = flow.begin_confirm().expect("claim");
        flow.finish_confirm(&request, Ok(RsvpOutcome::rejected("Event is full")));
        assert_eq!(flow.step(), RsvpStep::Error);
        assert_eq!(flow.error_message(), Some("Event is full"));
        assert!(!flow.is_submitting());

        flow.retry();
        assert_eq!(flow.step(), RsvpStep::Form);
        assert_eq!(flow.name(), "Ada");
    }

    #[test]
    fn rejection_without_reason_uses_fallback() {
        let mut flow = RsvpFlow::open("e1", known());
        let request = flow.begin_confirm().expect("claim");
        flow.finish_confirm(
            &request,
            Ok(RsvpOutcome {
                success: false,
                error: None,
            }),
        );
        assert_eq!(
            flow.error_message(),
            Some("Failed to submit RSVP. Please try again.")
        );
    }

    #[test]
    fn service_error_releases_guard() {
        let mut flow = RsvpFlow::open("e1", known());
        let request = flow.begin_confirm().expect("claim");
        flow.finish_confirm(
            &request,
            Err(PortalError::Unavailable("timeout".to_string())),
        );
        assert_eq!(flow.step(), RsvpStep::Error);
        assert!(!flow.is_submitting());
        assert_eq!(flow.error_message(), Some("service unavailable: timeout"));
    }

    #[test]
    fn close_resets_by_identity_rule() {
        let mut anonymous = RsvpFlow::open("e1", None);
        anonymous.submit("Ada", "ada@example.edu").expect("valid form");
        anonymous.close();
        assert_eq!(anonymous.step(), RsvpStep::Form);
        assert_eq!(anonymous.name(), "");
        assert_eq!(anonymous.email(), "");

        let mut signed_in = RsvpFlow::open("e1", known());
        let request = signed_in.begin_confirm().expect("claim");
        signed_in.finish_confirm(&request, Ok(RsvpOutcome::rejected("closed")));
        signed_in.close();
        assert_eq!(signed_in.step(), RsvpStep::Confirm);
        assert_eq!(signed_in.name(), "Grace Hopper");
        assert!(signed_in.error_message().is_none());
    }

    #[test]
    fn result_after_close_is_discarded() {
        let mut flow = RsvpFlow::open("e1", known());
        let request = flow.begin_confirm().expect("claim");
        flow.close();
        assert!(!flow.is_submitting());

        flow.finish_confirm(&request, Ok(RsvpOutcome::accepted()));
        assert_eq!(flow.step(), RsvpStep::Confirm);
    }

    #[test]
    fn identity_change_reenters_flow() {
        let mut flow = RsvpFlow::open("e1", None);
        flow.reset_identity(known());
        assert_eq!(flow.step(), RsvpStep::Confirm);
        assert!(flow.has_known_identity());

        flow.reset_identity(None);
        assert_eq!(flow.step(), RsvpStep::Form);
        assert_eq!(flow.email(), "");
    }
}
