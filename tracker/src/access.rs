//! Deciding whether a visitor's progress is durable or a guest preview.

use std::collections::HashSet;

use crate::persistence::{GuestSession, RequestContext};

/// Enrolment lookup provided by the host.
pub trait EnrolmentCheck: Send + Sync {
    fn is_enrolled(&self, user_id: u64, course_id: u64) -> bool;
}

/// Enrolments held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticEnrolments {
    enrolled: HashSet<(u64, u64)>,
}

impl StaticEnrolments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enrol(mut self, user_id: u64, course_id: u64) -> Self {
        self.enrolled.insert((user_id, course_id));
        self
    }
}

impl EnrolmentCheck for StaticEnrolments {
    fn is_enrolled(&self, user_id: u64, course_id: u64) -> bool {
        self.enrolled.contains(&(user_id, course_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Enrolled: progress is stored.
    Durable,
    /// Previewing without enrolment: progress lives in a guest session.
    Guest,
    Denied,
}

impl AccessMode {
    pub fn resolve(
        user_id: u64,
        course_id: u64,
        enrolment: &impl EnrolmentCheck,
        preview_enabled: bool,
    ) -> Self {
        if enrolment.is_enrolled(user_id, course_id) {
            AccessMode::Durable
        } else if preview_enabled {
            AccessMode::Guest
        } else {
            AccessMode::Denied
        }
    }

    /// Build the request context for this mode. Guests reuse `session`
    /// when one is already open for the visitor.
    pub fn context(self, user_id: u64, session: Option<GuestSession>) -> Option<RequestContext> {
        match self {
            AccessMode::Durable => Some(RequestContext::user(user_id)),
            AccessMode::Guest => Some(RequestContext::guest(user_id, session.unwrap_or_default())),
            AccessMode::Denied => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrolled_users_are_durable() {
        let enrolments = StaticEnrolments::new().enrol(1, 10);
        assert_eq!(AccessMode::resolve(1, 10, &enrolments, true), AccessMode::Durable);
        assert_eq!(AccessMode::resolve(1, 10, &enrolments, false), AccessMode::Durable);
    }

    #[test]
    fn preview_turns_visitors_into_guests() {
        let enrolments = StaticEnrolments::new().enrol(1, 10);
        assert_eq!(AccessMode::resolve(2, 10, &enrolments, true), AccessMode::Guest);
        assert_eq!(AccessMode::resolve(1, 11, &enrolments, false), AccessMode::Denied);
    }

    #[test]
    fn context_follows_mode() {
        let durable = AccessMode::Durable.context(1, None).unwrap();
        assert!(durable.guest.is_none());

        let session = GuestSession::new();
        let guest = AccessMode::Guest.context(2, Some(session.clone())).unwrap();
        assert_eq!(guest.guest.map(|s| s.id()), Some(session.id()));

        assert!(AccessMode::Denied.context(3, None).is_none());
    }
}
