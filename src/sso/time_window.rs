use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{SsoParticipationPolicy, SsoPolicySettings, TriStateBoolean};
use crate::{registry::RegisteredService, ticket::TicketState};

/// Which session timestamp opens the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStart {
    /// When the principal authenticated.
    #[default]
    LastAuthentication,
    /// When the session was last used, or created if never used.
    LastUsed,
}

impl WindowStart {
    fn starting_instant(self, ticket: &dyn TicketState) -> DateTime<Utc> {
        match self {
            Self::LastAuthentication => ticket.authentication().authentication_date,
            Self::LastUsed => ticket
                .last_time_used()
                .unwrap_or_else(|| ticket.creation_time()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn duration(self, value: i64) -> Option<Duration> {
        match self {
            Self::Milliseconds => Duration::try_milliseconds(value),
            Self::Seconds => Duration::try_seconds(value),
            Self::Minutes => Duration::try_minutes(value),
            Self::Hours => Duration::try_hours(value),
            Self::Days => Duration::try_days(value),
        }
    }
}

/// Participates until `time_value` `time_unit`s have passed since the
/// selected session timestamp. A non-positive `time_value` disables the
/// window and always participates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowSsoParticipationPolicy {
    #[serde(flatten)]
    pub settings: SsoPolicySettings,

    #[serde(default)]
    pub window_start: WindowStart,

    #[serde(default)]
    pub time_unit: TimeUnit,

    #[serde(default)]
    pub time_value: i64,
}

impl TimeWindowSsoParticipationPolicy {
    pub fn new(window_start: WindowStart, time_unit: TimeUnit, time_value: i64) -> Self {
        Self {
            settings: SsoPolicySettings::default(),
            window_start,
            time_unit,
            time_value,
        }
    }

    /// End of the window, or `None` when the window is disabled or too large
    /// to represent.
    fn ending_instant(&self, ticket: &dyn TicketState) -> Option<DateTime<Utc>> {
        if self.time_value <= 0 {
            return None;
        }
        let duration = self.time_unit.duration(self.time_value)?;
        self.window_start
            .starting_instant(ticket)
            .checked_add_signed(duration)
    }
}

impl SsoParticipationPolicy for TimeWindowSsoParticipationPolicy {
    fn should_participate_in_sso(
        &self,
        registered_service: &RegisteredService,
        ticket: &dyn TicketState,
    ) -> bool {
        let Some(ending) = self.ending_instant(ticket) else {
            return true;
        };
        let participate = Utc::now() < ending;
        if !participate {
            tracing::debug!(
                service = %registered_service.name,
                ticket = %ticket.id(),
                ending = %ending,
                "SSO participation window has elapsed"
            );
        }
        participate
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.settings.create_cookie_on_renewed_authentication
    }

    fn order(&self) -> i32 {
        self.settings.order
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::ticket::{Authentication, Principal, SessionTicket};

    fn ticket(authenticated_ago: Duration) -> SessionTicket {
        SessionTicket::new(
            "TGT-1",
            Authentication::new(Principal::new("casuser"))
                .with_authentication_date(Utc::now() - authenticated_ago),
        )
    }

    #[rstest]
    #[case(TimeUnit::Seconds, 30, Duration::seconds(10), true)]
    #[case(TimeUnit::Seconds, 30, Duration::seconds(60), false)]
    #[case(TimeUnit::Minutes, 5, Duration::minutes(4), true)]
    #[case(TimeUnit::Hours, 1, Duration::hours(2), false)]
    #[case(TimeUnit::Days, 1, Duration::hours(2), true)]
    #[case(TimeUnit::Milliseconds, 100, Duration::seconds(1), false)]
    #[case(TimeUnit::Seconds, 0, Duration::days(365), true)]
    #[case(TimeUnit::Seconds, -5, Duration::days(365), true)]
    fn test_since_last_authentication(
        #[case] unit: TimeUnit,
        #[case] value: i64,
        #[case] ago: Duration,
        #[case] expected: bool,
    ) {
        let service = RegisteredService::new(1, ".*", "any");
        let policy = TimeWindowSsoParticipationPolicy::new(WindowStart::LastAuthentication, unit, value);
        assert_eq!(policy.should_participate_in_sso(&service, &ticket(ago)), expected);
    }

    #[test]
    fn test_since_last_used() {
        let service = RegisteredService::new(1, ".*", "any");
        let policy = TimeWindowSsoParticipationPolicy::new(WindowStart::LastUsed, TimeUnit::Seconds, 60);

        // Authenticated long ago but used recently
        let recent = ticket(Duration::hours(1)).with_last_time_used(Utc::now() - Duration::seconds(5));
        assert!(policy.should_participate_in_sso(&service, &recent));

        // Never used: falls back to creation time
        let unused = ticket(Duration::hours(1));
        assert!(!policy.should_participate_in_sso(&service, &unused));
    }

    #[test]
    fn test_huge_window_always_participates() {
        let service = RegisteredService::new(1, ".*", "any");
        let policy = TimeWindowSsoParticipationPolicy::new(WindowStart::LastAuthentication, TimeUnit::Days, i64::MAX);
        assert!(policy.should_participate_in_sso(&service, &ticket(Duration::days(1))));
    }
}
