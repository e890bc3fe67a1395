use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An election, read-only to this service.
#[derive(Debug, Clone)]
pub struct Election {
    /// The unique identifier for the election.
    pub id: Uuid,
    /// The election's display name.
    pub name: String,
    /// Operator switch. Voting requires this AND the date window.
    pub is_active: bool,
    /// Start of the voting window.
    pub start_date: DateTime<Utc>,
    /// End of the voting window.
    pub end_date: DateTime<Utc>,
}

/// Derived election state. Never persisted; computed at evaluation time from
/// the active flag and the date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// Operator switched the election off.
    Suspended,
    /// The window has not opened yet.
    Scheduled,
    /// Open for voting.
    Active,
    /// The window has closed.
    Ended,
}

impl ElectionState {
    /// Stable lowercase label for responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionState::Suspended => "suspended",
            ElectionState::Scheduled => "scheduled",
            ElectionState::Active => "active",
            ElectionState::Ended => "ended",
        }
    }
}

impl Election {
    /// Computes the derived state at `now`.
    ///
    /// Active requires the stored flag true AND `now` within
    /// `[start_date, end_date]`; the flag alone never opens an election.
    pub fn state_at(&self, now: DateTime<Utc>) -> ElectionState {
        if !self.is_active {
            return ElectionState::Suspended;
        }
        if now < self.start_date {
            return ElectionState::Scheduled;
        }
        if now > self.end_date {
            return ElectionState::Ended;
        }
        ElectionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn february_election(is_active: bool) -> Election {
        Election {
            id: Uuid::new_v4(),
            name: "General".to_string(),
            is_active,
            start_date: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn active_flag_alone_does_not_open_the_election() {
        let election = february_election(true);
        let before = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(election.state_at(before), ElectionState::Scheduled);
    }

    #[test]
    fn in_window_and_flagged_is_active() {
        let election = february_election(true);
        let mid = Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 0).unwrap();
        assert_eq!(election.state_at(mid), ElectionState::Active);
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let election = february_election(true);
        assert_eq!(election.state_at(election.start_date), ElectionState::Active);
        assert_eq!(election.state_at(election.end_date), ElectionState::Active);
    }

    #[test]
    fn past_window_is_ended() {
        let election = february_election(true);
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(election.state_at(after), ElectionState::Ended);
    }

    #[test]
    fn inactive_flag_suspends_regardless_of_window() {
        let election = february_election(false);
        let mid = Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 0).unwrap();
        assert_eq!(election.state_at(mid), ElectionState::Suspended);
    }
}
