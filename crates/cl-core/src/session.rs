//! Session lifecycle tracking.
//!
//! Per player the state machine is: no open session → (join) → open →
//! (leave | server shutdown) → no open session. Out-of-order or duplicate
//! events are counted as anomalies and never repaired.

use chrono::{DateTime, Utc};

use crate::state::{LogState, Session};

/// Result of a join event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    /// A new open session was appended.
    Opened,
    /// The player already had an open session; it stays open and no second
    /// one is created.
    AlreadyOpen,
}

/// Result of a leave event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Closed,
    UnknownPlayer,
    NoSessions,
    AlreadyClosed,
}

impl LogState {
    /// Records a join at `timestamp`, creating the player if needed.
    pub fn start_session(&mut self, name: &str, timestamp: DateTime<Utc>) -> SessionStart {
        let player = self.ensure_player(name, timestamp);
        player.n_logins += 1;
        player.touch(timestamp);

        if player.open_session().is_some() {
            self.anomalies.duplicate_joins += 1;
            tracing::debug!(player = name, %timestamp, "join while a session is already open");
            return SessionStart::AlreadyOpen;
        }

        player.sessions.push(Session::open(timestamp));
        self.active_sessions.insert(name.to_string());
        SessionStart::Opened
    }

    /// Records a leave at `timestamp`.
    ///
    /// Leaves for unknown players, players without sessions, or players whose
    /// latest session is already closed change nothing.
    pub fn end_session(&mut self, name: &str, timestamp: DateTime<Utc>) -> SessionEnd {
        let outcome = match self.players.get_mut(name) {
            None => SessionEnd::UnknownPlayer,
            Some(player) => match player.sessions.last_mut() {
                None => SessionEnd::NoSessions,
                Some(session) if !session.is_open() => SessionEnd::AlreadyClosed,
                Some(session) => {
                    session.end = Some(timestamp);
                    player.touch(timestamp);
                    SessionEnd::Closed
                }
            },
        };

        if outcome == SessionEnd::Closed {
            self.active_sessions.remove(name);
        } else {
            self.anomalies.unmatched_leaves += 1;
            tracing::debug!(player = name, %timestamp, ?outcome, "leave without open session");
        }
        outcome
    }

    /// Closes every open session at `timestamp`.
    ///
    /// A server restart drops all connections without individual leave
    /// lines. Returns the number of sessions closed.
    pub fn force_close_all(&mut self, timestamp: DateTime<Utc>) -> usize {
        let names = std::mem::take(&mut self.active_sessions);
        let mut closed = 0;
        for name in &names {
            let Some(player) = self.players.get_mut(name) else {
                continue;
            };
            if let Some(session) = player.sessions.last_mut().filter(|s| s.is_open()) {
                session.end = Some(timestamp);
                player.touch(timestamp);
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::debug!(closed, %timestamp, "server restart closed open sessions");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, hour, min, 0).unwrap()
    }

    #[test]
    fn join_then_leave_yields_one_closed_session() {
        let mut state = LogState::new();
        assert_eq!(state.start_session("X", ts(10, 0)), SessionStart::Opened);
        assert_eq!(state.end_session("X", ts(11, 30)), SessionEnd::Closed);
        state.finalize();

        let x = state.player("X").unwrap();
        assert_eq!(
            x.sessions,
            vec![Session {
                start: ts(10, 0),
                end: Some(ts(11, 30))
            }]
        );
        assert_eq!(x.n_logins, 1);
        assert_eq!(x.last_seen, ts(11, 30));
        assert_eq!(x.total_active, Duration::minutes(90));
        assert!(state.active_sessions.is_empty());
    }

    #[test]
    fn leave_for_unknown_player_is_an_anomaly() {
        let mut state = LogState::new();
        assert_eq!(
            state.end_session("Bob", ts(0, 0)),
            SessionEnd::UnknownPlayer
        );
        assert!(state.player("Bob").is_none());
        assert_eq!(state.anomalies.unmatched_leaves, 1);
    }

    #[test]
    fn duplicate_leave_does_not_move_end() {
        let mut state = LogState::new();
        state.start_session("X", ts(10, 0));
        state.end_session("X", ts(11, 0));

        assert_eq!(
            state.end_session("X", ts(12, 0)),
            SessionEnd::AlreadyClosed
        );
        let x = state.player("X").unwrap();
        assert_eq!(x.sessions[0].end, Some(ts(11, 0)));
        assert_eq!(x.last_seen, ts(11, 0));
    }

    #[test]
    fn leave_for_player_without_sessions() {
        let mut state = LogState::new();
        state.ensure_player("Chatty", ts(9, 0));
        assert_eq!(
            state.end_session("Chatty", ts(10, 0)),
            SessionEnd::NoSessions
        );
    }

    #[test]
    fn duplicate_join_keeps_single_open_session() {
        let mut state = LogState::new();
        state.start_session("X", ts(10, 0));
        assert_eq!(
            state.start_session("X", ts(11, 0)),
            SessionStart::AlreadyOpen
        );

        let x = state.player("X").unwrap();
        assert_eq!(x.sessions.len(), 1);
        assert_eq!(x.n_logins, 2);
        assert_eq!(state.anomalies.duplicate_joins, 1);
    }

    #[test]
    fn force_close_all_ends_every_open_session() {
        let mut state = LogState::new();
        state.start_session("A", ts(10, 0));
        state.start_session("B", ts(10, 5));
        state.start_session("C", ts(10, 10));
        state.end_session("C", ts(10, 20));

        assert_eq!(state.force_close_all(ts(11, 0)), 2);

        assert!(state.active_sessions.is_empty());
        assert_eq!(state.player("A").unwrap().sessions[0].end, Some(ts(11, 0)));
        assert_eq!(state.player("B").unwrap().sessions[0].end, Some(ts(11, 0)));
        assert_eq!(state.player("C").unwrap().sessions[0].end, Some(ts(10, 20)));
    }

    #[test]
    fn rejoin_after_close_opens_new_session() {
        let mut state = LogState::new();
        state.start_session("X", ts(10, 0));
        state.force_close_all(ts(10, 30));
        state.start_session("X", ts(10, 40));

        let x = state.player("X").unwrap();
        assert_eq!(x.sessions.len(), 2);
        assert!(x.sessions[1].is_open());
        assert!(state.active_sessions.contains("X"));
    }
}
