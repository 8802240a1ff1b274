//! The agent's lifecycle as an explicit state machine.
//!
//! The machine only decides; it never performs I/O. Feeding it an [`Event`]
//! moves it to its next [`State`] and returns the [`Action`]s the agent has to
//! carry out, in order. Events that make no sense in the current state are
//! ignored.

use derive_more::Display;
use serde::Serialize;

pub const HELLO_MESSAGE: &str = "Hello world!";
pub const DONE_MESSAGE: &str = "I'm done!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// No session; a connection attempt is pending or in progress.
    #[display("connecting")]
    Connecting,
    /// Connected, resolving the username to a player in the world.
    #[display("authenticating")]
    Authenticating,
    /// In the world and not collecting.
    #[display("spawned")]
    Spawned,
    /// In the world with the collection loop running.
    #[display("collecting")]
    Collecting,
    /// The session timer ran out and the agent has left.
    #[display("done")]
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The TCP connection to the server is up.
    Connected,
    /// Connecting failed.
    ConnectFailed,
    /// The retry delay after a failure has passed.
    RetryDue,
    /// The username resolved to a player.
    LoggedIn,
    /// The player could not be resolved.
    AuthFailed,
    /// The block table for the session's version is loaded.
    BlocksLoaded,
    /// There is no block table for the session's version.
    BlocksUnavailable,
    /// The collection loop stopped, for whatever reason.
    CollectionFinished,
    /// The session timer ran out.
    TimerElapsed,
    /// The connection broke during a live session.
    ConnectionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open a connection to the server.
    Connect,
    /// Drop the session and wait for the retry delay.
    ScheduleReconnect,
    /// Look the username up in the world.
    Authenticate,
    /// Start the world viewer.
    OpenViewer,
    /// Post a chat message.
    Chat(&'static str),
    /// Start the session timer.
    StartTimer,
    /// Load the block table for the session's version.
    LoadBlocks,
    /// Start the collection loop.
    StartCollection,
    /// Close the session.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    state: State,
    viewer_opened: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub const fn new() -> Self {
        Self {
            state: State::Connecting,
            viewer_opened: false,
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    /// The actions that kick the machine off.
    pub fn start(&self) -> Vec<Action> {
        match self.state {
            State::Connecting => vec![Action::Connect],
            _ => Vec::new(),
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        use self::{Action as A, Event as E, State as S};

        let (next, actions) = match (self.state, event) {
            (S::Done, _) => (S::Done, Vec::new()),

            (S::Connecting, E::Connected) => (S::Authenticating, vec![A::Authenticate]),
            (S::Connecting, E::ConnectFailed) => (S::Connecting, vec![A::ScheduleReconnect]),
            (S::Connecting, E::RetryDue) => (S::Connecting, vec![A::Connect]),

            (S::Authenticating, E::LoggedIn) => {
                let mut actions = Vec::with_capacity(4);
                if !self.viewer_opened {
                    self.viewer_opened = true;
                    actions.push(A::OpenViewer);
                }
                actions.extend([A::Chat(HELLO_MESSAGE), A::StartTimer, A::LoadBlocks]);
                (S::Spawned, actions)
            }
            (S::Authenticating, E::AuthFailed | E::ConnectionLost) => {
                (S::Connecting, vec![A::ScheduleReconnect])
            }

            (S::Spawned, E::BlocksLoaded) => (S::Collecting, vec![A::StartCollection]),
            (S::Collecting, E::CollectionFinished) => (S::Spawned, Vec::new()),

            (S::Spawned | S::Collecting, E::TimerElapsed) => {
                (S::Done, vec![A::Chat(DONE_MESSAGE), A::Quit])
            }
            (S::Spawned | S::Collecting, E::ConnectionLost) => {
                (S::Connecting, vec![A::ScheduleReconnect])
            }

            (state, _) => (state, Vec::new()),
        };

        self.state = next;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &mut Machine, events: &[Event]) -> Vec<Action> {
        events.iter().flat_map(|&e| machine.handle(e)).collect()
    }

    #[test]
    fn starts_by_connecting() {
        let machine = Machine::new();
        assert_eq!(machine.state(), State::Connecting);
        assert_eq!(machine.start(), vec![Action::Connect]);
    }

    #[test]
    fn happy_path() {
        let mut machine = Machine::new();
        assert_eq!(machine.handle(Event::Connected), vec![Action::Authenticate]);
        assert_eq!(machine.state(), State::Authenticating);
        assert_eq!(
            machine.handle(Event::LoggedIn),
            vec![
                Action::OpenViewer,
                Action::Chat(HELLO_MESSAGE),
                Action::StartTimer,
                Action::LoadBlocks,
            ]
        );
        assert_eq!(machine.state(), State::Spawned);
        assert_eq!(machine.handle(Event::BlocksLoaded), vec![Action::StartCollection]);
        assert_eq!(machine.state(), State::Collecting);
        assert!(machine.handle(Event::CollectionFinished).is_empty());
        assert_eq!(machine.state(), State::Spawned);
        assert_eq!(
            machine.handle(Event::TimerElapsed),
            vec![Action::Chat(DONE_MESSAGE), Action::Quit]
        );
        assert_eq!(machine.state(), State::Done);
    }

    #[test]
    fn timer_ends_an_active_collection() {
        let mut machine = Machine::new();
        run(&mut machine, &[Event::Connected, Event::LoggedIn, Event::BlocksLoaded]);
        assert_eq!(machine.state(), State::Collecting);
        assert_eq!(
            machine.handle(Event::TimerElapsed),
            vec![Action::Chat(DONE_MESSAGE), Action::Quit]
        );
        assert_eq!(machine.state(), State::Done);
    }

    #[test]
    fn connect_failures_retry_forever() {
        let mut machine = Machine::new();
        for _ in 0..100 {
            assert_eq!(machine.handle(Event::ConnectFailed), vec![Action::ScheduleReconnect]);
            assert_eq!(machine.handle(Event::RetryDue), vec![Action::Connect]);
            assert_eq!(machine.state(), State::Connecting);
        }
    }

    #[test]
    fn failed_logins_reconnect() {
        let mut machine = Machine::new();
        machine.handle(Event::Connected);
        assert_eq!(machine.handle(Event::AuthFailed), vec![Action::ScheduleReconnect]);
        assert_eq!(machine.state(), State::Connecting);
    }

    #[test]
    fn viewer_opens_once_per_process() {
        let mut machine = Machine::new();
        let first = run(&mut machine, &[Event::Connected, Event::LoggedIn]);
        assert!(first.contains(&Action::OpenViewer));

        assert_eq!(machine.handle(Event::ConnectionLost), vec![Action::ScheduleReconnect]);
        let second = run(
            &mut machine,
            &[Event::RetryDue, Event::Connected, Event::LoggedIn],
        );
        assert!(!second.contains(&Action::OpenViewer));
        assert!(second.contains(&Action::Chat(HELLO_MESSAGE)));
    }

    #[test]
    fn missing_block_table_keeps_the_timer() {
        let mut machine = Machine::new();
        run(&mut machine, &[Event::Connected, Event::LoggedIn]);
        assert!(machine.handle(Event::BlocksUnavailable).is_empty());
        assert_eq!(machine.state(), State::Spawned);
        assert_eq!(
            machine.handle(Event::TimerElapsed),
            vec![Action::Chat(DONE_MESSAGE), Action::Quit]
        );
    }

    #[test]
    fn done_is_final() {
        let mut machine = Machine::new();
        run(
            &mut machine,
            &[Event::Connected, Event::LoggedIn, Event::TimerElapsed],
        );
        for event in [Event::Connected, Event::ConnectionLost, Event::RetryDue] {
            assert!(machine.handle(event).is_empty());
            assert_eq!(machine.state(), State::Done);
        }
    }

    #[test]
    fn out_of_place_events_are_ignored() {
        let mut machine = Machine::new();
        assert!(machine.handle(Event::TimerElapsed).is_empty());
        assert!(machine.handle(Event::CollectionFinished).is_empty());
        assert_eq!(machine.state(), State::Connecting);
    }
}
