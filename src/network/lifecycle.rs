//! Connection lifecycle as an explicit state machine.
//!
//! Socket callbacks become [`LinkEvent`]s; the machine answers with the
//! [`LinkAction`]s the driver must perform. Keeping this free of I/O is what
//! makes the reconnect rules testable.

use std::time::Duration;

use super::state::ConnectionState;

/// Something that happened to the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Initial connect request.
    ConnectRequested,
    /// The websocket handshake completed.
    Opened,
    /// The peer or the stream closed the connection.
    Closed(String),
    /// Dial or socket error.
    Failed(String),
    /// The scheduled reconnect delay elapsed.
    ReconnectDue,
    /// The pipeline is stopping.
    Shutdown,
}

/// Work the driver must do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    Dial,
    StartHeartbeat,
    StopHeartbeat,
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Close the socket (if any) and stop driving the link.
    Disconnect,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    reconnect_delay: Duration,
    /// A dial is in flight.
    starting: bool,
    /// A reconnect timer is armed.
    reconnect_pending: bool,
    heartbeat_running: bool,
    stopped: bool,
}

impl Lifecycle {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_delay,
            starting: false,
            reconnect_pending: false,
            heartbeat_running: false,
            stopped: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkAction> {
        match event {
            LinkEvent::ConnectRequested => self.begin_dial(),
            LinkEvent::ReconnectDue => {
                self.reconnect_pending = false;
                self.begin_dial()
            }
            LinkEvent::Opened => {
                self.starting = false;
                if self.stopped {
                    return vec![LinkAction::Disconnect];
                }
                self.state = ConnectionState::Connected;
                self.heartbeat_running = true;
                vec![LinkAction::StartHeartbeat]
            }
            LinkEvent::Closed(_) | LinkEvent::Failed(_) => self.link_lost(),
            LinkEvent::Shutdown => {
                self.stopped = true;
                self.starting = false;
                self.state = ConnectionState::Closing;
                let mut actions = self.stop_heartbeat();
                if self.reconnect_pending {
                    self.reconnect_pending = false;
                    actions.push(LinkAction::CancelReconnect);
                }
                actions.push(LinkAction::Disconnect);
                self.state = ConnectionState::Disconnected;
                actions
            }
        }
    }

    fn begin_dial(&mut self) -> Vec<LinkAction> {
        if self.stopped || self.starting || self.state == ConnectionState::Connected {
            return Vec::new();
        }
        self.starting = true;
        self.state = ConnectionState::Connecting;
        vec![LinkAction::Dial]
    }

    fn link_lost(&mut self) -> Vec<LinkAction> {
        self.starting = false;
        let mut actions = self.stop_heartbeat();
        if self.stopped {
            self.state = ConnectionState::Disconnected;
            return actions;
        }
        self.state = ConnectionState::Reconnecting;
        if !self.reconnect_pending {
            self.reconnect_pending = true;
            actions.push(LinkAction::ScheduleReconnect(self.reconnect_delay));
        }
        actions
    }

    fn stop_heartbeat(&mut self) -> Vec<LinkAction> {
        if std::mem::take(&mut self.heartbeat_running) {
            vec![LinkAction::StopHeartbeat]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(5);

    fn connected() -> Lifecycle {
        let mut link = Lifecycle::new(DELAY);
        assert_eq!(link.handle(LinkEvent::ConnectRequested), vec![LinkAction::Dial]);
        assert_eq!(link.handle(LinkEvent::Opened), vec![LinkAction::StartHeartbeat]);
        link
    }

    #[test]
    fn test_connect_flow() {
        let link = connected();
        assert_eq!(link.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_close_schedules_one_reconnect() {
        let mut link = connected();

        assert_eq!(
            link.handle(LinkEvent::Closed("going away".to_string())),
            vec![LinkAction::StopHeartbeat, LinkAction::ScheduleReconnect(DELAY)]
        );
        // Second close in quick succession: nothing new is scheduled.
        assert!(link.handle(LinkEvent::Closed("again".to_string())).is_empty());
        assert!(link.handle(LinkEvent::Failed("reset".to_string())).is_empty());
        assert!(link.is_reconnect_pending());
        assert_eq!(link.state(), ConnectionState::Reconnecting);

        assert_eq!(link.handle(LinkEvent::ReconnectDue), vec![LinkAction::Dial]);
        assert_eq!(link.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_starting_guard() {
        let mut link = Lifecycle::new(DELAY);
        assert_eq!(link.handle(LinkEvent::ConnectRequested), vec![LinkAction::Dial]);
        assert!(link.handle(LinkEvent::ConnectRequested).is_empty());
        assert!(link.handle(LinkEvent::ReconnectDue).is_empty());
    }

    #[test]
    fn test_failed_dial_retries_forever() {
        let mut link = Lifecycle::new(DELAY);
        link.handle(LinkEvent::ConnectRequested);

        for _ in 0..10 {
            assert_eq!(
                link.handle(LinkEvent::Failed("refused".to_string())),
                vec![LinkAction::ScheduleReconnect(DELAY)]
            );
            assert_eq!(link.handle(LinkEvent::ReconnectDue), vec![LinkAction::Dial]);
        }
    }

    #[test]
    fn test_shutdown_cancels_and_never_rearms() {
        let mut link = connected();
        link.handle(LinkEvent::Closed("bye".to_string()));

        assert_eq!(
            link.handle(LinkEvent::Shutdown),
            vec![LinkAction::CancelReconnect, LinkAction::Disconnect]
        );
        assert!(link.is_stopped());
        assert!(link.handle(LinkEvent::ReconnectDue).is_empty());
        assert!(link.handle(LinkEvent::Failed("late".to_string())).is_empty());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_shutdown_while_connected_stops_heartbeat() {
        let mut link = connected();
        assert_eq!(
            link.handle(LinkEvent::Shutdown),
            vec![LinkAction::StopHeartbeat, LinkAction::Disconnect]
        );
    }

    #[test]
    fn test_open_after_shutdown_disconnects() {
        let mut link = Lifecycle::new(DELAY);
        link.handle(LinkEvent::ConnectRequested);
        link.handle(LinkEvent::Shutdown);
        assert_eq!(link.handle(LinkEvent::Opened), vec![LinkAction::Disconnect]);
    }
}
