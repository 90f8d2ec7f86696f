//! Session supervisor: a background task that reverts a non-default session
//! to Default after inactivity, unless the tester-present flag holds it open.
//! Runs as a cancellable tokio task, ticking at a configurable interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::info;

use crate::state::ServerState;

/// A handle to a running supervisor task. Calling `stop` signals cancellation;
/// the loop exits within one tick.
pub struct SupervisorHandle {
    cancel: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl SupervisorHandle {
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.task.await;
    }
}

/// Spawns the supervisor loop against `state`, ticking at `state.tick_ms`.
pub fn spawn(state: Arc<ServerState>) -> SupervisorHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let tick_ms = state.tick_ms;

    let task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(tick_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick(&state);
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("session supervisor stopping");
                        break;
                    }
                }
            }
        }
    });

    SupervisorHandle { cancel: cancel_tx, task }
}

/// One supervisor tick, exposed separately so tests can drive it
/// deterministically instead of sleeping on wall-clock time.
pub fn tick(state: &ServerState) {
    use std::sync::atomic::Ordering;
    use crate::uds::session_type;

    if state.tester_present.load(Ordering::SeqCst) {
        state.touch_session_change();
        return;
    }
    if state.session() != session_type::DEFAULT
        && state.milliseconds_since_session_change() >= state.session_timeout_ms
    {
        state.revert_to_default_session();
        info!("session timed out, reverted to default");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcuConfig;
    use crate::uds::session_type;
    use std::sync::atomic::Ordering;

    #[test]
    fn reverts_session_after_timeout() {
        let mut config = EcuConfig::default();
        config.timeout.session_timeout_ms = 0;
        let state = ServerState::from_config(&config);
        state.set_session(session_type::EXTENDED);
        tick(&state);
        assert!(state.is_default_session());
    }

    #[test]
    fn tester_present_holds_session_open() {
        let mut config = EcuConfig::default();
        config.timeout.session_timeout_ms = 0;
        let state = ServerState::from_config(&config);
        state.set_session(session_type::EXTENDED);
        state.tester_present.store(true, Ordering::SeqCst);
        tick(&state);
        assert_eq!(state.session(), session_type::EXTENDED);
    }

    #[tokio::test]
    async fn spawn_and_stop_completes() {
        let state = Arc::new(ServerState::from_config(&EcuConfig::default()));
        let handle = spawn(state);
        handle.stop().await;
    }
}
