//! A desk-side UDS (ISO 14229) ECU simulator.
//!
//! [`Simulator`] is the crate's single entry point: it owns the shared server
//! state (session, security, DID/DTC/memory/routine stores) and the
//! background session-timeout supervisor, and exposes a plain
//! `process(frame) -> frame` control surface plus supervisor lifecycle —
//! leaving transport, framing, and UI entirely to callers.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod seed;
pub mod state;
pub mod supervisor;
pub mod uds;

use std::sync::Arc;

use config::EcuConfig;
use state::ServerState;
use supervisor::SupervisorHandle;

/// The simulated ECU: shared state plus its background supervisor.
pub struct Simulator {
    state: Arc<ServerState>,
    supervisor: Option<SupervisorHandle>,
}

impl Simulator {
    /// Builds a simulator from `config` without starting the supervisor.
    /// Call [`Simulator::start_supervisor`] to begin the timeout loop.
    pub fn new(config: &EcuConfig) -> Self {
        Self {
            state: Arc::new(ServerState::from_config(config)),
            supervisor: None,
        }
    }

    /// The single request/response entry point: accepts one frame, returns
    /// one frame.
    pub fn process(&self, frame: &[u8]) -> Vec<u8> {
        dispatcher::process(&self.state, frame)
    }

    pub fn start_supervisor(&mut self) {
        if self.supervisor.is_none() {
            self.supervisor = Some(supervisor::spawn(Arc::clone(&self.state)));
        }
    }

    pub async fn stop_supervisor(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.stop().await;
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_routes_a_full_request() {
        let sim = Simulator::new(&EcuConfig::default_identity());
        assert_eq!(sim.process(&[0x10, 0x03]), vec![0x50, 0x03, 0x00, 0x32, 0x13, 0x88]);
    }

    #[tokio::test]
    async fn supervisor_starts_and_stops_cleanly() {
        let mut sim = Simulator::new(&EcuConfig::default());
        sim.start_supervisor();
        sim.stop_supervisor().await;
    }
}
