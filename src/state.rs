//! Shared mutable ECU state: the session/security state machine, the DID/memory/
//! DTC/routine/I-O-status stores, and the bookkeeping the session supervisor reads.
//!
//! One struct owns every piece of shared state behind `parking_lot` locks,
//! with atomics for the hot scalar fields (active session, tester-present).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::config::{EcuConfig, ParameterDef};
use crate::seed::SeedSource;
use crate::uds::{session_type, Dtc};

#[derive(Debug, Clone)]
pub struct SecurityState {
    pub seed: [u8; 4],
    pub seed_sent: bool,
    pub unlocked: bool,
    pub attempts: u8,
}

impl Default for SecurityState {
    fn default() -> Self {
        Self {
            seed: [0; 4],
            seed_sent: false,
            unlocked: false,
            attempts: 0,
        }
    }
}

/// The complete shared state of one simulated ECU.
///
/// Handlers in `dispatcher` take `&ServerState` and mutate through the locks
/// directly rather than holding a back-reference to some owning server
/// object.
pub struct ServerState {
    pub session: AtomicU8,
    pub security: RwLock<SecurityState>,
    pub last_session_change: RwLock<Instant>,
    pub tester_present: AtomicBool,
    pub dtc_setting_enabled: AtomicBool,
    pub parameters: RwLock<HashMap<u16, ParameterDef>>,
    pub dtcs: RwLock<Vec<Dtc>>,
    pub memory: RwLock<HashMap<u32, Vec<u8>>>,
    pub io_status: RwLock<HashMap<u16, u8>>,
    pub routine_status: RwLock<HashMap<u16, bool>>,
    pub routine_results: HashMap<u16, Vec<u8>>,
    pub seed_source: Box<dyn SeedSource>,
    pub clear_security_on_timeout: bool,
    pub session_timeout_ms: u64,
    pub tick_ms: u64,
}

impl ServerState {
    pub fn from_config(config: &EcuConfig) -> Self {
        Self::with_seed_source(config, crate::seed::RandSeedSource::default())
    }

    pub fn with_seed_source(config: &EcuConfig, seed_source: impl SeedSource + 'static) -> Self {
        let parameters = config
            .parameters
            .iter()
            .cloned()
            .map(|p| (p.did, p))
            .collect();
        let dtcs = config
            .dtcs
            .iter()
            .map(|d| Dtc::new(d.bytes, d.status))
            .collect();
        let routine_results = config
            .routines
            .iter()
            .filter(|r| !r.result.is_empty())
            .map(|r| (r.id, r.result.clone()))
            .collect();

        Self {
            session: AtomicU8::new(session_type::DEFAULT),
            security: RwLock::new(SecurityState::default()),
            last_session_change: RwLock::new(Instant::now()),
            tester_present: AtomicBool::new(false),
            dtc_setting_enabled: AtomicBool::new(true),
            parameters: RwLock::new(parameters),
            dtcs: RwLock::new(dtcs),
            memory: RwLock::new(HashMap::new()),
            io_status: RwLock::new(HashMap::new()),
            routine_status: RwLock::new(HashMap::new()),
            routine_results,
            seed_source: Box::new(seed_source),
            clear_security_on_timeout: config.timeout.clear_security_on_timeout,
            session_timeout_ms: config.timeout.session_timeout_ms,
            tick_ms: config.timeout.tick_ms,
        }
    }

    pub fn session(&self) -> u8 {
        self.session.load(Ordering::SeqCst)
    }

    pub fn is_default_session(&self) -> bool {
        self.session() == session_type::DEFAULT
    }

    pub fn is_unlocked(&self) -> bool {
        self.security.read().unlocked
    }

    /// DiagnosticSessionControl's success path: changes the active session
    /// and records the change time. Security state is deliberately left
    /// untouched — leaving a security-capable session does not automatically
    /// re-lock.
    pub fn set_session(&self, session: u8) {
        self.session.store(session, Ordering::SeqCst);
        *self.last_session_change.write() = Instant::now();
    }

    /// EcuReset's success path: restores Default and clears the full
    /// security handshake.
    pub fn reset_to_default(&self) {
        self.session.store(session_type::DEFAULT, Ordering::SeqCst);
        *self.security.write() = SecurityState::default();
        *self.last_session_change.write() = Instant::now();
    }

    /// The session supervisor's timeout path. Whether this also clears
    /// `unlocked` is configurable; it defaults to "no" since a timeout alone
    /// doesn't imply the tester's unlock should be revoked.
    pub fn revert_to_default_session(&self) {
        self.session.store(session_type::DEFAULT, Ordering::SeqCst);
        if self.clear_security_on_timeout {
            *self.security.write() = SecurityState::default();
        }
        *self.last_session_change.write() = Instant::now();
    }

    pub fn touch_session_change(&self) {
        *self.last_session_change.write() = Instant::now();
    }

    pub fn milliseconds_since_session_change(&self) -> u64 {
        self.last_session_change.read().elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_default_session_locked() {
        let state = ServerState::from_config(&EcuConfig::default());
        assert!(state.is_default_session());
        assert!(!state.is_unlocked());
    }

    #[test]
    fn session_change_does_not_clear_security() {
        let state = ServerState::from_config(&EcuConfig::default());
        state.security.write().unlocked = true;
        state.set_session(session_type::DEFAULT);
        assert!(state.is_unlocked());
    }

    #[test]
    fn reset_clears_security_and_session() {
        let state = ServerState::from_config(&EcuConfig::default());
        state.set_session(session_type::EXTENDED);
        state.security.write().unlocked = true;
        state.reset_to_default();
        assert!(state.is_default_session());
        assert!(!state.is_unlocked());
    }

    #[test]
    fn revert_to_default_keeps_security_unless_configured() {
        let config = EcuConfig::default();
        let state = ServerState::from_config(&config);
        state.session.store(session_type::EXTENDED, Ordering::SeqCst);
        state.security.write().unlocked = true;
        state.revert_to_default_session();
        assert!(state.is_default_session());
        assert!(state.is_unlocked());
    }
}
