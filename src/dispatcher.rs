//! The request dispatcher and per-service handlers.
//!
//! One function per SID, each validating length and state before mutating
//! `ServerState` and building its response through `uds::positive_response` /
//! `uds::negative_response`.

use tracing::{debug, warn};

use crate::config::AccessLevel;
use crate::state::ServerState;
use crate::uds::{
    comm_control_type, comm_type, dtc_setting_type, dtc_sub_function, negative_response,
    positive_response, reset_type, routine_sub_function, service_id, session_type, standard_did,
    NegativeResponseCode as Nrc,
};

/// Processes one request frame and returns the response frame. An empty
/// frame is malformed against a synthetic SID 0.
pub fn process(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let Some(&sid) = frame.first() else {
        return negative_response(0x00, Nrc::IncorrectMessageLengthOrFormat.into());
    };

    let response = match sid {
        service_id::DIAGNOSTIC_SESSION_CONTROL => diagnostic_session_control(state, frame),
        service_id::ECU_RESET => ecu_reset(state, frame),
        service_id::CLEAR_DIAGNOSTIC_INFO => clear_diagnostic_information(state, frame),
        service_id::READ_DTC_INFO => read_dtc_information(state, frame),
        service_id::READ_DATA_BY_ID => read_data_by_identifier(state, frame),
        service_id::READ_MEMORY_BY_ADDRESS => read_memory_by_address(state, frame),
        service_id::SECURITY_ACCESS => security_access(state, frame),
        service_id::COMMUNICATION_CONTROL => communication_control(state, frame),
        service_id::WRITE_DATA_BY_ID => write_data_by_identifier(state, frame),
        service_id::IO_CONTROL_BY_ID => io_control_by_identifier(state, frame),
        service_id::ROUTINE_CONTROL => routine_control(state, frame),
        service_id::REQUEST_DOWNLOAD
        | service_id::REQUEST_UPLOAD
        | service_id::TRANSFER_DATA
        | service_id::REQUEST_TRANSFER_EXIT
        | service_id::REQUEST_FILE_TRANSFER => {
            negative_response(sid, Nrc::ServiceNotSupported.into())
        }
        service_id::WRITE_MEMORY_BY_ADDRESS => write_memory_by_address(state, frame),
        service_id::TESTER_PRESENT => tester_present(state, frame),
        service_id::CONTROL_DTC_SETTING => control_dtc_setting(state, frame),
        _ => {
            warn!(sid = format!("0x{sid:02X}"), "unrecognized service id");
            negative_response(sid, Nrc::ServiceNotSupported.into())
        }
    };

    debug!(sid = format!("0x{sid:02X}"), response_len = response.len(), "processed request");
    response
}

/// 0x10 DiagnosticSessionControl.
fn diagnostic_session_control(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::DIAGNOSTIC_SESSION_CONTROL;
    if frame.len() != 2 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let sub_function = frame[1];
    if !matches!(
        sub_function,
        session_type::DEFAULT | session_type::PROGRAMMING | session_type::EXTENDED | session_type::SAFETY_SYSTEM
    ) {
        return negative_response(sid, Nrc::SubFunctionNotSupported.into());
    }
    state.set_session(sub_function);
    positive_response(sid, &[sub_function, 0x00, 0x32, 0x13, 0x88])
}

/// 0x11 EcuReset.
fn ecu_reset(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::ECU_RESET;
    if frame.len() != 2 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let sub_function = frame[1];
    if !matches!(sub_function, reset_type::HARD_RESET | reset_type::KEY_ON_OFF | reset_type::SOFT_RESET) {
        return negative_response(sid, Nrc::SubFunctionNotSupported.into());
    }
    if state.session() == session_type::PROGRAMMING && sub_function != reset_type::HARD_RESET {
        return negative_response(sid, Nrc::RequestOutOfRange.into());
    }
    state.reset_to_default();
    positive_response(sid, &[sub_function])
}

/// 0x27 SecurityAccess.
fn security_access(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::SECURITY_ACCESS;
    if frame.len() < 2 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    if !matches!(state.session(), session_type::PROGRAMMING | session_type::EXTENDED) {
        return negative_response(sid, Nrc::ConditionsNotCorrect.into());
    }
    let sub_function = frame[1];
    let is_request_seed = sub_function % 2 == 1;
    let is_send_key = sub_function % 2 == 0 && sub_function != 0;
    if !is_request_seed && !is_send_key {
        return negative_response(sid, Nrc::SubFunctionNotSupported.into());
    }

    let mut security = state.security.write();
    if security.unlocked {
        return negative_response(sid, Nrc::RequestSequenceError.into());
    }
    if is_send_key && !security.seed_sent {
        return negative_response(sid, Nrc::RequestSequenceError.into());
    }
    if is_request_seed && security.seed_sent {
        return negative_response(sid, Nrc::RequestSequenceError.into());
    }

    if is_request_seed {
        let seed = state.seed_source.generate();
        security.seed = seed;
        security.seed_sent = true;
        let mut payload = vec![sub_function];
        payload.extend_from_slice(&seed);
        return positive_response(sid, &payload);
    }

    // Send-key path.
    if frame.len() != 6 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let seed_u32 = u32::from_be_bytes(security.seed);
    let expected = seed_u32 | 0x1122_3344;
    let key_u32 = u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]);
    if key_u32 == expected {
        security.unlocked = true;
        positive_response(sid, &[sub_function])
    } else {
        security.attempts = security.attempts.saturating_add(1);
        negative_response(sid, Nrc::SecurityAccessDenied.into())
    }
}

/// 0x28 CommunicationControl.
fn communication_control(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::COMMUNICATION_CONTROL;
    if frame.len() < 3 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    if !matches!(state.session(), session_type::PROGRAMMING | session_type::EXTENDED) {
        return negative_response(sid, Nrc::ConditionsNotCorrect.into());
    }
    let sub_function = frame[1];
    if !matches!(
        sub_function,
        comm_control_type::ENABLE_RX_TX
            | comm_control_type::ENABLE_RX_DISABLE_TX
            | comm_control_type::DISABLE_RX_ENABLE_TX
            | comm_control_type::DISABLE_RX_TX
    ) {
        return negative_response(sid, Nrc::SubFunctionNotSupported.into());
    }
    let communication_type = frame[2];
    if !matches!(
        communication_type,
        comm_type::NORMAL_COMMUNICATION | comm_type::NETWORK_MANAGEMENT | comm_type::NORMAL_AND_NETWORK_MANAGEMENT
    ) {
        return negative_response(sid, Nrc::RequestOutOfRange.into());
    }
    positive_response(sid, &frame[1..])
}

/// 0x3E TesterPresent.
fn tester_present(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    use crate::uds::tester_present_type;
    let sid = service_id::TESTER_PRESENT;
    if frame.len() != 2 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let sub_function = frame[1];
    if !matches!(sub_function, tester_present_type::ZERO | tester_present_type::ZERO_SUPPRESS_RESPONSE) {
        return negative_response(sid, Nrc::SubFunctionNotSupported.into());
    }
    state.tester_present.store(true, std::sync::atomic::Ordering::SeqCst);
    if sub_function == tester_present_type::ZERO_SUPPRESS_RESPONSE {
        Vec::new()
    } else {
        positive_response(sid, &[sub_function])
    }
}

/// Checks a DID's configured access level against current session/security
/// state. Every default-identity DID is `Public`, so this is a no-op unless a
/// config opts a DID into `Extended`/`Protected`.
fn access_denied_nrc(state: &ServerState, access: AccessLevel) -> Option<u8> {
    match access {
        AccessLevel::Public => None,
        AccessLevel::Extended => (state.session() == session_type::DEFAULT)
            .then_some(Nrc::RequestOutOfRange.into()),
        AccessLevel::Protected => (!state.is_unlocked()).then_some(Nrc::SecurityAccessDenied.into()),
    }
}

/// 0x22 ReadDataByIdentifier.
fn read_data_by_identifier(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::READ_DATA_BY_ID;
    if frame.len() != 3 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let did = u16::from_be_bytes([frame[1], frame[2]]);
    if did == standard_did::ACTIVE_DIAGNOSTIC_SESSION {
        return positive_response(sid, &[frame[1], frame[2], state.session()]);
    }
    let parameters = state.parameters.read();
    match parameters.get(&did) {
        Some(parameter) => {
            if let Some(nrc) = access_denied_nrc(state, parameter.access) {
                return negative_response(sid, nrc);
            }
            let mut payload = vec![frame[1], frame[2]];
            payload.extend_from_slice(&parameter.value);
            positive_response(sid, &payload)
        }
        None => negative_response(sid, Nrc::RequestOutOfRange.into()),
    }
}

/// 0x2E WriteDataByIdentifier.
fn write_data_by_identifier(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::WRITE_DATA_BY_ID;
    if frame.len() < 4 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let did = u16::from_be_bytes([frame[1], frame[2]]);
    let mut parameters = state.parameters.write();
    match parameters.get_mut(&did) {
        Some(parameter) if parameter.writable => {
            if let Some(nrc) = access_denied_nrc(state, parameter.access) {
                return negative_response(sid, nrc);
            }
            parameter.value = frame[3..].to_vec();
            positive_response(sid, &[frame[1], frame[2]])
        }
        _ => negative_response(sid, Nrc::RequestOutOfRange.into()),
    }
}

/// 0x23 ReadMemoryByAddress.
fn read_memory_by_address(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::READ_MEMORY_BY_ADDRESS;
    if frame.len() != 5 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let address = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
    let memory = state.memory.read();
    match memory.get(&address) {
        Some(bytes) => positive_response(sid, bytes),
        None => negative_response(sid, Nrc::RequestOutOfRange.into()),
    }
}

/// 0x3D WriteMemoryByAddress.
fn write_memory_by_address(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::WRITE_MEMORY_BY_ADDRESS;
    if frame.len() < 6 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let address = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
    state.memory.write().insert(address, frame[5..].to_vec());
    positive_response(sid, &[])
}

/// 0x14 ClearDiagnosticInformation.
fn clear_diagnostic_information(state: &ServerState, _frame: &[u8]) -> Vec<u8> {
    let sid = service_id::CLEAR_DIAGNOSTIC_INFO;
    if !state.dtc_setting_enabled.load(std::sync::atomic::Ordering::SeqCst) {
        return negative_response(sid, Nrc::ConditionsNotCorrect.into());
    }
    state.dtcs.write().clear();
    positive_response(sid, &[])
}

/// 0x19 ReadDtcInformation.
fn read_dtc_information(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::READ_DTC_INFO;
    if frame.len() < 2 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let sub_function = frame[1];
    match sub_function {
        dtc_sub_function::REPORT_NUMBER_BY_STATUS_MASK => {
            if frame.len() < 3 {
                return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
            }
            let status_mask = frame[2];
            let count = state
                .dtcs
                .read()
                .iter()
                .filter(|dtc| dtc.matches_mask(status_mask))
                .count() as u8;
            positive_response(sid, &[sub_function, status_mask, 0x01, count])
        }
        dtc_sub_function::REPORT_BY_STATUS_MASK => {
            if frame.len() < 3 {
                return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
            }
            let status_mask = frame[2];
            let mut payload = vec![sub_function, status_mask];
            for dtc in state.dtcs.read().iter() {
                payload.extend_from_slice(&dtc.code);
                payload.push(dtc.status);
            }
            positive_response(sid, &payload)
        }
        _ => negative_response(sid, Nrc::SubFunctionNotSupported.into()),
    }
}

/// 0x2F InputOutputControlByIdentifier.
fn io_control_by_identifier(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::IO_CONTROL_BY_ID;
    if frame.len() < 4 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let did = u16::from_be_bytes([frame[1], frame[2]]);
    state.io_status.write().insert(did, frame[3]);
    positive_response(sid, &[frame[1], frame[2]])
}

/// 0x31 RoutineControl.
fn routine_control(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::ROUTINE_CONTROL;
    if frame.len() < 4 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let sub_function = frame[1];
    let routine_id = u16::from_be_bytes([frame[2], frame[3]]);
    match sub_function {
        routine_sub_function::START_ROUTINE => {
            state.routine_status.write().insert(routine_id, true);
            positive_response(sid, &[sub_function, frame[2], frame[3]])
        }
        routine_sub_function::STOP_ROUTINE => {
            state.routine_status.write().insert(routine_id, false);
            positive_response(sid, &[sub_function, frame[2], frame[3]])
        }
        routine_sub_function::REQUEST_ROUTINE_RESULTS => {
            if !state.routine_status.read().contains_key(&routine_id) {
                return negative_response(sid, Nrc::RequestOutOfRange.into());
            }
            let result = state
                .routine_results
                .get(&routine_id)
                .cloned()
                .unwrap_or_else(|| vec![0x01, 0x02, 0x03]);
            let mut payload = vec![sub_function, frame[2], frame[3]];
            payload.extend_from_slice(&result);
            positive_response(sid, &payload)
        }
        _ => negative_response(sid, Nrc::SubFunctionNotSupported.into()),
    }
}

/// 0x85 ControlDTCSetting: toggles whether new DTCs can be set/cleared.
fn control_dtc_setting(state: &ServerState, frame: &[u8]) -> Vec<u8> {
    let sid = service_id::CONTROL_DTC_SETTING;
    if frame.len() != 2 {
        return negative_response(sid, Nrc::IncorrectMessageLengthOrFormat.into());
    }
    let sub_function = frame[1];
    match sub_function {
        dtc_setting_type::ON => {
            state.dtc_setting_enabled.store(true, std::sync::atomic::Ordering::SeqCst);
            positive_response(sid, &[sub_function])
        }
        dtc_setting_type::OFF => {
            state.dtc_setting_enabled.store(false, std::sync::atomic::Ordering::SeqCst);
            positive_response(sid, &[sub_function])
        }
        _ => negative_response(sid, Nrc::SubFunctionNotSupported.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcuConfig;
    use crate::seed::FixedSeedSource;

    fn fixture() -> ServerState {
        ServerState::with_seed_source(&EcuConfig::default_identity(), FixedSeedSource([0x11, 0x22, 0x33, 0x44]))
    }

    #[test]
    fn empty_frame_is_malformed() {
        let state = fixture();
        assert_eq!(process(&state, &[]), vec![0x7F, 0x00, 0x13]);
    }

    #[test]
    fn unknown_sid_is_service_not_supported() {
        let state = fixture();
        assert_eq!(process(&state, &[0xC0]), vec![0x7F, 0xC0, 0x11]);
    }

    #[test]
    fn enters_extended_session() {
        let state = fixture();
        assert_eq!(process(&state, &[0x10, 0x03]), vec![0x50, 0x03, 0x00, 0x32, 0x13, 0x88]);
    }

    #[test]
    fn dsc_bad_subfunction() {
        let state = fixture();
        assert_eq!(process(&state, &[0x10, 0x05]), vec![0x7F, 0x10, 0x12]);
    }

    #[test]
    fn security_access_full_sequence() {
        let state = fixture();
        process(&state, &[0x10, 0x03]);
        let seed_resp = process(&state, &[0x27, 0x01]);
        assert_eq!(seed_resp, vec![0x67, 0x01, 0x11, 0x22, 0x33, 0x44]);

        let expected_key = 0x1122_3344u32 | 0x1122_3344;
        let key_bytes = expected_key.to_be_bytes();
        let mut request = vec![0x27, 0x02];
        request.extend_from_slice(&key_bytes);
        assert_eq!(process(&state, &request), vec![0x67, 0x02]);

        assert_eq!(process(&state, &[0x27, 0x01]), vec![0x7F, 0x27, 0x24]);
    }

    #[test]
    fn security_access_requires_non_default_session() {
        let state = fixture();
        assert_eq!(process(&state, &[0x27, 0x01]), vec![0x7F, 0x27, 0x22]);
    }

    #[test]
    fn read_active_session() {
        let state = fixture();
        assert_eq!(process(&state, &[0x22, 0xF1, 0x86]), vec![0x62, 0xF1, 0x86, 0x01]);
    }

    #[test]
    fn read_unknown_did() {
        let state = fixture();
        assert_eq!(process(&state, &[0x22, 0xAB, 0xCD]), vec![0x7F, 0x22, 0x31]);
    }

    #[test]
    fn clear_dtc_gated_by_dtc_setting_flag() {
        let state = fixture();
        process(&state, &[0x85, 0x02]);
        assert_eq!(process(&state, &[0x14]), vec![0x7F, 0x14, 0x22]);
        process(&state, &[0x85, 0x01]);
        assert_eq!(process(&state, &[0x14]), vec![0x54]);
    }

    #[test]
    fn tester_present_zero_and_suppressed() {
        let state = fixture();
        assert_eq!(process(&state, &[0x3E, 0x00]), vec![0x7E, 0x00]);
        assert_eq!(process(&state, &[0x3E, 0x80]), Vec::<u8>::new());
    }

    #[test]
    fn write_then_read_writable_did() {
        let state = fixture();
        let write_resp = process(&state, &[0x2E, 0xF1, 0x8C, b'X', b'Y', b'Z']);
        assert_eq!(write_resp, vec![0x6E, 0xF1, 0x8C]);
        let read_resp = process(&state, &[0x22, 0xF1, 0x8C]);
        assert_eq!(read_resp, vec![0x62, 0xF1, 0x8C, b'X', b'Y', b'Z']);
    }

    #[test]
    fn write_then_read_memory_address() {
        let state = fixture();
        let write_resp = process(&state, &[0x3D, 0x00, 0x00, 0x10, 0x00, 0xAA, 0xBB]);
        assert_eq!(write_resp, vec![0x7D]);
        let read_resp = process(&state, &[0x23, 0x00, 0x00, 0x10, 0x00]);
        assert_eq!(read_resp, vec![0x63, 0xAA, 0xBB]);
    }

    #[test]
    fn read_unknown_memory_address_is_out_of_range() {
        let state = fixture();
        assert_eq!(process(&state, &[0x23, 0xDE, 0xAD, 0xBE, 0xEF]), vec![0x7F, 0x23, 0x31]);
    }

    #[test]
    fn ecu_reset_clears_security_and_session() {
        let state = fixture();
        process(&state, &[0x10, 0x03]);
        assert_eq!(process(&state, &[0x11, 0x01]), vec![0x51, 0x01]);
        assert!(state.is_default_session());
        assert!(!state.is_unlocked());
    }

    #[test]
    fn routine_control_round_trip() {
        let state = fixture();
        assert_eq!(process(&state, &[0x31, 0x01, 0xFF, 0x01]), vec![0x71, 0x01, 0xFF, 0x01]);
        assert_eq!(
            process(&state, &[0x31, 0x03, 0xFF, 0x01]),
            vec![0x71, 0x03, 0xFF, 0x01, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn routine_results_for_untracked_routine_is_out_of_range() {
        let state = fixture();
        assert_eq!(process(&state, &[0x31, 0x03, 0x00, 0x01]), vec![0x7F, 0x31, 0x31]);
    }

    #[test]
    fn protected_did_denies_read_until_unlocked() {
        let state = fixture();
        state
            .parameters
            .write()
            .insert(0x1234, crate::config::ParameterDef {
                did: 0x1234,
                id: "secret".to_string(),
                value: vec![0x01],
                access: AccessLevel::Protected,
                writable: false,
            });
        assert_eq!(process(&state, &[0x22, 0x12, 0x34]), vec![0x7F, 0x22, 0x33]);
        state.security.write().unlocked = true;
        assert_eq!(process(&state, &[0x22, 0x12, 0x34]), vec![0x62, 0x12, 0x34, 0x01]);
    }

    #[test]
    fn upload_download_family_is_service_not_supported() {
        let state = fixture();
        for sid in [0x34, 0x35, 0x36, 0x37, 0x38] {
            assert_eq!(process(&state, &[sid]), vec![0x7F, sid, 0x11]);
        }
    }
}
