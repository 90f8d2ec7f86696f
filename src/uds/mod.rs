//! UDS (ISO 14229) protocol constants and frame construction.
//!
//! This module holds the wire-level vocabulary the rest of the simulator is built
//! on: service identifiers, sub-functions, negative response codes, and the two
//! frame builders every handler returns through.

mod dtc;
mod nrc;

pub use dtc::{status_bit, Dtc};
pub use nrc::NegativeResponseCode;

/// UDS Service Identifiers (request SID). Positive responses echo `SID + 0x40`.
#[allow(dead_code)]
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const CLEAR_DIAGNOSTIC_INFO: u8 = 0x14;
    pub const READ_DTC_INFO: u8 = 0x19;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const READ_MEMORY_BY_ADDRESS: u8 = 0x23;
    pub const READ_SCALING_DATA_BY_ID: u8 = 0x24;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const COMMUNICATION_CONTROL: u8 = 0x28;
    pub const READ_DATA_BY_PERIODIC_ID: u8 = 0x2A;
    pub const DYNAMICALLY_DEFINE_DATA_ID: u8 = 0x2C;
    pub const WRITE_DATA_BY_ID: u8 = 0x2E;
    pub const IO_CONTROL_BY_ID: u8 = 0x2F;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const REQUEST_UPLOAD: u8 = 0x35;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const REQUEST_FILE_TRANSFER: u8 = 0x38;
    pub const WRITE_MEMORY_BY_ADDRESS: u8 = 0x3D;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const ACCESS_TIMING_PARAMETER: u8 = 0x83;
    pub const SECURED_DATA_TRANSMISSION: u8 = 0x84;
    pub const CONTROL_DTC_SETTING: u8 = 0x85;
    pub const RESPONSE_ON_EVENT: u8 = 0x86;
    pub const LINK_CONTROL: u8 = 0x87;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// DiagnosticSessionControl (0x10) sub-functions.
pub mod session_type {
    pub const DEFAULT: u8 = 0x01;
    pub const PROGRAMMING: u8 = 0x02;
    pub const EXTENDED: u8 = 0x03;
    pub const SAFETY_SYSTEM: u8 = 0x04;
}

/// EcuReset (0x11) sub-functions.
pub mod reset_type {
    pub const HARD_RESET: u8 = 0x01;
    pub const KEY_ON_OFF: u8 = 0x02;
    pub const SOFT_RESET: u8 = 0x03;
}

/// CommunicationControl (0x28) sub-functions.
pub mod comm_control_type {
    pub const ENABLE_RX_TX: u8 = 0x00;
    pub const ENABLE_RX_DISABLE_TX: u8 = 0x01;
    pub const DISABLE_RX_ENABLE_TX: u8 = 0x02;
    pub const DISABLE_RX_TX: u8 = 0x03;
}

/// CommunicationControl (0x28) communication-type byte.
pub mod comm_type {
    pub const NORMAL_COMMUNICATION: u8 = 0x00;
    pub const NETWORK_MANAGEMENT: u8 = 0x01;
    pub const NORMAL_AND_NETWORK_MANAGEMENT: u8 = 0x02;
}

/// TesterPresent (0x3E) sub-functions.
pub mod tester_present_type {
    pub const ZERO: u8 = 0x00;
    pub const ZERO_SUPPRESS_RESPONSE: u8 = 0x80;
}

/// RoutineControl (0x31) sub-functions.
pub mod routine_sub_function {
    pub const START_ROUTINE: u8 = 0x01;
    pub const STOP_ROUTINE: u8 = 0x02;
    pub const REQUEST_ROUTINE_RESULTS: u8 = 0x03;
}

/// ReadDTCInformation (0x19) sub-functions.
pub mod dtc_sub_function {
    pub const REPORT_NUMBER_BY_STATUS_MASK: u8 = 0x01;
    pub const REPORT_BY_STATUS_MASK: u8 = 0x02;
}

/// InputOutputControlById (0x2F) control options.
pub mod io_control_option {
    pub const RETURN_CONTROL_TO_ECU: u8 = 0x00;
    pub const RESET_TO_DEFAULT: u8 = 0x01;
    pub const FREEZE_CURRENT_STATE: u8 = 0x02;
    pub const SHORT_TERM_ADJUSTMENT: u8 = 0x03;
}

/// ControlDTCSetting (0x85) sub-functions.
pub mod dtc_setting_type {
    pub const ON: u8 = 0x01;
    pub const OFF: u8 = 0x02;
}

/// DynamicallyDefineDataIdentifier (0x2C) sub-functions.
pub mod ddid_sub_function {
    pub const DEFINE_BY_IDENTIFIER: u8 = 0x01;
    pub const CLEAR_DYNAMICALLY_DEFINED_DATA_ID: u8 = 0x03;
}

/// ReadDataByPeriodicIdentifier (0x2A) transmission modes.
pub mod periodic_mode {
    pub const SEND_SLOW: u8 = 0x01;
    pub const SEND_MEDIUM: u8 = 0x02;
    pub const SEND_FAST: u8 = 0x03;
    pub const STOP_SENDING: u8 = 0x04;
}

/// LinkControl (0x87) sub-functions.
pub mod link_control_sub_function {
    pub const VERIFY_FIXED_BAUD_RATE: u8 = 0x01;
    pub const TRANSITION_BAUD_RATE: u8 = 0x03;
}

/// LinkControl (0x87) fixed baud rate identifiers.
pub mod link_baud_rate {
    pub const CAN_125K: u8 = 0x10;
    pub const CAN_250K: u8 = 0x11;
    pub const CAN_500K: u8 = 0x12;
    pub const CAN_1M: u8 = 0x13;
}

/// Standard UDS Data Identifiers (ISO 14229-1 Annex C) used for ECU identity.
pub mod standard_did {
    pub const ACTIVE_DIAGNOSTIC_SESSION: u16 = 0xF186;
    pub const VIN: u16 = 0xF190;
    pub const SPARE_PART_NUMBER: u16 = 0xF187;
    pub const ECU_SOFTWARE_NUMBER: u16 = 0xF188;
    pub const ECU_SOFTWARE_VERSION: u16 = 0xF189;
    pub const SYSTEM_SUPPLIER_ID: u16 = 0xF18A;
    pub const ECU_MANUFACTURING_DATE: u16 = 0xF18B;
    pub const ECU_SERIAL_NUMBER: u16 = 0xF18C;
    pub const PROGRAMMING_DATE: u16 = 0xF199;
}

/// Build a positive response frame: `[SID + 0x40, payload...]`.
pub fn positive_response(sid: u8, payload: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(1 + payload.len());
    response.push(sid.wrapping_add(0x40));
    response.extend_from_slice(payload);
    response
}

/// Build a negative response frame: `[0x7F, SID, NRC]`.
pub fn negative_response(sid: u8, nrc: u8) -> Vec<u8> {
    vec![service_id::NEGATIVE_RESPONSE, sid, nrc]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_response_sets_high_bit_of_sid() {
        let resp = positive_response(service_id::DIAGNOSTIC_SESSION_CONTROL, &[0x03]);
        assert_eq!(resp, vec![0x50, 0x03]);
    }

    #[test]
    fn negative_response_is_three_bytes() {
        let resp = negative_response(service_id::SECURITY_ACCESS, NegativeResponseCode::RequestSequenceError.into());
        assert_eq!(resp, vec![0x7F, 0x27, 0x24]);
    }
}
