//! Data-driven ECU configuration.
//!
//! DIDs, DTCs, and routines are described declaratively (TOML or YAML) rather
//! than hard-coded per ECU variant, so the same binary can impersonate
//! different vehicles for desk-side testing.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::uds::standard_did;

/// Access level required to read or write a simulated parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Readable/writable in any session, no security needed.
    Public,
    /// Requires the extended diagnostic session (0x03).
    Extended,
    /// Requires SecurityAccess (0x27) to be unlocked.
    Protected,
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Public
    }
}

/// A single DID definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    #[serde(deserialize_with = "deserialize_hex_u16")]
    pub did: u16,
    /// Human-readable identifier, for logging only.
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_hex_bytes_vec")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub access: AccessLevel,
    #[serde(default)]
    pub writable: bool,
}

fn default_dtc_status() -> u8 {
    0x09 // test_failed + confirmed
}

/// A single stored-DTC definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtcDef {
    #[serde(deserialize_with = "deserialize_dtc_bytes")]
    pub bytes: [u8; 3],
    #[serde(default = "default_dtc_status", deserialize_with = "deserialize_hex_u8")]
    pub status: u8,
}

/// A single routine definition for RoutineControl (0x31). `result`, when
/// non-empty, overrides the default `[0x01, 0x02, 0x03]` RequestRoutineResults
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineDef {
    #[serde(deserialize_with = "deserialize_hex_u16")]
    pub id: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_hex_bytes_vec")]
    pub result: Vec<u8>,
}

/// Session-supervisor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Whether timing out a non-default session back to Default also clears
    /// `unlocked`. Off by default: a session timeout alone does not imply the
    /// tester lost its unlock.
    #[serde(default)]
    pub clear_security_on_timeout: bool,
}

fn default_session_timeout_ms() -> u64 {
    5_000
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            tick_ms: default_tick_ms(),
            clear_security_on_timeout: false,
        }
    }
}

/// Complete simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuConfig {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub dtcs: Vec<DtcDef>,
    #[serde(default)]
    pub routines: Vec<RoutineDef>,
}

fn default_id() -> String {
    "example_ecu".to_string()
}

impl Default for EcuConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            timeout: TimeoutConfig::default(),
            parameters: Vec::new(),
            dtcs: Vec::new(),
            routines: Vec::new(),
        }
    }
}

impl EcuConfig {
    pub fn load_toml(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    #[allow(dead_code)]
    pub fn load_yaml(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// A minimal but representative identity surface, used whenever a config
    /// doesn't define its own parameters.
    pub fn default_identity() -> Self {
        Self {
            parameters: vec![
                ParameterDef {
                    did: standard_did::VIN,
                    id: "vin".to_string(),
                    value: b"SIMULATOR00000001".to_vec(),
                    access: AccessLevel::Public,
                    writable: false,
                },
                ParameterDef {
                    did: standard_did::SPARE_PART_NUMBER,
                    id: "spare_part_number".to_string(),
                    value: b"000000000000".to_vec(),
                    access: AccessLevel::Public,
                    writable: false,
                },
                ParameterDef {
                    did: standard_did::ECU_SOFTWARE_NUMBER,
                    id: "sw_number".to_string(),
                    value: b"SW0001".to_vec(),
                    access: AccessLevel::Public,
                    writable: false,
                },
                ParameterDef {
                    did: standard_did::ECU_SOFTWARE_VERSION,
                    id: "sw_version".to_string(),
                    value: b"1.0.0".to_vec(),
                    access: AccessLevel::Public,
                    writable: false,
                },
                ParameterDef {
                    did: standard_did::ECU_MANUFACTURING_DATE,
                    id: "mfg_date".to_string(),
                    value: b"20260101".to_vec(),
                    access: AccessLevel::Public,
                    writable: false,
                },
                ParameterDef {
                    did: standard_did::ECU_SERIAL_NUMBER,
                    id: "serial_number".to_string(),
                    value: b"SN0000000001".to_vec(),
                    access: AccessLevel::Public,
                    writable: true,
                },
            ],
            dtcs: vec![
                DtcDef {
                    bytes: [0x12, 0x34, 0x56],
                    status: 0x09,
                },
                DtcDef {
                    bytes: [0x78, 0x9A, 0xBC],
                    status: 0x08,
                },
            ],
            ..Self::default()
        }
    }
}

/// Strips an optional `0x`/`0X` prefix so a config author can write either form.
fn strip_radix_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let s = strip_radix_prefix(s);
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// A serde visitor accepting either a plain integer or a hex string
/// (`"0xF190"`/`"F190"`) for fields that config authors naturally write as hex.
struct HexOrIntVisitor<T>(std::marker::PhantomData<T>);

macro_rules! impl_hex_or_int_visitor {
    ($ty:ty) => {
        impl<'de> serde::de::Visitor<'de> for HexOrIntVisitor<$ty> {
            type Value = $ty;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "an integer or a hex string")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<$ty, E> {
                <$ty>::try_from(v).map_err(|_| E::custom(format!("{v} out of range")))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<$ty, E> {
                <$ty>::try_from(v).map_err(|_| E::custom(format!("{v} out of range")))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<$ty, E> {
                <$ty>::from_str_radix(strip_radix_prefix(v), 16).map_err(|e| E::custom(e.to_string()))
            }
        }
    };
}

impl_hex_or_int_visitor!(u16);
impl_hex_or_int_visitor!(u8);

fn deserialize_hex_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(HexOrIntVisitor::<u16>(std::marker::PhantomData))
}

fn deserialize_hex_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(HexOrIntVisitor::<u8>(std::marker::PhantomData))
}

/// A serde visitor accepting either a hex string or an explicit byte array for
/// fields that may be written either compactly or spelled out.
struct HexOrByteArrayVisitor;

impl<'de> serde::de::Visitor<'de> for HexOrByteArrayVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a hex string or an array of byte values")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
        parse_hex_bytes(v).ok_or_else(|| E::custom("invalid hex string"))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Vec<u8>, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element()? {
            bytes.push(byte);
        }
        Ok(bytes)
    }
}

fn deserialize_hex_bytes_vec<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(HexOrByteArrayVisitor)
}

fn deserialize_dtc_bytes<'de, D>(deserializer: D) -> Result<[u8; 3], D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let bytes = deserializer.deserialize_any(HexOrByteArrayVisitor)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| D::Error::custom(format!("DTC bytes must be exactly 3 bytes, got {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_did_as_string() {
        let toml = r#"did = "0xF190""#;
        let def: ParameterDef = toml::from_str(&format!("{toml}\nid = \"vin\"")).unwrap();
        assert_eq!(def.did, 0xF190);
    }

    #[test]
    fn parses_int_did() {
        let toml = "did = 61840\nid = \"vin\"";
        let def: ParameterDef = toml::from_str(toml).unwrap();
        assert_eq!(def.did, 61840);
    }

    #[test]
    fn parses_dtc_hex_string() {
        let toml = r#"bytes = "010100""#;
        let def: DtcDef = toml::from_str(toml).unwrap();
        assert_eq!(def.bytes, [0x01, 0x01, 0x00]);
        assert_eq!(def.status, 0x09); // default
    }

    #[test]
    fn parses_dtc_byte_array() {
        let toml = "bytes = [1, 1, 0]\nstatus = 9";
        let def: DtcDef = toml::from_str(toml).unwrap();
        assert_eq!(def.bytes, [0x01, 0x01, 0x00]);
    }

    #[test]
    fn default_identity_has_writable_serial() {
        let config = EcuConfig::default_identity();
        let serial = config
            .parameters
            .iter()
            .find(|p| p.did == standard_did::ECU_SERIAL_NUMBER)
            .unwrap();
        assert!(serial.writable);
    }
}
