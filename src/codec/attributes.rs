//! Typed attribute values exchanged via `GetAttribute`/`SetAttribute`/`AttributeChanged`.

use crate::Error;

/// One-byte attribute identifiers as defined by the device's attribute table.
pub mod attribute_id {
    pub const SERIAL_NO: u8 = 0x01;
    pub const VENDOR: u8 = 0x02;
    pub const MODEL: u8 = 0x03;
    pub const FIRMWARE_VERSION: u8 = 0x04;
    pub const BLUETOOTH_MAC: u8 = 0x05;
    pub const BATTERY_LEVEL: u8 = 0x06;
    pub const HEART_RATE: u8 = 0x07;
    pub const CHARGE_STATE: u8 = 0x08;
    pub const TEMPERATURE: u8 = 0x09;
    pub const CURRENT_TIME: u8 = 0x0A;
    pub const TRACE_LEVEL: u8 = 0x0B;
}

/// A decoded attribute value. The wire encoding for each variant is fixed by
/// the device's attribute table; strings are length-prefixed (`u8` length)
/// ASCII, everything else is big-endian.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    SerialNo(String),
    Vendor(String),
    Model(String),
    FirmwareVersion(String),
    BluetoothMac(String),
    BatteryLevel(u8),
    HeartRate(u16),
    ChargeState(bool),
    /// Tenths of a degree Celsius.
    Temperature(i16),
    /// Milliseconds since the Unix epoch.
    CurrentTime(u64),
    TraceLevel(u8),
}

impl Attribute {
    pub fn attribute_id(&self) -> u8 {
        match self {
            Attribute::SerialNo(_) => attribute_id::SERIAL_NO,
            Attribute::Vendor(_) => attribute_id::VENDOR,
            Attribute::Model(_) => attribute_id::MODEL,
            Attribute::FirmwareVersion(_) => attribute_id::FIRMWARE_VERSION,
            Attribute::BluetoothMac(_) => attribute_id::BLUETOOTH_MAC,
            Attribute::BatteryLevel(_) => attribute_id::BATTERY_LEVEL,
            Attribute::HeartRate(_) => attribute_id::HEART_RATE,
            Attribute::ChargeState(_) => attribute_id::CHARGE_STATE,
            Attribute::Temperature(_) => attribute_id::TEMPERATURE,
            Attribute::CurrentTime(_) => attribute_id::CURRENT_TIME,
            Attribute::TraceLevel(_) => attribute_id::TRACE_LEVEL,
        }
    }

    /// Degrees Celsius, for the `Temperature` variant.
    pub fn temp_celsius(&self) -> Option<f32> {
        match self {
            Attribute::Temperature(tenths) => Some(*tenths as f32 / 10.0),
            _ => None,
        }
    }

    pub(crate) fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            Attribute::SerialNo(s)
            | Attribute::Vendor(s)
            | Attribute::Model(s)
            | Attribute::FirmwareVersion(s)
            | Attribute::BluetoothMac(s) => {
                out.push(s.len() as u8);
                out.extend_from_slice(s.as_bytes());
            }
            Attribute::BatteryLevel(v) => out.push(*v),
            Attribute::HeartRate(v) => out.extend_from_slice(&v.to_be_bytes()),
            Attribute::ChargeState(v) => out.push(*v as u8),
            Attribute::Temperature(v) => out.extend_from_slice(&v.to_be_bytes()),
            Attribute::CurrentTime(v) => out.extend_from_slice(&v.to_be_bytes()),
            Attribute::TraceLevel(v) => out.push(*v),
        }
    }

    pub(crate) fn decode_value(attribute_id: u8, body: &[u8]) -> Result<Self, Error> {
        use attribute_id as id;
        let decode_str = |body: &[u8]| -> Result<String, Error> {
            let len = *body
                .first()
                .ok_or_else(|| Error::DecodeError("attribute string missing length".into()))?
                as usize;
            let bytes = body
                .get(1..1 + len)
                .ok_or_else(|| Error::DecodeError("attribute string truncated".into()))?;
            std::str::from_utf8(bytes)
                .map(|s| s.to_string())
                .map_err(Error::from)
        };
        Ok(match attribute_id {
            x if x == id::SERIAL_NO => Attribute::SerialNo(decode_str(body)?),
            x if x == id::VENDOR => Attribute::Vendor(decode_str(body)?),
            x if x == id::MODEL => Attribute::Model(decode_str(body)?),
            x if x == id::FIRMWARE_VERSION => Attribute::FirmwareVersion(decode_str(body)?),
            x if x == id::BLUETOOTH_MAC => Attribute::BluetoothMac(decode_str(body)?),
            x if x == id::BATTERY_LEVEL => Attribute::BatteryLevel(
                *body
                    .first()
                    .ok_or_else(|| Error::DecodeError("battery level truncated".into()))?,
            ),
            x if x == id::HEART_RATE => Attribute::HeartRate(u16::from_be_bytes(
                body.get(0..2)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| Error::DecodeError("heart rate truncated".into()))?,
            )),
            x if x == id::CHARGE_STATE => Attribute::ChargeState(
                *body
                    .first()
                    .ok_or_else(|| Error::DecodeError("charge state truncated".into()))?
                    != 0,
            ),
            x if x == id::TEMPERATURE => Attribute::Temperature(i16::from_be_bytes(
                body.get(0..2)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| Error::DecodeError("temperature truncated".into()))?,
            )),
            x if x == id::CURRENT_TIME => Attribute::CurrentTime(u64::from_be_bytes(
                body.get(0..8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| Error::DecodeError("current time truncated".into()))?,
            )),
            x if x == id::TRACE_LEVEL => Attribute::TraceLevel(
                *body
                    .first()
                    .ok_or_else(|| Error::DecodeError("trace level truncated".into()))?,
            ),
            other => {
                return Err(Error::DecodeError(format!(
                    "unknown attribute id: {other:#04x}"
                )));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_string_attribute() {
        let attr = Attribute::SerialNo("ABC-123".to_string());
        let mut buf = Vec::new();
        attr.encode_value(&mut buf);
        let decoded = Attribute::decode_value(attribute_id::SERIAL_NO, &buf).unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn round_trips_temperature() {
        let attr = Attribute::Temperature(-55);
        let mut buf = Vec::new();
        attr.encode_value(&mut buf);
        let decoded = Attribute::decode_value(attribute_id::TEMPERATURE, &buf).unwrap();
        assert_eq!(decoded, attr);
        assert_eq!(decoded.temp_celsius(), Some(-5.5));
    }

    #[test]
    fn unknown_attribute_id_errs() {
        assert!(Attribute::decode_value(0xEE, &[]).is_err());
    }
}
