//! Wire codec for the device protocol: `type:u8 | length:u16-be | body | crc:u16-be`.
//!
//! `type >= 0x80` marks a response; everything else is a request (host-originated)
//! or a notification (device-originated, unsolicited). This module owns encode/decode
//! and the CRC routine; the concurrency core treats it as a
//! pluggable `Codec` implementation via the [`Codec`] trait.

mod crc;

pub mod attributes;
pub mod files;

pub use attributes::Attribute;
pub use crc::crc16_ccitt;
pub use files::FileInfo;

use crate::Error;

mod msg_type {
    pub const HEARTBEAT: u8 = 0x01;
    pub const LIST_FILES: u8 = 0x02;
    pub const DELETE_FILE: u8 = 0x03;
    pub const DELETE_ALL_FILES: u8 = 0x04;
    pub const REFORMAT_DISK: u8 = 0x05;
    pub const GET_ATTRIBUTE: u8 = 0x06;
    pub const SET_ATTRIBUTE: u8 = 0x07;
    pub const GET_FILE_UART: u8 = 0x08;

    pub const ATTRIBUTE_CHANGED: u8 = 0x20;
    pub const SEND_FILE: u8 = 0x21;

    pub const HEARTBEAT_RESPONSE: u8 = 0x81;
    pub const LIST_FILES_RESPONSE: u8 = 0x82;
    pub const DELETE_FILE_RESPONSE: u8 = 0x83;
    pub const DELETE_ALL_FILES_RESPONSE: u8 = 0x84;
    pub const REFORMAT_DISK_RESPONSE: u8 = 0x85;
    pub const GET_ATTRIBUTE_RESPONSE: u8 = 0x86;
    pub const SET_ATTRIBUTE_RESPONSE: u8 = 0x87;
    pub const GET_FILE_UART_RESPONSE: u8 = 0x88;
    pub const NACK_RESPONSE: u8 = 0xFF;
}

/// The response-bit threshold: any `type` at or above this is a response.
pub const RESPONSE_BIT: u8 = 0x80;

/// A decoded protocol message. Requests and notifications share `type < 0x80`;
/// responses (including NACK) use `type >= 0x80`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // Requests
    Heartbeat,
    ListFiles,
    DeleteFile { name: String },
    DeleteAllFiles,
    ReformatDisk,
    GetAttribute { attribute_id: u8 },
    SetAttribute { value: Attribute },
    GetFileUart { name: String },

    // Notifications (device-initiated, unsolicited)
    AttributeChanged { value: Attribute },
    SendFile { name: String, size: u64 },

    // Responses
    HeartbeatResponse,
    ListFilesResponse { files: Vec<FileInfo> },
    DeleteFileResponse,
    DeleteAllFilesResponse,
    ReformatDiskResponse,
    GetAttributeResponse { value: Attribute },
    SetAttributeResponse,
    GetFileUartResponse,
    NackResponse { code: u8 },
}

impl Message {
    /// The wire `type` byte for this message.
    pub fn msg_type(&self) -> u8 {
        use msg_type::*;
        match self {
            Message::Heartbeat => HEARTBEAT,
            Message::ListFiles => LIST_FILES,
            Message::DeleteFile { .. } => DELETE_FILE,
            Message::DeleteAllFiles => DELETE_ALL_FILES,
            Message::ReformatDisk => REFORMAT_DISK,
            Message::GetAttribute { .. } => GET_ATTRIBUTE,
            Message::SetAttribute { .. } => SET_ATTRIBUTE,
            Message::GetFileUart { .. } => GET_FILE_UART,
            Message::AttributeChanged { .. } => ATTRIBUTE_CHANGED,
            Message::SendFile { .. } => SEND_FILE,
            Message::HeartbeatResponse => HEARTBEAT_RESPONSE,
            Message::ListFilesResponse { .. } => LIST_FILES_RESPONSE,
            Message::DeleteFileResponse => DELETE_FILE_RESPONSE,
            Message::DeleteAllFilesResponse => DELETE_ALL_FILES_RESPONSE,
            Message::ReformatDiskResponse => REFORMAT_DISK_RESPONSE,
            Message::GetAttributeResponse { .. } => GET_ATTRIBUTE_RESPONSE,
            Message::SetAttributeResponse => SET_ATTRIBUTE_RESPONSE,
            Message::GetFileUartResponse => GET_FILE_UART_RESPONSE,
            Message::NackResponse { .. } => NACK_RESPONSE,
        }
    }

    /// `type >= 0x80`: this is a response rather than a request/notification.
    pub fn is_response(&self) -> bool {
        self.msg_type() >= RESPONSE_BIT
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        match self {
            Message::DeleteFile { name } | Message::GetFileUart { name } => {
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
            Message::GetAttribute { attribute_id } => out.push(*attribute_id),
            Message::SetAttribute { value } | Message::AttributeChanged { value } => {
                out.push(value.attribute_id());
                value.encode_value(out);
            }
            Message::GetAttributeResponse { value } => {
                out.push(value.attribute_id());
                value.encode_value(out);
            }
            Message::SendFile { name, size } => {
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(&size.to_be_bytes());
            }
            Message::ListFilesResponse { files } => {
                for file in files {
                    file.encode(out);
                }
            }
            Message::NackResponse { code } => out.push(*code),
            Message::Heartbeat
            | Message::ListFiles
            | Message::DeleteAllFiles
            | Message::ReformatDisk
            | Message::HeartbeatResponse
            | Message::DeleteFileResponse
            | Message::DeleteAllFilesResponse
            | Message::ReformatDiskResponse
            | Message::SetAttributeResponse
            | Message::GetFileUartResponse => {}
        }
    }
}

/// Behavior the concurrency core depends on without knowing the wire format.
pub trait Codec: Send + Sync {
    fn encode(&self, msg: &Message) -> Vec<u8>;
    fn decode(&self, frame: &[u8]) -> Result<Message, Error>;
}

/// The concrete device codec implementing the `type|length|body|crc` framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCodec;

impl Codec for DeviceCodec {
    fn encode(&self, msg: &Message) -> Vec<u8> {
        let mut body = Vec::new();
        msg.encode_body(&mut body);

        // length = type(1) + length(2) + body + crc(2)
        let length = 3 + body.len() + 2;
        let mut frame = Vec::with_capacity(length);
        frame.push(msg.msg_type());
        frame.extend_from_slice(&(length as u16).to_be_bytes());
        frame.extend_from_slice(&body);
        let crc = crc16_ccitt(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, Error> {
        if frame.len() < 5 {
            return Err(Error::DecodeError(format!(
                "frame too short to contain header+crc: {} bytes",
                frame.len()
            )));
        }
        let msg_type = frame[0];
        let length = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        if length != frame.len() {
            return Err(Error::DecodeError(format!(
                "length field {length} does not match frame size {}",
                frame.len()
            )));
        }
        let body = &frame[3..frame.len() - 2];
        let received_crc = u16::from_be_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
        let computed_crc = crc16_ccitt(&frame[..frame.len() - 2]);
        if received_crc != computed_crc {
            return Err(Error::DecodeError(format!(
                "crc mismatch: received {received_crc:#06x}, computed {computed_crc:#06x}"
            )));
        }
        decode_body(msg_type, body)
    }
}

fn decode_body(msg_type: u8, body: &[u8]) -> Result<Message, Error> {
    use msg_type as t;
    let decode_name = |body: &[u8]| -> Result<String, Error> {
        let len = *body
            .first()
            .ok_or_else(|| Error::DecodeError("name field missing length".into()))?
            as usize;
        let bytes = body
            .get(1..1 + len)
            .ok_or_else(|| Error::DecodeError("name field truncated".into()))?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(Error::from)
    };

    Ok(match msg_type {
        x if x == t::HEARTBEAT => Message::Heartbeat,
        x if x == t::LIST_FILES => Message::ListFiles,
        x if x == t::DELETE_FILE => Message::DeleteFile {
            name: decode_name(body)?,
        },
        x if x == t::DELETE_ALL_FILES => Message::DeleteAllFiles,
        x if x == t::REFORMAT_DISK => Message::ReformatDisk,
        x if x == t::GET_ATTRIBUTE => Message::GetAttribute {
            attribute_id: *body
                .first()
                .ok_or_else(|| Error::DecodeError("get-attribute missing id".into()))?,
        },
        x if x == t::SET_ATTRIBUTE => {
            let id = *body
                .first()
                .ok_or_else(|| Error::DecodeError("set-attribute missing id".into()))?;
            Message::SetAttribute {
                value: Attribute::decode_value(id, &body[1..])?,
            }
        }
        x if x == t::GET_FILE_UART => Message::GetFileUart {
            name: decode_name(body)?,
        },
        x if x == t::ATTRIBUTE_CHANGED => {
            let id = *body
                .first()
                .ok_or_else(|| Error::DecodeError("attribute-changed missing id".into()))?;
            Message::AttributeChanged {
                value: Attribute::decode_value(id, &body[1..])?,
            }
        }
        x if x == t::SEND_FILE => {
            let name_len = *body
                .first()
                .ok_or_else(|| Error::DecodeError("send-file missing name length".into()))?
                as usize;
            let name = std::str::from_utf8(
                body.get(1..1 + name_len)
                    .ok_or_else(|| Error::DecodeError("send-file name truncated".into()))?,
            )
            .map(|s| s.to_string())
            .map_err(Error::from)?;
            let size_start = 1 + name_len;
            let size = u64::from_be_bytes(
                body.get(size_start..size_start + 8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| Error::DecodeError("send-file size truncated".into()))?,
            );
            Message::SendFile { name, size }
        }
        x if x == t::HEARTBEAT_RESPONSE => Message::HeartbeatResponse,
        x if x == t::LIST_FILES_RESPONSE => {
            let mut files = Vec::new();
            let mut offset = 0;
            while offset < body.len() {
                let (file, consumed) = FileInfo::decode(&body[offset..])?;
                files.push(file);
                offset += consumed;
            }
            Message::ListFilesResponse { files }
        }
        x if x == t::DELETE_FILE_RESPONSE => Message::DeleteFileResponse,
        x if x == t::DELETE_ALL_FILES_RESPONSE => Message::DeleteAllFilesResponse,
        x if x == t::REFORMAT_DISK_RESPONSE => Message::ReformatDiskResponse,
        x if x == t::GET_ATTRIBUTE_RESPONSE => {
            let id = *body
                .first()
                .ok_or_else(|| Error::DecodeError("get-attribute-response missing id".into()))?;
            Message::GetAttributeResponse {
                value: Attribute::decode_value(id, &body[1..])?,
            }
        }
        x if x == t::SET_ATTRIBUTE_RESPONSE => Message::SetAttributeResponse,
        x if x == t::GET_FILE_UART_RESPONSE => Message::GetFileUartResponse,
        x if x == t::NACK_RESPONSE => Message::NackResponse {
            code: *body
                .first()
                .ok_or_else(|| Error::DecodeError("nack missing code".into()))?,
        },
        other => return Err(Error::DecodeError(format!("unknown message type: {other:#04x}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_heartbeat() {
        let codec = DeviceCodec;
        let frame = codec.encode(&Message::Heartbeat);
        assert_eq!(codec.decode(&frame).unwrap(), Message::Heartbeat);
    }

    #[test]
    fn zero_body_frame_has_length_three_plus_crc() {
        let codec = DeviceCodec;
        let frame = codec.encode(&Message::HeartbeatResponse);
        // type(1) + length(2) + crc(2), no body.
        assert_eq!(frame.len(), 5);
        assert_eq!(u16::from_be_bytes([frame[1], frame[2]]) as usize, frame.len());
    }

    #[test]
    fn response_bit_distinguishes_kinds() {
        assert!(!Message::Heartbeat.is_response());
        assert!(Message::HeartbeatResponse.is_response());
        assert!(Message::NackResponse { code: 1 }.is_response());
        assert!(!Message::SendFile { name: "a".into(), size: 1 }.is_response());
    }

    #[test]
    fn round_trips_list_files_response() {
        let codec = DeviceCodec;
        let msg = Message::ListFilesResponse {
            files: vec![
                FileInfo { name: "a.bin".into(), size: 10 },
                FileInfo { name: "b.bin".into(), size: 20 },
            ],
        };
        let frame = codec.encode(&msg);
        assert_eq!(codec.decode(&frame).unwrap(), msg);
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let codec = DeviceCodec;
        let mut frame = codec.encode(&Message::Heartbeat);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(codec.decode(&frame).is_err());
    }

    #[test]
    fn round_trips_set_attribute_with_string_value() {
        let codec = DeviceCodec;
        let msg = Message::SetAttribute {
            value: Attribute::Model("X1".to_string()),
        };
        let frame = codec.encode(&msg);
        assert_eq!(codec.decode(&frame).unwrap(), msg);
    }
}
