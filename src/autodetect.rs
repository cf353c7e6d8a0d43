//! Serial-port auto-detection: enumerate candidate ports by
//! manufacturer/description tokens, probe each with a `Heartbeat`, and
//! return the first one that answers.

use crate::codec::{Codec, DeviceCodec, Message};
use crate::config::AutoDetectConfig;
use crate::transport::serial::DEFAULT_BAUD;
use crate::transport::{Link, ReadOutcome, SerialLink};
use crate::Error;
use std::time::Instant;

/// Enumerates serial ports, opens each candidate whose manufacturer or
/// product string matches a configured token, and probes it with a
/// `Heartbeat`/`HeartbeatResponse` exchange. Returns the device path of the
/// first port that answers correctly.
pub fn find_device_port(config: &AutoDetectConfig) -> Result<String, Error> {
    let ports = serialport::available_ports().map_err(|e| Error::Other(e.to_string()))?;

    for port in ports {
        if !matches_tokens(&port, config) {
            continue;
        }
        if probe(&port.port_name, config) {
            return Ok(port.port_name);
        }
    }
    Err(Error::DeviceNotFound)
}

fn matches_tokens(port: &serialport::SerialPortInfo, config: &AutoDetectConfig) -> bool {
    let serialport::SerialPortType::UsbPort(info) = &port.port_type else {
        return false;
    };
    let manufacturer = info.manufacturer.as_deref().unwrap_or("");
    let product = info.product.as_deref().unwrap_or("");

    let manufacturer_hit = config
        .manufacturers
        .iter()
        .any(|token| contains_ignore_case(manufacturer, token));
    let description_hit = config
        .descriptions
        .iter()
        .any(|token| contains_ignore_case(product, token));

    manufacturer_hit || description_hit
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn probe(path: &str, config: &AutoDetectConfig) -> bool {
    let Ok(link) = SerialLink::open(path, DEFAULT_BAUD) else {
        return false;
    };
    let _ = link.set_read_timeout(config.probe_timeout);

    let codec = DeviceCodec;
    let frame = codec.encode(&Message::Heartbeat);
    if link.write_all(&frame).is_err() {
        return false;
    }

    let expected = codec.encode(&Message::HeartbeatResponse);
    let mut buf = vec![0u8; expected.len()];
    let started = Instant::now();
    let mut filled = 0;
    while filled < buf.len() {
        if started.elapsed() > config.probe_timeout {
            return false;
        }
        match link.read(&mut buf[filled..]) {
            Ok(ReadOutcome::Read(n)) if n > 0 => filled += n,
            Ok(ReadOutcome::Read(_)) | Ok(ReadOutcome::Eof) => return false,
            Ok(ReadOutcome::TimedOut) => continue,
            Err(_) => return false,
        }
    }
    let _ = link.close();
    buf == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_carries_the_documented_tokens() {
        let config = AutoDetectConfig::default();
        assert!(config.manufacturers.contains(&"Datek".to_string()));
        assert!(config.manufacturers.contains(&"Aidee".to_string()));
        assert!(config.descriptions.contains(&"IsenseU".to_string()));
        assert!(config.descriptions.contains(&"G3".to_string()));
        assert!(config.descriptions.contains(&"EmBody".to_string()));
    }

    #[test]
    fn contains_ignore_case_matches_regardless_of_case() {
        assert!(contains_ignore_case("Datek Embedded CDC", "datek"));
        assert!(!contains_ignore_case("Generic USB Serial", "aidee"));
    }
}
