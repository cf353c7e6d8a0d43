//! Type-state builder for constructing a running [`LinkCore`] (cf. the
//! connection-mode builder this crate's concurrency core was modeled on).

use crate::config::AutoDetectConfig;
use crate::core::LinkCore;
use crate::transport::serial::DEFAULT_BAUD;
use crate::transport::{Link, SerialLink};
use crate::Error;
use std::marker::PhantomData;
use std::sync::Arc;

// Type-state builder states.
pub struct Init;
pub struct Serial;
pub struct AutoDetect;

/// Type-state builder for a [`LinkCore`]. Pick a connection mode with
/// `.with_serial()` or `.with_auto_detect()`, then `.connect()`.
pub struct LinkBuilder<T> {
    com_port: Option<String>,
    baud_rate: u32,
    auto_detect: AutoDetectConfig,
    _marker: PhantomData<T>,
}

impl Default for LinkBuilder<Init> {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkBuilder<Init> {
    pub fn new() -> Self {
        Self {
            com_port: None,
            baud_rate: DEFAULT_BAUD,
            auto_detect: AutoDetectConfig::default(),
            _marker: PhantomData,
        }
    }

    /// Connects over a named serial port (e.g. `/dev/ttyACM0`, `COM3`).
    pub fn with_serial(self, com_port: &str) -> LinkBuilder<Serial> {
        LinkBuilder {
            com_port: Some(com_port.to_string()),
            baud_rate: self.baud_rate,
            auto_detect: self.auto_detect,
            _marker: PhantomData,
        }
    }

    /// Connects to whichever port matches the configured auto-detect tokens.
    pub fn with_auto_detect(self) -> LinkBuilder<AutoDetect> {
        LinkBuilder {
            com_port: None,
            baud_rate: self.baud_rate,
            auto_detect: self.auto_detect,
            _marker: PhantomData,
        }
    }
}

impl LinkBuilder<Serial> {
    pub fn baud(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn connect(self) -> Result<Arc<LinkCore>, Error> {
        let link = SerialLink::open(
            self.com_port
                .as_deref()
                .expect("com_port is set once in the Serial type-state"),
            self.baud_rate,
        )?;
        Ok(LinkCore::start(Arc::new(link) as Arc<dyn Link>))
    }
}

impl LinkBuilder<AutoDetect> {
    pub fn auto_detect_config(mut self, config: AutoDetectConfig) -> Self {
        self.auto_detect = config;
        self
    }

    pub fn connect(self) -> Result<Arc<LinkCore>, Error> {
        let path = crate::autodetect::find_device_port(&self.auto_detect)?;
        let link = SerialLink::open(&path, self.baud_rate)?;
        Ok(LinkCore::start(Arc::new(link) as Arc<dyn Link>))
    }
}

#[cfg(any(test, feature = "test-util"))]
impl LinkBuilder<Init> {
    /// Builds over a caller-supplied [`Link`] (typically a
    /// [`crate::transport::MockLink`]) without touching a real port.
    pub fn connect_with(self, link: Arc<dyn Link>) -> Arc<LinkCore> {
        LinkCore::start(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockLink;

    #[test]
    fn connect_with_starts_a_link_over_a_mock() {
        let link = Arc::new(MockLink::new());
        let core = LinkBuilder::new().connect_with(link);
        assert!(core.is_connected());
        core.shutdown();
    }
}
