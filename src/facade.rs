//! Typed get/set surface over [`LinkCore`]: each getter sends a
//! `GetAttribute` request and narrows the response; each setter sends
//! `SetAttribute` and checks for acknowledgement.

use crate::codec::attributes::attribute_id;
use crate::codec::{Attribute, FileInfo, Message};
use crate::config::{DownloadOptions, DEFAULT_SEND_TIMEOUT};
use crate::core::{BulkProgressListener, LinkCore};
use crate::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A thin, typed wrapper around a running [`LinkCore`]. Unlike the core
/// itself (which only ever returns `None` on failure), the facade
/// surfaces `Nack` and connection failures as typed errors because callers
/// at this layer can usefully act on them.
pub struct DeviceFacade {
    core: Arc<LinkCore>,
}

impl DeviceFacade {
    pub fn new(core: Arc<LinkCore>) -> Self {
        Self { core }
    }

    pub fn set_bulk_progress_listener(&self, listener: Arc<dyn BulkProgressListener>) {
        self.core.set_bulk_progress_listener(listener);
    }

    fn get_attribute(&self, id: u8) -> Result<Attribute, Error> {
        match self.core.send(Message::GetAttribute { attribute_id: id }, DEFAULT_SEND_TIMEOUT) {
            Some(Message::GetAttributeResponse { value }) => Ok(value),
            Some(Message::NackResponse { code }) => Err(Error::Nack { code }),
            Some(other) => Err(Error::InvalidResponse(format!(
                "unexpected response to get-attribute: {other:?}"
            ))),
            None => Err(Error::MissingResponse),
        }
    }

    fn set_attribute(&self, value: Attribute) -> Result<(), Error> {
        match self.core.send(Message::SetAttribute { value }, DEFAULT_SEND_TIMEOUT) {
            Some(Message::SetAttributeResponse) => Ok(()),
            Some(Message::NackResponse { code }) => Err(Error::Nack { code }),
            Some(other) => Err(Error::InvalidResponse(format!(
                "unexpected response to set-attribute: {other:?}"
            ))),
            None => Err(Error::MissingResponse),
        }
    }

    pub fn get_serial_no(&self) -> Result<String, Error> {
        match self.get_attribute(attribute_id::SERIAL_NO)? {
            Attribute::SerialNo(s) => Ok(s),
            other => Err(unexpected_attribute("serial number", &other)),
        }
    }

    pub fn get_vendor(&self) -> Result<String, Error> {
        match self.get_attribute(attribute_id::VENDOR)? {
            Attribute::Vendor(s) => Ok(s),
            other => Err(unexpected_attribute("vendor", &other)),
        }
    }

    pub fn get_model(&self) -> Result<String, Error> {
        match self.get_attribute(attribute_id::MODEL)? {
            Attribute::Model(s) => Ok(s),
            other => Err(unexpected_attribute("model", &other)),
        }
    }

    pub fn get_firmware_version(&self) -> Result<String, Error> {
        match self.get_attribute(attribute_id::FIRMWARE_VERSION)? {
            Attribute::FirmwareVersion(s) => Ok(s),
            other => Err(unexpected_attribute("firmware version", &other)),
        }
    }

    pub fn get_bluetooth_mac(&self) -> Result<String, Error> {
        match self.get_attribute(attribute_id::BLUETOOTH_MAC)? {
            Attribute::BluetoothMac(s) => Ok(s),
            other => Err(unexpected_attribute("bluetooth mac", &other)),
        }
    }

    pub fn get_battery_level(&self) -> Result<u8, Error> {
        match self.get_attribute(attribute_id::BATTERY_LEVEL)? {
            Attribute::BatteryLevel(v) => Ok(v),
            other => Err(unexpected_attribute("battery level", &other)),
        }
    }

    pub fn get_heart_rate(&self) -> Result<u16, Error> {
        match self.get_attribute(attribute_id::HEART_RATE)? {
            Attribute::HeartRate(v) => Ok(v),
            other => Err(unexpected_attribute("heart rate", &other)),
        }
    }

    pub fn get_charge_state(&self) -> Result<bool, Error> {
        match self.get_attribute(attribute_id::CHARGE_STATE)? {
            Attribute::ChargeState(v) => Ok(v),
            other => Err(unexpected_attribute("charge state", &other)),
        }
    }

    /// Degrees Celsius (the device reports tenths internally).
    pub fn get_temperature(&self) -> Result<f32, Error> {
        match self.get_attribute(attribute_id::TEMPERATURE)? {
            attr @ Attribute::Temperature(_) => {
                Ok(attr.temp_celsius().expect("just matched Temperature"))
            }
            other => Err(unexpected_attribute("temperature", &other)),
        }
    }

    /// Milliseconds since the Unix epoch, per the device's clock.
    pub fn get_current_time(&self) -> Result<u64, Error> {
        match self.get_attribute(attribute_id::CURRENT_TIME)? {
            Attribute::CurrentTime(v) => Ok(v),
            other => Err(unexpected_attribute("current time", &other)),
        }
    }

    /// Sets the device clock to the host's current wall-clock time.
    pub fn set_current_timestamp(&self) -> Result<(), Error> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.set_timestamp(millis)
    }

    pub fn set_timestamp(&self, millis_since_epoch: u64) -> Result<(), Error> {
        self.set_attribute(Attribute::CurrentTime(millis_since_epoch))
    }

    pub fn set_trace_level(&self, level: u8) -> Result<(), Error> {
        self.set_attribute(Attribute::TraceLevel(level))
    }

    pub fn list_files(&self) -> Result<Vec<FileInfo>, Error> {
        match self.core.send(Message::ListFiles, DEFAULT_SEND_TIMEOUT) {
            Some(Message::ListFilesResponse { files }) => Ok(files),
            Some(Message::NackResponse { code }) => Err(Error::Nack { code }),
            Some(other) => Err(Error::InvalidResponse(format!(
                "unexpected response to list-files: {other:?}"
            ))),
            None => Err(Error::MissingResponse),
        }
    }

    pub fn delete_file(&self, name: &str) -> Result<(), Error> {
        match self.core.send(
            Message::DeleteFile { name: name.to_string() },
            DEFAULT_SEND_TIMEOUT,
        ) {
            Some(Message::DeleteFileResponse) => Ok(()),
            Some(Message::NackResponse { code }) => Err(Error::Nack { code }),
            Some(other) => Err(Error::InvalidResponse(format!(
                "unexpected response to delete-file: {other:?}"
            ))),
            None => Err(Error::MissingResponse),
        }
    }

    pub fn delete_all_files(&self) -> Result<(), Error> {
        match self.core.send(Message::DeleteAllFiles, DEFAULT_SEND_TIMEOUT) {
            Some(Message::DeleteAllFilesResponse) => Ok(()),
            Some(Message::NackResponse { code }) => Err(Error::Nack { code }),
            Some(other) => Err(Error::InvalidResponse(format!(
                "unexpected response to delete-all-files: {other:?}"
            ))),
            None => Err(Error::MissingResponse),
        }
    }

    pub fn reformat_disk(&self) -> Result<(), Error> {
        match self.core.send(Message::ReformatDisk, DEFAULT_SEND_TIMEOUT) {
            Some(Message::ReformatDiskResponse) => Ok(()),
            Some(Message::NackResponse { code }) => Err(Error::Nack { code }),
            Some(other) => Err(Error::InvalidResponse(format!(
                "unexpected response to reformat-disk: {other:?}"
            ))),
            None => Err(Error::MissingResponse),
        }
    }

    /// Downloads `name` (of known `size` bytes, typically from a prior
    /// [`Self::list_files`] or a `SendFile` notification) into a temporary
    /// artifact, returning its path and the achieved throughput in KB/s.
    pub fn download_file(
        &self,
        name: &str,
        size: u64,
        opts: DownloadOptions,
    ) -> Result<(PathBuf, f64), Error> {
        self.core.download_file(name, size, opts)
    }
}

fn unexpected_attribute(what: &str, got: &Attribute) -> Error {
    Error::InvalidResponse(format!("expected {what} attribute, got {got:?}"))
}
