//! The link-layer concurrency core: reader thread, dispatcher, single-writer
//! sender, bulk file-transfer streaming, and the subscriber pools that fan
//! decoded messages out to listeners.

pub mod bulk;
pub mod dispatcher;
pub mod frame_reader;
pub mod link_core;
pub mod pools;
pub mod response_slot;
pub mod sender;

pub use frame_reader::ReaderMode;
pub use link_core::LinkCore;
pub use pools::{
    BulkProgressListener, ConnectionListener, MessageListener, Progress, ResponseListener,
};
