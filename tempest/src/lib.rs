pub mod codec;
pub mod config;
pub mod conversions;
pub mod ipc;
pub mod logging;
pub mod relay;
pub mod store;

pub use codec::{apply, apply_datagram, Applied, CodecError, EventKind};
pub use config::{OutputFormat, RelayConfig};
pub use ipc::{Command, ControlChannel, IpcError};
pub use relay::{Relay, RelayError};
pub use store::AggregationStore;

pub fn get_version() -> String {
    format!("v{}", env!("CARGO_PKG_VERSION"))
}
