mod decode;
mod janitor;
pub mod transport;
mod worker;

mod supervisor;

pub use decode::decode_payload;
pub use supervisor::BleSupervisor;
pub use transport::{BleTransport, PatchConnection};
