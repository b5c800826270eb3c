//! Protocol vocabulary shared by the client, the servers and every transport.

mod primitives;
mod status;

pub use primitives::{ClientId, LockId, Xid};
pub use status::LockStatus;
