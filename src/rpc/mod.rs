//! Broker transport: blocking unary calls over framed TCP.

pub mod endpoint;
pub mod message;
pub mod remote;

pub use endpoint::Endpoint;
pub use message::{read_frame, write_frame, Request, Response, MESSAGE_SIZE_LIMIT};
pub use remote::RemoteBroker;
