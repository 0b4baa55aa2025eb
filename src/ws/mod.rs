//! Session gateway - WebSocket transport, names and targeted delivery

pub mod handler;
pub mod names;
pub mod protocol;
pub mod session;
