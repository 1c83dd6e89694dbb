//! lsgate core library: the command gate, sandboxed `ls` execution, and the WebSocket
//! gateway used by the CLI.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod init;
pub mod resolve;
pub mod sandbox;
