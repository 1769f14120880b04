pub mod constants;
pub mod notification_tools;
pub mod render_tools;
pub mod server;
pub mod tools;
pub mod types;

// Re-export commonly used constants and helpers
pub use constants::{JsonRpcEnvelopes, MCP_PROTOCOL_VERSION};
