//! Small helpers with no shared state, plus the in-process client tracker.

pub mod client_state;
pub mod hostname;
pub mod time;

pub use client_state::{ClientState, ClientStateTracker, SharedClientStates};
pub use hostname::{forwarded_client_ip, resolve_hostname, HostnameResolver};
pub use time::{current_time, format_timestamp, parse_timestamp, FormatError};
