pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_CONNECT_DEFAULT_SECS: u64 = 5;
    pub const KEEPALIVE_INTERVAL_SECS: u32 = 30;
    pub const POLL_SLEEP_MS: u64 = 20;
}

pub mod limits {
    pub const MAX_CAPTURE_BYTES: usize = 256 * 1024;
    pub const MAX_ANNOTATION_LENGTH: usize = 120;
    pub const MIN_SECRET_REDACT_LENGTH: usize = 6;
}

/// Sentinel exit codes for failures that never produced a remote exit status.
/// Remote commands report their own non-negative codes; these stay negative so
/// callers can tell "never connected" apart from "connected but failed".
pub mod exit_codes {
    pub const NEVER_CONNECTED: i64 = -1;
    pub const CANCELLED: i64 = -2;
    pub const CREDENTIAL_REJECTED: i64 = -3;
}

pub mod key_modes {
    pub const OWNER_READ_WRITE: u32 = 0o600;
    pub const OWNER_READ_ONLY: u32 = 0o400;
    pub const MODE_MASK: u32 = 0o777;
}

pub mod process {
    pub const EXIT_OK: i32 = 0;
    pub const EXIT_HOST_FAILURES: i32 = 1;
    pub const EXIT_CONFIG: i32 = 2;
}
