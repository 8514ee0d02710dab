//! Protocol constants for the Firebase REST API.
//!
//! # Organization
//!
//! ```text
//! constants/
//! ├── Top-level    - Path suffix and default values (JSON_SUFFIX, etc.)
//! ├── params       - Query parameter names understood by the REST API
//! ├── events       - Event names used in the streaming framing
//! ├── fields       - Field prefixes inside one stream record
//! └── media_types  - Accept / Content-Type values
//! ```
//!
//! # Examples
//!
//! ```
//! use firebase_http::protocol::constants::{events, params};
//!
//! assert_eq!(params::SHALLOW, "shallow");
//! assert_eq!(events::KEEP_ALIVE, "keep-alive");
//! ```

// =============================================================================
// Top-Level Constants
// =============================================================================

/// Every REST request targets `{location}/.json`.
pub const JSON_SUFFIX: &str = "/.json";

/// Scheme prepended to base addresses that carry none.
pub const DEFAULT_SCHEME: &str = "https://";

/// Value of the `format` parameter that asks for priorities.
pub const FORMAT_EXPORT: &str = "export";

/// Default timeout budget for dial plus header wait.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Query Parameters
// =============================================================================

/// Query parameter names.
pub mod params {
    /// Auth token or database secret.
    pub const AUTH: &str = "auth";

    /// `format=export` includes `.priority` in returned values.
    pub const FORMAT: &str = "format";

    /// `shallow=true` truncates object children to `true`.
    pub const SHALLOW: &str = "shallow";

    pub const ORDER_BY: &str = "orderBy";
    pub const EQUAL_TO: &str = "equalTo";
    pub const START_AT: &str = "startAt";
    pub const END_AT: &str = "endAt";
    pub const LIMIT_TO_FIRST: &str = "limitToFirst";
    pub const LIMIT_TO_LAST: &str = "limitToLast";
}

// =============================================================================
// Stream Event Names
// =============================================================================

/// Event names carried on `event:` lines.
pub mod events {
    /// Replace the value at `path` with `data`.
    pub const PUT: &str = "put";

    /// Merge the children of `data` into the value at `path`.
    pub const PATCH: &str = "patch";

    pub const KEEP_ALIVE: &str = "keep-alive";

    /// The server closed the stream, usually after a security rule change.
    pub const CANCEL: &str = "cancel";

    /// The credential used for the stream expired or was revoked.
    pub const AUTH_REVOKED: &str = "auth_revoked";

    /// Hyphenated spelling accepted alongside [`AUTH_REVOKED`].
    pub const AUTH_REVOKED_ALT: &str = "auth-revoked";
}

// =============================================================================
// Record Fields
// =============================================================================

/// Field names inside one stream record.
pub mod fields {
    pub const EVENT: &str = "event";
    pub const DATA: &str = "data";
}

// =============================================================================
// Media Types
// =============================================================================

pub mod media_types {
    /// Accept value that switches a GET into streaming mode.
    pub const EVENT_STREAM: &str = "text/event-stream";

    pub const JSON: &str = "application/json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_names() {
        assert_eq!(params::AUTH, "auth");
        assert_eq!(params::FORMAT, "format");
        assert_eq!(params::SHALLOW, "shallow");
        assert_eq!(FORMAT_EXPORT, "export");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(events::PUT, "put");
        assert_eq!(events::PATCH, "patch");
        assert_eq!(events::AUTH_REVOKED, "auth_revoked");
    }
}
