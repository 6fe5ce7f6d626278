//! Per-project policy resolution.

use chrono::Duration;

use crate::store::Project;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 900;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 43_200;
pub const DEFAULT_SINGLE_SESSION: bool = false;

/// Effective token policy for one project.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub single_session: bool,
}

/// Resolve a project's effective policy, falling back to the hard-coded
/// defaults when the record omits a value. Pure function of the record.
///
/// The access window must be strictly shorter than the refresh window; a
/// record violating that (possible only by writing to the store directly)
/// resolves to the defaults for both.
#[must_use]
pub fn resolve(project: &Project) -> Policy {
    let mut access_seconds = project
        .access_ttl_seconds
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS);
    let mut refresh_seconds = project
        .refresh_ttl_seconds
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS);
    if access_seconds >= refresh_seconds {
        access_seconds = DEFAULT_ACCESS_TTL_SECONDS;
        refresh_seconds = DEFAULT_REFRESH_TTL_SECONDS;
    }
    Policy {
        access_ttl: Duration::seconds(access_seconds),
        refresh_ttl: Duration::seconds(refresh_seconds),
        single_session: project.single_session.unwrap_or(DEFAULT_SINGLE_SESSION),
    }
}
