//! # Gatehouse (Multi-tenant Credential & Session Service)
//!
//! `gatehouse` is a credential-lifecycle service. A central operator manages
//! projects (tenants), each project owns its own pool of end-user accounts,
//! and the service issues, validates, rotates, and revokes authentication
//! artifacts scoped to the project's policy.
//!
//! ## Tenant Model
//!
//! Operator accounts own projects. Each project carries its own token policy
//! (`access_ttl`, `refresh_ttl`, `single_session`) and its own user pool;
//! end-user emails are unique per project, not globally.
//!
//! ## Authentication Artifacts
//!
//! - **Operator sessions**: coarse-grained bearer tokens with a simple expiry,
//!   no refresh.
//! - **User sessions**: access + refresh token pairs. The access token
//!   authorizes requests; the refresh token only mints new access tokens.
//! - **Verification tokens**: single-use password-reset and email-verification
//!   tokens routed through the email capability.
//!
//! All bearer artifacts are stored hashed; raw values are returned exactly
//! once at mint time. Failed credential checks collapse to an
//! undifferentiated `Unauthorized` so callers cannot probe which check
//! failed, and subject-lookup flows answer success for unknown emails to
//! prevent account enumeration.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
