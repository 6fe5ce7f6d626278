//! In-memory store: a single mutex over id-keyed tables.
//!
//! Used by tests and `memory:` DSNs. Every compound operation runs under one
//! lock acquisition, which gives it the same atomicity the Postgres store
//! gets from transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    Account, EmailVerifyOutcome, NewAccount, NewOperatorSession, NewProject, NewProjectUser,
    NewUserSession, NewVerificationToken, OperatorSession, Project, ProjectUpdate, ProjectUser,
    Store, StoreError, TokenKind, UserSession, VerificationToken,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    projects: HashMap<Uuid, Project>,
    project_users: HashMap<Uuid, ProjectUser>,
    operator_sessions: HashMap<Uuid, OperatorSession>,
    user_sessions: HashMap<Uuid, UserSession>,
    verification_tokens: HashMap<Uuid, VerificationToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("store mutex poisoned")))
    }
}

fn revoke_live_sessions(tables: &mut Tables, project_user_id: Uuid, now: DateTime<Utc>) {
    for session in tables.user_sessions.values_mut() {
        if session.project_user_id == project_user_id && session.is_live(now) {
            session.revoked_at = Some(now);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .accounts
            .values()
            .any(|account| account.email == new.email)
        {
            return Err(StoreError::Conflict("account email"));
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: new.email,
            secret_hash: new.secret_hash,
            metadata: new.metadata,
            email_verified: false,
            created_at: Utc::now(),
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn update_account_metadata(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Option<Account>, StoreError> {
        let mut tables = self.lock()?;
        Ok(tables.accounts.get_mut(&id).map(|account| {
            account.metadata = metadata;
            account.clone()
        }))
    }

    async fn update_account_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let Some(account) = tables.accounts.get_mut(&id) else {
            return Ok(false);
        };
        account.secret_hash = secret_hash.to_string();
        Ok(true)
    }

    async fn create_project(&self, new: NewProject) -> Result<Project, StoreError> {
        let mut tables = self.lock()?;
        let project = Project {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            platform: new.platform,
            access_ttl_seconds: new.access_ttl_seconds,
            refresh_ttl_seconds: new.refresh_ttl_seconds,
            single_session: new.single_session,
            owner_account_id: new.owner_account_id,
            created_at: Utc::now(),
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.lock()?.projects.get(&id).cloned())
    }

    async fn list_projects(&self, owner_account_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let tables = self.lock()?;
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|project| project.owner_account_id == owner_account_id)
            .cloned()
            .collect();
        projects.sort_by_key(|project| project.created_at);
        Ok(projects)
    }

    async fn update_project(
        &self,
        id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Option<Project>, StoreError> {
        let mut tables = self.lock()?;
        let Some(project) = tables.projects.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            project.name = name;
        }
        if let Some(description) = update.description {
            project.description = Some(description);
        }
        if let Some(platform) = update.platform {
            project.platform = platform;
        }
        if let Some(seconds) = update.access_ttl_seconds {
            project.access_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = update.refresh_ttl_seconds {
            project.refresh_ttl_seconds = Some(seconds);
        }
        if let Some(single_session) = update.single_session {
            project.single_session = Some(single_session);
        }
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        if tables.projects.remove(&id).is_none() {
            return Ok(false);
        }
        let user_ids: Vec<Uuid> = tables
            .project_users
            .values()
            .filter(|user| user.project_id == id)
            .map(|user| user.id)
            .collect();
        tables
            .user_sessions
            .retain(|_, session| !user_ids.contains(&session.project_user_id));
        tables.project_users.retain(|_, user| user.project_id != id);
        tables
            .verification_tokens
            .retain(|_, token| token.project_id != Some(id));
        Ok(true)
    }

    async fn create_project_user(&self, new: NewProjectUser) -> Result<ProjectUser, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .project_users
            .values()
            .any(|user| user.project_id == new.project_id && user.email == new.email)
        {
            return Err(StoreError::Conflict("project user email"));
        }
        let user = ProjectUser {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            email: new.email,
            secret_hash: new.secret_hash,
            metadata: new.metadata,
            enabled: true,
            created_at: Utc::now(),
        };
        tables.project_users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_project_user(&self, id: Uuid) -> Result<Option<ProjectUser>, StoreError> {
        Ok(self.lock()?.project_users.get(&id).cloned())
    }

    async fn find_project_user_by_email(
        &self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<ProjectUser>, StoreError> {
        Ok(self
            .lock()?
            .project_users
            .values()
            .find(|user| user.project_id == project_id && user.email == email)
            .cloned())
    }

    async fn list_project_users(&self, project_id: Uuid) -> Result<Vec<ProjectUser>, StoreError> {
        let tables = self.lock()?;
        let mut users: Vec<ProjectUser> = tables
            .project_users
            .values()
            .filter(|user| user.project_id == project_id)
            .cloned()
            .collect();
        users.sort_by_key(|user| user.created_at);
        Ok(users)
    }

    async fn set_project_user_enabled(&self, id: Uuid, enabled: bool) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.project_users.get_mut(&id) {
            Some(user) => {
                user.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_project_user_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.project_users.get_mut(&id) {
            Some(user) => {
                user.secret_hash = secret_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_project_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        if tables.project_users.remove(&id).is_none() {
            return Ok(false);
        }
        tables
            .user_sessions
            .retain(|_, session| session.project_user_id != id);
        Ok(true)
    }

    async fn create_operator_session(
        &self,
        new: NewOperatorSession,
    ) -> Result<OperatorSession, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .operator_sessions
            .values()
            .any(|session| session.token_hash == new.token_hash)
        {
            return Err(StoreError::Conflict("operator session token"));
        }
        let session = OperatorSession {
            id: Uuid::new_v4(),
            account_id: new.account_id,
            token_hash: new.token_hash,
            metadata: new.metadata,
            created_at: Utc::now(),
            expires_at: new.expires_at,
        };
        tables.operator_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_operator_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<OperatorSession>, StoreError> {
        Ok(self
            .lock()?
            .operator_sessions
            .values()
            .find(|session| session.token_hash == token_hash)
            .cloned())
    }

    async fn delete_operator_session(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let id = tables
            .operator_sessions
            .values()
            .find(|session| session.token_hash == token_hash)
            .map(|session| session.id);
        Ok(id
            .and_then(|id| tables.operator_sessions.remove(&id))
            .is_some())
    }

    async fn create_user_session(
        &self,
        new: NewUserSession,
        revoke_existing: bool,
    ) -> Result<UserSession, StoreError> {
        let mut tables = self.lock()?;
        if tables.user_sessions.values().any(|session| {
            session.access_token_hash == new.access_token_hash
                || session.refresh_token_hash == new.refresh_token_hash
        }) {
            return Err(StoreError::Conflict("session token"));
        }
        let now = Utc::now();
        // Revocation happens before the insert so two sessions are never
        // simultaneously live under a single-session policy.
        if revoke_existing {
            revoke_live_sessions(&mut tables, new.project_user_id, now);
        }
        let session = UserSession {
            id: Uuid::new_v4(),
            project_user_id: new.project_user_id,
            access_token_hash: new.access_token_hash,
            refresh_token_hash: new.refresh_token_hash,
            access_expiration: new.access_expiration,
            refresh_expiration: new.refresh_expiration,
            revoked_at: None,
            device_info: new.device_info,
            created_at: now,
        };
        tables.user_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_user_session_by_access(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserSession>, StoreError> {
        Ok(self
            .lock()?
            .user_sessions
            .values()
            .find(|session| session.access_token_hash == token_hash)
            .cloned())
    }

    async fn find_user_session_by_refresh(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserSession>, StoreError> {
        Ok(self
            .lock()?
            .user_sessions
            .values()
            .find(|session| session.refresh_token_hash == token_hash)
            .cloned())
    }

    async fn list_user_sessions(
        &self,
        project_user_id: Uuid,
    ) -> Result<Vec<UserSession>, StoreError> {
        let tables = self.lock()?;
        let mut sessions: Vec<UserSession> = tables
            .user_sessions
            .values()
            .filter(|session| session.project_user_id == project_user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        Ok(sessions)
    }

    async fn refresh_user_session(
        &self,
        refresh_token_hash: &str,
        new_access_token_hash: &str,
        new_access_expiration: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError> {
        let mut tables = self.lock()?;
        let Some(session) = tables
            .user_sessions
            .values_mut()
            .find(|session| session.refresh_token_hash == refresh_token_hash)
        else {
            return Ok(None);
        };
        // The liveness guard is part of the same critical section as the
        // write; a concurrent revoke cannot slip in between.
        if session.revoked_at.is_some() || session.refresh_expiration <= now {
            return Ok(None);
        }
        session.access_token_hash = new_access_token_hash.to_string();
        session.access_expiration = new_access_expiration;
        Ok(Some(session.clone()))
    }

    async fn delete_user_session_by_access(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let id = tables
            .user_sessions
            .values()
            .find(|session| session.access_token_hash == token_hash)
            .map(|session| session.id);
        Ok(id.and_then(|id| tables.user_sessions.remove(&id)).is_some())
    }

    async fn create_verification_token(
        &self,
        new: NewVerificationToken,
    ) -> Result<VerificationToken, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .verification_tokens
            .values()
            .any(|token| token.token_hash == new.token_hash)
        {
            return Err(StoreError::Conflict("verification token"));
        }
        let token = VerificationToken {
            id: Uuid::new_v4(),
            subject_email: new.subject_email,
            project_id: new.project_id,
            token_hash: new.token_hash,
            kind: new.kind,
            expires_at: new.expires_at,
            used: false,
            created_at: Utc::now(),
        };
        tables.verification_tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_secret_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let Some(record) = tables
            .verification_tokens
            .values()
            .find(|token| {
                token.token_hash == token_hash
                    && token.kind == TokenKind::PasswordReset
                    && !token.used
                    && token.expires_at > now
            })
            .cloned()
        else {
            return Ok(false);
        };
        // Resolve the subject first: if it is gone, the token stays unused so
        // the caller sees the same invalid_token outcome on every retry.
        let token_id = record.id;
        match record.project_id {
            Some(project_id) => {
                let Some(user_id) = tables
                    .project_users
                    .values()
                    .find(|user| user.project_id == project_id && user.email == record.subject_email)
                    .map(|user| user.id)
                else {
                    return Ok(false);
                };
                if let Some(user) = tables.project_users.get_mut(&user_id) {
                    user.secret_hash = new_secret_hash.to_string();
                }
            }
            None => {
                let Some(account_id) = tables
                    .accounts
                    .values()
                    .find(|account| account.email == record.subject_email)
                    .map(|account| account.id)
                else {
                    return Ok(false);
                };
                if let Some(account) = tables.accounts.get_mut(&account_id) {
                    account.secret_hash = new_secret_hash.to_string();
                }
            }
        }
        if let Some(token) = tables.verification_tokens.get_mut(&token_id) {
            token.used = true;
        }
        Ok(true)
    }

    async fn consume_email_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<EmailVerifyOutcome, StoreError> {
        let mut tables = self.lock()?;
        let Some(record) = tables
            .verification_tokens
            .values()
            .find(|token| {
                token.token_hash == token_hash
                    && token.kind == TokenKind::EmailVerify
                    && !token.used
                    && token.expires_at > now
            })
            .cloned()
        else {
            return Ok(EmailVerifyOutcome::Invalid);
        };
        let Some(account_id) = tables
            .accounts
            .values()
            .find(|account| account.email == record.subject_email)
            .map(|account| account.id)
        else {
            return Ok(EmailVerifyOutcome::Invalid);
        };
        let already = tables
            .accounts
            .get(&account_id)
            .is_some_and(|account| account.email_verified);
        if let Some(account) = tables.accounts.get_mut(&account_id) {
            account.email_verified = true;
        }
        if let Some(token) = tables.verification_tokens.get_mut(&record.id) {
            token.used = true;
        }
        Ok(if already {
            EmailVerifyOutcome::AlreadyVerified
        } else {
            EmailVerifyOutcome::Verified
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Platform;
    use chrono::Duration;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            secret_hash: "$argon2id$stub".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    fn new_session(user_id: Uuid, tag: &str, now: DateTime<Utc>) -> NewUserSession {
        NewUserSession {
            project_user_id: user_id,
            access_token_hash: format!("access-{tag}"),
            refresh_token_hash: format!("refresh-{tag}"),
            access_expiration: now + Duration::seconds(900),
            refresh_expiration: now + Duration::seconds(43_200),
            device_info: None,
        }
    }

    #[tokio::test]
    async fn duplicate_account_email_conflicts() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.create_account(new_account("a@example.com")).await?;
        let err = store.create_account(new_account("a@example.com")).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn project_user_email_unique_per_project_only() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let owner = store.create_account(new_account("own@example.com")).await?;
        let mut projects = Vec::new();
        for name in ["one", "two"] {
            projects.push(
                store
                    .create_project(NewProject {
                        name: name.to_string(),
                        description: None,
                        platform: Platform::All,
                        access_ttl_seconds: None,
                        refresh_ttl_seconds: None,
                        single_session: None,
                        owner_account_id: owner.id,
                    })
                    .await?,
            );
        }
        for project in &projects {
            store
                .create_project_user(NewProjectUser {
                    project_id: project.id,
                    email: "same@example.com".to_string(),
                    secret_hash: "$argon2id$stub".to_string(),
                    metadata: serde_json::json!({}),
                })
                .await?;
        }
        let dup = store
            .create_project_user(NewProjectUser {
                project_id: projects[0].id,
                email: "same@example.com".to_string(),
                secret_hash: "$argon2id$stub".to_string(),
                metadata: serde_json::json!({}),
            })
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn delete_project_cascades_users_and_sessions() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let owner = store.create_account(new_account("own@example.com")).await?;
        let project = store
            .create_project(NewProject {
                name: "demo".to_string(),
                description: None,
                platform: Platform::Web,
                access_ttl_seconds: None,
                refresh_ttl_seconds: None,
                single_session: None,
                owner_account_id: owner.id,
            })
            .await?;
        let user = store
            .create_project_user(NewProjectUser {
                project_id: project.id,
                email: "user@example.com".to_string(),
                secret_hash: "$argon2id$stub".to_string(),
                metadata: serde_json::json!({}),
            })
            .await?;
        let now = Utc::now();
        store
            .create_user_session(new_session(user.id, "t1", now), false)
            .await?;

        assert!(store.delete_project(project.id).await?);
        assert!(store.find_project_user(user.id).await?.is_none());
        assert!(store.list_user_sessions(user.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_then_create_leaves_one_live_session() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        store
            .create_user_session(new_session(user_id, "t1", now), true)
            .await?;
        store
            .create_user_session(new_session(user_id, "t2", now), true)
            .await?;
        let sessions = store.list_user_sessions(user_id).await?;
        let live: Vec<&UserSession> = sessions
            .iter()
            .filter(|session| session.is_live(Utc::now()))
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].access_token_hash, "access-t2");
        Ok(())
    }

    #[tokio::test]
    async fn refresh_guard_rejects_revoked_and_expired() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let mut expired = new_session(user_id, "old", now);
        expired.refresh_expiration = now - Duration::seconds(1);
        store.create_user_session(expired, false).await?;
        let outcome = store
            .refresh_user_session("refresh-old", "access-new", now + Duration::seconds(900), now)
            .await?;
        assert!(outcome.is_none());

        store
            .create_user_session(new_session(user_id, "live", now), false)
            .await?;
        // Revoke it via single-session create, then try to refresh.
        store
            .create_user_session(new_session(user_id, "next", now), true)
            .await?;
        let outcome = store
            .refresh_user_session(
                "refresh-live",
                "access-new2",
                now + Duration::seconds(900),
                now,
            )
            .await?;
        assert!(outcome.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn password_reset_consumption_is_exactly_once() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("a@example.com")).await?;
        let now = Utc::now();
        store
            .create_verification_token(NewVerificationToken {
                subject_email: account.email.clone(),
                project_id: None,
                token_hash: "tok".to_string(),
                kind: TokenKind::PasswordReset,
                expires_at: now + Duration::minutes(15),
            })
            .await?;

        assert!(store.consume_password_reset("tok", now, "$argon2id$new").await?);
        assert!(!store.consume_password_reset("tok", now, "$argon2id$other").await?);
        let account = store
            .find_account_by_email("a@example.com")
            .await?
            .expect("account");
        assert_eq!(account.secret_hash, "$argon2id$new");
        Ok(())
    }

    #[tokio::test]
    async fn password_reset_missing_subject_leaves_token_unused() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .create_verification_token(NewVerificationToken {
                subject_email: "ghost@example.com".to_string(),
                project_id: None,
                token_hash: "tok".to_string(),
                kind: TokenKind::PasswordReset,
                expires_at: now + Duration::minutes(15),
            })
            .await?;
        assert!(!store.consume_password_reset("tok", now, "$argon2id$new").await?);
        // Token was not burned; a later retry sees the same outcome.
        assert!(!store.consume_password_reset("tok", now, "$argon2id$new").await?);
        Ok(())
    }

    #[tokio::test]
    async fn email_verification_is_idempotent_across_tokens() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("v@example.com")).await?;
        let now = Utc::now();
        for tag in ["first", "second"] {
            store
                .create_verification_token(NewVerificationToken {
                    subject_email: account.email.clone(),
                    project_id: None,
                    token_hash: tag.to_string(),
                    kind: TokenKind::EmailVerify,
                    expires_at: now + Duration::hours(24),
                })
                .await?;
        }
        assert_eq!(
            store.consume_email_verification("first", now).await?,
            EmailVerifyOutcome::Verified
        );
        assert_eq!(
            store.consume_email_verification("second", now).await?,
            EmailVerifyOutcome::AlreadyVerified
        );
        // A consumed token is invalid regardless of subject state.
        assert_eq!(
            store.consume_email_verification("first", now).await?,
            EmailVerifyOutcome::Invalid
        );
        Ok(())
    }
}
