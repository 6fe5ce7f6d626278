//! Postgres store backed by sqlx.
//!
//! Compound invariants (single-session revoke-then-create, exactly-once token
//! consumption) run inside transactions with conditional updates; the guards
//! are re-evaluated by the database, not by the caller.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    Account, EmailVerifyOutcome, NewAccount, NewOperatorSession, NewProject, NewProjectUser,
    NewUserSession, NewVerificationToken, OperatorSession, Project, ProjectUpdate, ProjectUser,
    Store, StoreError, TokenKind, UserSession, VerificationToken,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn account_from(row: &PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        secret_hash: row.get("secret_hash"),
        metadata: row.get("metadata"),
        email_verified: row.get("email_verified"),
        created_at: row.get("created_at"),
    }
}

fn project_from(row: &PgRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        platform: row.get("platform"),
        access_ttl_seconds: row.get("access_ttl_seconds"),
        refresh_ttl_seconds: row.get("refresh_ttl_seconds"),
        single_session: row.get("single_session"),
        owner_account_id: row.get("owner_account_id"),
        created_at: row.get("created_at"),
    }
}

fn project_user_from(row: &PgRow) -> ProjectUser {
    ProjectUser {
        id: row.get("id"),
        project_id: row.get("project_id"),
        email: row.get("email"),
        secret_hash: row.get("secret_hash"),
        metadata: row.get("metadata"),
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
    }
}

fn operator_session_from(row: &PgRow) -> OperatorSession {
    OperatorSession {
        id: row.get("id"),
        account_id: row.get("account_id"),
        token_hash: row.get("token_hash"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

fn user_session_from(row: &PgRow) -> UserSession {
    UserSession {
        id: row.get("id"),
        project_user_id: row.get("project_user_id"),
        access_token_hash: row.get("access_token_hash"),
        refresh_token_hash: row.get("refresh_token_hash"),
        access_expiration: row.get("access_expiration"),
        refresh_expiration: row.get("refresh_expiration"),
        revoked_at: row.get("revoked_at"),
        device_info: row.get("device_info"),
        created_at: row.get("created_at"),
    }
}

fn verification_token_from(row: &PgRow) -> VerificationToken {
    VerificationToken {
        id: row.get("id"),
        subject_email: row.get("subject_email"),
        project_id: row.get("project_id"),
        token_hash: row.get("token_hash"),
        kind: row.get("kind"),
        expires_at: row.get("expires_at"),
        used: row.get("used"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(tracing::info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(tracing::info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")?;
        Ok(())
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let query = r"
            INSERT INTO accounts (id, email, secret_hash, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&new.email)
            .bind(&new.secret_hash)
            .bind(&new.metadata)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(row) => Ok(account_from(&row)),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict("account email")),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert account")
                .into()),
        }
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = "SELECT * FROM accounts WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup account")?;
        Ok(row.as_ref().map(account_from))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = "SELECT * FROM accounts WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup account by email")?;
        Ok(row.as_ref().map(account_from))
    }

    async fn update_account_metadata(
        &self,
        id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Option<Account>, StoreError> {
        let query = "UPDATE accounts SET metadata = $2 WHERE id = $1 RETURNING *";
        let row = sqlx::query(query)
            .bind(id)
            .bind(&metadata)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update account metadata")?;
        Ok(row.as_ref().map(account_from))
    }

    async fn update_account_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
    ) -> Result<bool, StoreError> {
        let query = "UPDATE accounts SET secret_hash = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(secret_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update account secret")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_project(&self, new: NewProject) -> Result<Project, StoreError> {
        let query = r"
            INSERT INTO projects
                (id, name, description, platform, access_ttl_seconds,
                 refresh_ttl_seconds, single_session, owner_account_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.description)
            .bind(new.platform)
            .bind(new.access_ttl_seconds)
            .bind(new.refresh_ttl_seconds)
            .bind(new.single_session)
            .bind(new.owner_account_id)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert project")?;
        Ok(project_from(&row))
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let query = "SELECT * FROM projects WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup project")?;
        Ok(row.as_ref().map(project_from))
    }

    async fn list_projects(&self, owner_account_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let query = "SELECT * FROM projects WHERE owner_account_id = $1 ORDER BY created_at";
        let rows = sqlx::query(query)
            .bind(owner_account_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list projects")?;
        Ok(rows.iter().map(project_from).collect())
    }

    async fn update_project(
        &self,
        id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Option<Project>, StoreError> {
        let query = r"
            UPDATE projects SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                platform = COALESCE($4, platform),
                access_ttl_seconds = COALESCE($5, access_ttl_seconds),
                refresh_ttl_seconds = COALESCE($6, refresh_ttl_seconds),
                single_session = COALESCE($7, single_session)
            WHERE id = $1
            RETURNING *
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(&update.name)
            .bind(&update.description)
            .bind(update.platform)
            .bind(update.access_ttl_seconds)
            .bind(update.refresh_ttl_seconds)
            .bind(update.single_session)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update project")?;
        Ok(row.as_ref().map(project_from))
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, StoreError> {
        // ON DELETE CASCADE removes project users and their sessions.
        let query = "DELETE FROM projects WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete project")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_project_user(&self, new: NewProjectUser) -> Result<ProjectUser, StoreError> {
        let query = r"
            INSERT INTO project_users (id, project_id, email, secret_hash, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(new.project_id)
            .bind(&new.email)
            .bind(&new.secret_hash)
            .bind(&new.metadata)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(row) => Ok(project_user_from(&row)),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("project user email"))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert project user")
                .into()),
        }
    }

    async fn find_project_user(&self, id: Uuid) -> Result<Option<ProjectUser>, StoreError> {
        let query = "SELECT * FROM project_users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup project user")?;
        Ok(row.as_ref().map(project_user_from))
    }

    async fn find_project_user_by_email(
        &self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<ProjectUser>, StoreError> {
        let query = "SELECT * FROM project_users WHERE project_id = $1 AND email = $2";
        let row = sqlx::query(query)
            .bind(project_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup project user by email")?;
        Ok(row.as_ref().map(project_user_from))
    }

    async fn list_project_users(&self, project_id: Uuid) -> Result<Vec<ProjectUser>, StoreError> {
        let query = "SELECT * FROM project_users WHERE project_id = $1 ORDER BY created_at";
        let rows = sqlx::query(query)
            .bind(project_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list project users")?;
        Ok(rows.iter().map(project_user_from).collect())
    }

    async fn set_project_user_enabled(&self, id: Uuid, enabled: bool) -> Result<bool, StoreError> {
        let query = "UPDATE project_users SET enabled = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update project user enabled flag")?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_project_user_secret(
        &self,
        id: Uuid,
        secret_hash: &str,
    ) -> Result<bool, StoreError> {
        let query = "UPDATE project_users SET secret_hash = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(secret_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update project user secret")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_project_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM project_users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete project user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_operator_session(
        &self,
        new: NewOperatorSession,
    ) -> Result<OperatorSession, StoreError> {
        let query = r"
            INSERT INTO operator_sessions (id, account_id, token_hash, metadata, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(new.account_id)
            .bind(&new.token_hash)
            .bind(&new.metadata)
            .bind(new.expires_at)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(row) => Ok(operator_session_from(&row)),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("operator session token"))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert operator session")
                .into()),
        }
    }

    async fn find_operator_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<OperatorSession>, StoreError> {
        let query = "SELECT * FROM operator_sessions WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup operator session")?;
        Ok(row.as_ref().map(operator_session_from))
    }

    async fn delete_operator_session(&self, token_hash: &str) -> Result<bool, StoreError> {
        let query = "DELETE FROM operator_sessions WHERE token_hash = $1";
        let result = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete operator session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_user_session(
        &self,
        new: NewUserSession,
        revoke_existing: bool,
    ) -> Result<UserSession, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin session transaction")?;

        if revoke_existing {
            // Lock the owner row first: under READ COMMITTED two concurrent
            // sign-ins would each revoke before the other's insert commits
            // and both sessions would survive. The lock serializes them.
            let query = "SELECT id FROM project_users WHERE id = $1 FOR UPDATE";
            sqlx::query(query)
                .bind(new.project_user_id)
                .fetch_optional(&mut *tx)
                .instrument(query_span("SELECT", query))
                .await
                .context("failed to lock session owner")?;

            // Revoke first so two sessions are never simultaneously live
            // under a single-session policy.
            let query = r"
                UPDATE user_sessions
                SET revoked_at = NOW()
                WHERE project_user_id = $1
                  AND revoked_at IS NULL
                  AND access_expiration > NOW()
                  AND refresh_expiration > NOW()
            ";
            sqlx::query(query)
                .bind(new.project_user_id)
                .execute(&mut *tx)
                .instrument(query_span("UPDATE", query))
                .await
                .context("failed to revoke prior sessions")?;
        }

        let query = r"
            INSERT INTO user_sessions
                (id, project_user_id, access_token_hash, refresh_token_hash,
                 access_expiration, refresh_expiration, device_info)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(new.project_user_id)
            .bind(&new.access_token_hash)
            .bind(&new.refresh_token_hash)
            .bind(new.access_expiration)
            .bind(new.refresh_expiration)
            .bind(&new.device_info)
            .fetch_one(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await;
        let row = match result {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
                return Err(StoreError::Conflict("session token"));
            }
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(anyhow::Error::new(err)
                    .context("failed to insert user session")
                    .into());
            }
        };
        tx.commit().await.context("commit session transaction")?;
        Ok(user_session_from(&row))
    }

    async fn find_user_session_by_access(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserSession>, StoreError> {
        let query = "SELECT * FROM user_sessions WHERE access_token_hash = $1";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session by access token")?;
        Ok(row.as_ref().map(user_session_from))
    }

    async fn find_user_session_by_refresh(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserSession>, StoreError> {
        let query = "SELECT * FROM user_sessions WHERE refresh_token_hash = $1";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session by refresh token")?;
        Ok(row.as_ref().map(user_session_from))
    }

    async fn list_user_sessions(
        &self,
        project_user_id: Uuid,
    ) -> Result<Vec<UserSession>, StoreError> {
        let query = "SELECT * FROM user_sessions WHERE project_user_id = $1 ORDER BY created_at";
        let rows = sqlx::query(query)
            .bind(project_user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list user sessions")?;
        Ok(rows.iter().map(user_session_from).collect())
    }

    async fn refresh_user_session(
        &self,
        refresh_token_hash: &str,
        new_access_token_hash: &str,
        new_access_expiration: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<UserSession>, StoreError> {
        // Single conditional update: the liveness guard and the token swap
        // cannot be separated by a concurrent revoke.
        let query = r"
            UPDATE user_sessions
            SET access_token_hash = $2,
                access_expiration = $3
            WHERE refresh_token_hash = $1
              AND revoked_at IS NULL
              AND refresh_expiration > $4
            RETURNING *
        ";
        let row = sqlx::query(query)
            .bind(refresh_token_hash)
            .bind(new_access_token_hash)
            .bind(new_access_expiration)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to refresh session")?;
        Ok(row.as_ref().map(user_session_from))
    }

    async fn delete_user_session_by_access(&self, token_hash: &str) -> Result<bool, StoreError> {
        // Sign-out is idempotent; zero rows deleted is fine.
        let query = "DELETE FROM user_sessions WHERE access_token_hash = $1";
        let result = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete user session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_verification_token(
        &self,
        new: NewVerificationToken,
    ) -> Result<VerificationToken, StoreError> {
        let query = r"
            INSERT INTO verification_tokens
                (id, subject_email, project_id, token_hash, kind, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&new.subject_email)
            .bind(new.project_id)
            .bind(&new.token_hash)
            .bind(new.kind)
            .bind(new.expires_at)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(row) => Ok(verification_token_from(&row)),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict("verification token"))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert verification token")
                .into()),
        }
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_secret_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.context("begin reset transaction")?;

        // Burn the token and apply the new secret as one unit; if the subject
        // is gone the transaction rolls back and the token stays unused.
        let query = r"
            UPDATE verification_tokens
            SET used = TRUE
            WHERE token_hash = $1
              AND kind = $2
              AND used = FALSE
              AND expires_at > $3
            RETURNING subject_email, project_id
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(TokenKind::PasswordReset)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume reset token")?;

        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Ok(false);
        };
        let subject_email: String = row.get("subject_email");
        let project_id: Option<Uuid> = row.get("project_id");

        let applied = match project_id {
            Some(project_id) => {
                let query = r"
                    UPDATE project_users
                    SET secret_hash = $3
                    WHERE project_id = $1 AND email = $2
                ";
                sqlx::query(query)
                    .bind(project_id)
                    .bind(&subject_email)
                    .bind(new_secret_hash)
                    .execute(&mut *tx)
                    .instrument(query_span("UPDATE", query))
                    .await
                    .context("failed to apply project user secret")?
                    .rows_affected()
            }
            None => {
                let query = "UPDATE accounts SET secret_hash = $2 WHERE email = $1";
                sqlx::query(query)
                    .bind(&subject_email)
                    .bind(new_secret_hash)
                    .execute(&mut *tx)
                    .instrument(query_span("UPDATE", query))
                    .await
                    .context("failed to apply account secret")?
                    .rows_affected()
            }
        };

        if applied == 0 {
            let _ = tx.rollback().await;
            return Ok(false);
        }
        tx.commit().await.context("commit reset transaction")?;
        Ok(true)
    }

    async fn consume_email_verification(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<EmailVerifyOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin verification transaction")?;

        let query = r"
            UPDATE verification_tokens
            SET used = TRUE
            WHERE token_hash = $1
              AND kind = $2
              AND used = FALSE
              AND expires_at > $3
            RETURNING subject_email
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(TokenKind::EmailVerify)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume verification token")?;

        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Ok(EmailVerifyOutcome::Invalid);
        };
        let subject_email: String = row.get("subject_email");

        let query = "SELECT email_verified FROM accounts WHERE email = $1 FOR UPDATE";
        let row = sqlx::query(query)
            .bind(&subject_email)
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lock account for verification")?;

        let Some(row) = row else {
            // Subject vanished; keep the token unused for consistent retries.
            let _ = tx.rollback().await;
            return Ok(EmailVerifyOutcome::Invalid);
        };
        let was_verified: bool = row.get("email_verified");

        if !was_verified {
            let query = "UPDATE accounts SET email_verified = TRUE WHERE email = $1";
            sqlx::query(query)
                .bind(&subject_email)
                .execute(&mut *tx)
                .instrument(query_span("UPDATE", query))
                .await
                .context("failed to flag account verified")?;
        }
        tx.commit().await.context("commit verification transaction")?;
        Ok(if was_verified {
            EmailVerifyOutcome::AlreadyVerified
        } else {
            EmailVerifyOutcome::Verified
        })
    }
}
