use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUserRow, ProfileChangesRow, User};
use super::store::{StoreError, StoreResult, UserStore};

const USER_COLUMNS: &str =
    "id, username, email, fullname, password_hash, refresh_token, created_at, updated_at";

/// PostgreSQL-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Unique-constraint violations become conflicts; everything else is opaque.
fn map_write_err(e: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let msg = match db_err.constraint() {
                Some(c) if c.contains("email") => "Email is already registered",
                _ => "Username is already taken",
            };
            return StoreError::Conflict(msg.into());
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by username or email")?;
        Ok(user)
    }

    async fn insert(&self, row: NewUserRow) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, fullname, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(row.id)
        .bind(&row.username)
        .bind(&row.email)
        .bind(&row.fullname)
        .bind(&row.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_err(e, "insert user"))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChangesRow,
    ) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET fullname      = COALESCE($2, fullname),
                   username      = COALESCE($3, username),
                   password_hash = COALESCE($4, password_hash),
                   updated_at    = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.fullname)
        .bind(changes.username)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_err(e, "update user profile"))
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE users SET refresh_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await
            .context("set refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET refresh_token = $3 WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&self.db)
        .await
        .context("swap refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() == 1)
    }
}
