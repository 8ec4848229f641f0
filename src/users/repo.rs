use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{UserError, UserResult};
use crate::users::model::User;

/// Columns of the default read projection. `password` is left out.
const USER_COLUMNS: &str = "id, email, first_name, last_name, phone_number, \
     password_changed_at, password_reset_expires, password_reset_token, role, \
     created_at, updated_at";

/// Lookup key for a single user.
#[derive(Debug, Clone)]
pub enum UserFilter {
    Id(Uuid),
    Email(String),
    /// Hash of a reset token, as stored in `password_reset_token`.
    ResetTokenHash(String),
}

/// Which columns to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Default,
    WithPassword,
}

/// Persistence for user records.
///
/// `insert` and `update` write the record as given; callers go through
/// [`User::save`] so the pre-save hook has run first.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> UserResult<()>;
    async fn update(&self, user: &User) -> UserResult<()>;
    async fn find_one(&self, filter: &UserFilter, projection: Projection)
        -> UserResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> UserResult<Option<User>> {
        self.find_one(&UserFilter::Id(id), Projection::Default).await
    }

    async fn find_by_id_with_password(&self, id: Uuid) -> UserResult<Option<User>> {
        self.find_one(&UserFilter::Id(id), Projection::WithPassword)
            .await
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<User>> {
        self.find_one(&UserFilter::Email(email.trim().to_lowercase()), Projection::Default)
            .await
    }

    async fn find_by_email_with_password(&self, email: &str) -> UserResult<Option<User>> {
        self.find_one(
            &UserFilter::Email(email.trim().to_lowercase()),
            Projection::WithPassword,
        )
        .await
    }

    async fn find_by_reset_token_hash(&self, token_hash: &str) -> UserResult<Option<User>> {
        self.find_one(
            &UserFilter::ResetTokenHash(token_hash.to_string()),
            Projection::Default,
        )
        .await
    }
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Value bound to `password` in UPDATE. `None` keeps the stored hash via COALESCE.
fn password_for_update(user: &User) -> Option<&str> {
    user.is_password_modified().then(|| user.password())
}

fn map_write_error(e: sqlx::Error, what: &'static str) -> UserError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return UserError::EmailTaken;
        }
    }
    UserError::Storage(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> UserResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, phone_number, password,
                               password_changed_at, password_reset_expires,
                               password_reset_token, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.password())
        .bind(user.password_changed_at)
        .bind(user.password_reset_expires)
        .bind(&user.password_reset_token)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, "insert user"))?;
        Ok(())
    }

    async fn update(&self, user: &User) -> UserResult<()> {
        let password = password_for_update(user);
        let result = sqlx::query(
            r#"
            UPDATE users
               SET email = $2,
                   first_name = $3,
                   last_name = $4,
                   phone_number = $5,
                   password = COALESCE($6, password),
                   password_changed_at = $7,
                   password_reset_expires = $8,
                   password_reset_token = $9,
                   role = $10,
                   updated_at = $11
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(password)
        .bind(user.password_changed_at)
        .bind(user.password_reset_expires)
        .bind(&user.password_reset_token)
        .bind(user.role)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    async fn find_one(
        &self,
        filter: &UserFilter,
        projection: Projection,
    ) -> UserResult<Option<User>> {
        let columns = match projection {
            Projection::Default => USER_COLUMNS.to_string(),
            Projection::WithPassword => format!("{USER_COLUMNS}, password"),
        };
        let (column, sql) = match filter {
            UserFilter::Id(_) => ("id", format!("SELECT {columns} FROM users WHERE id = $1")),
            UserFilter::Email(_) => (
                "email",
                format!("SELECT {columns} FROM users WHERE email = $1"),
            ),
            UserFilter::ResetTokenHash(_) => (
                "password_reset_token",
                format!("SELECT {columns} FROM users WHERE password_reset_token = $1"),
            ),
        };

        let query = sqlx::query_as::<_, User>(&sql);
        let query = match filter {
            UserFilter::Id(id) => query.bind(*id),
            UserFilter::Email(email) => query.bind(email.as_str()),
            UserFilter::ResetTokenHash(hash) => query.bind(hash.as_str()),
        };
        let user = query
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("find user by {column}"))?;
        Ok(user)
    }
}
