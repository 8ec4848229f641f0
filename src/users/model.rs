use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::auth::{
    password::{compare_password, hash_password},
    tokens::{generate_reset_token, hashed_token},
};
use crate::error::{UserError, UserResult};
use crate::users::{hooks, repo::UserStore};

/// Lifetime of a password reset token when the caller has no override.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    async_graphql::Enum,
)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[graphql(name = "UserRole")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// Where the in-memory password stands relative to what is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordState {
    /// Matches storage (or was not loaded at all).
    #[default]
    Clean,
    /// Holds a plaintext value that has not been hashed yet.
    Plain,
    /// Hashed by the pre-save hook but not written yet.
    Hashed,
}

/// Fields accepted when creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone_number: String,
    pub password: String,
    pub role: Option<UserRole>,
}

/// Options for [`User::save`].
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    pub validate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

impl SaveOptions {
    pub fn skip_validation() -> Self {
        Self { validate: false }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone_number: String,
    // argon2 hash once saved; absent from the default projection
    #[serde(skip)]
    #[sqlx(default)]
    password: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    pub role: UserRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip)]
    #[sqlx(skip)]
    is_new: bool,
    #[serde(skip)]
    #[sqlx(skip)]
    password_state: PasswordState,
}

fn trimmed(s: &str) -> String {
    s.trim().to_string()
}

fn trimmed_opt(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl User {
    /// Build an unsaved record. The password stays plaintext until the
    /// pre-save hook runs.
    pub fn new(input: NewUser) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            email: trimmed(&input.email).to_lowercase(),
            first_name: trimmed(&input.first_name),
            last_name: trimmed_opt(input.last_name.as_deref()),
            phone_number: trimmed(&input.phone_number),
            password: trimmed(&input.password),
            password_changed_at: None,
            password_reset_expires: None,
            password_reset_token: None,
            role: input.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            is_new: true,
            password_state: PasswordState::Plain,
        }
    }

    /// Stored password value: the hash for saved records, empty when the
    /// record was loaded through the default projection.
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, plain: &str) {
        self.password = trimmed(plain);
        self.password_state = PasswordState::Plain;
    }

    pub fn set_email(&mut self, email: &str) {
        self.email = trimmed(email).to_lowercase();
    }

    pub fn set_first_name(&mut self, first_name: &str) {
        self.first_name = trimmed(first_name);
    }

    pub fn set_last_name(&mut self, last_name: Option<&str>) {
        self.last_name = trimmed_opt(last_name);
    }

    pub fn set_phone_number(&mut self, phone_number: &str) {
        self.phone_number = trimmed(phone_number);
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_password_modified(&self) -> bool {
        self.password_state != PasswordState::Clean
    }

    pub fn password_state(&self) -> PasswordState {
        self.password_state
    }

    pub(crate) fn apply_password_hash(&mut self, hash: String) {
        self.password = hash;
        self.password_state = PasswordState::Hashed;
    }

    /// Reset dirty tracking after the record reached storage.
    pub(crate) fn mark_saved(&mut self) {
        self.is_new = false;
        self.password_state = PasswordState::Clean;
    }

    /// Copy as a freshly loaded row would look for the given projection.
    pub(crate) fn loaded(&self, with_password: bool) -> Self {
        let mut user = self.clone();
        user.mark_saved();
        if !with_password {
            user.password.clear();
        }
        user
    }

    pub(crate) fn strip_password(mut self) -> Self {
        self.password.clear();
        self
    }

    pub(crate) fn with_password_of(mut self, other: &User) -> Self {
        self.password = other.password.clone();
        self
    }

    pub fn validate(&self) -> UserResult<()> {
        if self.email.is_empty() {
            return Err(UserError::Validation("email is required".into()));
        }
        if !is_valid_email(&self.email) {
            return Err(UserError::Validation("email is invalid".into()));
        }
        if self.first_name.is_empty() {
            return Err(UserError::Validation("first name is required".into()));
        }
        if self.phone_number.is_empty() {
            return Err(UserError::Validation("phone number is required".into()));
        }
        // an unloaded password is fine as long as it is not being changed
        if self.password.is_empty() && (self.is_new || self.is_password_modified()) {
            return Err(UserError::Validation("password is required".into()));
        }
        Ok(())
    }

    /// True iff `candidate` hashes to `hashed_password` under the argon2 scheme.
    /// The candidate is trimmed the same way stored passwords are.
    pub fn correct_password(candidate: &str, hashed_password: &str) -> bool {
        compare_password(candidate.trim(), hashed_password)
    }

    /// Whether the password changed after a token issued at `issued_at` (unix seconds).
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.unix_timestamp() > issued_at)
            .unwrap_or(false)
    }

    pub fn clear_password_reset(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }

    /// Persist the record, running the pre-save hook first.
    pub async fn save(&mut self, store: &dyn UserStore, options: SaveOptions) -> UserResult<()> {
        self.save_with_hasher(store, options, hash_password).await
    }

    pub(crate) async fn save_with_hasher(
        &mut self,
        store: &dyn UserStore,
        options: SaveOptions,
        hasher: fn(&str) -> UserResult<String>,
    ) -> UserResult<()> {
        if options.validate {
            self.validate()?;
        }
        hooks::before_save_with(self, hasher)?;

        self.updated_at = OffsetDateTime::now_utc();
        if self.is_new {
            store.insert(self).await?;
            debug!(user_id = %self.id, "user inserted");
        } else {
            store.update(self).await?;
            debug!(user_id = %self.id, "user updated");
        }
        self.mark_saved();
        Ok(())
    }

    /// Issue a password reset token. Only its hash is stored; the plaintext
    /// is returned to the caller and nowhere else.
    #[instrument(skip(self, store), fields(user_id = %self.id))]
    pub async fn create_password_reset_token(
        &mut self,
        store: &dyn UserStore,
        ttl: Duration,
    ) -> UserResult<String> {
        let reset_token = generate_reset_token();

        self.password_reset_token = Some(hashed_token(&reset_token));
        self.password_reset_expires = Some(OffsetDateTime::now_utc() + ttl);

        self.save(store, SaveOptions::skip_validation()).await?;

        info!(expires = ?self.password_reset_expires, "password reset token issued");
        Ok(reset_token)
    }
}
