//! Lifecycle hooks for [`User`] persistence.
//!
//! Storage code calls [`before_save`] ahead of every insert or update; nothing
//! runs implicitly.

use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::auth::password::hash_password;
use crate::error::UserResult;
use crate::users::model::{PasswordState, User};

/// Hash the password in place iff it was modified since the last write.
///
/// On error the record is left exactly as it was and the write must not
/// happen.
pub fn before_save(user: &mut User) -> UserResult<()> {
    before_save_with(user, hash_password)
}

pub(crate) fn before_save_with(
    user: &mut User,
    hasher: fn(&str) -> UserResult<String>,
) -> UserResult<()> {
    if user.password_state() != PasswordState::Plain {
        return Ok(());
    }

    let hash = hasher(user.password())?;
    user.apply_password_hash(hash);

    if !user.is_new() {
        // back-dated so a token minted right after the change is still valid
        user.password_changed_at = Some(OffsetDateTime::now_utc() - Duration::seconds(1));
    }
    debug!(user_id = %user.id, "password hashed before save");
    Ok(())
}
