use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{password::hash_password, tokens::hashed_token};
use crate::error::{UserError, UserResult};
use crate::users::{
    model::{NewUser, SaveOptions, User},
    repo::UserStore,
};

pub const MIN_PASSWORD_LEN: usize = 8;

fn check_new_password(password: &str) -> UserResult<()> {
    if password.trim().chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(UserError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[instrument(skip(store, input), fields(email = %input.email.trim()))]
pub async fn register(store: &dyn UserStore, input: NewUser) -> UserResult<User> {
    check_new_password(&input.password)?;
    let mut user = User::new(input);
    user.validate()?;

    if store.find_by_email(&user.email).await?.is_some() {
        warn!(email = %user.email, "email already registered");
        return Err(UserError::EmailTaken);
    }

    user.save(store, SaveOptions::default()).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Check an email/password pair. Unknown emails and wrong passwords are
/// indistinguishable to the caller, including in time spent.
#[instrument(skip(store, password))]
pub async fn authenticate(store: &dyn UserStore, email: &str, password: &str) -> UserResult<User> {
    let user = match store.find_by_email_with_password(email).await? {
        Some(u) => u,
        None => {
            // one argon2 run, as on the known-email path
            hash_password(password)?;
            warn!("login unknown email");
            return Err(UserError::InvalidCredentials);
        }
    };

    if !User::correct_password(password, user.password()) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(UserError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user.strip_password())
}

#[instrument(skip(store, current, new_password))]
pub async fn change_password(
    store: &dyn UserStore,
    user_id: Uuid,
    current: &str,
    new_password: &str,
) -> UserResult<User> {
    let mut user = store
        .find_by_id_with_password(user_id)
        .await?
        .ok_or(UserError::NotFound)?;

    if !User::correct_password(current, user.password()) {
        warn!(%user_id, "change password with wrong current password");
        return Err(UserError::InvalidCredentials);
    }
    check_new_password(new_password)?;

    user.set_password(new_password);
    user.save(store, SaveOptions::default()).await?;
    info!(%user_id, "password changed");
    Ok(user.strip_password())
}

/// Issue a reset token for `email`. Returns `None` when no such user exists.
#[instrument(skip(store))]
pub async fn request_password_reset(
    store: &dyn UserStore,
    email: &str,
    ttl: Duration,
) -> UserResult<Option<String>> {
    let Some(mut user) = store.find_by_email(email).await? else {
        info!("password reset requested for unknown email");
        return Ok(None);
    };
    let token = user.create_password_reset_token(store, ttl).await?;
    Ok(Some(token))
}

/// Consume a reset token and set a new password.
#[instrument(skip(store, token, new_password))]
pub async fn reset_password(
    store: &dyn UserStore,
    token: &str,
    new_password: &str,
) -> UserResult<User> {
    let mut user = store
        .find_by_reset_token_hash(&hashed_token(token.trim()))
        .await?
        .ok_or(UserError::InvalidResetToken)?;

    let now = OffsetDateTime::now_utc();
    match user.password_reset_expires {
        Some(expires) if expires > now => {}
        _ => {
            warn!(user_id = %user.id, "expired reset token used");
            return Err(UserError::InvalidResetToken);
        }
    }
    check_new_password(new_password)?;

    user.set_password(new_password);
    user.clear_password_reset();
    user.save(store, SaveOptions::default()).await?;
    info!(user_id = %user.id, "password reset");
    Ok(user.strip_password())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{memory::MemoryUserStore, model::RESET_TOKEN_TTL};

    fn input(email: &str, password: &str) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            phone_number: "+44 20 7946 0000".into(),
            password: password.into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let store = MemoryUserStore::new();
        let user = register(&store, input("ada@example.com", "analytical-engine"))
            .await
            .unwrap();

        let logged_in = authenticate(&store, " ADA@example.com ", "analytical-engine")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(logged_in.password(), "");
    }

    #[tokio::test]
    async fn padded_password_logs_in_with_the_same_string() {
        let store = MemoryUserStore::new();
        let user = register(&store, input("p@example.com", " padded-secret "))
            .await
            .unwrap();

        let logged_in = authenticate(&store, "p@example.com", " padded-secret ")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let changed = change_password(&store, user.id, " padded-secret ", "another-secret")
            .await
            .unwrap();
        assert_eq!(changed.id, user.id);
    }

    #[tokio::test]
    async fn password_length_counts_characters() {
        let store = MemoryUserStore::new();
        // 4 characters, 12 bytes
        let err = register(&store, input("cjk@example.com", "密码密码"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Validation(_)));

        register(&store, input("cjk@example.com", "密码密码密码密码"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_and_short_password() {
        let store = MemoryUserStore::new();
        register(&store, input("ada@example.com", "analytical-engine"))
            .await
            .unwrap();

        let dup = register(&store, input("Ada@Example.com", "different-pass"))
            .await
            .unwrap_err();
        assert!(matches!(dup, UserError::EmailTaken));

        let short = register(&store, input("bob@example.com", "abc"))
            .await
            .unwrap_err();
        assert!(matches!(short, UserError::Validation(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn authenticate_failures_look_the_same() {
        let store = MemoryUserStore::new();
        register(&store, input("ada@example.com", "analytical-engine"))
            .await
            .unwrap();

        let wrong = authenticate(&store, "ada@example.com", "difference-engine")
            .await
            .unwrap_err();
        let unknown = authenticate(&store, "nobody@example.com", "analytical-engine")
            .await
            .unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(unknown, UserError::InvalidCredentials));
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let store = MemoryUserStore::new();
        let user = register(&store, input("ada@example.com", "analytical-engine"))
            .await
            .unwrap();

        let err = change_password(&store, user.id, "nope-nope", "brand-new-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::InvalidCredentials));

        let changed = change_password(&store, user.id, "analytical-engine", "brand-new-pass")
            .await
            .unwrap();
        assert!(changed.password_changed_at.is_some());
        assert!(authenticate(&store, "ada@example.com", "brand-new-pass")
            .await
            .is_ok());
        assert!(authenticate(&store, "ada@example.com", "analytical-engine")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn reset_flow_consumes_token() {
        let store = MemoryUserStore::new();
        register(&store, input("ada@example.com", "analytical-engine"))
            .await
            .unwrap();

        let token = request_password_reset(&store, "ada@example.com", RESET_TOKEN_TTL)
            .await
            .unwrap()
            .expect("token for known email");

        let user = reset_password(&store, &token, "fresh-password-1")
            .await
            .unwrap();
        assert!(user.password_reset_token.is_none());
        assert!(user.password_reset_expires.is_none());
        assert!(authenticate(&store, "ada@example.com", "fresh-password-1")
            .await
            .is_ok());

        // single use
        let again = reset_password(&store, &token, "another-password")
            .await
            .unwrap_err();
        assert!(matches!(again, UserError::InvalidResetToken));
    }

    #[tokio::test]
    async fn reset_rejects_expired_and_unknown_tokens() {
        let store = MemoryUserStore::new();
        register(&store, input("ada@example.com", "analytical-engine"))
            .await
            .unwrap();

        let token = request_password_reset(&store, "ada@example.com", Duration::seconds(-1))
            .await
            .unwrap()
            .unwrap();
        let expired = reset_password(&store, &token, "fresh-password-1")
            .await
            .unwrap_err();
        assert!(matches!(expired, UserError::InvalidResetToken));

        let unknown = reset_password(&store, "not-a-token", "fresh-password-1")
            .await
            .unwrap_err();
        assert!(matches!(unknown, UserError::InvalidResetToken));

        // old password still works
        assert!(authenticate(&store, "ada@example.com", "analytical-engine")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reset_request_for_unknown_email_is_none() {
        let store = MemoryUserStore::new();
        let token = request_password_reset(&store, "ghost@example.com", RESET_TOKEN_TTL)
            .await
            .unwrap();
        assert!(token.is_none());
    }
}
