use std::sync::Arc;

use async_graphql::{Context, ErrorExtensions, Result};
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::graphql::errors::unauthenticated;
use crate::users::{User, UserStore};

/// Raw bearer token taken from the request headers.
pub struct BearerToken(pub String);

pub(crate) fn store<'a>(ctx: &Context<'a>) -> Result<&'a Arc<dyn UserStore>> {
    ctx.data::<Arc<dyn UserStore>>()
}

/// Resolve the signed-in user, rejecting tokens minted before the last
/// password change.
pub(crate) async fn current_user(ctx: &Context<'_>) -> Result<User> {
    let token = ctx
        .data_opt::<BearerToken>()
        .ok_or_else(|| unauthenticated("missing bearer token"))?;
    let keys = ctx.data::<JwtKeys>()?;
    let claims = keys.verify(&token.0).map_err(|_| {
        warn!("invalid or expired token");
        unauthenticated("invalid or expired token")
    })?;

    let user = store(ctx)?
        .find_by_id(claims.sub)
        .await
        .map_err(|e| e.extend())?
        .ok_or_else(|| unauthenticated("user no longer exists"))?;

    if user.changed_password_after(claims.iat as i64) {
        warn!(user_id = %user.id, "token predates password change");
        return Err(unauthenticated("password changed, sign in again"));
    }
    Ok(user)
}
