use std::sync::Arc;

use async_graphql::{Context, Error, ErrorExtensions, Object, Result};
use tracing::error;

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::graphql::{
    context::{current_user, store},
    types::{AuthPayload, SignUpInput, UserObject},
};
use crate::users::{services, User};

pub struct MutationRoot;

fn issue(ctx: &Context<'_>, user: User) -> Result<AuthPayload> {
    let keys = ctx.data::<JwtKeys>()?;
    let token = keys.sign(user.id).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign failed");
        Error::new("internal server error")
    })?;
    Ok(AuthPayload {
        token,
        user: UserObject(user),
    })
}

#[Object]
impl MutationRoot {
    async fn sign_up(&self, ctx: &Context<'_>, input: SignUpInput) -> Result<AuthPayload> {
        let user = services::register(store(ctx)?.as_ref(), input.into())
            .await
            .map_err(|e| e.extend())?;
        issue(ctx, user)
    }

    async fn login(&self, ctx: &Context<'_>, email: String, password: String) -> Result<AuthPayload> {
        let user = services::authenticate(store(ctx)?.as_ref(), &email, &password)
            .await
            .map_err(|e| e.extend())?;
        issue(ctx, user)
    }

    /// Change the signed-in user's password. Previously issued tokens stop working.
    async fn change_password(
        &self,
        ctx: &Context<'_>,
        current_password: String,
        new_password: String,
    ) -> Result<AuthPayload> {
        let caller = current_user(ctx).await?;
        let user = services::change_password(
            store(ctx)?.as_ref(),
            caller.id,
            &current_password,
            &new_password,
        )
        .await
        .map_err(|e| e.extend())?;
        issue(ctx, user)
    }

    /// Issue a password reset token. Null when the email is unknown; the
    /// caller is responsible for delivering the token to its owner.
    async fn forgot_password(&self, ctx: &Context<'_>, email: String) -> Result<Option<String>> {
        let ttl = ctx.data::<Arc<AppConfig>>()?.reset_token_ttl();
        services::request_password_reset(store(ctx)?.as_ref(), &email, ttl)
            .await
            .map_err(|e| e.extend())
    }

    async fn reset_password(
        &self,
        ctx: &Context<'_>,
        token: String,
        new_password: String,
    ) -> Result<AuthPayload> {
        let user = services::reset_password(store(ctx)?.as_ref(), &token, &new_password)
            .await
            .map_err(|e| e.extend())?;
        issue(ctx, user)
    }
}
