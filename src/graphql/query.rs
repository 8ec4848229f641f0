use async_graphql::{Context, ErrorExtensions, Object, Result, ID};
use uuid::Uuid;

use crate::error::UserError;
use crate::graphql::{
    context::{current_user, store},
    errors::forbidden,
    types::UserObject,
};
use crate::users::UserRole;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The signed-in user.
    async fn me(&self, ctx: &Context<'_>) -> Result<UserObject> {
        current_user(ctx).await.map(UserObject)
    }

    /// Look up a user by id. Callers may read themselves; admins anyone.
    async fn user(&self, ctx: &Context<'_>, id: ID) -> Result<Option<UserObject>> {
        let caller = current_user(ctx).await?;
        let id = Uuid::parse_str(&id)
            .map_err(|_| UserError::Validation("invalid id".into()).extend())?;
        if caller.id != id && caller.role != UserRole::Admin {
            return Err(forbidden());
        }
        let user = store(ctx)?.find_by_id(id).await.map_err(|e| e.extend())?;
        Ok(user.map(UserObject))
    }
}
