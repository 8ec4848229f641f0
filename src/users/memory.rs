use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{UserError, UserResult};
use crate::users::model::User;
use crate::users::repo::{Projection, UserFilter, UserStore};

/// In-process store with the same semantics as the Postgres one:
/// unique emails, projection without password, password kept on update
/// unless modified.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

fn email_taken(users: &HashMap<Uuid, User>, user: &User) -> bool {
    users
        .values()
        .any(|u| u.id != user.id && u.email == user.email)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &User) -> UserResult<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(anyhow::anyhow!("duplicate user id {}", user.id).into());
        }
        if email_taken(&users, user) {
            return Err(UserError::EmailTaken);
        }
        users.insert(user.id, user.loaded(true));
        Ok(())
    }

    async fn update(&self, user: &User) -> UserResult<()> {
        let mut users = self.users.write().await;
        if email_taken(&users, user) {
            return Err(UserError::EmailTaken);
        }
        let existing = users.get_mut(&user.id).ok_or(UserError::NotFound)?;
        let mut next = user.loaded(true);
        if !user.is_password_modified() {
            next = next.with_password_of(existing);
        }
        *existing = next;
        Ok(())
    }

    async fn find_one(
        &self,
        filter: &UserFilter,
        projection: Projection,
    ) -> UserResult<Option<User>> {
        let users = self.users.read().await;
        let found = match filter {
            UserFilter::Id(id) => users.get(id),
            UserFilter::Email(email) => users.values().find(|u| &u.email == email),
            UserFilter::ResetTokenHash(hash) => users
                .values()
                .find(|u| u.password_reset_token.as_deref() == Some(hash.as_str())),
        };
        Ok(found.map(|u| u.loaded(projection == Projection::WithPassword)))
    }
}
