use async_graphql::{InputObject, Object, SimpleObject, ID};
use time::OffsetDateTime;

use crate::users::{NewUser, User, UserRole};

/// GraphQL view of a [`User`]. Credential fields are not exposed.
pub struct UserObject(pub User);

#[Object(name = "User")]
impl UserObject {
    async fn id(&self) -> ID {
        ID(self.0.id.to_string())
    }

    async fn email(&self) -> &str {
        &self.0.email
    }

    async fn first_name(&self) -> &str {
        &self.0.first_name
    }

    async fn last_name(&self) -> Option<&str> {
        self.0.last_name.as_deref()
    }

    async fn phone_number(&self) -> &str {
        &self.0.phone_number
    }

    async fn password_changed_at(&self) -> Option<OffsetDateTime> {
        self.0.password_changed_at
    }

    async fn password_reset_expires(&self) -> Option<OffsetDateTime> {
        self.0.password_reset_expires
    }

    async fn role(&self) -> UserRole {
        self.0.role
    }

    async fn created_at(&self) -> OffsetDateTime {
        self.0.created_at
    }

    async fn updated_at(&self) -> OffsetDateTime {
        self.0.updated_at
    }
}

#[derive(InputObject)]
pub struct SignUpInput {
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone_number: String,
    pub password: String,
}

impl From<SignUpInput> for NewUser {
    fn from(input: SignUpInput) -> Self {
        NewUser {
            email: input.email,
            first_name: input.first_name,
            last_name: input.last_name,
            phone_number: input.phone_number,
            password: input.password,
            role: None,
        }
    }
}

/// Returned by every mutation that signs the caller in.
#[derive(SimpleObject)]
pub struct AuthPayload {
    pub token: String,
    pub user: UserObject,
}
