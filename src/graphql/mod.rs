use std::sync::Arc;

use async_graphql::{EmptySubscription, Schema};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::auth::jwt::{bearer_token, JwtKeys};
use crate::config::AppConfig;
use crate::state::AppState;
use crate::users::{UserRole, UserStore};

pub mod context;
pub mod errors;
pub mod mutation;
pub mod query;
pub mod types;

use context::BearerToken;
use mutation::MutationRoot;
use query::QueryRoot;
use types::UserObject;

pub type AccountsSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the GraphQL schema. This is the single place where the exposed
/// types are registered and where resolvers get their collaborators.
pub fn build_schema(
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    config: Arc<AppConfig>,
) -> AccountsSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .register_output_type::<UserRole>()
        .register_output_type::<UserObject>()
        .data(store)
        .data(keys)
        .data(config)
        .finish()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/graphql/schema", get(sdl_handler))
}

pub async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    if let Some(token) = bearer_token(&headers) {
        request = request.data(BearerToken(token.to_string()));
    }
    Json(state.schema.execute(request).await)
}

async fn sdl_handler(State(state): State<AppState>) -> String {
    state.schema.sdl()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Request;
    use serde_json::Value;

    fn schema() -> AccountsSchema {
        AppState::fake().schema
    }

    async fn run(schema: &AccountsSchema, query: &str, token: Option<&str>) -> Value {
        let mut req = Request::new(query);
        if let Some(t) = token {
            req = req.data(BearerToken(t.to_string()));
        }
        let res = schema.execute(req).await;
        serde_json::to_value(&res).unwrap()
    }

    const SIGN_UP: &str = r#"
        mutation {
          signUp(input: {
            email: " Linus@Example.com ",
            firstName: "Linus",
            phoneNumber: "+358 40 000",
            password: "penguins-rule"
          }) {
            token
            user { id email firstName lastName role }
          }
        }
    "#;

    fn error_code(res: &Value) -> &str {
        res["errors"][0]["extensions"]["code"].as_str().unwrap_or_default()
    }

    #[test]
    fn sdl_registers_user_and_role_without_credentials() {
        let sdl = schema().sdl();
        assert!(sdl.contains("enum UserRole"));
        assert!(sdl.contains("USER"));
        assert!(sdl.contains("ADMIN"));
        assert!(sdl.contains("type User"));
        assert!(sdl.contains("phoneNumber"));
        assert!(!sdl.contains("passwordResetToken"));
    }

    #[tokio::test]
    async fn sign_up_then_me() {
        let schema = schema();
        let res = run(&schema, SIGN_UP, None).await;
        assert!(res.get("errors").is_none(), "{res}");
        let payload = &res["data"]["signUp"];
        assert_eq!(payload["user"]["email"], "linus@example.com");
        assert_eq!(payload["user"]["role"], "USER");
        assert!(payload["user"]["lastName"].is_null());

        let token = payload["token"].as_str().unwrap();
        let me = run(&schema, "{ me { email firstName } }", Some(token)).await;
        assert_eq!(me["data"]["me"]["firstName"], "Linus");
    }

    #[tokio::test]
    async fn me_requires_token() {
        let res = run(&schema(), "{ me { id } }", None).await;
        assert_eq!(error_code(&res), "UNAUTHENTICATED");

        let res = run(&schema(), "{ me { id } }", Some("garbage")).await;
        assert_eq!(error_code(&res), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let schema = schema();
        run(&schema, SIGN_UP, None).await;

        let ok = run(
            &schema,
            r#"mutation { login(email: "linus@example.com", password: "penguins-rule") { token } }"#,
            None,
        )
        .await;
        assert!(ok["data"]["login"]["token"].is_string());

        let bad = run(
            &schema,
            r#"mutation { login(email: "linus@example.com", password: "nope-nope") { token } }"#,
            None,
        )
        .await;
        assert_eq!(error_code(&bad), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_user_error() {
        let schema = schema();
        run(&schema, SIGN_UP, None).await;
        let res = run(&schema, SIGN_UP, None).await;
        assert_eq!(error_code(&res), "BAD_USER_INPUT");
    }

    #[tokio::test]
    async fn forgot_and_reset_password() {
        let schema = schema();
        run(&schema, SIGN_UP, None).await;

        let res = run(
            &schema,
            r#"mutation { forgotPassword(email: "linus@example.com") }"#,
            None,
        )
        .await;
        let token = res["data"]["forgotPassword"].as_str().unwrap().to_string();

        let unknown = run(
            &schema,
            r#"mutation { forgotPassword(email: "nobody@example.com") }"#,
            None,
        )
        .await;
        assert!(unknown["data"]["forgotPassword"].is_null());

        let reset = run(
            &schema,
            &format!(
                r#"mutation {{ resetPassword(token: "{token}", newPassword: "kernel-hacker") {{ token user {{ passwordResetExpires }} }} }}"#
            ),
            None,
        )
        .await;
        assert!(reset.get("errors").is_none(), "{reset}");
        assert!(reset["data"]["resetPassword"]["user"]["passwordResetExpires"].is_null());

        let login = run(
            &schema,
            r#"mutation { login(email: "linus@example.com", password: "kernel-hacker") { token } }"#,
            None,
        )
        .await;
        assert!(login["data"]["login"]["token"].is_string());
    }

    #[tokio::test]
    async fn user_query_is_limited_to_self_for_plain_users() {
        let schema = schema();
        let res = run(&schema, SIGN_UP, None).await;
        let token = res["data"]["signUp"]["token"].as_str().unwrap().to_string();
        let id = res["data"]["signUp"]["user"]["id"].as_str().unwrap().to_string();

        let own = run(&schema, &format!(r#"{{ user(id: "{id}") {{ email }} }}"#), Some(&token)).await;
        assert_eq!(own["data"]["user"]["email"], "linus@example.com");

        let other_id = uuid::Uuid::new_v4();
        let other = run(
            &schema,
            &format!(r#"{{ user(id: "{other_id}") {{ email }} }}"#),
            Some(&token),
        )
        .await;
        assert_eq!(error_code(&other), "FORBIDDEN");
    }
}
