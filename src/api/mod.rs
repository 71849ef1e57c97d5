//! HTTP routes over the catalog and account services.
//!
//! | Method   | Path                | Auth           | Cache-Control        |
//! |----------|---------------------|----------------|----------------------|
//! | `GET`    | `/catalog/:id`      | none           | `no-cache, no-store` |
//! | `GET`    | `/catalog`          | none           | `public, max-age=60` |
//! | `POST`   | `/catalog`          | Moderator      | `no-store`           |
//! | `DELETE` | `/catalog/:id`      | Administrator  | `no-store`           |
//! | `POST`   | `/account/register` | none           | `no-cache, no-store` |
//! | `POST`   | `/account/login`    | none           | `no-cache, no-store` |
//!
//! Error responses always carry the `no-cache, no-store` default.

pub mod envelope;
pub mod problem;

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::account::{AccountService, LoginRequest, RegisterRequest};
use crate::catalog::CatalogService;
use crate::context::Context;
use crate::error::{ServiceError, ServiceResult, ValidationErrors};
use crate::middleware::{CacheControlMiddleware, LoggerMiddleware, Pipeline};
use crate::model::GamePatch;
use crate::query::ListRequest;
use crate::router::{IntoHandler, Router};
use crate::security::{Authentication, BearerAuthentication, Principal, TokenService};
use crate::{Response, StatusCode};

use envelope::{LinkDto, RestDto};

const LIST_CACHE_CONTROL: &str = "public, max-age=60";
const MUTATION_CACHE_CONTROL: &str = "no-store";

/// Services shared by every route.
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub accounts: Arc<AccountService>,
    pub tokens: Arc<TokenService>,
}

/// The full request pipeline: request logging, response cache policy, bearer
/// authentication, routes.
pub fn pipeline(state: Arc<AppState>) -> Pipeline {
    Pipeline::builder()
        .layer(Arc::new(LoggerMiddleware))
        .layer(Arc::new(CacheControlMiddleware::default()))
        .layer(Arc::new(BearerAuthentication::new(Arc::clone(&state.tokens))))
        .finish(router(state))
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();
    router.get("/catalog/:id", route(&state, get_entry));
    router.get("/catalog", route(&state, list_entries));
    router.post("/catalog", route(&state, update_entry));
    router.delete("/catalog/:id", route(&state, delete_entry));
    router.post("/account/register", route(&state, register));
    router.post("/account/login", route(&state, login));
    router
}

/// Binds `handler` to the shared state and renders its error as a problem body.
fn route<H, F>(state: &Arc<AppState>, handler: H) -> impl IntoHandler
where
    H: Fn(Arc<AppState>, Context) -> F + Send + Sync + Copy + 'static,
    F: Future<Output = ServiceResult<Response>> + Send + 'static,
{
    let state = Arc::clone(state);
    move |ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let state = Arc::clone(&state);
        Box::pin(async move { handler(state, ctx).await.unwrap_or_else(problem::respond) })
    }
}

async fn get_entry(state: Arc<AppState>, ctx: Context) -> ServiceResult<Response> {
    let id = path_id(&ctx)?;
    let game = state.catalog.get_by_id(id).await?;
    let count = usize::from(game.is_some());
    let dto = RestDto::new(game, LinkDto::to_self(ctx.request())).paged(0, 1, count);
    Ok(Response::json(StatusCode::Ok, &dto))
}

async fn list_entries(state: Arc<AppState>, ctx: Context) -> ServiceResult<Response> {
    let request = list_request(&ctx, state.catalog.default_list_request())?;
    let listing = state.catalog.list(&request).await?;
    let dto = RestDto::new(listing.items, LinkDto::to_self(ctx.request())).paged(
        listing.page_index,
        listing.page_size,
        listing.record_count,
    );
    Ok(Response::json(StatusCode::Ok, &dto).header("Cache-Control", LIST_CACHE_CONTROL))
}

async fn update_entry(state: Arc<AppState>, ctx: Context) -> ServiceResult<Response> {
    let principal = principal(&ctx)?;
    let patch: GamePatch = body(&ctx)?;
    let game = state.catalog.update(&principal, &patch).await?;
    let dto = RestDto::new(game, LinkDto::to_self(ctx.request()));
    Ok(Response::json(StatusCode::Ok, &dto).header("Cache-Control", MUTATION_CACHE_CONTROL))
}

async fn delete_entry(state: Arc<AppState>, ctx: Context) -> ServiceResult<Response> {
    let principal = principal(&ctx)?;
    let id = path_id(&ctx)?;
    let game = state.catalog.delete(&principal, id).await?;
    let dto = RestDto::new(game, LinkDto::to_self(ctx.request()));
    Ok(Response::json(StatusCode::Ok, &dto).header("Cache-Control", MUTATION_CACHE_CONTROL))
}

async fn register(state: Arc<AppState>, ctx: Context) -> ServiceResult<Response> {
    let request: RegisterRequest = body(&ctx)?;
    let message = state.accounts.register(&request).await?;
    Ok(Response::new(StatusCode::Created).body(message))
}

async fn login(state: Arc<AppState>, ctx: Context) -> ServiceResult<Response> {
    let request: LoginRequest = body(&ctx)?;
    let token = state.accounts.login(&request).await?;
    Ok(Response::new(StatusCode::Ok).body(token.value))
}

fn principal(ctx: &Context) -> ServiceResult<Principal> {
    Ok(Authentication::of(ctx).principal()?.clone())
}

fn path_id(ctx: &Context) -> ServiceResult<i64> {
    match ctx.params().parse::<i64>("id") {
        Some(Ok(id)) => Ok(id),
        _ => {
            let raw = ctx.params().get("id").unwrap_or_default();
            Err(ValidationErrors::single("id", format!("The value '{raw}' is not valid.")).into())
        }
    }
}

fn body<T: DeserializeOwned>(ctx: &Context) -> ServiceResult<T> {
    ctx.json().map_err(|e| {
        ServiceError::from(ValidationErrors::single(
            "body",
            format!("The request body is not valid JSON: {e}"),
        ))
    })
}

/// Reads `ListRequest` fields from the query string; absent fields keep their
/// defaults and unparsable numbers are validation errors.
fn list_request(ctx: &Context, mut list: ListRequest) -> ServiceResult<ListRequest> {
    let request = ctx.request();
    let mut errors = ValidationErrors::new();

    if let Some(text) = request.query_param("filterText") {
        list.filter_text = Some(text.to_owned());
    }
    if let Some(column) = request.query_param("sortColumn") {
        list.sort_column = column.to_owned();
    }
    if let Some(order) = request.query_param("sortOrder") {
        list.sort_order = order.to_owned();
    }
    if let Some(index) = number(&mut errors, request.query_param("pageIndex"), "pageIndex") {
        list.page_index = index;
    }
    if let Some(size) = number(&mut errors, request.query_param("pageSize"), "pageSize") {
        list.page_size = size;
    }

    errors.into_result()?;
    Ok(list)
}

fn number<T: FromStr>(errors: &mut ValidationErrors, raw: Option<&str>, field: &str) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(field, format!("The value '{raw}' is not valid."));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use crate::account::{CredentialStore, InMemoryCredentials};
    use crate::database::{DataStore, InMemoryStore, StoreError};
    use crate::model::BoardGame;
    use crate::query::{Page, QueryPlan};
    use crate::security::Role;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{DateTime, Utc};
    use serde_json::Value;

    const SECRET: &[u8] = b"an-hmac-secret-of-at-least-32-bytes!";

    struct Harness {
        app: Pipeline,
        tokens: Arc<TokenService>,
    }

    impl Harness {
        fn with_store(store: Arc<dyn DataStore>) -> Self {
            let tokens = Arc::new(TokenService::new(SECRET, "boardshelf", "clients"));
            let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentials::new());
            let state = Arc::new(AppState {
                catalog: Arc::new(CatalogService::new(store)),
                accounts: Arc::new(AccountService::new(credentials, Arc::clone(&tokens))),
                tokens: Arc::clone(&tokens),
            });
            Self {
                app: pipeline(state),
                tokens,
            }
        }

        fn new() -> Self {
            Self::with_store(Arc::new(InMemoryStore::with_games([
                BoardGame::new(1, "Axis & Allies", 1981),
                BoardGame::new(2, "Citadels", 2000),
                BoardGame::new(3, "Terraforming Mars", 2016),
                BoardGame::new(5, "Pandemic", 2008),
            ])))
        }

        fn bearer(&self, role: Role) -> String {
            let token = self
                .tokens
                .issue(&Principal::new("tester", [role.as_str()]))
                .unwrap();
            format!("Bearer {}", token.value)
        }

        async fn send(
            &self,
            method: &str,
            target: &str,
            authorization: Option<&str>,
            body: Option<&str>,
        ) -> Response {
            let mut raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n");
            if let Some(auth) = authorization {
                raw.push_str(&format!("Authorization: {auth}\r\n"));
            }
            let body = body.unwrap_or_default();
            raw.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));

            let bytes = Bytes::from(raw);
            let (request, offset) = Request::parse(&bytes).unwrap();
            self.app.handle(request.with_body(bytes.slice(offset..))).await
        }
    }

    fn json(response: &Response) -> Value {
        serde_json::from_slice(response.body_ref()).unwrap()
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let h = Harness::new();
        let response = h
            .send(
                "GET",
                "/catalog?filterText=Mars&sortColumn=Name&sortOrder=ASC&pageIndex=0&pageSize=2",
                None,
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(
            response.headers().get("content-type"),
            Some("application/json; charset=utf-8")
        );

        let body = json(&response);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["name"], "Terraforming Mars");
        assert_eq!(body["recordCount"], 1);
        assert_eq!(body["pageIndex"], 0);
        assert_eq!(body["pageSize"], 2);
        assert_eq!(body["links"][0]["rel"], "self");
        assert!(
            body["links"][0]["href"]
                .as_str()
                .unwrap()
                .starts_with("http://localhost/catalog?")
        );
    }

    #[tokio::test]
    async fn list_uses_defaults() {
        let h = Harness::new();
        let body = json(&h.send("GET", "/catalog", None, None).await);
        let names: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["name"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            names,
            ["Axis & Allies", "Citadels", "Pandemic", "Terraforming Mars"]
        );
        assert_eq!(body["pageSize"], 10);
        assert_eq!(body["recordCount"], 4);
    }

    #[tokio::test]
    async fn bad_list_parameters_are_400() {
        let h = Harness::new();
        let response = h
            .send("GET", "/catalog?sortColumn=password&pageSize=abc", None, None)
            .await;
        assert_eq!(response.status(), StatusCode::BadRequest);
        let body = json(&response);
        assert_eq!(body["type"], problem::BAD_REQUEST_TYPE);
        assert_eq!(body["title"], problem::VALIDATION_TITLE);
        assert!(body["errors"]["pageSize"].is_array());

        let response = h.send("GET", "/catalog?sortColumn=password", None, None).await;
        assert!(json(&response)["errors"]["sortColumn"].is_array());
    }

    #[tokio::test]
    async fn get_by_id_found_and_missing() {
        let h = Harness::new();
        let body = json(&h.send("GET", "/catalog/3", None, None).await);
        assert_eq!(body["data"]["name"], "Terraforming Mars");
        assert_eq!(body["recordCount"], 1);
        assert_eq!(body["pageSize"], 1);

        let body = json(&h.send("GET", "/catalog/99", None, None).await);
        assert!(body["data"].is_null());
        assert_eq!(body["recordCount"], 0);

        let response = h.send("GET", "/catalog/abc", None, None).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn moderator_cannot_delete() {
        let h = Harness::new();
        let moderator = h.bearer(Role::Moderator);
        let response = h
            .send("DELETE", "/catalog/5", Some(&moderator), None)
            .await;
        assert_eq!(response.status(), StatusCode::Forbidden);
        assert_eq!(json(&response)["type"], problem::FORBIDDEN_TYPE);

        let body = json(&h.send("GET", "/catalog/5", None, None).await);
        assert_eq!(body["data"]["name"], "Pandemic");
    }

    #[tokio::test]
    async fn administrator_deletes() {
        let h = Harness::new();
        let admin = h.bearer(Role::Administrator);
        let response = h.send("DELETE", "/catalog/5", Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::Ok);
        let body = json(&response);
        assert_eq!(body["data"]["id"], 5);
        assert!(body.get("recordCount").is_none());
        assert_eq!(body["links"][0]["type"], "DELETE");

        let body = json(&h.send("GET", "/catalog/5", None, None).await);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn mutations_require_a_valid_token() {
        let h = Harness::new();
        let response = h.send("DELETE", "/catalog/5", None, None).await;
        assert_eq!(response.status(), StatusCode::Unauthorized);
        assert_eq!(json(&response)["type"], problem::UNAUTHORIZED_TYPE);

        let response = h
            .send("POST", "/catalog", Some("Bearer garbage"), Some(r#"{"id":1}"#))
            .await;
        assert_eq!(response.status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn moderator_updates() {
        let h = Harness::new();
        let moderator = h.bearer(Role::Moderator);
        let response = h
            .send(
                "POST",
                "/catalog",
                Some(&moderator),
                Some(r#"{"id":2,"name":"Citadels Classic","year":0}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        let body = json(&response);
        assert_eq!(body["data"]["name"], "Citadels Classic");
        assert_eq!(body["data"]["year"], 2000);

        let body = json(&h.send("GET", "/catalog/2", None, None).await);
        assert_eq!(body["data"]["name"], "Citadels Classic");

        let response = h
            .send("POST", "/catalog", Some(&moderator), Some("{not json"))
            .await;
        assert_eq!(response.status(), StatusCode::BadRequest);

        let body = json(
            &h.send("POST", "/catalog", Some(&moderator), Some(r#"{"id":404}"#))
                .await,
        );
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn register_then_login() {
        let h = Harness::new();
        let response = h
            .send(
                "POST",
                "/account/register",
                None,
                Some(r#"{"username":"gina","email":"gina@example.com","password":"Abc123!@#xyz"}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(response.body_ref(), b"User 'gina' has been created.");

        let response = h
            .send(
                "POST",
                "/account/login",
                None,
                Some(r#"{"username":"gina","password":"Abc123!@#xyz"}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::Ok);
        let token = std::str::from_utf8(response.body_ref()).unwrap();
        assert_eq!(h.tokens.verify(token).unwrap().username, "gina");
    }

    #[tokio::test]
    async fn weak_registration_is_400() {
        let h = Harness::new();
        let response = h
            .send(
                "POST",
                "/account/register",
                None,
                Some(r#"{"username":"hal","email":"hal@example.com","password":"abc123"}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert!(json(&response)["errors"]["password"].is_array());
    }

    #[tokio::test]
    async fn wrong_password_is_generic_401() {
        let h = Harness::new();
        h.send(
            "POST",
            "/account/register",
            None,
            Some(r#"{"username":"ivy","email":"ivy@example.com","password":"Abc123!@#xyz"}"#),
        )
        .await;

        let response = h
            .send(
                "POST",
                "/account/login",
                None,
                Some(r#"{"username":"ivy","password":"nope"}"#),
            )
            .await;
        assert_eq!(response.status(), StatusCode::Unauthorized);
        let body = json(&response);
        assert_eq!(body["detail"], crate::account::LOGIN_FAILED);
        assert_eq!(body["type"], problem::UNAUTHORIZED_TYPE);
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn store_failure_is_generic_500() {
        let h = Harness::with_store(Arc::new(BrokenStore));
        let response = h.send("GET", "/catalog/1", None, None).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        let body = json(&response);
        assert_eq!(body["detail"], problem::INTERNAL_DETAIL);
        assert!(!String::from_utf8_lossy(response.body_ref()).contains("disk on fire"));
    }

    #[tokio::test]
    async fn unknown_routes() {
        let h = Harness::new();
        assert_eq!(
            h.send("GET", "/nowhere", None, None).await.status(),
            StatusCode::NotFound
        );
        assert_eq!(
            h.send("PUT", "/catalog", None, None).await.status(),
            StatusCode::MethodNotAllowed
        );
    }

    fn cache_control(response: &Response) -> Option<&str> {
        response.headers().get("cache-control")
    }

    #[tokio::test]
    async fn cache_control_per_route() {
        let h = Harness::new();

        let list = h.send("GET", "/catalog", None, None).await;
        assert_eq!(cache_control(&list), Some("public, max-age=60"));

        let entry = h.send("GET", "/catalog/2", None, None).await;
        assert_eq!(cache_control(&entry), Some("no-cache, no-store"));

        let moderator = h.bearer(Role::Moderator);
        let update = h
            .send("POST", "/catalog", Some(&moderator), Some(r#"{"id":2,"year":2016}"#))
            .await;
        assert_eq!(update.status(), StatusCode::Ok);
        assert_eq!(cache_control(&update), Some("no-store"));

        let admin = h.bearer(Role::Administrator);
        let delete = h.send("DELETE", "/catalog/2", Some(&admin), None).await;
        assert_eq!(delete.status(), StatusCode::Ok);
        assert_eq!(cache_control(&delete), Some("no-store"));
    }

    #[tokio::test]
    async fn failed_requests_are_never_cacheable() {
        let h = Harness::new();

        let invalid = h.send("GET", "/catalog?pageSize=abc", None, None).await;
        assert_eq!(invalid.status(), StatusCode::BadRequest);
        assert_eq!(cache_control(&invalid), Some("no-cache, no-store"));

        let anonymous = h.send("DELETE", "/catalog/2", None, None).await;
        assert_eq!(anonymous.status(), StatusCode::Unauthorized);
        assert_eq!(cache_control(&anonymous), Some("no-cache, no-store"));
    }

    struct BrokenStore;

    #[async_trait]
    impl DataStore for BrokenStore {
        async fn get(&self, _id: i64) -> Result<Option<BoardGame>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }

        async fn query(&self, _plan: &QueryPlan) -> Result<Page, StoreError> {
            Err(StoreError::Query("disk on fire".into()))
        }

        async fn update(
            &self,
            _patch: &GamePatch,
            _modified_at: DateTime<Utc>,
        ) -> Result<Option<BoardGame>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }

        async fn remove(&self, _id: i64) -> Result<Option<BoardGame>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
    }
}
