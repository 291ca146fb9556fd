//! Meshgate API routes
//!
//! - Login and super-admin bootstrap
//! - User management
//! - Remote access gateway bindings and the per-user gateway view
//! - Legacy node migration

use axum::{
    extract::{FromRef, Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use meshgate_common::{
    CredentialVerifier, Error, HostPull, MigrationRequest, RecordStore, UserView,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::cleanup::CleanupQueue;
use super::gateways::GatewayBindings;
use super::migrate::{LegacyMigrator, MigrationDefaults};
use super::remote_access::{resolve_user_gateways, GatewaysByNetwork};
use super::server_info::ServerInfoProvider;
use super::transfer::transfer_super_admin;
use super::users::{NewUser, UserService};
use crate::auth::{AuthConfig, AuthManager, CurrentUser, LoginRequest, PolicyEngine, TokenResponse, UserChange};
use crate::blocking::run_blocking;
use crate::error::ApiResult;

// ============================================================================
// State
// ============================================================================

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: Arc<AuthManager>,
    pub users: Arc<UserService>,
    pub gateways: Arc<GatewayBindings>,
    pub migrator: Arc<LegacyMigrator>,
    pub policy: PolicyEngine,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn CredentialVerifier>,
        auth_config: AuthConfig,
        server_info: Arc<dyn ServerInfoProvider>,
        defaults: MigrationDefaults,
        cleanup: CleanupQueue,
    ) -> Self {
        let basic_auth = auth_config.basic_auth;
        Self {
            auth: Arc::new(AuthManager::new(auth_config, store.clone(), verifier.clone())),
            users: Arc::new(UserService::new(store.clone(), verifier.clone(), basic_auth)),
            gateways: Arc::new(GatewayBindings::new(store.clone(), cleanup)),
            migrator: Arc::new(LegacyMigrator::new(store.clone(), verifier, server_info, defaults)),
            policy: PolicyEngine::new(),
            store,
        }
    }
}

impl FromRef<AppState> for Arc<AuthManager> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Build the API router
pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Auth and bootstrap
        .route("/api/users/adm/authenticate", post(authenticate_handler))
        .route("/api/users/adm/hassuperadmin", get(has_super_admin_handler))
        .route("/api/users/adm/createsuperadmin", post(create_super_admin_handler))
        .route(
            "/api/users/adm/transfersuperadmin/:username",
            post(transfer_super_admin_handler),
        )

        // Remote access gateways
        .route(
            "/api/users/:username/remote_access_gw/:gateway_id",
            post(attach_gateway_handler).delete(detach_gateway_handler),
        )
        .route("/api/users/:username/remote_access_gw", get(user_gateways_handler))

        // Users
        .route("/api/users", get(list_users_handler))
        .route(
            "/api/users/:username",
            get(get_user_handler)
                .post(create_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        )

        // Migration
        .route("/api/v1/nodes/migrate", put(migrate_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn parse_gateway_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::bad_request(format!("invalid gateway id {}", raw)))
}

// ============================================================================
// Auth handlers
// ============================================================================

async fn authenticate_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let token = run_blocking(move || state.auth.authenticate(&req.username, &req.password)).await?;
    Ok(Json(token))
}

async fn has_super_admin_handler(State(state): State<AppState>) -> ApiResult<Json<bool>> {
    Ok(Json(run_blocking(move || state.users.has_super_admin()).await?))
}

async fn create_super_admin_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<UserView>> {
    let user =
        run_blocking(move || state.users.create_super_admin(&req.username, &req.password)).await?;
    Ok(Json(user))
}

async fn transfer_super_admin_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(username): Path<String>,
) -> ApiResult<Json<UserView>> {
    let user =
        run_blocking(move || transfer_super_admin(state.store.as_ref(), &caller, &username)).await?;
    Ok(Json(user))
}

// ============================================================================
// Gateway handlers
// ============================================================================

async fn attach_gateway_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path((username, gateway_id)): Path<(String, String)>,
) -> ApiResult<Json<UserView>> {
    state.policy.require_admin(&caller).into_result()?;
    let gateway_id = parse_gateway_id(&gateway_id)?;
    let user = run_blocking(move || state.gateways.attach(&username, gateway_id)).await?;
    Ok(Json(user))
}

async fn detach_gateway_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path((username, gateway_id)): Path<(String, String)>,
) -> ApiResult<Json<UserView>> {
    state.policy.require_admin(&caller).into_result()?;
    let gateway_id = parse_gateway_id(&gateway_id)?;
    let user = run_blocking(move || state.gateways.detach(&username, gateway_id)).await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    #[serde(default)]
    remote_access_clientid: String,
}

/// A user's own gateway view; elevated callers are turned away by the query
async fn user_gateways_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(username): Path<String>,
    Query(query): Query<GatewayQuery>,
) -> ApiResult<Json<GatewaysByNetwork>> {
    state.policy.require_self(&caller, &username).into_result()?;
    let gateways = run_blocking(move || {
        resolve_user_gateways(
            state.store.as_ref(),
            &caller.username,
            &query.remote_access_clientid,
        )
    })
    .await?;
    Ok(Json(gateways))
}

// ============================================================================
// User handlers
// ============================================================================

async fn list_users_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> ApiResult<Json<Vec<UserView>>> {
    Ok(Json(run_blocking(move || state.users.list_users(&caller)).await?))
}

async fn get_user_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(username): Path<String>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(run_blocking(move || state.users.get_user(&caller, &username)).await?))
}

async fn create_user_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(username): Path<String>,
    Json(mut req): Json<NewUser>,
) -> ApiResult<Json<UserView>> {
    req.username = username;
    Ok(Json(run_blocking(move || state.users.create_user(&caller, &req)).await?))
}

async fn update_user_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(username): Path<String>,
    Json(change): Json<UserChange>,
) -> ApiResult<Json<UserView>> {
    let user =
        run_blocking(move || state.users.update_user(&caller, &username, &change)).await?;
    Ok(Json(user))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    message: String,
}

async fn delete_user_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(username): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let message = format!("user {} deleted", username);
    run_blocking(move || state.users.delete_user(&caller, &username)).await?;
    Ok(Json(DeleteResponse { message }))
}

// ============================================================================
// Migration
// ============================================================================

async fn migrate_handler(
    State(state): State<AppState>,
    Json(req): Json<MigrationRequest>,
) -> ApiResult<Json<HostPull>> {
    Ok(Json(run_blocking(move || state.migrator.migrate(&req)).await?))
}
