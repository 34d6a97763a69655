//! HTTP surface: platform webhooks, the bot admin API and a health check.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::agent::{AiAgent, PromptConfig, PromptUpdate};
use crate::bus::Platform;
use crate::channels::BotManager;
use crate::channels::telegram::lookup_username;
use crate::channels::whatsapp::WHATSAPP_WEBHOOK_OBJECT;
use crate::config::Config;
use crate::errors::BizbotError;
use crate::store::{BotConfig, BotRepository, BotStatus, BotUpdate, NewBot};

type HmacSha256 = Hmac<Sha256>;

/// Max webhook payload size: 1 MB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;
const DEFAULT_LOG_LIMIT: usize = 100;
const ACCEPTING: [BotStatus; 2] = [BotStatus::Online, BotStatus::Starting];

#[derive(Clone)]
pub struct GatewayState {
    manager: Arc<BotManager>,
    bots: Arc<dyn BotRepository>,
    agent: Arc<AiAgent>,
    verify_token: Arc<str>,
    app_secret: Arc<str>,
    telegram_api_base: Arc<str>,
}

impl GatewayState {
    pub fn new(
        manager: Arc<BotManager>,
        bots: Arc<dyn BotRepository>,
        agent: Arc<AiAgent>,
        config: &Config,
    ) -> Self {
        Self {
            manager,
            bots,
            agent,
            verify_token: config.whatsapp.verify_token.as_str().into(),
            app_secret: config.whatsapp.app_secret.as_str().into(),
            telegram_api_base: config.telegram.api_base.as_str().into(),
        }
    }
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<BizbotError> for ApiError {
    fn from(err: BizbotError) -> Self {
        let status = match &err {
            BizbotError::NotFound(_) => StatusCode::NOT_FOUND,
            BizbotError::Config(_) | BizbotError::UnsupportedPlatform(_) => {
                StatusCode::BAD_REQUEST
            }
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("admin request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_platform(raw: &str) -> ApiResult<Platform> {
    raw.parse::<Platform>().map_err(ApiError::bad_request)
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/webhooks/{platform}",
            get(verify_webhook).post(platform_webhook),
        )
        .route("/api/webhooks/{platform}/{bot_id}", post(bot_webhook))
        .route("/api/bots", get(list_bots).post(create_bot))
        .route(
            "/api/bots/{id}",
            get(get_bot).patch(update_bot).delete(delete_bot),
        )
        .route("/api/bots/{id}/control", post(control_bot))
        .route("/api/bots/{id}/logs", get(bot_logs))
        .route("/api/ai/status", get(ai_status))
        .route("/api/ai/provider", post(switch_ai_provider))
        .route(
            "/api/ai/prompts",
            put(import_prompts)
                .patch(update_prompts)
                .get(export_prompts),
        )
        .route("/api/ai/intents", post(explain_intent))
        .with_state(state)
}

/// GET /api/health
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "activeBots": state.manager.active_bots().await.len(),
    }))
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// GET /api/webhooks/{platform}: Meta subscription handshake.
async fn verify_webhook(
    State(state): State<GatewayState>,
    Path(platform): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map_or("", String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    let token_ok = !state.verify_token.is_empty()
        && bool::from(token.as_bytes().ct_eq(state.verify_token.as_bytes()));
    if mode == Some("subscribe") && token_ok {
        info!("{} webhook verified", platform);
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("{} webhook verification failed", platform);
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Signature and envelope checks shared by both ingress routes.
/// `Ok(None)` means "acknowledge and ignore".
fn accept_payload(
    state: &GatewayState,
    platform: Platform,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<Option<Value>, StatusCode> {
    if body.len() > WEBHOOK_MAX_BODY {
        warn!("{} webhook payload too large ({} bytes)", platform, body.len());
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    if platform == Platform::WhatsApp && !state.app_secret.is_empty() {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        let Some(signature) = signature else {
            warn!("whatsapp webhook: missing signature header");
            return Err(StatusCode::FORBIDDEN);
        };
        if !validate_webhook_signature(&state.app_secret, signature, body) {
            warn!("whatsapp webhook: invalid signature");
            return Err(StatusCode::FORBIDDEN);
        }
    }

    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("{} webhook: body is not JSON: {}", platform, e);
            return Ok(None);
        }
    };

    if platform == Platform::WhatsApp
        && payload.get("object").and_then(Value::as_str) != Some(WHATSAPP_WEBHOOK_OBJECT)
    {
        debug!("whatsapp webhook: ignoring non-business object");
        return Ok(None);
    }
    Ok(Some(payload))
}

fn dispatch(state: &GatewayState, bot_id: String, payload: Value) {
    let manager = state.manager.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.route_webhook_payload(&bot_id, payload).await {
            error!("webhook processing for bot {} failed: {}", bot_id, e);
        }
    });
}

/// POST /api/webhooks/{platform}: routed to the first accepting bot.
async fn platform_webhook(
    State(state): State<GatewayState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Ok(platform) = platform.parse::<Platform>() else {
        return StatusCode::NOT_FOUND;
    };
    let payload = match accept_payload(&state, platform, &headers, &body) {
        Ok(Some(payload)) => payload,
        Ok(None) => return StatusCode::OK,
        Err(status) => return status,
    };

    match state.bots.find_bot_for_platform(platform, &ACCEPTING).await {
        Ok(Some(bot)) => dispatch(&state, bot.id, payload),
        Ok(None) => warn!("no active {} bot to handle webhook", platform),
        Err(e) => {
            error!("{} webhook: bot lookup failed: {}", platform, e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    StatusCode::OK
}

/// POST /api/webhooks/{platform}/{bot_id}
async fn bot_webhook(
    State(state): State<GatewayState>,
    Path((platform, bot_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Ok(platform) = platform.parse::<Platform>() else {
        return StatusCode::NOT_FOUND;
    };
    // Signature rules follow the stored bot, never the path segment.
    let bot = match state.bots.get_bot(&bot_id).await {
        Ok(Some(bot)) if bot.platform == platform => bot,
        Ok(_) => return StatusCode::NOT_FOUND,
        Err(e) => {
            error!("webhook lookup for bot {} failed: {}", bot_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    match accept_payload(&state, bot.platform, &headers, &body) {
        Ok(Some(payload)) => {
            dispatch(&state, bot_id, payload);
            StatusCode::OK
        }
        Ok(None) => StatusCode::OK,
        Err(status) => status,
    }
}

// ---------------------------------------------------------------------------
// Bot admin
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListQuery {
    platform: Option<String>,
}

async fn list_bots(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let platform = query
        .platform
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(parse_platform)
        .transpose()?;
    Ok(Json(state.bots.list_bots(platform).await?))
}

async fn get_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bot = state
        .bots
        .get_bot(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Bot not found"))?;
    Ok(Json(bot))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBotRequest {
    platform: Option<String>,
    bot_token: Option<String>,
    business_id: Option<String>,
    username: Option<String>,
    webhook_url: Option<String>,
    polling: Option<bool>,
    polling_interval: Option<u64>,
    phone_number_id: Option<String>,
}

async fn create_bot(
    State(state): State<GatewayState>,
    Json(req): Json<CreateBotRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(platform), Some(token)) = (
        req.platform.as_deref().filter(|p| !p.trim().is_empty()),
        req.bot_token.filter(|t| !t.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("Platform and botToken are required"));
    };
    let platform = parse_platform(platform)?;
    if !state.manager.supports(platform) {
        return Err(BizbotError::UnsupportedPlatform(platform.to_string()).into());
    }

    let mut config = BotConfig {
        webhook_url: req.webhook_url,
        phone_number_id: req.phone_number_id,
        ..BotConfig::default()
    };
    if let Some(polling) = req.polling {
        config.polling = polling;
    }
    if let Some(interval) = req.polling_interval {
        config.polling_interval = interval;
    }

    let mut username = req.username;
    if platform == Platform::Telegram && username.is_none() {
        username = lookup_username(&state.telegram_api_base, &token).await;
    }

    let bot = state
        .bots
        .create_bot(NewBot {
            business_id: req.business_id,
            platform,
            bot_token: token,
            username,
            config,
        })
        .await?;
    info!("created {} bot {}", bot.platform, bot.id);
    Ok((StatusCode::CREATED, Json(bot)))
}

async fn update_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(update): Json<BotUpdate>,
) -> ApiResult<impl IntoResponse> {
    let bot = state.bots.update_bot(&id, update).await?;
    info!("updated bot {}", id);
    Ok(Json(bot))
}

async fn delete_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.manager.remove(&id).await? {
        return Err(ApiError::not_found("Bot not found"));
    }
    Ok(Json(json!({ "message": "Bot deleted successfully" })))
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    action: String,
}

async fn control_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("{} bot {}", req.action, id);
    match req.action.as_str() {
        "start" => state.manager.start(&id).await?,
        "stop" => state.manager.stop(&id).await?,
        "restart" => state.manager.restart(&id).await?,
        _ => {
            return Err(ApiError::bad_request(
                "Invalid action. Must be start, stop, or restart",
            ));
        }
    }
    let bot = state.bots.get_bot(&id).await?;
    Ok(Json(json!({
        "message": format!("Bot {} successful", req.action),
        "bot": bot,
    })))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn bot_logs(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let bot = state
        .bots
        .get_bot(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Bot not found"))?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let lines: Vec<&str> = bot
        .error_log
        .as_deref()
        .map(|log| log.lines().take(limit).collect())
        .unwrap_or_default();
    Ok(Json(lines).into_response())
}

// ---------------------------------------------------------------------------
// AI admin
// ---------------------------------------------------------------------------

async fn ai_status(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.agent.provider_status().await)
}

#[derive(Debug, Deserialize)]
struct SwitchProviderRequest {
    provider: String,
}

async fn switch_ai_provider(
    State(state): State<GatewayState>,
    Json(req): Json<SwitchProviderRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = state.agent.switch_provider(&req.provider)?;
    Ok(Json(json!({ "provider": name })))
}

async fn export_prompts(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.agent.prompts().export())
}

async fn import_prompts(
    State(state): State<GatewayState>,
    Json(config): Json<PromptConfig>,
) -> ApiResult<impl IntoResponse> {
    state.agent.prompts().import(config)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/ai/prompts: merge entries into the live table, returning it.
async fn update_prompts(
    State(state): State<GatewayState>,
    Json(update): Json<PromptUpdate>,
) -> ApiResult<impl IntoResponse> {
    state.agent.prompts().update(update)?;
    Ok(Json(state.agent.prompts().export()))
}

#[derive(Debug, Deserialize)]
struct IntentRequest {
    text: String,
}

async fn explain_intent(
    State(state): State<GatewayState>,
    Json(req): Json<IntentRequest>,
) -> impl IntoResponse {
    let detected = state.agent.detect_intent(&req.text).await;
    let candidates = state.agent.detector().all_possible_intents(&req.text);
    Json(json!({ "detected": detected, "candidates": candidates }))
}

/// Bind and serve in a background task.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP gateway listening on {}", addr);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP gateway error: {}", e);
        }
    }))
}
