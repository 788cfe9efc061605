/// Whitelist endpoints
///
/// Thin JSON adapters over [`WhitelistService`](crate::whitelist::WhitelistService);
/// status mapping lives in the error type.
use crate::{
    context::AppContext,
    error::{WhitelistError, WhitelistResult},
    panel::{PanelAction, PanelResponse},
    store::LinkRecord,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Build whitelist routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/discord/whitelist/register", post(register))
        .route("/discord/whitelist/remove", post(remove))
        .route("/discord/whitelist/:discord_user_id", get(get_link))
        .route("/discord/whitelist/:discord_user_id/allowed", get(is_allowed))
        .route("/discord/panel", post(panel_interaction))
        .route("/vrchat/whitelist/:vrc_user_id/allowed", get(is_allowed_by_vrc))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub discord_user_id: String,
    #[serde(default)]
    pub vrc_display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub created: bool,
    pub link: Option<LinkRecord>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    #[serde(default)]
    pub discord_user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowedResponse {
    pub allowed: bool,
}

/// An interaction forwarded by the bot gateway
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelInteraction {
    Command {
        discord_user_id: String,
    },
    Button {
        discord_user_id: String,
        custom_id: String,
    },
    Modal {
        discord_user_id: String,
        custom_id: String,
        #[serde(default)]
        inputs: HashMap<String, String>,
    },
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> WhitelistResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| WhitelistError::InvalidArgument(format!("invalid json: {}", e.body_text())))
}

/// Link a Discord user to a VRChat display name
async fn register(
    State(ctx): State<AppContext>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> WhitelistResult<(StatusCode, Json<RegisterResponse>)> {
    let req = json_body(body)?;

    let created = ctx
        .whitelist
        .register_link(&req.discord_user_id, &req.vrc_display_name)
        .await?;
    // The link is committed; a failed read-back must not turn that into a 500
    let link = match ctx.whitelist.get_link(&req.discord_user_id).await {
        Ok(link) => link,
        Err(e) => {
            tracing::warn!(
                discord_user_id = %req.discord_user_id,
                error = %e,
                "failed to read back registered link"
            );
            None
        }
    };

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(RegisterResponse { created, link })))
}

/// Unlink a Discord user
async fn remove(
    State(ctx): State<AppContext>,
    body: Result<Json<RemoveRequest>, JsonRejection>,
) -> WhitelistResult<StatusCode> {
    let req = json_body(body)?;
    ctx.whitelist.unlink(&req.discord_user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_link(
    State(ctx): State<AppContext>,
    Path(discord_user_id): Path<String>,
) -> Result<Json<LinkRecord>, axum::response::Response> {
    use axum::response::IntoResponse;

    match ctx.whitelist.get_link(&discord_user_id).await {
        Ok(Some(link)) => Ok(Json(link)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "NotLinked",
                "message": "Discord user is not linked"
            })),
        )
            .into_response()),
        Err(e) => Err(e.into_response()),
    }
}

async fn is_allowed(
    State(ctx): State<AppContext>,
    Path(discord_user_id): Path<String>,
) -> WhitelistResult<Json<AllowedResponse>> {
    let allowed = ctx.whitelist.is_allowed(&discord_user_id).await?;
    Ok(Json(AllowedResponse { allowed }))
}

async fn is_allowed_by_vrc(
    State(ctx): State<AppContext>,
    Path(vrc_user_id): Path<String>,
) -> WhitelistResult<Json<AllowedResponse>> {
    let allowed = ctx.whitelist.is_allowed_by_vrc_user_id(&vrc_user_id).await?;
    Ok(Json(AllowedResponse { allowed }))
}

/// Render the whitelist panel for a bot interaction
async fn panel_interaction(
    State(ctx): State<AppContext>,
    body: Result<Json<PanelInteraction>, JsonRejection>,
) -> WhitelistResult<Json<PanelResponse>> {
    let (discord_user_id, action) = match json_body(body)? {
        PanelInteraction::Command { discord_user_id } => (discord_user_id, Some(PanelAction::Open)),
        PanelInteraction::Button {
            discord_user_id,
            custom_id,
        } => {
            let action = PanelAction::from_button(&custom_id);
            (discord_user_id, action)
        }
        PanelInteraction::Modal {
            discord_user_id,
            custom_id,
            inputs,
        } => {
            let action = PanelAction::from_modal(
                &custom_id,
                inputs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
            (discord_user_id, action)
        }
    };

    if discord_user_id.trim().is_empty() {
        return Err(WhitelistError::InvalidArgument("discord_user_id is required".to_string()));
    }
    let action = action.ok_or_else(|| WhitelistError::InvalidArgument("unknown component".to_string()))?;

    Ok(Json(ctx.panel.handle(discord_user_id.trim(), action).await))
}
