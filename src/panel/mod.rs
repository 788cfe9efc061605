/// Discord whitelist panel
///
/// Rendering-neutral model of the `/whitelist` panel: a status embed with
/// register / delete / refresh buttons and a modal asking for the VRChat
/// name. A bot front-end turns [`PanelResponse`] into embeds and
/// components; this module only decides what to show.
use crate::{
    error::{ErrorKind, WhitelistError},
    store::LinkRecord,
    whitelist::WhitelistService,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

pub const BUTTON_REGISTER: &str = "wl_register";
pub const BUTTON_DELETE: &str = "wl_delete";
pub const BUTTON_REFRESH: &str = "wl_refresh";
pub const MODAL_REGISTER: &str = "wl_modal_register";
pub const MODAL_INPUT_VRC_NAME: &str = "wl_modal_input_vrc_name";

pub const COLOR_LINKED: u32 = 0x00cc99;
pub const COLOR_UNLINKED: u32 = 0xff9933;
pub const COLOR_UNAVAILABLE: u32 = 0x99aab5;

/// A user interaction with the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    /// Slash command: show the panel
    Open,
    /// Register button: ask for the VRChat name
    OpenRegisterModal,
    /// Modal submitted with a VRChat display name
    Register { display_name: String },
    Delete,
    Refresh,
}

impl PanelAction {
    /// Map a button custom id to an action
    pub fn from_button(custom_id: &str) -> Option<Self> {
        match custom_id {
            BUTTON_REGISTER => Some(PanelAction::OpenRegisterModal),
            BUTTON_DELETE => Some(PanelAction::Delete),
            BUTTON_REFRESH => Some(PanelAction::Refresh),
            _ => None,
        }
    }

    /// Map a modal submission (custom id + text inputs) to an action
    pub fn from_modal<'a, I>(custom_id: &str, inputs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if custom_id != MODAL_REGISTER {
            return None;
        }

        let display_name = inputs
            .into_iter()
            .find(|(id, _)| *id == MODAL_INPUT_VRC_NAME)
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_default();

        Some(PanelAction::Register { display_name })
    }
}

/// What the status embed shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub discord_user_id: String,
    /// False when the link could not be loaded; `linked` is then meaningless
    pub available: bool,
    pub linked: bool,
    pub vrc_display_name: Option<String>,
    pub vrc_avatar_url: Option<String>,
    pub color: u32,
}

impl PanelView {
    fn from_link(discord_user_id: &str, link: Option<&LinkRecord>) -> Self {
        Self {
            discord_user_id: discord_user_id.to_string(),
            available: true,
            linked: link.is_some(),
            vrc_display_name: link.map(|l| l.vrc_display_name.clone()),
            vrc_avatar_url: link.and_then(|l| l.vrc_avatar_url.clone()),
            color: if link.is_some() { COLOR_LINKED } else { COLOR_UNLINKED },
        }
    }

    fn unavailable(discord_user_id: &str) -> Self {
        Self {
            discord_user_id: discord_user_id.to_string(),
            available: false,
            linked: false,
            vrc_display_name: None,
            vrc_avatar_url: None,
            color: COLOR_UNAVAILABLE,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if !self.available {
            "Status unavailable"
        } else if self.linked {
            "Registered"
        } else {
            "Not registered"
        }
    }
}

/// How the front-end should answer the interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PanelResponse {
    /// Show the VRChat name modal
    Modal,
    /// Send (or edit, when `update_in_place`) an ephemeral panel message
    Panel {
        message: Option<String>,
        view: PanelView,
        update_in_place: bool,
    },
}

/// Drives the panel through the whitelist service
#[derive(Clone)]
pub struct PanelHandler {
    whitelist: Arc<WhitelistService>,
}

impl PanelHandler {
    pub fn new(whitelist: Arc<WhitelistService>) -> Self {
        Self { whitelist }
    }

    pub async fn handle(&self, discord_user_id: &str, action: PanelAction) -> PanelResponse {
        match action {
            PanelAction::Open => self.panel(discord_user_id, None, false).await,
            PanelAction::OpenRegisterModal => PanelResponse::Modal,
            PanelAction::Register { display_name } => {
                let message = match self.whitelist.register_link(discord_user_id, &display_name).await {
                    Ok(true) => "Added to the whitelist.".to_string(),
                    Ok(false) => "Whitelist entry updated.".to_string(),
                    Err(e) => failure_message(discord_user_id, &e),
                };
                self.panel(discord_user_id, Some(message), false).await
            }
            PanelAction::Delete => {
                let message = match self.whitelist.unlink(discord_user_id).await {
                    Ok(()) => "Removed from the whitelist.".to_string(),
                    Err(e) => failure_message(discord_user_id, &e),
                };
                self.panel(discord_user_id, Some(message), true).await
            }
            PanelAction::Refresh => self.panel(discord_user_id, None, true).await,
        }
    }

    async fn panel(&self, discord_user_id: &str, message: Option<String>, update_in_place: bool) -> PanelResponse {
        let (message, view) = match self.whitelist.get_link(discord_user_id).await {
            Ok(link) => (message, PanelView::from_link(discord_user_id, link.as_ref())),
            Err(e) => {
                error!(discord_user_id, error = %e, "failed to load whitelist link for panel");
                // Keep the outcome of the action itself if there is one
                let message = message.unwrap_or_else(|| failure_message(discord_user_id, &e));
                (Some(message), PanelView::unavailable(discord_user_id))
            }
        };

        PanelResponse::Panel {
            message,
            view,
            update_in_place,
        }
    }
}

/// User-facing copy for a failed operation
pub fn failure_message(discord_user_id: &str, err: &WhitelistError) -> String {
    match err.kind() {
        ErrorKind::InvalidArgument => "The VRChat name is empty. Please check your input.".to_string(),
        ErrorKind::NoExactMatch => {
            "No VRChat user has exactly that display name. Check spelling and capitalization.".to_string()
        }
        ErrorKind::MultipleExactMatch => {
            "Several VRChat users share that display name. Please contact a moderator.".to_string()
        }
        ErrorKind::AlreadyLinkedElsewhere => {
            "That VRChat account is already registered by another Discord user.".to_string()
        }
        _ => {
            error!(discord_user_id, error = %err, "whitelist panel operation failed");
            "Something went wrong on our side. Please try again later.".to_string()
        }
    }
}
