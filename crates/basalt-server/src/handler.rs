use basalt_types::{BlockPos, GameProfile, Hand, ItemStack, TextComponent};
use serde::Serialize;
use uuid::Uuid;

pub use crate::game::{DimensionCtx, PlayerId};

/// Outcome of [`ServerHandler::on_login`].
pub enum LoginDecision {
    Allow,
    Deny(TextComponent),
}

/// Outcome of [`ServerHandler::on_join`].
pub enum JoinDecision {
    /// Admit the player, optionally into a specific dimension.
    Allow { dimension: Option<String> },
    Deny(TextComponent),
}

/// Whether a per-player handler consumed an event or defers to the dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    Consumed,
    Delegate,
}

/// Server-wide embedding callbacks. All methods have sensible defaults, so a
/// bare `struct Hub; impl ServerHandler for Hub {}` is a valid embedding.
pub trait ServerHandler: Send + Sync + 'static {
    /// Build the status (server list) document.
    fn status(&self, ctx: &StatusCtx) -> StatusResponse {
        StatusResponse::from_ctx(ctx)
    }

    /// Called after the username is known; `uuid` is None in offline mode
    /// (the server synthesizes one after acceptance).
    fn on_login(&self, _username: &str, _uuid: Option<Uuid>) -> LoginDecision {
        LoginDecision::Allow
    }

    /// Called when configuration finishes, before the player enters a
    /// dimension. Returning a dimension name overrides the default.
    fn on_join(&self, _profile: &GameProfile) -> JoinDecision {
        JoinDecision::Allow { dimension: None }
    }
}

/// Per-dimension embedding callbacks, dispatched from the game loop. The
/// defaults implement the plain lobby behavior.
#[allow(unused_variables)]
pub trait DimensionHandler: Send + 'static {
    /// 20 Hz dimension timer.
    fn on_tick(&mut self, ctx: &mut DimensionCtx) {}

    /// Runs after the player is registered, before chunks stream.
    fn on_player_joined(&mut self, ctx: &mut DimensionCtx, player: PlayerId) {
        let spawn = ctx.spawn_point();
        ctx.set_player_position(player, spawn);
    }

    /// The player crossed a block boundary.
    fn on_player_changed_position(&mut self, ctx: &mut DimensionCtx, player: PlayerId) {}

    fn on_break_block(&mut self, ctx: &mut DimensionCtx, player: PlayerId, pos: BlockPos) {
        ctx.set_block(pos, "minecraft:air");
    }

    fn on_use_item(&mut self, ctx: &mut DimensionCtx, player: PlayerId, hand: Hand) {}

    fn on_use_item_on_block(
        &mut self,
        ctx: &mut DimensionCtx,
        player: PlayerId,
        hand: Hand,
        pos: BlockPos,
        face: u8,
    ) {
    }

    fn on_chat_message(&mut self, ctx: &mut DimensionCtx, player: PlayerId, message: &str) {
        ctx.broadcast_chat(player, message);
    }

    fn on_command(&mut self, ctx: &mut DimensionCtx, player: PlayerId, command: &str) {
        tracing::debug!("unhandled command from {:?}: {}", player, command);
    }

    fn on_set_slot(
        &mut self,
        ctx: &mut DimensionCtx,
        player: PlayerId,
        slot: i16,
        item: Option<ItemStack>,
    ) {
    }

    fn on_select_hotbar_slot(&mut self, ctx: &mut DimensionCtx, player: PlayerId, slot: u8) {}
}

/// The no-op dimension handler used when the embedder supplies none.
pub(crate) struct DefaultDimensionHandler;

impl DimensionHandler for DefaultDimensionHandler {}

/// Optional per-player overrides; defaults delegate to the dimension handler.
#[allow(unused_variables)]
pub trait PlayerHandler: Send + 'static {
    fn on_chat_message(
        &mut self,
        ctx: &mut DimensionCtx,
        player: PlayerId,
        message: &str,
    ) -> HandlerResult {
        HandlerResult::Delegate
    }

    fn on_command(&mut self, ctx: &mut DimensionCtx, player: PlayerId, command: &str) -> HandlerResult {
        HandlerResult::Delegate
    }

    fn on_set_slot(
        &mut self,
        ctx: &mut DimensionCtx,
        player: PlayerId,
        slot: i16,
        item: Option<ItemStack>,
    ) -> HandlerResult {
        HandlerResult::Delegate
    }

    fn on_select_hotbar_slot(
        &mut self,
        ctx: &mut DimensionCtx,
        player: PlayerId,
        slot: u8,
    ) -> HandlerResult {
        HandlerResult::Delegate
    }
}

/// Inputs for building a status document.
pub struct StatusCtx {
    pub online: usize,
    pub max: u32,
    pub motd: String,
    pub version_name: &'static str,
    pub protocol: i32,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: TextComponent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(rename = "enforcesSecureChat")]
    pub enforces_secure_chat: bool,
    #[serde(rename = "preventsChatReports", skip_serializing_if = "Option::is_none")]
    pub prevents_chat_reports: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Serialize)]
pub struct StatusPlayers {
    pub max: u32,
    pub online: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<StatusSample>,
}

#[derive(Debug, Serialize)]
pub struct StatusSample {
    pub name: String,
    /// Hyphenated UUID string.
    pub id: String,
}

impl StatusResponse {
    pub fn from_ctx(ctx: &StatusCtx) -> Self {
        Self {
            version: StatusVersion {
                name: ctx.version_name.to_string(),
                protocol: ctx.protocol,
            },
            players: StatusPlayers {
                max: ctx.max,
                online: ctx.online,
                sample: Vec::new(),
            },
            description: TextComponent::plain(ctx.motd.clone()),
            favicon: None,
            enforces_secure_chat: false,
            prevents_chat_reports: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_shape() {
        let ctx = StatusCtx {
            online: 3,
            max: 20,
            motd: "hub".into(),
            version_name: "1.21.8",
            protocol: 772,
        };
        let json = StatusResponse::from_ctx(&ctx).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"]["protocol"], 772);
        assert_eq!(value["players"]["online"], 3);
        assert_eq!(value["description"]["text"], "hub");
        assert_eq!(value["enforcesSecureChat"], false);
        assert!(value.get("favicon").is_none());
    }

    #[test]
    fn test_sample_uuid_form() {
        let uuid = Uuid::new_v4();
        let sample = StatusSample {
            name: "Alex".into(),
            id: uuid.hyphenated().to_string(),
        };
        assert_eq!(sample.id.len(), 36);
    }
}
