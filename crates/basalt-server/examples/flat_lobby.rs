//! A minimal lobby: one superflat dimension, chat relay, and a /who command.

use basalt_server::types::{TextComponent, Vec3d};
use basalt_server::{
    Dimension, DimensionCtx, DimensionHandler, PlayerId, Registry, Server, ServerHandler,
    ServerProperties, SuperflatGenerator,
};
use std::path::Path;

struct Lobby;

impl ServerHandler for Lobby {}

struct LobbyWorld;

impl DimensionHandler for LobbyWorld {
    fn on_player_joined(&mut self, ctx: &mut DimensionCtx, player: PlayerId) {
        let spawn = ctx.spawn_point();
        ctx.set_player_position(player, spawn);
        if let Some(name) = ctx.player_name(player) {
            ctx.broadcast_system(TextComponent::plain(format!("{name} joined the lobby")));
        }
    }

    fn on_command(&mut self, ctx: &mut DimensionCtx, player: PlayerId, command: &str) {
        match command.trim() {
            "who" => {
                let names: Vec<String> = ctx
                    .players()
                    .iter()
                    .filter_map(|p| ctx.player_name(*p))
                    .collect();
                ctx.send_system(
                    player,
                    TextComponent::plain(format!("online: {}", names.join(", "))),
                );
            }
            other => {
                ctx.send_system(player, TextComponent::plain(format!("unknown command /{other}")));
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let properties = ServerProperties::load(Path::new("server.toml"))?;
    let registry = Registry::load_default()?;
    let mut server = Server::new(properties, registry, Lobby)?;

    let registry = server.registry();
    let generator = SuperflatGenerator::new(
        &registry,
        &[
            ("minecraft:bedrock", 1),
            ("minecraft:dirt", 2),
            ("minecraft:grass_block", 1),
        ],
    )?;
    let surface = generator.surface_y() as f64;
    let dimension = Dimension::new(
        "minecraft:overworld",
        "minecraft:overworld",
        Box::new(generator),
        &registry,
    )?
    .with_flat(true)
    .with_spawn_point(Vec3d::new(0.5, surface, 0.5))
    .with_handler(Box::new(LobbyWorld));
    server.add_dimension(dimension);

    let bind = server.properties().bind.clone();
    let port = server.properties().port;
    server.listen(&bind, port).await
}
