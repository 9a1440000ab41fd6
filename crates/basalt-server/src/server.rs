use crate::dimension::Dimension;
use crate::game;
use crate::handler::ServerHandler;
use crate::network;
use crate::player::NewPlayer;
use crate::properties::ServerProperties;
use anyhow::{Context, Result};
use basalt_protocol_v772::V772Adapter;
use basalt_registry::Registry;
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// State shared between the accept loop, connection tasks and the game loop.
pub(crate) struct ServerShared {
    pub properties: ServerProperties,
    pub registry: Arc<Registry>,
    pub adapter: V772Adapter,
    pub handler: Arc<dyn ServerHandler>,
    pub rsa_key: Option<RsaPrivateKey>,
    pub public_key_der: Vec<u8>,
    pub player_count: AtomicUsize,
    pub new_player_tx: mpsc::UnboundedSender<NewPlayer>,
}

impl ServerShared {
    #[cfg(test)]
    pub(crate) fn for_tests(
        properties: ServerProperties,
        registry: Arc<Registry>,
        handler: Arc<dyn ServerHandler>,
        new_player_tx: mpsc::UnboundedSender<NewPlayer>,
    ) -> Self {
        Self {
            properties,
            registry,
            adapter: V772Adapter::new(),
            handler,
            rsa_key: None,
            public_key_der: Vec::new(),
            player_count: AtomicUsize::new(0),
            new_player_tx,
        }
    }
}

/// Requests a running [`Server`] to stop: the accept loop closes, every live
/// connection receives a shutdown disconnect, and the game loop exits.
#[derive(Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// The process-wide server: dimensions, the frozen registry, the embedder
/// callbacks, and (in online mode) the RSA keypair.
pub struct Server {
    properties: ServerProperties,
    registry: Arc<Registry>,
    handler: Arc<dyn ServerHandler>,
    dimensions: HashMap<String, Dimension>,
    default_dimension: Option<String>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Finalizes the registry (idempotent) and takes ownership of it; the
    /// frozen registry is shared with dimensions and providers via
    /// [`Server::registry`].
    pub fn new(
        properties: ServerProperties,
        mut registry: Registry,
        handler: impl ServerHandler,
    ) -> Result<Self> {
        registry.finalize()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            properties,
            registry: Arc::new(registry),
            handler: Arc::new(handler),
            dimensions: HashMap::new(),
            default_dimension: None,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    /// Register a dimension. The first one becomes the default.
    pub fn add_dimension(&mut self, dimension: Dimension) {
        if self.default_dimension.is_none() {
            self.default_dimension = Some(dimension.id().to_string());
        }
        self.dimensions
            .insert(dimension.id().to_string(), dimension);
    }

    pub fn set_default_dimension(&mut self, id: &str) -> Result<()> {
        anyhow::ensure!(
            self.dimensions.contains_key(id),
            "unknown dimension {id}"
        );
        self.default_dimension = Some(id.to_string());
        Ok(())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Bind and serve until the shutdown handle fires. Consumes the server;
    /// one task accepts sockets, one task per connection drives the
    /// pre-play phases, and a single game task owns all game state.
    pub async fn listen(self, address: &str, port: u16) -> Result<()> {
        let default_dimension = self
            .default_dimension
            .context("at least one dimension must be added before listen")?;

        let (rsa_key, public_key_der) = if self.properties.online_mode {
            let mut rng = rand::rngs::OsRng;
            let key = RsaPrivateKey::new(&mut rng, 1024).context("RSA key generation failed")?;
            let der = key.to_public_key().to_public_key_der()?.into_vec();
            info!("generated 1024-bit RSA keypair for online mode");
            (Some(key), der)
        } else {
            (None, Vec::new())
        };

        let (new_player_tx, new_player_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ServerShared {
            properties: self.properties,
            registry: self.registry,
            adapter: V772Adapter::new(),
            handler: self.handler,
            rsa_key,
            public_key_der,
            player_count: AtomicUsize::new(0),
            new_player_tx,
        });

        let listener = TcpListener::bind((address, port)).await?;
        info!("listening on {address}:{port}");

        let game = game::run_game_loop(
            shared.clone(),
            self.dimensions,
            default_dimension,
            new_player_rx,
            self.shutdown_rx.clone(),
        );
        let accept = accept_loop(listener, shared, self.shutdown_rx);
        tokio::join!(game, accept);
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("accept loop stopped");
                    return;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    info!("new connection from {peer}");
                    tokio::spawn(network::handle_connection(socket, shared.clone()));
                }
                Err(e) => {
                    warn!("failed to accept connection: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ServerHandler;
    use basalt_world::SuperflatGenerator;

    struct Hub;
    impl ServerHandler for Hub {}

    #[tokio::test]
    async fn test_listen_requires_a_dimension() {
        let registry = Registry::load_default().unwrap();
        let server = Server::new(ServerProperties::default(), registry, Hub).unwrap();
        let err = server.listen("127.0.0.1", 0).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn test_registry_frozen_by_new() {
        let registry = Registry::load_default().unwrap();
        let server = Server::new(ServerProperties::default(), registry, Hub).unwrap();
        assert!(server.registry().is_frozen());
        assert!(server.registry().network_data().is_ok());
    }

    #[tokio::test]
    async fn test_first_dimension_is_default() {
        let registry = Registry::load_default().unwrap();
        let mut server = Server::new(ServerProperties::default(), registry, Hub).unwrap();
        let reg = server.registry();
        let generator = SuperflatGenerator::new(&reg, &[("minecraft:stone", 4)]).unwrap();
        let dim = Dimension::new(
            "minecraft:overworld",
            "minecraft:overworld",
            Box::new(generator),
            &reg,
        )
        .unwrap();
        server.add_dimension(dim);
        assert_eq!(server.default_dimension.as_deref(), Some("minecraft:overworld"));
        assert!(server.set_default_dimension("hub:missing").is_err());
    }
}
