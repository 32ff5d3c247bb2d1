//! The plugin as the host sees it: load, two commands, unload.

use std::sync::Arc;

use discord_link_transport::Connector;
use discord_link_verify::{
    PermissionStore, Player, PlayerDirectory, VerificationProcessor,
};
use tracing::info;

use crate::{
    Commands, ConnectionHandle, ConnectionManager, ConnectionStatus,
    LinkConfig, LinkError, PollingTransport, VerificationDispatcher,
    VerificationTransport, VerifyCommandOutcome,
};

/// A loaded discord-link plugin.
///
/// `T` is the transport `verify` uses: a [`ConnectionHandle`] for the
/// WebSocket push mode, a [`PollingTransport`] for HTTP polling.
pub struct DiscordLink<T, S, D> {
    commands: Commands<T, S, D>,
    processor: Arc<VerificationProcessor<S, D>>,
    connection: Option<ConnectionHandle>,
    config: LinkConfig,
}

impl<S, D> DiscordLink<ConnectionHandle, S, D>
where
    S: PermissionStore,
    D: PlayerDirectory,
{
    /// Loads the plugin in push mode.
    ///
    /// Ensures the verification group exists, spawns the connection
    /// manager and starts the first connect. Returns without waiting for
    /// the connection to open; a failed connect is retried in the
    /// background.
    ///
    /// # Errors
    /// [`LinkError::Config`] for a bad URL or group name, and
    /// [`LinkError::Verify`] if the group cannot be created.
    pub async fn start_websocket<C: Connector>(
        config: LinkConfig,
        store: S,
        directory: D,
        connector: C,
    ) -> Result<Self, LinkError> {
        config.validate_websocket()?;
        let processor = Self::processor_for(&config, store, directory)?;

        let handle = ConnectionManager::spawn(
            config.api.web_socket_url.clone(),
            connector,
            VerificationDispatcher::new(Arc::clone(&processor)),
            config.reconnect.to_config(),
        );
        handle.connect().await?;

        info!(
            mode = "websocket",
            url = %config.api.web_socket_url,
            group = %config.group.name,
            "discord link loaded"
        );
        Ok(Self::assemble(handle.clone(), processor, Some(handle), config))
    }

    /// Snapshot of the push connection.
    pub async fn status(&self) -> Result<ConnectionStatus, LinkError> {
        Ok(self.commands.transport().status().await?)
    }
}

impl<S, D> DiscordLink<PollingTransport, S, D>
where
    S: PermissionStore,
    D: PlayerDirectory,
{
    /// Loads the plugin in polling mode. No connection is held.
    pub fn start_polling(
        config: LinkConfig,
        store: S,
        directory: D,
    ) -> Result<Self, LinkError> {
        config.validate_polling()?;
        let processor = Self::processor_for(&config, store, directory)?;
        let transport = PollingTransport::new(config.api.verified_users_url.clone())?;

        info!(
            mode = "polling",
            url = %config.api.verified_users_url,
            group = %config.group.name,
            "discord link loaded"
        );
        Ok(Self::assemble(transport, processor, None, config))
    }
}

impl<T, S, D> DiscordLink<T, S, D>
where
    T: VerificationTransport,
    S: PermissionStore,
    D: PlayerDirectory,
{
    fn processor_for(
        config: &LinkConfig,
        store: S,
        directory: D,
    ) -> Result<Arc<VerificationProcessor<S, D>>, LinkError> {
        let processor = VerificationProcessor::new(
            store,
            directory,
            config.group.name.clone(),
            config.messages.verification(),
        );
        processor.ensure_group()?;
        Ok(Arc::new(processor))
    }

    fn assemble(
        transport: T,
        processor: Arc<VerificationProcessor<S, D>>,
        connection: Option<ConnectionHandle>,
        config: LinkConfig,
    ) -> Self {
        Self {
            commands: Commands::new(
                transport,
                Arc::clone(&processor),
                config.messages.clone(),
            ),
            processor,
            connection,
            config,
        }
    }

    /// Handles the `discord` chat command.
    pub fn discord<P: Player>(&self, player: &P) {
        self.commands.discord(player);
    }

    /// Handles the `verify` chat command.
    pub async fn verify<P: Player>(&self, player: &P) -> VerifyCommandOutcome {
        self.commands.verify(player).await
    }

    pub fn processor(&self) -> &VerificationProcessor<S, D> {
        &self.processor
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The push connection, if the plugin was started in push mode.
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Unloads the plugin. In push mode this shuts the connection manager
    /// down; nothing it does afterwards reaches the host.
    pub async fn shutdown(self) -> Result<(), LinkError> {
        if let Some(connection) = &self.connection {
            connection.shutdown().await?;
        }
        info!(group = %self.config.group.name, "discord link unloaded");
        Ok(())
    }
}
