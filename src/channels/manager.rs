//! ChannelManager: owns the configured channels and merges their input.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Routes replies back to the channel each message came from.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. A later channel with the same name replaces the
    /// earlier one.
    pub fn add(&mut self, channel: Box<dyn Channel>) {
        let channel: Arc<dyn Channel> = Arc::from(channel);
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start every channel and merge their streams. Channels that fail to
    /// start are logged and skipped.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::new();
        for (name, channel) in &self.channels {
            match channel.start().await {
                Ok(stream) => {
                    tracing::info!(channel = %name, "Channel started");
                    streams.push(stream);
                }
                Err(e) => tracing::warn!(channel = %name, "Channel failed to start: {e}"),
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel could be started".into(),
            });
        }
        Ok(stream::select_all(streams).boxed())
    }

    /// Send a response on the message's originating channel.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(&msg.channel)
            .ok_or_else(|| ChannelError::UnknownChannel(msg.channel.clone()))?;
        channel.respond(msg, response).await
    }

    /// Run every channel's health check; failures are returned by name.
    pub async fn health_check_all(&self) -> Vec<(String, ChannelError)> {
        let mut failures = Vec::new();
        for (name, channel) in &self.channels {
            if let Err(e) = channel.health_check().await {
                failures.push((name.clone(), e));
            }
        }
        failures
    }

    pub async fn shutdown_all(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = %name, "Channel shutdown failed: {e}");
            }
        }
    }
}
