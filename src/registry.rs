//! Channel registry: name → channel lookup with a guaranteed default.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::ports::Channel;

/// Collects channels before the default is known.
#[derive(Default)]
pub struct RegistryBuilder {
    channels: HashMap<String, Arc<dyn Channel>>,
    order: Vec<String>,
}

impl RegistryBuilder {
    /// Register a channel under its declared name.
    ///
    /// A second channel with the same name replaces the first
    /// (last write wins); the replacement is logged.
    ///
    /// # Errors
    ///
    /// Returns a config error if the declared name is empty or contains
    /// whitespace.
    pub fn register(mut self, channel: Arc<dyn Channel>) -> Result<Self, GatewayError> {
        let name = channel.name().to_string();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(GatewayError::Config(format!("invalid channel name {name:?}")));
        }
        if self.channels.insert(name.clone(), channel).is_some() {
            log::warn!("channel {name} registered twice, keeping the last registration");
        } else {
            self.order.push(name);
        }
        Ok(self)
    }

    /// Freeze the registry with `default` as the fallback channel.
    ///
    /// # Errors
    ///
    /// Returns a config error if `default` names no registered channel.
    pub fn build(self, default: &str) -> Result<ChannelRegistry, GatewayError> {
        let default_channel = self.channels.get(default).cloned().ok_or_else(|| {
            GatewayError::Config(format!(
                "default channel {default:?} is not registered (available: {})",
                self.order.join(", ")
            ))
        })?;
        Ok(ChannelRegistry { channels: self.channels, order: self.order, default: default_channel })
    }
}

/// Immutable set of channels shared by every request.
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
    order: Vec<String>,
    default: Arc<dyn Channel>,
}

impl ChannelRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Exact, case-sensitive lookup. No fallback.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }

    /// The configured default channel.
    #[must_use]
    pub fn get_default(&self) -> Arc<dyn Channel> {
        Arc::clone(&self.default)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Name of the default channel.
    #[must_use]
    pub fn default_name(&self) -> &str {
        self.default.name()
    }
}
