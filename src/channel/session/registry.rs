//! Provider registry
//!
//! A Provider serving many Consumers keeps one [`ProviderChannel`] per
//! channel. Each channel sits behind its own mutex so payments on one channel
//! are evaluated one at a time against a consistent balance, while different
//! channels proceed in parallel. The map itself is only write-locked to add
//! or remove channels.

use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{Transaction, Txid};
use parking_lot::{Mutex, RwLock};

use crate::channel::broadcast::Broadcaster;
use crate::channel::session::provider::ProviderChannel;
use crate::errors::{ChannelError, Result};
use crate::types::ChannelId;

/// Shared handle to one channel's ledger
pub type SharedChannel = Arc<Mutex<ProviderChannel>>;

/// Channels served by one Provider, keyed by redeem script hash
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    channels: RwLock<HashMap<ChannelId, SharedChannel>>,
}

impl ProviderRegistry {
    /// Creates an empty registry
    pub fn new() -> Self { Self::default() }

    /// Adds a channel
    ///
    /// # Errors
    /// * `ChannelError::ChannelAlreadyRegistered` - If a channel with the same redeem script exists
    pub fn register(&self, channel: ProviderChannel) -> Result<ChannelId> {
        let id = channel.channel_id();
        let mut channels = self.channels.write();
        if channels.contains_key(&id) {
            return Err(ChannelError::ChannelAlreadyRegistered.into());
        }
        channels.insert(id, Arc::new(Mutex::new(channel)));
        tracing::debug!(channel = %id, "registered channel");
        Ok(id)
    }

    /// Looks up a channel
    pub fn get(&self, id: &ChannelId) -> Option<SharedChannel> { self.channels.read().get(id).cloned() }

    /// Removes a channel, returning its ledger
    pub fn remove(&self, id: &ChannelId) -> Option<SharedChannel> { self.channels.write().remove(id) }

    /// Number of registered channels
    pub fn len(&self) -> usize { self.channels.read().len() }

    /// Returns true when no channel is registered
    pub fn is_empty(&self) -> bool { self.channels.read().is_empty() }

    /// Evaluates a payment on channel `id`
    ///
    /// # Errors
    /// * `ChannelError::UnknownChannel` - If `id` is not registered
    pub fn accept_payment(&self, id: &ChannelId, channel_tx: &Transaction) -> Result<bool> {
        self.channel(id)?.lock().accept_payment(channel_tx)
    }

    /// Evaluates a serialized payment on channel `id`
    ///
    /// # Errors
    /// * `ChannelError::UnknownChannel` - If `id` is not registered
    pub fn accept_payment_hex(&self, id: &ChannelId, raw: &str) -> Result<bool> {
        self.channel(id)?.lock().accept_payment_hex(raw)
    }

    /// Closes channel `id` and drops it from the registry
    ///
    /// The channel stays registered when the broadcast fails.
    ///
    /// # Errors
    /// * `ChannelError::UnknownChannel` - If `id` is not registered
    /// * `ChannelError::NoAcceptedPayment` - If the channel has no accepted payment
    /// * `BroadcastError` - The broadcaster's rejection, unmodified
    pub fn close(&self, id: &ChannelId, broadcaster: &dyn Broadcaster) -> Result<Txid> {
        let txid = self.channel(id)?.lock().close(broadcaster)?;
        self.remove(id);
        Ok(txid)
    }

    fn channel(&self, id: &ChannelId) -> Result<SharedChannel> {
        self.get(id).ok_or_else(|| ChannelError::UnknownChannel.into())
    }
}
