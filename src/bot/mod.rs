//! # Bot Module
//!
//! Discord-facing side of the crate.
//!
//! - [`MusicCog`]: producer API used by command handlers and download workers
//! - [`MessageDispatcher`]: the single consumer of the message queue
//! - [`MusicBot`]: serenity [`EventHandler`] wiring both to the gateway
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use open_music_cog::{bot::MusicBot, config::Config};
//! # fn example() -> anyhow::Result<()> {
//! let config = Arc::new(Config::load()?);
//! let bot = MusicBot::new(config);
//! let cog = bot.cog().clone();
//! # Ok(())
//! # }
//! ```

use serenity::{
    all::{Context, EventHandler, Guild, Ready, UnavailableGuild},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod cog;
pub mod dispatcher;

pub use cog::{
    play_order_key, request_bundle_key, BundleContent, BundleContentSource, MusicCog, QueuedItem,
};
pub use dispatcher::MessageDispatcher;

use crate::config::Config;

/// Gateway event handler.
///
/// Starts the [`MessageDispatcher`] on the first `ready` (reconnects fire
/// `ready` again) and cleans a guild up when the bot leaves it.
pub struct MusicBot {
    config: Arc<Config>,
    cog: Arc<MusicCog>,
    dispatcher_started: AtomicBool,
    shutdown: CancellationToken,
}

impl MusicBot {
    pub fn new(config: Arc<Config>) -> Self {
        let cog = Arc::new(MusicCog::new(config.clone()));
        Self {
            config,
            cog,
            dispatcher_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn cog(&self) -> &Arc<MusicCog> {
        &self.cog
    }

    /// Token that stops the dispatcher when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn start_dispatcher(&self) {
        if self.dispatcher_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let dispatcher = MessageDispatcher::new(
            self.cog.queue().clone(),
            self.cog.clone(),
            self.config.message_poll_interval,
            self.shutdown.clone(),
        );
        tokio::spawn(dispatcher.run());
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        self.start_dispatcher();
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Outages also fire guild_delete; only a real removal clears state.
        if incomplete.unavailable {
            return;
        }

        info!("👋 Removed from guild {}", incomplete.id);
        self.cog.cleanup_guild(incomplete.id);
    }
}
