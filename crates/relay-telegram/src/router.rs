use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use relay_core::{
    config::Config,
    conversation::Conversation,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    rate_limit::RateLimiter,
    streaming::{DeliveryMode, StreamingDelivery},
};

use crate::handlers;
use crate::TelegramMessenger;

/// Rate-limit entries idle this long are forgotten.
const RATE_LIMIT_IDLE: Duration = Duration::from_secs(60 * 60);
const RATE_LIMIT_SWEEP_EVERY: Duration = Duration::from_secs(10 * 60);

/// Everything an update handler needs, shared across all chats.
#[derive(Clone)]
pub struct AppState {
    pub conversation: Arc<Conversation>,
    pub messenger: Arc<dyn MessagingPort>,
    pub delivery: StreamingDelivery,
    pub delivery_mode: DeliveryMode,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl AppState {
    pub fn new(
        cfg: &Config,
        conversation: Arc<Conversation>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            conversation,
            messenger,
            delivery: StreamingDelivery::new(cfg.delivery.clone()),
            delivery_mode: cfg.delivery_mode,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                cfg.rate_limit_enabled,
                cfg.user_min_interval,
            ))),
        }
    }
}

/// Long-poll Telegram until Ctrl-C.
///
/// The dispatcher runs different chats concurrently and updates of one chat in
/// order, so a chat never has two replies in flight.
pub async fn run_polling(cfg: Arc<Config>, conversation: Arc<Conversation>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "relay started"),
        Err(e) => warn!(error = %e, "getMe failed; continuing"),
    }
    info!(
        mode = ?cfg.delivery_mode,
        persistent_history = cfg.database_url.is_some(),
        "delivery configured"
    );

    // Throttle outbound calls to reduce 429s during edit-heavy delivery. The
    // Telegram adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let state = Arc::new(AppState::new(&cfg, conversation, messenger));
    spawn_rate_limit_sweeper(state.rate_limiter.clone());

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("relay stopped");
    Ok(())
}

fn spawn_rate_limit_sweeper(rate_limiter: Arc<Mutex<RateLimiter>>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(RATE_LIMIT_SWEEP_EVERY);
        tick.tick().await;
        loop {
            tick.tick().await;
            let mut rl = rate_limiter.lock().await;
            let evicted = rl.evict_idle(RATE_LIMIT_IDLE);
            if evicted > 0 {
                debug!(evicted, tracked = rl.tracked_users(), "rate limiter swept");
            }
        }
    });
}
