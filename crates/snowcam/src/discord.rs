use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, GatewayIntents, Http, Message};
use serenity::async_trait;
use serenity::client::Context as SerenityContext;
use serenity::prelude::*;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::commands::{Reply, Router};
use crate::config::{Config, ScheduleSlot};
use crate::schedule::next_fire;
use crate::subscribers::SubscriberStore;

pub struct Handler {
    router: Arc<Router>,
    scheduler_started: AtomicBool,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: serenity::model::gateway::Ready) {
        info!(user = %ready.user.name, "Bot connected");

        // Fires again after every reconnect.
        if self.scheduler_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let http = ctx.http.clone();
        let router = self.router.clone();
        tokio::spawn(async move {
            run_scheduler(http, router).await;
        });
    }

    async fn message(&self, ctx: SerenityContext, msg: Message) {
        if msg.author.bot {
            return;
        }

        let chat_id = msg.channel_id.get().to_string();
        let Some(reply) = self.router.handle(&chat_id, &msg.content).await else {
            return;
        };

        if let Err(e) = send_reply(&ctx.http, msg.channel_id, &reply, Some(&msg)).await {
            error!(error = %e, chat_id, "Failed to send reply");
        }
    }
}

async fn send_reply(
    http: &Arc<Http>,
    channel_id: ChannelId,
    reply: &Reply,
    reference: Option<&Message>,
) -> Result<()> {
    let mut message = match reply {
        Reply::Text(text) => CreateMessage::new().content(text),
        Reply::Image {
            data,
            filename,
            caption,
        } => CreateMessage::new()
            .content(caption)
            .add_file(CreateAttachment::bytes(data.clone(), filename.clone())),
    };
    if let Some(original) = reference {
        message = message.reference_message(original);
    }

    channel_id
        .send_message(http, message)
        .await
        .context("Failed to send message")?;
    Ok(())
}

/// Parses a stored chat id. Channel ids are non-zero snowflakes.
fn channel_id(id: &str) -> Option<ChannelId> {
    match id.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(ChannelId::new(id)),
    }
}

/// Sends to every chat at once through `send`. Failures are logged per
/// chat and do not affect the others. Returns the number of chats reached.
async fn broadcast<F, Fut>(chat_ids: &[String], send: F) -> usize
where
    F: Fn(ChannelId) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let send = &send;
    let sends = chat_ids.iter().map(|chat_id| async move {
        let Some(channel) = channel_id(chat_id) else {
            warn!(chat_id = %chat_id, "Skipping invalid chat id");
            return false;
        };
        match send(channel).await {
            Ok(()) => {
                info!(chat_id = %chat_id, "Scheduled update sent");
                true
            }
            Err(e) => {
                error!(chat_id = %chat_id, error = %e, "Failed to send scheduled update");
                false
            }
        }
    });

    let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
    info!(delivered, total = chat_ids.len(), "Broadcast finished");
    delivered
}

/// Subscribers and content for a slot that fired at `fire_at`.
///
/// `None` when there is nobody to send to or the frame could not be fetched.
async fn scheduled_update(
    router: &Router,
    slot: &ScheduleSlot,
    fire_at: DateTime<Utc>,
) -> Option<(Vec<String>, Reply)> {
    info!(title = %slot.title, "Sending scheduled update");

    let chat_ids = router.subscribers().await;
    if chat_ids.is_empty() {
        warn!("No subscribed chats, skipping scheduled update");
        return None;
    }

    match router.scheduled(slot, fire_at).await {
        Ok(reply) => Some((chat_ids, reply)),
        Err(e) => {
            error!(title = %slot.title, error = %e, "Scheduled update failed");
            None
        }
    }
}

async fn run_scheduler(http: Arc<Http>, router: Arc<Router>) {
    let tz = router.timezone();
    info!(slots = router.schedule().len(), timezone = %tz, "Starting scheduler");

    let mut after = Utc::now();
    loop {
        let Some((fire_at, slot)) = next_fire(after, tz, router.schedule()) else {
            warn!("No schedule slots configured, scheduler stopped");
            return;
        };

        let wait = (fire_at - Utc::now()).to_std().unwrap_or_default();
        info!(
            title = %slot.title,
            at = %fire_at.with_timezone(&tz),
            wait = %humantime::format_duration(Duration::from_secs(wait.as_secs())),
            "Next scheduled update"
        );
        tokio::time::sleep(wait).await;

        if let Some((chat_ids, reply)) = scheduled_update(&router, slot, fire_at).await {
            let (http, reply) = (&http, &reply);
            broadcast(&chat_ids, move |channel| {
                send_reply(http, channel, reply, None)
            })
            .await;
        }
        after = Utc::now().max(fire_at);
    }
}

pub async fn run(config: Config, store: SubscriberStore) -> Result<()> {
    let router = Router::new(&config, Arc::new(Mutex::new(store)))?;

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = Handler {
        router: Arc::new(router),
        scheduler_started: AtomicBool::new(false),
    };

    let mut client = Client::builder(&config.discord.token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create client")?;

    info!("Starting bot");
    client.start().await.context("Client error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn parse_channel_ids() {
        assert_eq!(
            channel_id("123456789012345678"),
            Some(ChannelId::new(123456789012345678))
        );
        assert_eq!(channel_id(" 42 "), Some(ChannelId::new(42)));
        assert_eq!(channel_id("0"), None);
        assert_eq!(channel_id("120363000000000000@g.us"), None);
        assert_eq!(channel_id(""), None);
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn failed_send_does_not_stop_the_others() {
        let sent = StdMutex::new(Vec::new());
        let sent_ref = &sent;

        let delivered = broadcast(&ids(&["11", "22", "33"]), move |channel| async move {
            if channel.get() == 22 {
                return Err(anyhow::anyhow!("channel unavailable"));
            }
            sent_ref.lock().unwrap().push(channel.get());
            Ok(())
        })
        .await;

        let mut sent = sent.into_inner().unwrap();
        sent.sort();
        assert_eq!(sent, [11, 33]);
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn invalid_ids_are_skipped() {
        let calls = StdMutex::new(0);
        let calls_ref = &calls;

        let delivered = broadcast(&ids(&["0", "not-a-channel", "44"]), move |channel| async move {
            *calls_ref.lock().unwrap() += 1;
            assert_eq!(channel.get(), 44);
            Ok::<_, anyhow::Error>(())
        })
        .await;

        assert_eq!(delivered, 1);
        assert_eq!(calls.into_inner().unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_broadcast_sends_nothing() {
        let calls = StdMutex::new(0);
        let calls_ref = &calls;

        let delivered = broadcast(&[], move |_| async move {
            *calls_ref.lock().unwrap() += 1;
            Ok::<_, anyhow::Error>(())
        })
        .await;

        assert_eq!(delivered, 0);
        assert_eq!(calls.into_inner().unwrap(), 0);
    }

    fn offline_router(subscribers: &[&str]) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            schedule: vec![ScheduleSlot {
                hour: 8,
                minute: 0,
                title: "Morning".to_string(),
            }],
            ..Default::default()
        };
        config.webcam.api_url = "http://127.0.0.1:9".to_string();
        config.weather.feed_url = "http://127.0.0.1:9/VQHA80.csv".to_string();
        config.subscribers.path = dir.path().join("subscribers.json");

        let mut store = SubscriberStore::load(&config.subscribers.path);
        store.merge(&ids(subscribers)).unwrap();
        let router = Router::new(&config, Arc::new(Mutex::new(store))).unwrap();
        (router, dir)
    }

    #[tokio::test]
    async fn no_subscribers_skips_the_update() {
        let (router, _dir) = offline_router(&[]);
        let slot = router.schedule()[0].clone();

        assert!(scheduled_update(&router, &slot, Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_skips_the_update() {
        let (router, _dir) = offline_router(&["11"]);
        let slot = router.schedule()[0].clone();

        assert!(scheduled_update(&router, &slot, Utc::now()).await.is_none());
    }
}
