// tests/fanout_guard.rs
//
// Delivery guard: permission checks per destination and the notice fallback chain
// (system channel -> owner DM -> first public channel).

use std::sync::Arc;

use freegame_notifier::deal::Deal;
use freegame_notifier::destination::{ChannelId, ChannelPermissions, DestinationRecord, GuildId, UserId};
use freegame_notifier::notify::{ChatError, ChatPlatform, DeliveryOutcome, GuildInfo};
use freegame_notifier::render::ChatMessage;
use freegame_notifier::store::{DocumentStore, MemoryStore};
use freegame_notifier::testkit::{RecordingChat, RecordingMicroblog};
use freegame_notifier::{Fanout, Source};

const GUILD: u64 = 1;
const TARGET: u64 = 100;
const SYSTEM: u64 = 101;
const GENERAL: u64 = 102;
const OWNER: u64 = 900;

const SEND_ONLY: ChannelPermissions = ChannelPermissions {
    view: true,
    send: true,
    embed: false,
    attach: false,
};
const NOTHING: ChannelPermissions = ChannelPermissions {
    view: false,
    send: false,
    embed: false,
    attach: false,
};

fn source() -> Source {
    let mut s = Source::new("epic", "Epic Games", "https://store.epicgames.com/free");
    s.data = Some(vec![Deal::new("Game A", "https://store.test/a", true)]);
    s
}

fn guild() -> GuildInfo {
    GuildInfo {
        id: GUILD,
        name: "Gamers".into(),
        owner_id: OWNER,
        system_channel: Some(SYSTEM),
        text_channels: vec![TARGET, SYSTEM, GENERAL],
    }
}

async fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let mut rec = DestinationRecord::new(GUILD);
    rec.channel_id = Some(TARGET);
    rec.role_id = Some(GUILD);
    rec.subscriptions.insert("epic".into());
    store.upsert_destination(&rec).await.unwrap();
    store
}

#[tokio::test]
async fn send_without_embed_gets_notice_in_place_and_nothing_else() {
    let store = store().await;
    let chat = Arc::new(
        RecordingChat::new()
            .with_guild(guild())
            .with_permissions(TARGET, SEND_ONLY),
    );
    let fanout = Fanout::new(store.clone()).with_chat(chat.clone());

    let report = fanout.notify(&source()).await;
    assert_eq!(report.chat_outcome(GUILD), Some(DeliveryOutcome::Degraded));

    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, TARGET);
    let notice = &sent[0].1;
    assert!(notice.embed.is_none());
    assert!(notice.attachment.is_none());
    let text = notice.content.as_deref().unwrap();
    assert!(text.contains("❌ Embed Links"));
    assert!(text.contains("✅ Send Messages"));
    assert!(chat.direct_messages().is_empty());

    let rec = store.get_destination(GUILD).await.unwrap().unwrap();
    assert_eq!(rec.last_permissions, Some(SEND_ONLY));
}

#[tokio::test]
async fn no_rights_falls_back_to_system_channel() {
    let chat = Arc::new(
        RecordingChat::new()
            .with_guild(guild())
            .with_permissions(TARGET, NOTHING),
    );
    let fanout = Fanout::new(store().await).with_chat(chat.clone());

    let report = fanout.notify(&source()).await;
    assert_eq!(report.chat_outcome(GUILD), Some(DeliveryOutcome::Degraded));
    assert_eq!(chat.sent_to(SYSTEM).len(), 1);
    assert!(chat.sent_to(TARGET).is_empty());
    assert!(chat.direct_messages().is_empty());
}

#[tokio::test]
async fn system_channel_refusal_falls_back_to_owner_dm() {
    let chat = Arc::new(
        RecordingChat::new()
            .with_guild(guild())
            .with_permissions(TARGET, NOTHING)
            .refusing_channel(SYSTEM),
    );
    let fanout = Fanout::new(store().await).with_chat(chat.clone());

    fanout.notify(&source()).await;
    let dms = chat.direct_messages();
    assert_eq!(dms.len(), 1);
    assert_eq!(dms[0].0, OWNER);
    assert!(dms[0].1.contains(&format!("<#{TARGET}>")));
    assert!(chat.sent().is_empty());
}

#[tokio::test]
async fn last_resort_is_first_public_channel_with_send_rights() {
    let chat = Arc::new(
        RecordingChat::new()
            .with_guild(guild())
            .with_permissions(TARGET, NOTHING)
            .with_permissions(GENERAL, SEND_ONLY)
            .refusing_channel(SYSTEM)
            .refusing_dm(OWNER),
    );
    let fanout = Fanout::new(store().await).with_chat(chat.clone());

    let report = fanout.notify(&source()).await;
    assert_eq!(report.chat_outcome(GUILD), Some(DeliveryOutcome::Degraded));
    assert_eq!(chat.sent_to(GENERAL).len(), 1);
}

#[tokio::test]
async fn nowhere_to_post_gives_up_quietly() {
    let chat = Arc::new(
        RecordingChat::new()
            .with_guild(guild())
            .with_permissions(TARGET, NOTHING)
            .with_permissions(GENERAL, NOTHING)
            .refusing_channel(SYSTEM)
            .refusing_dm(OWNER),
    );
    let microblog = Arc::new(RecordingMicroblog::default());
    let mut src = source();
    src.channels.microblog = true;
    let fanout = Fanout::new(store().await)
        .with_chat(chat.clone())
        .with_microblog(microblog.clone());

    let report = fanout.notify(&src).await;
    assert_eq!(report.chat_outcome(GUILD), Some(DeliveryOutcome::Failed));
    assert!(chat.sent().is_empty());
    // Other platforms are unaffected.
    assert_eq!(microblog.posts().len(), 1);
}

#[tokio::test]
async fn full_rights_mention_everyone_for_default_role() {
    let chat = Arc::new(RecordingChat::new().with_permissions(TARGET, ChannelPermissions::ALL));
    let fanout = Fanout::new(store().await).with_chat(chat.clone());

    let report = fanout.notify(&source()).await;
    assert_eq!(report.chat_outcome(GUILD), Some(DeliveryOutcome::Delivered));
    let msg = &chat.sent_to(TARGET)[0];
    assert!(msg.content.as_deref().unwrap().contains("@everyone"));
    assert!(msg.embed.is_some());
}

/// Chat fake whose first send moves the destination to another channel through the
/// store, like a user editing settings while the fan-out is in flight.
struct ReassignDuringSend {
    inner: RecordingChat,
    store: Arc<MemoryStore>,
    moved_to: ChannelId,
}

#[async_trait::async_trait]
impl ChatPlatform for ReassignDuringSend {
    async fn channel_permissions(&self, channel: ChannelId) -> Result<ChannelPermissions, ChatError> {
        self.inner.channel_permissions(channel).await
    }

    async fn send(&self, channel: ChannelId, message: &ChatMessage) -> Result<(), ChatError> {
        let mut rec = self.store.get_destination(GUILD).await.unwrap().unwrap();
        rec.channel_id = Some(self.moved_to);
        self.store.upsert_destination(&rec).await.unwrap();
        self.inner.send(channel, message).await
    }

    async fn guild(&self, guild: GuildId) -> Result<GuildInfo, ChatError> {
        self.inner.guild(guild).await
    }

    async fn direct_message(&self, user: UserId, text: &str) -> Result<(), ChatError> {
        self.inner.direct_message(user, text).await
    }
}

#[tokio::test]
async fn permission_write_back_keeps_settings_changed_mid_delivery() {
    let store = store().await;
    let chat = Arc::new(ReassignDuringSend {
        inner: RecordingChat::new().with_permissions(TARGET, ChannelPermissions::ALL),
        store: store.clone(),
        moved_to: 999,
    });
    let fanout = Fanout::new(store.clone()).with_chat(chat);

    let report = fanout.notify(&source()).await;
    assert_eq!(report.chat_outcome(GUILD), Some(DeliveryOutcome::Delivered));

    let rec = store.get_destination(GUILD).await.unwrap().unwrap();
    assert_eq!(rec.channel_id, Some(999), "user edit survives the fan-out");
    assert_eq!(rec.last_permissions, Some(ChannelPermissions::ALL));
    assert!(rec.subscriptions.contains(&"epic".into()));
}

#[tokio::test]
async fn permission_write_back_skips_destinations_removed_mid_delivery() {
    struct RemoveDuringSend {
        inner: RecordingChat,
        store: Arc<MemoryStore>,
    }

    #[async_trait::async_trait]
    impl ChatPlatform for RemoveDuringSend {
        async fn channel_permissions(&self, channel: ChannelId) -> Result<ChannelPermissions, ChatError> {
            self.inner.channel_permissions(channel).await
        }

        async fn send(&self, channel: ChannelId, message: &ChatMessage) -> Result<(), ChatError> {
            self.store.delete_destination(GUILD).await.unwrap();
            self.inner.send(channel, message).await
        }

        async fn guild(&self, guild: GuildId) -> Result<GuildInfo, ChatError> {
            self.inner.guild(guild).await
        }

        async fn direct_message(&self, user: UserId, text: &str) -> Result<(), ChatError> {
            self.inner.direct_message(user, text).await
        }
    }

    let store = store().await;
    let chat = Arc::new(RemoveDuringSend {
        inner: RecordingChat::new().with_permissions(TARGET, ChannelPermissions::ALL),
        store: store.clone(),
    });
    Fanout::new(store.clone()).with_chat(chat).notify(&source()).await;

    assert!(store.get_destination(GUILD).await.unwrap().is_none());
}
