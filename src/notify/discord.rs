// src/notify/discord.rs
use anyhow::{anyhow, Context};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::chat::{ChatError, ChatPlatform, GuildInfo};
use crate::destination::{ChannelId, ChannelPermissions, GuildId, UserId};
use crate::render::{ChatMessage, Embed};

pub const API_BASE: &str = "https://discord.com/api/v10";

const ADMINISTRATOR: u64 = 1 << 3;
const VIEW_CHANNEL: u64 = 1 << 10;
const SEND_MESSAGES: u64 = 1 << 11;
const EMBED_LINKS: u64 = 1 << 14;
const ATTACH_FILES: u64 = 1 << 15;

const TEXT_CHANNEL: u8 = 0;

/// Bot-token REST client.
#[derive(Clone)]
pub struct DiscordClient {
    base: String,
    token: String,
    client: Client,
    timeout: Duration,
    bot_user: std::sync::Arc<OnceCell<u64>>,
}

#[derive(Debug, Deserialize)]
struct Snowflake {
    #[serde(with = "id_str")]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ChannelRsp {
    #[serde(default, with = "opt_id_str")]
    guild_id: Option<u64>,
    #[serde(default)]
    permission_overwrites: Vec<Overwrite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Overwrite {
    #[serde(with = "id_str")]
    pub id: u64,
    /// 0 = role, 1 = member
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(with = "bits_str")]
    pub allow: u64,
    #[serde(with = "bits_str")]
    pub deny: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    #[serde(with = "id_str")]
    pub id: u64,
    #[serde(with = "bits_str")]
    pub permissions: u64,
}

#[derive(Debug, Deserialize)]
struct GuildRsp {
    #[serde(with = "id_str")]
    id: u64,
    name: String,
    #[serde(with = "id_str")]
    owner_id: u64,
    #[serde(default, with = "opt_id_str")]
    system_channel_id: Option<u64>,
    #[serde(default)]
    roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
struct GuildChannel {
    #[serde(with = "id_str")]
    id: u64,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    position: i64,
}

#[derive(Debug, Deserialize)]
struct MemberRsp {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Serialize)]
struct AttachmentRef<'a> {
    id: u32,
    filename: &'a str,
}

#[derive(Serialize)]
struct EmbedImage<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct WireEmbed<'a> {
    #[serde(flatten)]
    embed: &'a Embed,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage<'a>>,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: Vec<WireEmbed<'a>>,
    attachments: Vec<AttachmentRef<'a>>,
}

impl<'a> MessagePayload<'a> {
    fn from_message(msg: &'a ChatMessage) -> Self {
        Self {
            content: msg.content.as_deref(),
            embeds: msg
                .embed
                .iter()
                .map(|e| WireEmbed {
                    embed: e,
                    image: e.image_url.as_deref().map(|url| EmbedImage { url }),
                })
                .collect(),
            attachments: msg
                .attachment
                .iter()
                .map(|a| AttachmentRef {
                    id: 0,
                    filename: &a.filename,
                })
                .collect(),
        }
    }
}

/// Discord's permission resolution for one member in one channel: base role permissions,
/// then @everyone, role and member overwrites in that order.
pub fn compute_permissions(
    guild: GuildId,
    owner: UserId,
    member: UserId,
    member_roles: &[u64],
    roles: &[Role],
    overwrites: &[Overwrite],
) -> ChannelPermissions {
    if member == owner {
        return ChannelPermissions::ALL;
    }
    let mut bits = roles
        .iter()
        .filter(|r| r.id == guild || member_roles.contains(&r.id))
        .fold(0u64, |acc, r| acc | r.permissions);
    if bits & ADMINISTRATOR != 0 {
        return ChannelPermissions::ALL;
    }

    if let Some(everyone) = overwrites.iter().find(|o| o.kind == 0 && o.id == guild) {
        bits = (bits & !everyone.deny) | everyone.allow;
    }
    let (mut allow, mut deny) = (0u64, 0u64);
    for o in overwrites
        .iter()
        .filter(|o| o.kind == 0 && o.id != guild && member_roles.contains(&o.id))
    {
        allow |= o.allow;
        deny |= o.deny;
    }
    bits = (bits & !deny) | allow;
    if let Some(own) = overwrites.iter().find(|o| o.kind == 1 && o.id == member) {
        bits = (bits & !own.deny) | own.allow;
    }

    ChannelPermissions {
        view: bits & VIEW_CHANNEL != 0,
        send: bits & SEND_MESSAGES != 0,
        embed: bits & EMBED_LINKS != 0,
        attach: bits & ATTACH_FILES != 0,
    }
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base: API_BASE.to_string(),
            token: token.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            bot_user: Default::default(),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ChatError> {
        let rsp = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("discord GET {path}"))?;
        let rsp = check(rsp).await?;
        Ok(rsp
            .json::<T>()
            .await
            .with_context(|| format!("decoding discord GET {path}"))?)
    }

    async fn bot_user(&self) -> Result<u64, ChatError> {
        self.bot_user
            .get_or_try_init(|| async {
                let me: Snowflake = self.get("/users/@me").await?;
                Ok::<_, ChatError>(me.id)
            })
            .await
            .copied()
    }

    async fn post_message(&self, channel: ChannelId, msg: &ChatMessage) -> Result<(), ChatError> {
        let payload = serde_json::to_string(&MessagePayload::from_message(msg))
            .context("encoding discord message")?;
        let path = format!("/channels/{channel}/messages");
        let req = self
            .client
            .post(self.url(&path))
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(self.timeout);

        let req = match &msg.attachment {
            Some(att) => {
                let file = Part::bytes(att.data.to_vec())
                    .file_name(att.filename.clone())
                    .mime_str("image/gif")
                    .context("attachment mime")?;
                req.multipart(Form::new().text("payload_json", payload).part("files[0]", file))
            }
            None => req
                .header("Content-Type", "application/json")
                .body(payload),
        };
        let rsp = req
            .send()
            .await
            .with_context(|| format!("discord POST {path}"))?;
        check(rsp).await.map(|_| ())
    }
}

async fn check(rsp: Response) -> Result<Response, ChatError> {
    match rsp.status() {
        s if s.is_success() => Ok(rsp),
        StatusCode::FORBIDDEN => Err(ChatError::Forbidden),
        StatusCode::NOT_FOUND => Err(ChatError::NotFound),
        s => {
            let body = rsp.text().await.unwrap_or_default();
            Err(ChatError::Http(anyhow!("discord HTTP {s}: {body}")))
        }
    }
}

#[async_trait::async_trait]
impl ChatPlatform for DiscordClient {
    async fn channel_permissions(&self, channel: ChannelId) -> Result<ChannelPermissions, ChatError> {
        let ch: ChannelRsp = self.get(&format!("/channels/{channel}")).await?;
        let Some(guild_id) = ch.guild_id else {
            // DM channels carry no overwrites.
            return Ok(ChannelPermissions::ALL);
        };
        let me = self.bot_user().await?;
        let guild: GuildRsp = self.get(&format!("/guilds/{guild_id}")).await?;
        let member: MemberRsp = self
            .get(&format!("/guilds/{guild_id}/members/{me}"))
            .await?;
        let member_roles: Vec<u64> = member.roles.iter().filter_map(|r| r.parse().ok()).collect();

        Ok(compute_permissions(
            guild.id,
            guild.owner_id,
            me,
            &member_roles,
            &guild.roles,
            &ch.permission_overwrites,
        ))
    }

    async fn send(&self, channel: ChannelId, message: &ChatMessage) -> Result<(), ChatError> {
        self.post_message(channel, message).await
    }

    async fn guild(&self, guild: GuildId) -> Result<GuildInfo, ChatError> {
        let info: GuildRsp = self.get(&format!("/guilds/{guild}")).await?;
        let mut channels: Vec<GuildChannel> = self.get(&format!("/guilds/{guild}/channels")).await?;
        channels.retain(|c| c.kind == TEXT_CHANNEL);
        channels.sort_by_key(|c| c.position);
        Ok(GuildInfo {
            id: info.id,
            name: info.name,
            owner_id: info.owner_id,
            system_channel: info.system_channel_id,
            text_channels: channels.into_iter().map(|c| c.id).collect(),
        })
    }

    async fn direct_message(&self, user: UserId, text: &str) -> Result<(), ChatError> {
        let rsp = self
            .client
            .post(self.url("/users/@me/channels"))
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(self.timeout)
            .json(&serde_json::json!({ "recipient_id": user.to_string() }))
            .send()
            .await
            .context("discord open DM")?;
        let dm: Snowflake = check(rsp)
            .await?
            .json()
            .await
            .context("decoding DM channel")?;
        self.post_message(dm.id, &ChatMessage::text(text)).await
    }
}

/// Discord ships snowflakes and permission bitsets as decimal strings.
mod id_str {
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        String::deserialize(d)?.parse().map_err(D::Error::custom)
    }
}

mod opt_id_str {
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| s.parse().map_err(D::Error::custom))
            .transpose()
    }
}

use id_str as bits_str;

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: u64 = 100;
    const BOT: u64 = 7;

    fn everyone(bits: u64) -> Role {
        Role {
            id: GUILD,
            permissions: bits,
        }
    }

    #[test]
    fn base_role_permissions_apply() {
        let p = compute_permissions(
            GUILD,
            1,
            BOT,
            &[],
            &[everyone(VIEW_CHANNEL | SEND_MESSAGES)],
            &[],
        );
        assert!(p.can_send());
        assert!(!p.embed);
    }

    #[test]
    fn overwrites_apply_in_order() {
        let roles = [
            everyone(VIEW_CHANNEL | SEND_MESSAGES | EMBED_LINKS | ATTACH_FILES),
            Role {
                id: 55,
                permissions: 0,
            },
        ];
        let overwrites = [
            Overwrite {
                id: GUILD,
                kind: 0,
                allow: 0,
                deny: SEND_MESSAGES | ATTACH_FILES,
            },
            Overwrite {
                id: 55,
                kind: 0,
                allow: SEND_MESSAGES,
                deny: 0,
            },
            Overwrite {
                id: BOT,
                kind: 1,
                allow: 0,
                deny: EMBED_LINKS,
            },
        ];
        let p = compute_permissions(GUILD, 1, BOT, &[55], &roles, &overwrites);
        assert_eq!(
            p,
            ChannelPermissions {
                view: true,
                send: true,
                embed: false,
                attach: false,
            }
        );
    }

    #[test]
    fn administrator_bypasses_overwrites() {
        let overwrites = [Overwrite {
            id: GUILD,
            kind: 0,
            allow: 0,
            deny: VIEW_CHANNEL,
        }];
        let p = compute_permissions(GUILD, 1, BOT, &[], &[everyone(ADMINISTRATOR)], &overwrites);
        assert!(p.is_complete());
    }

    #[test]
    fn payload_references_attachment() {
        let mut src = crate::source::Source::new("epic", "Epic", "https://e");
        src.data = Some(vec![crate::deal::Deal::new("Hades", "https://e/h", true)]);
        src.media = Some(crate::source::MediaSet {
            wide: bytes::Bytes::from_static(b"GIF89a"),
            mobile: bytes::Bytes::from_static(b"GIF89a"),
            clip: None,
        });
        let msg = crate::render::chat_announcement(&src, crate::render::Viewport::Desktop);
        let json = serde_json::to_value(MessagePayload::from_message(&msg)).unwrap();
        assert_eq!(json["attachments"][0]["filename"], "img.gif");
        assert_eq!(json["embeds"][0]["image"]["url"], "attachment://img.gif");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn snowflakes_parse_from_strings() {
        let raw = r#"{"id":"9","type":1,"allow":"2048","deny":"0"}"#;
        let o: Overwrite = serde_json::from_str(raw).unwrap();
        assert_eq!((o.id, o.kind, o.allow), (9, 1, SEND_MESSAGES));
    }
}
