// src/notify/social.rs
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::render::SocialPost;

/// Free-text feed that accepts link facets and a video.
#[async_trait::async_trait]
pub trait SocialClient: Send + Sync {
    /// Publish and return the post URL.
    async fn post(&self, post: &SocialPost, clip: Option<Bytes>) -> Result<String>;
}

pub const BSKY_SERVICE: &str = "https://bsky.social";

/// Bluesky over XRPC with an app password. A fresh session is opened per post.
#[derive(Clone)]
pub struct BlueskyClient {
    service: String,
    handle: String,
    password: String,
    client: Client,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct BlobRsp {
    blob: Value,
}

#[derive(Deserialize)]
struct RecordRsp {
    uri: String,
}

/// `app.bsky.feed.post` record body.
pub fn post_record(post: &SocialPost, video: Option<Value>, created_at: &str) -> Value {
    let facets: Vec<Value> = post
        .links
        .iter()
        .map(|l| {
            json!({
                "index": { "byteStart": l.byte_start, "byteEnd": l.byte_end },
                "features": [ { "$type": "app.bsky.richtext.facet#link", "uri": l.uri } ]
            })
        })
        .collect();
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": post.text,
        "createdAt": created_at,
        "facets": facets,
    });
    if let Some(blob) = video {
        record["embed"] = json!({ "$type": "app.bsky.embed.video", "video": blob });
    }
    record
}

/// `at://did/app.bsky.feed.post/rkey` to a web link.
pub fn web_url(handle: &str, at_uri: &str) -> String {
    let rkey = at_uri.rsplit('/').next().unwrap_or_default();
    format!("https://bsky.app/profile/{handle}/post/{rkey}")
}

impl BlueskyClient {
    pub fn new(handle: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            service: BSKY_SERVICE.to_string(),
            handle: handle.into(),
            password: password.into(),
            client: Client::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.service)
    }

    async fn session(&self) -> Result<Session> {
        let rsp = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .timeout(self.timeout)
            .json(&json!({ "identifier": self.handle, "password": self.password }))
            .send()
            .await
            .context("bluesky createSession")?;
        ok_json(rsp, "createSession").await
    }

    async fn upload_clip(&self, session: &Session, clip: Bytes) -> Result<Value> {
        let rsp = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header("Content-Type", "video/mp4")
            .timeout(self.timeout)
            .body(clip)
            .send()
            .await
            .context("bluesky uploadBlob")?;
        let blob: BlobRsp = ok_json(rsp, "uploadBlob").await?;
        Ok(blob.blob)
    }
}

async fn ok_json<T: for<'de> Deserialize<'de>>(rsp: reqwest::Response, what: &str) -> Result<T> {
    let status = rsp.status();
    if !status.is_success() {
        let body = rsp.text().await.unwrap_or_default();
        return Err(anyhow!("bluesky {what} HTTP {status}: {body}"));
    }
    rsp.json().await.with_context(|| format!("decoding bluesky {what}"))
}

#[async_trait::async_trait]
impl SocialClient for BlueskyClient {
    async fn post(&self, post: &SocialPost, clip: Option<Bytes>) -> Result<String> {
        let session = self.session().await?;
        let video = match clip {
            Some(c) => Some(self.upload_clip(&session, c).await?),
            None => None,
        };
        let record = post_record(post, video, &Utc::now().to_rfc3339());
        let rsp = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .timeout(self.timeout)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .context("bluesky createRecord")?;
        let created: RecordRsp = ok_json(rsp, "createRecord").await?;
        Ok(web_url(&self.handle, &created.uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::LinkFacet;

    #[test]
    fn record_carries_link_facets_and_video() {
        let post = SocialPost {
            text: "Free: Hades".to_string(),
            links: vec![LinkFacet {
                byte_start: 6,
                byte_end: 11,
                uri: "https://e/hades".to_string(),
            }],
        };
        let r = post_record(&post, Some(json!({"ref": "x"})), "2025-06-19T15:00:00Z");
        assert_eq!(r["facets"][0]["index"]["byteStart"], 6);
        assert_eq!(r["facets"][0]["features"][0]["uri"], "https://e/hades");
        assert_eq!(r["embed"]["$type"], "app.bsky.embed.video");

        let r = post_record(&post, None, "2025-06-19T15:00:00Z");
        assert!(r.get("embed").is_none());
    }

    #[test]
    fn at_uri_maps_to_web_link() {
        assert_eq!(
            web_url("deals.bsky.social", "at://did:plc:abc/app.bsky.feed.post/3kxyz"),
            "https://bsky.app/profile/deals.bsky.social/post/3kxyz"
        );
    }
}
