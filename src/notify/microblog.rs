// src/notify/microblog.rs
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Short-post platform with a hard character budget.
#[async_trait::async_trait]
pub trait MicroblogClient: Send + Sync {
    /// Publish `text` with an optional GIF and return the post URL.
    async fn post(&self, text: &str, gif: Option<Bytes>) -> Result<String>;
}

pub const X_API_BASE: &str = "https://api.x.com/2";

/// X API v2 with an OAuth 2.0 user-context bearer token.
#[derive(Clone)]
pub struct XClient {
    base: String,
    token: String,
    client: Client,
    timeout: Duration,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MediaRsp {
    id: String,
}

#[derive(Deserialize)]
struct TweetRsp {
    id: String,
}

#[derive(Serialize)]
struct TweetMedia<'a> {
    media_ids: Vec<&'a str>,
}

#[derive(Serialize)]
struct TweetPayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia<'a>>,
}

impl XClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base: X_API_BASE.to_string(),
            token: token.into(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    async fn upload_gif(&self, gif: Bytes) -> Result<String> {
        let part = Part::bytes(gif.to_vec())
            .file_name("deals.gif")
            .mime_str("image/gif")?;
        let form = Form::new()
            .text("media_category", "tweet_gif")
            .part("media", part);
        let rsp = self
            .client
            .post(format!("{}/media/upload", self.base))
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .context("x media upload")?;
        if !rsp.status().is_success() {
            let s = rsp.status();
            let body = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("x media upload HTTP {s}: {body}"));
        }
        let media: Envelope<MediaRsp> = rsp.json().await.context("decoding x media id")?;
        Ok(media.data.id)
    }
}

#[async_trait::async_trait]
impl MicroblogClient for XClient {
    async fn post(&self, text: &str, gif: Option<Bytes>) -> Result<String> {
        let media_id = match gif {
            Some(g) => Some(self.upload_gif(g).await?),
            None => None,
        };
        let payload = TweetPayload {
            text,
            media: media_id.as_deref().map(|id| TweetMedia {
                media_ids: vec![id],
            }),
        };
        let rsp = self
            .client
            .post(format!("{}/tweets", self.base))
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .context("x create post")?;
        if !rsp.status().is_success() {
            let s = rsp.status();
            let body = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("x create post HTTP {s}: {body}"));
        }
        let tweet: Envelope<TweetRsp> = rsp.json().await.context("decoding x post")?;
        Ok(format!("https://x.com/i/web/status/{}", tweet.data.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_omits_media_without_gif() {
        let p = TweetPayload {
            text: "hi",
            media: None,
        };
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"text":"hi"}"#);

        let p = TweetPayload {
            text: "hi",
            media: Some(TweetMedia {
                media_ids: vec!["42"],
            }),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["media"]["media_ids"][0], "42");
    }
}
