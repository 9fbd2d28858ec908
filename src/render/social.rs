// src/render/social.rs
use serde::Serialize;

use crate::deal::short_date;
use crate::source::Source;

/// A link over a byte range of the post text (rich-text facet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFacet {
    pub byte_start: usize,
    pub byte_end: usize,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocialPost {
    pub text: String,
    pub links: Vec<LinkFacet>,
}

impl SocialPost {
    fn push(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn push_link(&mut self, label: &str, uri: &str) {
        let byte_start = self.text.len();
        self.text.push_str(label);
        self.links.push(LinkFacet {
            byte_start,
            byte_end: self.text.len(),
            uri: uri.to_string(),
        });
    }
}

/// Free-text post; titles carry their store links as facets instead of bare URLs.
pub fn render_social(source: &Source) -> Option<SocialPost> {
    let active: Vec<_> = source.active_deals().collect();
    if active.is_empty() {
        return None;
    }
    let mut post = SocialPost {
        text: String::new(),
        links: Vec::new(),
    };
    post.push(&format!("🕹️ Free now on {} 🕹️\n\n", source.name));
    if let Some(end) = active.iter().find_map(|d| d.end_date) {
        post.push(&format!("Free now until: {}\n\n", short_date(end)));
    }
    for deal in active {
        post.push("• ");
        post.push_link(&deal.title, &deal.url);
        post.push("\n\n");
    }
    post.text.truncate(post.text.trim_end().len());
    Some(post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::Deal;

    #[test]
    fn facets_cover_titles() {
        let mut s = Source::new("epic", "Epic Games", "https://store.epicgames.com");
        s.data = Some(vec![
            Deal::new("Game A", "https://a", true),
            Deal::new("Soon", "https://s", false),
            Deal::new("Game B", "https://b", true),
        ]);
        let post = render_social(&s).unwrap();
        assert_eq!(post.links.len(), 2);
        for f in &post.links {
            let label = &post.text[f.byte_start..f.byte_end];
            assert!(label == "Game A" || label == "Game B");
        }
        assert!(post.text.ends_with("Game B"));
        assert!(!post.text.contains("Soon"));
    }

    #[test]
    fn nothing_active_renders_nothing() {
        let mut s = Source::new("epic", "Epic Games", "https://store.epicgames.com");
        s.data = Some(vec![Deal::new("Soon", "https://s", false)]);
        assert!(render_social(&s).is_none());
    }
}
