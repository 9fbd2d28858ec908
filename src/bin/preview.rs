//! Renders a deal list (JSON file, the store's shape) to every platform format on stdout.
//! Nothing is sent anywhere.
//!
//! usage: preview <deals.json> [source name] [source landing url]

use anyhow::{bail, Context, Result};
use freegame_notifier::deal::Deal;
use freegame_notifier::render::{chat_announcement, render_microblog, render_social, Viewport};
use freegame_notifier::Source;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: preview <deals.json> [source name] [source landing url]");
    };
    let name = args.next().unwrap_or_else(|| "Preview Store".to_string());
    let url = args.next().unwrap_or_else(|| "https://example.com/free".to_string());

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let deals: Vec<Deal> = serde_json::from_str(&raw).context("parsing deal list")?;

    let mut source = Source::new("preview", name, url);
    source.data = Some(deals);

    for viewport in [Viewport::Desktop, Viewport::Mobile] {
        let msg = chat_announcement(&source, viewport);
        println!("== chat embed ({viewport:?}) ==");
        println!("{}", serde_json::to_string_pretty(&msg.embed)?);
    }

    println!("\n== microblog ==");
    match render_microblog(&source) {
        Ok((tier, text)) => println!("[{tier:?}, {} chars]\n{text}", text.chars().count()),
        Err(e) => println!("not postable: {e}"),
    }

    println!("\n== social ==");
    match render_social(&source) {
        Some(post) => {
            println!("{}", post.text);
            for l in &post.links {
                println!("  link {}..{} -> {}", l.byte_start, l.byte_end, l.uri);
            }
        }
        None => println!("nothing to post"),
    }
    Ok(())
}
