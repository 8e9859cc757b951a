use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::atlas::{IngestMethod, SourceTier};
use crate::config::FeedConfig;
use crate::ingest::normalize_text;
use crate::ingest::types::{NewsSource, RawItem};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<SourceTag>,
}
/// Aggregators (Google News) name the original outlet in `<source url="…">`.
#[derive(Debug, Deserialize)]
struct SourceTag {
    #[serde(rename = "$text", default)]
    name: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// Generic RSS 2.0 provider (search feeds, ministry feeds, outlet feeds).
pub struct RssFeedProvider {
    name: String,
    tier: SourceTier,
    method: IngestMethod,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedProvider {
    /// Parse a fixed XML document instead of fetching (tests, offline runs).
    pub fn from_fixture(name: &str, tier: SourceTier, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            tier,
            method: IngestMethod::Feed,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_config(cfg: &FeedConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("sentinel-atlas/0.1")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            name: cfg.name.clone(),
            tier: cfg.tier,
            method: cfg.method,
            mode: Mode::Http {
                url: cfg.url.clone(),
                client,
            },
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).with_context(|| format!("parsing {} rss xml", self.name))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let link = it.link.unwrap_or_default().trim().to_string();
            if title.is_empty() || link.is_empty() {
                continue;
            }
            let summary = it
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|s| !s.is_empty());
            let source = it
                .source
                .map(|s| s.name.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.name.clone());

            out.push(RawItem {
                title,
                link,
                summary,
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
                source,
                tier: self.tier,
                method: self.method,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl NewsSource for RssFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?;
                let body = resp
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item>
  <title>Artillery exchange reported near Preah Vihear</title>
  <link>https://news.test/a</link>
  <pubDate>Tue, 06 Jan 2026 08:00:00 GMT</pubDate>
  <description>&lt;b&gt;Shelling&lt;/b&gt; resumed overnight</description>
  <source url="https://outlet.test">Outlet Daily</source>
</item>
<item>
  <title></title>
  <link>https://news.test/empty</link>
</item>
</channel></rss>"#;

    #[tokio::test]
    async fn fixture_parses_items_and_skips_empty_titles() {
        let p = RssFeedProvider::from_fixture("Google News", SourceTier::TrustedMedia, XML);
        let items = p.fetch_latest().await.unwrap();
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.source, "Outlet Daily");
        assert_eq!(it.link, "https://news.test/a");
        assert_eq!(it.summary.as_deref(), Some("Shelling resumed overnight"));
        assert_eq!(it.published_at, Some(1_767_686_400));
        assert_eq!(it.tier, SourceTier::TrustedMedia);
    }

    #[test]
    fn bad_dates_are_none() {
        assert_eq!(parse_rfc2822_to_unix("yesterday-ish"), None);
    }
}
