// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{NewsSource, RawItem};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Total items parsed from feeds.");
        describe_counter!(
            "ingest_kept_total",
            "Items handed to Gate 1 after age filter and cap."
        );
        describe_counter!(
            "ingest_stale_total",
            "Items dropped because they were older than the max age."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when feeds were last polled."
        );
    });
}

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re) = RE_TAGS.get_or_try_init(|| regex::Regex::new(r"(?is)</?[^>]+>")) {
        out = re.replace_all(&out, " ").to_string();
    }

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    let mut out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Drop items published more than `max_age_secs` before `now`.
/// Items without a publish time are kept; the feed already ordered them.
pub fn filter_recent(now: i64, items: Vec<RawItem>, max_age_secs: i64) -> (Vec<RawItem>, usize) {
    let before = items.len();
    let kept: Vec<RawItem> = items
        .into_iter()
        .filter(|it| match it.published_at {
            Some(ts) => now.saturating_sub(ts) <= max_age_secs,
            None => true,
        })
        .collect();
    let stale = before - kept.len();
    (kept, stale)
}

/// Result of polling every configured feed once.
#[derive(Debug, Default)]
pub struct FeedBatch {
    pub items: Vec<RawItem>,
    pub stale: usize,
    pub provider_errors: usize,
}

/// Poll all providers, drop stale items and cap the batch at `cap`.
/// A failing provider is logged and skipped.
pub async fn run_once(
    providers: &[Box<dyn NewsSource>],
    now: i64,
    max_age_secs: i64,
    cap: usize,
) -> FeedBatch {
    ensure_metrics_described();

    let mut raw = Vec::new();
    let mut provider_errors = 0usize;
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => raw.append(&mut v),
            Err(e) => {
                tracing::warn!(target: "pipeline", error = ?e, provider = p.name(), "feed provider error");
                counter!("ingest_provider_errors_total").increment(1);
                provider_errors += 1;
            }
        }
    }

    let (mut items, stale) = filter_recent(now, raw, max_age_secs);
    items.truncate(cap);

    counter!("ingest_kept_total").increment(items.len() as u64);
    counter!("ingest_stale_total").increment(stale as u64);
    gauge!("ingest_last_run_ts").set(now as f64);

    FeedBatch {
        items,
        stale,
        provider_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{IngestMethod, SourceTier};

    fn item(title: &str, ts: Option<i64>) -> RawItem {
        RawItem {
            title: title.into(),
            link: format!("https://x.test/{title}"),
            summary: None,
            published_at: ts,
            source: "Wire".into(),
            tier: SourceTier::TrustedMedia,
            method: IngestMethod::Feed,
        }
    }

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Mortar&nbsp;&nbsp;fire</p>\n reported &amp; confirmed ";
        assert_eq!(normalize_text(s), "Mortar fire reported & confirmed");
    }

    #[test]
    fn filter_recent_keeps_undated_items() {
        let now = 1_000_000;
        let items = vec![
            item("fresh", Some(now - 60)),
            item("old", Some(now - 4 * 86_400)),
            item("undated", None),
        ];
        let (kept, stale) = filter_recent(now, items, 3 * 86_400);
        assert_eq!(stale, 1);
        let titles: Vec<_> = kept.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["fresh", "undated"]);
    }

    struct Broken;

    #[async_trait::async_trait]
    impl NewsSource for Broken {
        async fn fetch_latest(&self) -> anyhow::Result<Vec<RawItem>> {
            anyhow::bail!("boom")
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    struct Fixed(Vec<RawItem>);

    #[async_trait::async_trait]
    impl NewsSource for Fixed {
        async fn fetch_latest(&self) -> anyhow::Result<Vec<RawItem>> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn failing_provider_is_skipped_and_cap_applies() {
        let now = 2_000_000;
        let providers: Vec<Box<dyn NewsSource>> = vec![
            Box::new(Broken),
            Box::new(Fixed(vec![
                item("a", Some(now)),
                item("b", Some(now)),
                item("c", Some(now)),
            ])),
        ];
        let batch = run_once(&providers, now, 3600, 2).await;
        assert_eq!(batch.provider_errors, 1);
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.items[0].title, "a");
    }
}
