//! Background mission tasks: full sector generation and translation-only.
//!
//! Both tasks own an [`InFlightGuard`] for their whole lifetime, so the
//! single-flight marker is released on every exit path. A failed mission
//! writes nothing; the previous document (if any) stays as it was.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value;

use super::status::Stage;
use super::{translation_key, InFlightGuard, MissionContext};
use crate::geo::{self, SectorLocation, HOTZONES};
use crate::oracle::ask_json;
use crate::sitrep::normalize::{normalize, NormalizeContext, PriorState};
use crate::sitrep::{LanguageSitrep, SectorIntelDocument, MASTER_LANG};

/// Used when no prompt file is configured. Placeholders: `{target_name}`,
/// `{dist_info}`, `{news_text}`, `{current_date}`.
pub const DEFAULT_ANALYST_PROMPT: &str = r#"ACT AS: Senior Military Intelligence Analyst, civilian protection desk.
DATE: {current_date}
TARGET SECTOR: {target_name}
{dist_info}

CURRENT INTELLIGENCE (verified packets):
{news_text}

TASK: Produce a situation report for civilians in the target sector.
Rate the sector DEFCON 1 (active fire on the sector) to 5 (peacetime).
Only cite events present in the intelligence above. Do not invent coordinates.

OUTPUT JSON ONLY:
{
  "defcon_status": INTEGER,
  "defcon_justification": "STRING",
  "sitrep_entries": [{"topic": "STRING", "summary": "STRING", "citations": ["URL"]}],
  "tactical_map": {"roads_to_avoid": ["STRING"], "danger_zones": ["STRING"]},
  "evacuation_point": {"name": "STRING", "lat": FLOAT, "lon": FLOAT, "reason": "STRING"},
  "predictive_analysis": {
    "forecast_defcon": INTEGER,
    "confidence_score": INTEGER,
    "threat_vector": "Approaching" | "Receding" | "Static",
    "forecast_entries": [{"topic": "STRING", "prediction": "STRING"}]
  },
  "tactical_overlays": [{"name": "STRING", "lat": FLOAT, "lon": FLOAT, "type": "STRING", "date": "YYYY-MM-DD"}]
}"#;

/// What a successful generation wrote.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub restricted_by: Option<String>,
    pub master: LanguageSitrep,
    /// [`SectorIntelDocument::master_version`] of the stored document.
    pub master_version: String,
}

pub(crate) fn distance_context(loc: &SectorLocation, prior: &PriorState) -> String {
    let state = format!("[PREVIOUS STATE: DEFCON {} ({:?})]", prior.defcon, prior.trend);
    match geo::nearest_hotzone(loc.lat, loc.lon, HOTZONES) {
        Some((zone, km)) => format!(
            "TARGET DISTANCE TO THREAT: {km:.1} km (Nearest: {}) {state}",
            zone.name
        ),
        None => format!("TARGET DISTANCE TO THREAT: UNKNOWN {state}"),
    }
}

pub(crate) fn render_prompt(
    template: &str,
    loc: &SectorLocation,
    dist_info: &str,
    digest: &str,
    now: DateTime<Utc>,
) -> String {
    let target = format!(
        "{} (Lat: {}, Lon: {})",
        loc.display_name(),
        loc.lat,
        loc.lon
    );
    template
        .replace("{target_name}", &target)
        .replace("{dist_info}", dist_info)
        .replace("{news_text}", digest)
        .replace("{current_date}", &now.format("%Y-%m-%d %H:%M UTC").to_string())
}

pub(crate) fn translation_prompt(lang: &str, master_json: &str) -> String {
    let target = match lang {
        "th" => "THAI".to_string(),
        "km" => "KHMER".to_string(),
        other => other.to_ascii_uppercase(),
    };
    format!("TRANSLATE JSON VALUES TO {target}. KEEP KEYS/COORDS IDENTICAL. INPUT: {master_json}")
}

/// Compliance gate, feed cycle, analyst call, normalization, persist.
pub async fn generate(
    ctx: &MissionContext,
    loc: &SectorLocation,
    country: &str,
    now: DateTime<Utc>,
) -> Result<GenerationOutcome> {
    ctx.status.publish(Stage::Connecting);
    let verdict = ctx.compliance.check_point(loc.lat, loc.lon, country);
    if let Some(zone) = verdict.zone {
        let doc = SectorIntelDocument::restricted(loc, country, &zone.name, now);
        let master = doc.master().cloned().unwrap_or_default();
        let master_version = doc.master_version().unwrap_or_default();
        ctx.sectors
            .replace(doc)
            .await
            .context("writing restricted placeholder")?;
        return Ok(GenerationOutcome {
            restricted_by: Some(zone.name),
            master,
            master_version,
        });
    }

    ctx.status.publish(Stage::FetchingSources);
    let ts = now.timestamp();
    let report = ctx
        .pipeline
        .run_cycle(&ctx.feeds, ts, ctx.max_item_age_secs)
        .await;
    let digest = ctx.pipeline.recent_digest(ts, ctx.max_item_age_secs).await;
    tracing::info!(target: "mission", zip = %loc.zip_code, fresh_clean = report.stats.clean, "intel gathered");

    let previous = ctx
        .sectors
        .get(&loc.zip_code)
        .await
        .context("reading previous sector document")?;
    let prior = PriorState::from_document(previous.as_ref());
    let prompt = render_prompt(
        &ctx.prompt_template,
        loc,
        &distance_context(loc, &prior),
        &digest,
        now,
    );

    ctx.status.publish(Stage::AnalystRunning);
    let raw: Value = ask_json(ctx.analyst.as_ref(), &prompt, ctx.timeout)
        .await
        .context("analyst oracle")?;
    if !raw.is_object() {
        bail!("analyst reply is not a JSON object");
    }

    let nctx = NormalizeContext {
        location: loc,
        prior,
        links: &ctx.links,
        now,
    };
    let master = normalize(&raw, &nctx);
    let doc = SectorIntelDocument::new_master(loc, country, now, master.clone());
    let master_version = doc.master_version().unwrap_or_default();
    ctx.sectors
        .replace(doc)
        .await
        .context("persisting sector document")?;

    Ok(GenerationOutcome {
        restricted_by: None,
        master,
        master_version,
    })
}

/// Translate the master and store it under `lang`. `Ok(false)` when the
/// stored master is no longer the one translated and the result was discarded.
pub async fn translate(
    ctx: &MissionContext,
    zip: &str,
    lang: &str,
    master: &LanguageSitrep,
    master_version: &str,
) -> Result<bool> {
    let json = serde_json::to_string(master).context("encoding master for translation")?;
    let mut translated: LanguageSitrep = ask_json(
        ctx.translator.as_ref(),
        &translation_prompt(lang, &json),
        ctx.timeout,
    )
    .await
    .context("translator oracle")?;
    translated.pin_to_master(master);

    ctx.sectors
        .set_language(zip, lang, translated, master_version)
        .await
        .context("storing translation")
}

/// Spawned by the dispatcher for a stale or missing sector.
pub async fn run_generation(
    ctx: Arc<MissionContext>,
    loc: SectorLocation,
    country: String,
    lang: String,
    _guard: InFlightGuard,
) {
    let started = std::time::Instant::now();
    match generate(&ctx, &loc, &country, Utc::now()).await {
        Ok(outcome) => {
            let result = if outcome.restricted_by.is_some() {
                "restricted"
            } else {
                "generated"
            };
            counter!("mission_generations_total", "result" => result).increment(1);
            tracing::info!(
                target: "mission",
                zip = %loc.zip_code,
                result,
                defcon = outcome.master.defcon_status,
                certified = outcome.master.is_certified,
                ms = started.elapsed().as_millis() as u64,
                "mission complete"
            );

            if lang != MASTER_LANG {
                // a translation-only task may already be running for this pair
                if let Some(_tguard) = ctx.in_flight.try_acquire(&translation_key(&loc.zip_code, &lang)) {
                    ctx.status.publish(Stage::TranslatorRunning);
                    translate_logged(
                        &ctx,
                        &loc.zip_code,
                        &lang,
                        &outcome.master,
                        &outcome.master_version,
                    )
                    .await;
                }
            }
            ctx.status.publish(Stage::Done);
        }
        Err(e) => {
            counter!("mission_generations_total", "result" => "failed").increment(1);
            tracing::error!(target: "mission", zip = %loc.zip_code, error = ?e, "mission failed, nothing written");
            ctx.status.publish(Stage::Failed);
        }
    }
}

/// Spawned by the dispatcher when a fresh master lacks the requested language.
pub async fn run_translation(
    ctx: Arc<MissionContext>,
    zip: String,
    lang: String,
    master: LanguageSitrep,
    master_version: String,
    _guard: InFlightGuard,
) {
    ctx.status.publish(Stage::TranslatorRunning);
    let ok = translate_logged(&ctx, &zip, &lang, &master, &master_version).await;
    ctx.status.publish(if ok { Stage::Done } else { Stage::Failed });
}

async fn translate_logged(
    ctx: &MissionContext,
    zip: &str,
    lang: &str,
    master: &LanguageSitrep,
    master_version: &str,
) -> bool {
    match translate(ctx, zip, lang, master, master_version).await {
        Ok(true) => {
            counter!("mission_translations_total", "result" => "ok").increment(1);
            tracing::info!(target: "mission", zip, lang, "translation stored");
            true
        }
        Ok(false) => {
            counter!("mission_translations_total", "result" => "discarded").increment(1);
            tracing::info!(target: "mission", zip, lang, "master changed mid-translation, stale translation discarded");
            true
        }
        Err(e) => {
            counter!("mission_translations_total", "result" => "failed").increment(1);
            tracing::warn!(target: "mission", zip, lang, error = ?e, "translation failed, master still served");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sitrep::Trend;
    use chrono::TimeZone;

    fn loc() -> SectorLocation {
        SectorLocation {
            zip_code: "33110".into(),
            lat: 14.3914,
            lon: 104.6804,
            province: "Si Sa Ket".into(),
            district: "Kantharalak".into(),
        }
    }

    #[test]
    fn distance_context_names_nearest_zone_and_prior_state() {
        let prior = PriorState {
            defcon: 3,
            trend: Trend::Rising,
            certified: true,
        };
        assert_eq!(
            distance_context(&loc(), &prior),
            "TARGET DISTANCE TO THREAT: 0.0 km (Nearest: PREAH VIHEAR) [PREVIOUS STATE: DEFCON 3 (Rising)]"
        );
    }

    #[test]
    fn prompt_placeholders_are_filled() {
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 8, 0, 0).unwrap();
        let p = render_prompt(
            "{target_name}|{dist_info}|{news_text}|{current_date}",
            &loc(),
            "D",
            "N",
            now,
        );
        assert_eq!(
            p,
            "Si Sa Ket, Kantharalak (Lat: 14.3914, Lon: 104.6804)|D|N|2026-01-06 08:00 UTC"
        );
        for ph in ["{target_name}", "{dist_info}", "{news_text}", "{current_date}"] {
            assert!(DEFAULT_ANALYST_PROMPT.contains(ph), "{ph}");
        }
    }

    #[test]
    fn translation_prompt_names_language() {
        assert!(translation_prompt("th", "{}").starts_with("TRANSLATE JSON VALUES TO THAI."));
        assert!(translation_prompt("km", "{}").contains("KHMER"));
        assert!(translation_prompt("fr", "{}").contains("TO FR."));
    }
}
