//! Coarse progress record polled by clients while a mission runs.
//! Best effort: publishing never blocks the mission and never fails it.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Connecting,
    FetchingSources,
    AnalystRunning,
    TranslatorRunning,
    Done,
    Failed,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Connecting => "Connecting",
            Stage::FetchingSources => "Fetching Sources",
            Stage::AnalystRunning => "Analyst Running",
            Stage::TranslatorRunning => "Translator Running",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }

    pub fn progress(self) -> u8 {
        match self {
            Stage::Idle => 0,
            Stage::Connecting => 10,
            Stage::FetchingSources => 30,
            Stage::AnalystRunning => 60,
            Stage::TranslatorRunning => 85,
            Stage::Done | Stage::Failed => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub stage: &'static str,
    pub progress: u8,
    pub updated_at: String,
}

#[derive(Debug)]
struct StatusRecord {
    stage: Stage,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatusBoard {
    record: Mutex<StatusRecord>,
    ttl: Duration,
}

impl StatusBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            record: Mutex::new(StatusRecord {
                stage: Stage::Idle,
                updated_at: Utc::now(),
            }),
            ttl,
        }
    }

    pub fn publish(&self, stage: Stage) {
        self.publish_at(stage, Utc::now());
    }

    pub fn publish_at(&self, stage: Stage, now: DateTime<Utc>) {
        let mut g = match self.record.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        g.stage = stage;
        g.updated_at = now;
        tracing::debug!(target: "mission", stage = stage.label(), "status");
    }

    /// Current stage, or `Idle` once the last update is older than the TTL.
    pub fn snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let (stage, updated_at) = match self.record.lock() {
            Ok(g) => (g.stage, g.updated_at),
            Err(poison) => {
                let g = poison.into_inner();
                (g.stage, g.updated_at)
            }
        };
        let stage = if now - updated_at > self.ttl {
            Stage::Idle
        } else {
            stage
        };
        StatusSnapshot {
            stage: stage.label(),
            progress: stage.progress(),
            updated_at: updated_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuck_stage_resets_to_idle() {
        let board = StatusBoard::new(Duration::seconds(60));
        let t0 = Utc::now();
        board.publish_at(Stage::AnalystRunning, t0);

        let s = board.snapshot(t0 + Duration::seconds(30));
        assert_eq!(s.stage, "Analyst Running");
        assert_eq!(s.progress, 60);

        let s = board.snapshot(t0 + Duration::seconds(61));
        assert_eq!(s.stage, "Idle");
        assert_eq!(s.progress, 0);
    }
}
