// =====================================================
// MULTI-TABLE SESSION
// Several copy jobs sharing one target transaction
// =====================================================

use crate::data_transfer::engine::CopyJob;
use crate::data_transfer::models::Outcome;
use crate::db::connection::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub success: bool,
    /// One entry per job that ran, in run order.
    pub outcomes: Vec<Outcome>,
    pub skipped_jobs: usize,
}

impl SessionOutcome {
    pub fn affected_rows(&self) -> u64 {
        self.outcomes.iter().map(|outcome| outcome.affected_rows).sum()
    }
}

/// Runs jobs in order against one target connection. Nothing is committed
/// until every job succeeded; the first failure rolls back all of them.
pub struct CopySession {
    target: Arc<dyn Connection>,
    jobs: Vec<CopyJob>,
}

impl CopySession {
    pub fn new(target: Arc<dyn Connection>) -> Self {
        Self {
            target,
            jobs: Vec::new(),
        }
    }

    /// The job must write through the session's target connection.
    pub fn add_job(&mut self, mut job: CopyJob) -> Result<(), String> {
        if !Arc::ptr_eq(&job.target_endpoint().connection, &self.target) {
            return Err(format!(
                "Copy job for {} does not use the session's target connection",
                job.target_table()
            ));
        }
        job.begin_multi_table();
        self.jobs.push(job);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    async fn roll_back(&self, outcomes: &mut [Outcome], reason: &str) {
        if let Err(e) = self.target.rollback().await {
            log::warn!("Rollback of copy session failed: {}", e);
        }
        for outcome in outcomes.iter_mut() {
            outcome.affected_rows = 0;
            outcome.inserted_rows = 0;
            outcome.updated_rows = 0;
            outcome.deleted_rows = 0;
            outcome.push_warning_once(format!("Rolled back: {}", reason));
        }
    }

    pub async fn run(mut self) -> SessionOutcome {
        let total = self.jobs.len();
        let mut outcomes: Vec<Outcome> = Vec::with_capacity(total);
        log::info!("Starting copy session with {} tables", total);

        let jobs = std::mem::take(&mut self.jobs);
        for mut job in jobs {
            let table = job.target_table().to_string();
            let outcome = job.start_copy().await;
            job.end_multi_table();
            let failed = !outcome.success;
            let cancelled = outcome.cancelled;
            outcomes.push(outcome);

            if failed {
                let reason = if cancelled {
                    format!("copy to {} was cancelled", table)
                } else {
                    format!("copy to {} failed", table)
                };
                log::warn!("Copy session aborted: {}", reason);
                self.roll_back(&mut outcomes, &reason).await;
                return SessionOutcome {
                    success: false,
                    skipped_jobs: total - outcomes.len(),
                    outcomes,
                };
            }
        }

        if let Err(e) = self.target.commit().await {
            let reason = format!("session commit failed: {}", e);
            log::error!("Copy session {}", reason);
            self.roll_back(&mut outcomes, &reason).await;
            for outcome in outcomes.iter_mut() {
                outcome.success = false;
            }
            if let Some(last) = outcomes.last_mut() {
                last.errors.push(reason);
            }
            return SessionOutcome {
                success: false,
                skipped_jobs: 0,
                outcomes,
            };
        }

        log::info!("Copy session committed {} tables", outcomes.len());
        SessionOutcome {
            success: true,
            outcomes,
            skipped_jobs: 0,
        }
    }
}

#[cfg(test)]
mod tests;
