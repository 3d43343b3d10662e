//! Ledger metrics: query latency, commit outcomes and pool occupancy.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Publish connection pool occupancy. Call periodically.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();

    gauge!("ledger_pool_connections", "state" => "active").set(size.saturating_sub(idle) as f64);
    gauge!("ledger_pool_connections", "state" => "idle").set(idle as f64);
}

/// Count a transaction commit, labelled by whether it went through.
pub fn record_commit(committed: bool) {
    let outcome = if committed { "committed" } else { "failed" };
    counter!("ledger_commits_total", "outcome" => outcome).increment(1);
}

/// Times one read query and records it under `ledger_query_duration_seconds`.
///
/// ```ignore
/// let timer = QueryTimer::new("find_group_buy_by_id");
/// let result = sqlx::query_as::<_, GroupBuyEntity>(...).fetch_optional(&pool).await;
/// timer.finish(&result);
/// result
/// ```
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    pub fn finish<T>(self, result: &Result<T, sqlx::Error>) {
        histogram!(
            "ledger_query_duration_seconds",
            "query" => self.query,
            "outcome" => outcome_label(result)
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

fn outcome_label<T>(result: &Result<T, sqlx::Error>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(sqlx::Error::PoolTimedOut) => "pool_timeout",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&Ok::<_, sqlx::Error>(1)), "ok");
        assert_eq!(
            outcome_label::<()>(&Err(sqlx::Error::PoolTimedOut)),
            "pool_timeout"
        );
        assert_eq!(
            outcome_label::<()>(&Err(sqlx::Error::RowNotFound)),
            "error"
        );
    }

    #[test]
    fn test_timer_without_recorder_is_noop() {
        let timer = QueryTimer::new("point_balance");
        assert_eq!(timer.query, "point_balance");
        timer.finish(&Ok::<_, sqlx::Error>(()));
    }
}
