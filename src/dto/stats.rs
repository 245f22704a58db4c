use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dao::models::HistoryEntry;

use super::format_system_time;

/// Number of summaries returned when `limit` is omitted.
pub const DEFAULT_SUMMARY_LIMIT: usize = 20;

fn default_limit() -> usize {
    DEFAULT_SUMMARY_LIMIT
}

/// Query parameters of `GET /api/stats/summary`.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Number of rounds to return, newest first.
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    #[param(minimum = 1, maximum = 100)]
    pub limit: usize,
}

/// One finished round as seen by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoundStat {
    /// Name of the winner.
    pub player: String,
    /// Winning score.
    pub points: u32,
    /// Questions in the round.
    pub questions: usize,
    /// End of the round, RFC 3339.
    pub date: String,
}

impl From<HistoryEntry> for RoundStat {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            player: entry.player,
            points: entry.points,
            questions: entry.questions,
            date: format_system_time(entry.date),
        }
    }
}

/// Response of `GET /api/stats/summary`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub ok: bool,
    pub results: Vec<RoundStat>,
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn limit_defaults_and_is_bounded() {
        let query: SummaryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, DEFAULT_SUMMARY_LIMIT);
        assert!(query.validate().is_ok());

        let query = SummaryQuery { limit: 0 };
        assert!(query.validate().is_err());
        let query = SummaryQuery { limit: 101 };
        assert!(query.validate().is_err());
    }

    #[test]
    fn dates_are_rfc3339() {
        let stat = RoundStat::from(HistoryEntry {
            player: "Ana".into(),
            points: 3,
            questions: 5,
            date: UNIX_EPOCH + Duration::from_secs(86_400),
        });
        assert_eq!(stat.date, "1970-01-02T00:00:00Z");
    }
}
