use serde::Deserialize;

/// Checkend's answer to an accepted notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ApiResponse {
    /// Id of the stored notice.
    pub id: i64,
    /// Id of the problem the notice was grouped into.
    pub problem_id: i64,
}
