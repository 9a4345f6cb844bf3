use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub trial_count: i32,
    /// `None` for premium accounts (not metered).
    pub trials_remaining: Option<i32>,
    pub is_premium: bool,
}
