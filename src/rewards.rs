/// Weight of the user's rating in the combined reward.
const FEEDBACK_WEIGHT: f64 = 0.7;
const AUTO_WEIGHT: f64 = 0.3;

/// Maps a confidence score onto [-1, 1]; missing scores are neutral.
pub fn auto_reward(score: Option<f64>) -> f64 {
    match score {
        Some(s) if s.is_finite() => 2.0 * s.clamp(0.0, 1.0) - 1.0,
        _ => 0.0,
    }
}

/// Reward for a rated answer, rounded to three decimals.
pub fn feedback_reward(rating: i32, score: Option<f64>) -> f64 {
    let reward = FEEDBACK_WEIGHT * rating as f64 + AUTO_WEIGHT * auto_reward(score);
    (reward * 1000.0).round() / 1000.0
}
