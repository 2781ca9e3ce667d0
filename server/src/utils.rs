use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Keep only the first `max_chars` characters of trimmed text
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}
