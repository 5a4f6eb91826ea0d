//! Transport-wide constants for chatlink.
//!
//! Centralizes the timeouts and delays used by the persistent channel and
//! the chat session so they are discoverable in one place.
//!
//! # Categories
//!
//! - **Timeouts**: handshake limits
//! - **Chat**: UI affordance delays
//! - **Logging**: preview lengths for raw frames

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Persistent channel handshake timeout.
///
/// If the WebSocket upgrade has not completed within this window the
/// connection attempt is abandoned and reported as a timeout. There is no
/// idle timeout once the channel is open.
pub const CHANNEL_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Chat
// ============================================================================

/// How long the "composing" indicator stays set after a chat send.
///
/// This is a UI affordance only. It is not tied to the server echo.
pub const DEFAULT_COMPOSING_INDICATOR: Duration = Duration::from_millis(2000);

// ============================================================================
// Logging
// ============================================================================

/// Maximum number of characters of a raw inbound frame written to the log.
pub const LISTENER_LOG_PREVIEW: usize = 200;

/// Truncate `text` to at most `max` characters for log output.
///
/// Cuts on a char boundary so multi-byte text never panics.
#[must_use]
pub fn log_preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_values_are_reasonable() {
        assert_eq!(CHANNEL_HANDSHAKE_TIMEOUT, Duration::from_secs(30));
        assert!(DEFAULT_COMPOSING_INDICATOR >= Duration::from_millis(500));
        assert!(DEFAULT_COMPOSING_INDICATOR <= Duration::from_secs(10));
    }

    #[test]
    fn test_log_preview_short_text_unchanged() {
        assert_eq!(log_preview("hello", 10), "hello");
    }

    #[test]
    fn test_log_preview_truncates_on_char_boundary() {
        assert_eq!(log_preview("héllo wörld", 4), "héll");
    }
}
