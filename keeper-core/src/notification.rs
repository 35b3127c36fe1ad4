//! User-facing notifications.

/// A short message meant for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Delivers notifications to the user. Provided by the host application.
pub trait Notifier: Send + Sync {
    /// Shows `notification`. Delivery failures are the implementation's concern.
    fn notify(&self, notification: &Notification);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::info!(
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
    }
}

/// Shortens long identifiers for display, e.g. `0x1234...cdef`.
pub(crate) fn ellipsify(text: &str) -> String {
    const KEEP: usize = 6;
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= KEEP * 2 {
        return text.to_string();
    }
    let head: String = chars[..KEEP].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipsify() {
        assert_eq!(ellipsify("0x1234"), "0x1234");
        assert_eq!(ellipsify("0x1234567890abcdef"), "0x1234...cdef");
    }
}
