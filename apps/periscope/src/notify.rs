use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Default,
    Success,
    Destructive,
}

/// A user-visible notification. Failure paths in this crate end in one of
/// these or a logged warning; nothing crosses the public API as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default sink for headless use: success and default notices log at info,
/// destructive ones at warn.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Destructive => warn!(
                target: "periscope::notify",
                title = %notice.title,
                description = %notice.description,
                "notification"
            ),
            Severity::Default | Severity::Success => info!(
                target: "periscope::notify",
                title = %notice.title,
                description = %notice.description,
                "notification"
            ),
        }
    }
}
