use url::Url;

use crate::config::ConfigError;

/// Which backend entity a streaming session is attached to. Exactly one kind
/// is active per client; the selection priority is browser session, then
/// task, then workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    BrowserSession(String),
    Task(String),
    WorkflowRun(String),
}

impl SessionTarget {
    /// Top-down selection from the ids a caller may have on hand. Returns
    /// `None` when no id is present, in which case no channel may open.
    pub fn select(
        browser_session_id: Option<&str>,
        task_id: Option<&str>,
        workflow_run_id: Option<&str>,
    ) -> Option<SessionTarget> {
        let pick = |id: Option<&str>| {
            id.map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        };
        if let Some(id) = pick(browser_session_id) {
            return Some(SessionTarget::BrowserSession(id));
        }
        if let Some(id) = pick(task_id) {
            return Some(SessionTarget::Task(id));
        }
        pick(workflow_run_id).map(SessionTarget::WorkflowRun)
    }

    pub fn run_id(&self) -> &str {
        match self {
            SessionTarget::BrowserSession(id)
            | SessionTarget::Task(id)
            | SessionTarget::WorkflowRun(id) => id,
        }
    }

    fn kind_segment(&self) -> &'static str {
        match self {
            SessionTarget::BrowserSession(_) => "browser_session",
            SessionTarget::Task(_) => "task",
            SessionTarget::WorkflowRun(_) => "workflow_run",
        }
    }

    /// Route for the pixel-stream socket.
    pub fn vnc_route(&self) -> String {
        format!("/stream/vnc/{}/{}", self.kind_segment(), self.run_id())
    }

    /// Route for the control/message socket.
    pub fn messages_route(&self) -> String {
        format!("/stream/messages/{}/{}", self.kind_segment(), self.run_id())
    }

    /// The id the existence poller should watch, when there is one. Targets
    /// attached to a task or workflow run have no session to poll.
    pub fn browser_session_id(&self) -> Option<&str> {
        match self {
            SessionTarget::BrowserSession(id) => Some(id),
            SessionTarget::Task(_) | SessionTarget::WorkflowRun(_) => None,
        }
    }
}

/// Join a stream route and auth query onto the configured base.
pub fn build_stream_url(base: &Url, route: &str, query: &str) -> Result<Url, ConfigError> {
    let mut url = base.join(route).map_err(|source| ConfigError::InvalidBaseUrl {
        raw: format!("{base}{route}"),
        source,
    })?;
    if !query.is_empty() {
        url.set_query(Some(query));
    }
    Ok(url)
}
