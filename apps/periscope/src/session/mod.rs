pub mod backend;
pub mod poller;
pub mod target;

pub use backend::{BrowserSessionRecord, ReqwestSessionApi, SessionApi, SessionError};
pub use poller::ExistencePoller;
pub use target::{build_stream_url, SessionTarget};
