//! Websocket front end: authenticates a request, provisions kubectl credentials, and runs
//! one prompt session per connection.

mod auth;
mod credentials;
mod handler;
mod server;
mod session_dir;

pub use auth::{AuthContext, DevAuth, HeaderAuth, Identity};
pub use credentials::{
    ClusterCredentialProvider, CredentialRequest, KubeconfigDirProvider, SessionKind,
};
pub use handler::{
    PreparedSession, Relay, SessionRequest, SessionSettings, PROMPT_PREFIX, PROMPT_ROUTE,
    PROMPT_TITLE,
};
pub use server::{serve, serve_listener, spawn_pruner};
pub use session_dir::{session_id, SessionDir, SessionDirs, KUBECONFIG_FILE, VIEW_PREFIX};
