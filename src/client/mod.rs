//! Consumer-side session handling for the voice-auth API.

pub mod api;
pub mod persist;
pub mod routes;
pub mod session;

pub use api::{ApiClient, ClientError};
pub use persist::{FileSessionStore, MemorySessionStore, PersistedAuth, SessionStore};
pub use routes::{guard, resolve, RouteDecision, ViewAccess};
pub use session::{SessionManager, SessionSnapshot};
