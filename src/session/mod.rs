//! Session subsystem (C8, spec §4.8): snapshot model plus file-backed
//! persistence with quotas.

pub mod model;
pub mod store;

pub use model::{Session, SessionData, SessionMetadata, SessionStats, SESSION_FORMAT_VERSION};
pub use store::{validate_session_id, SessionStore, SESSION_ID_MAX_LEN};
