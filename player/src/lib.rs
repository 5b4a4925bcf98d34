//! Vertical video feed: gesture navigation over a fetched collection and the
//! session it persists into.

mod navigator;
mod session;
mod viewer;

pub use navigator::{Gesture, Navigator, NavigatorEvent, SwipeTracker, SWIPE_THRESHOLD};
pub use session::{
    JsonSessionStore, MemorySessionStore, Session, SessionError, SessionState, SessionStore,
    SESSION_FILE_NAME,
};
pub use viewer::{ViewStatus, Viewer, ViewerError, ViewerInput};
