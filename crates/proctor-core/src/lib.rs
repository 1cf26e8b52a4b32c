//! proctor-core: exam session engine.
//!
//! This crate defines the data model, the `Gateway` trait, and the session
//! components that keep a student's in-progress answers in step with the
//! remote attempt record: the answer store, timer, autosave scheduler,
//! submission finalizer, and the session controller that owns them.

pub mod autosave;
pub mod error;
pub mod finalizer;
pub mod kinds;
pub mod model;
pub mod script;
pub mod session;
pub mod store;
pub mod timer;
pub mod traits;

pub use error::{GatewayError, SessionError};
pub use session::{SessionConfig, SessionController, SessionSnapshot, SessionState};
