//! snapsight — capture a camera frame by button, voice trigger or timer and
//! get a spoken answer from a vision chat-completion endpoint.

pub mod ai;
pub mod capture;
pub mod credential;
pub mod presenter;
pub mod session;
pub mod settings;
pub mod voice;

pub use session::{Session, SessionHandle};
pub use settings::Settings;
