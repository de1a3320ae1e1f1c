pub mod chrome;
pub mod script;
pub mod session;
pub mod wait;

pub use chrome::{ChromeSession, LaunchOptions};
pub use session::{Cookie, ElementHandle, Session};
