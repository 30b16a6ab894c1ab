pub mod manager;
pub mod session;
pub mod stealth;

pub use manager::{ChromiumLauncher, ChromiumSession};
pub use session::{PortalSession, SessionFactory};
pub use stealth::UserAgentGenerator;
