//! Interactive session drivers.
//!
//! The orchestrator talks to the remote portal through the `SessionDriver`
//! capability trait. One driver instance belongs to exactly one acquisition
//! run; `SessionGuard` makes sure it is closed on every exit path.

mod error;
mod guard;
mod traits;
mod types;
mod webdriver;

pub use error::SessionError;
pub use guard::SessionGuard;
pub use traits::{SessionDriver, SessionFactory};
pub use types::*;
pub use webdriver::{WebDriverSession, WebDriverSessionFactory};
