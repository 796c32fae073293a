//! License and demo gating.
//!
//! [`keys`] classifies key strings, [`manager`] holds the state machine,
//! [`countdown`] derives demo time left from a stored start instant,
//! [`timer`] ticks the machine in the background and [`registry`] keeps
//! track of keys issued to named users.

pub mod countdown;
pub mod keys;
pub mod manager;
pub mod registry;
pub mod state;
pub mod timer;

pub use keys::{classify, generate_license_key, KeyKind, DEMO_KEY, FULL_KEY_PREFIX};
pub use manager::{LicenseError, LicenseManager, TickOutcome};
pub use state::{Access, LicenseMode, LicenseState};
pub use timer::CountdownTimer;
