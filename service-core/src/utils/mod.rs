pub mod clock;
pub mod signature;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use signature::{constant_time_eq, hmac_sha256_hex};
