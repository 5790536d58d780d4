//! Progress tracking and throttling.
//!
//! This module handles rate-limiting of the progress fractions reported while
//! an artifact is fetched.

mod throttle;

pub use throttle::ProgressThrottle;
