//! Optional structured logging of activation/GC transitions.
//!
//! Compiled unconditionally; the log calls inside are no-ops unless the
//! `log` feature is enabled and a subscriber is installed by the host
//! application (this crate never installs one itself).

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    };
}

#[allow(unused_imports)]
pub(crate) use trace;
