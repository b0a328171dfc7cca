//! # Logging Macros
//!
//! Internal logging front-end. The backend is picked by feature flag:
//!
//! - `defmt`: routes to the `defmt` crate.
//! - `log`: routes to the `log` crate.
//! - `esp32-log`: prints through `esp-println` with a level prefix.
//!
//! With none of them enabled every macro compiles to nothing, but the
//! arguments are still borrowed so they do not trigger unused warnings.
//!
//! Format strings are restricted to the subset understood by both `defmt`
//! and `core::fmt` (`{}` and `{:?}`).

#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::trace!($s $(, $x)*);
        #[cfg(all(feature = "esp32-log", not(any(feature = "log", feature = "defmt"))))]
        ::esp_println::println!(concat!("TRACE ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "esp32-log")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::debug!($s $(, $x)*);
        #[cfg(all(feature = "esp32-log", not(any(feature = "log", feature = "defmt"))))]
        ::esp_println::println!(concat!("DEBUG ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "esp32-log")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::info!($s $(, $x)*);
        #[cfg(all(feature = "esp32-log", not(any(feature = "log", feature = "defmt"))))]
        ::esp_println::println!(concat!("INFO  ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "esp32-log")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::warn!($s $(, $x)*);
        #[cfg(all(feature = "esp32-log", not(any(feature = "log", feature = "defmt"))))]
        ::esp_println::println!(concat!("WARN  ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "esp32-log")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::error!($s $(, $x)*);
        #[cfg(all(feature = "esp32-log", not(any(feature = "log", feature = "defmt"))))]
        ::esp_println::println!(concat!("ERROR ", $s) $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log", feature = "esp32-log")))]
        let _ = ($( & $x ),*);
    }};
}
