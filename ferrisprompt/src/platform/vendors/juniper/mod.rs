//! Juniper JUNOS platform support.

mod platform;

pub use platform::{PLATFORM_NAME, platform};
