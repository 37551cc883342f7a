//! Built-in vendor platform tables.
//!
//! Each vendor module exposes `platform()`, which compiles its mode table
//! into a [`PlatformDefinition`](super::PlatformDefinition).

pub mod arista;
pub mod cisco_iosxe;
pub mod juniper;
pub mod linux;
