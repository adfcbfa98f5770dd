//! Built-in device families.

pub mod cisco_ios;
