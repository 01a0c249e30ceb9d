//! Command implementations

pub mod info;

pub mod next_version;

pub mod release;
