#![forbid(unsafe_code)]

pub mod identity;
pub mod session_protocol;
pub mod utils;

#[cfg(test)]
mod proptests;
