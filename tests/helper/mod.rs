#![allow(dead_code)]

mod fixtures;
mod release;

pub use fixtures::*;
pub use release::*;
