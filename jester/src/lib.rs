#[macro_use]
extern crate log;

pub mod apis;
pub mod config;
pub mod dispatcher;
pub mod quota;
pub mod ratings;
pub mod storage;
pub mod text;
