// src/lib.rs — Library root for listbot

pub mod actor;
pub mod auth;
pub mod bot;
pub mod bulk;
pub mod cli;
pub mod flow;
pub mod infra;
pub mod integrations;
pub mod session;
pub mod timer;
pub mod util;
