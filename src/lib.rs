#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod clients;
pub mod config;
pub mod evaluation;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod store;
pub mod util;
