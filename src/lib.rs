pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod harbor;
pub mod output;
pub mod sheet;
pub mod tui;
