#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::option_if_let_else)]

pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod util;
