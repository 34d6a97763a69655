#![warn(clippy::pedantic)]
// Noisy doc/signature lints: would require annotating every pub function
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference: keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Token counts, timestamps and payload sizes cross integer widths on purpose
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod bus;
pub mod channels;
pub mod cli;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod handler;
pub mod providers;
pub mod store;
pub(crate) mod utils;

#[cfg(test)]
mod testing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
