mod client;
mod run;

pub use client::*;
pub use run::*;
