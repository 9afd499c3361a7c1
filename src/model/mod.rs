//! Domain model: uptime check specifications and mutations

mod check;
mod mutation;

pub use check::*;
pub use mutation::Mutation;
