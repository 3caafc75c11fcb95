//! Launch descriptor parsing and substitution

mod launch_file;
mod substitution;

pub use launch_file::*;
pub use substitution::*;
