pub mod ast;
pub mod config;
pub mod context;
pub mod doc;
pub mod env;
pub mod level;
pub mod normalize;
pub mod pretty;

#[cfg(test)]
mod test_support;

pub use ast::*;
pub use context::{Context, LocalDecl};
pub use env::{Env, GlobalDecl, GlobalName, Transparency};
pub use level::Level;
pub use normalize::{Normalizer, ReduceError, Rules};
