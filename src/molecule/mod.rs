// molecule/mod.rs
// Re-exports for the molecule storage module

mod types;
mod pool;
mod lists;

pub use types::*;
pub use pool::Pool;
pub use lists::*;

#[cfg(test)]
#[path = "tests/pool.rs"]
mod pool_tests;

#[cfg(test)]
#[path = "tests/lists.rs"]
mod lists_tests;
