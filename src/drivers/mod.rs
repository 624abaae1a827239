//! Storage driver implementations.
//!
//! | Driver        | Strategy                                      |
//! |---------------|-----------------------------------------------|
//! | [`CopyDriver`]| Full tree copy per layer, copied into bundles |

mod copy;
mod extract;

pub use copy::CopyDriver;
