//! Object trees and the minimal diffs that keep two copies converged.

mod differ;
mod value;

pub use differ::{apply_delete, apply_sync, get_delete, get_sync};
pub use value::{Value, ValueMap};
