pub mod discovery;

pub use discovery::{discover, require, Library};
