mod iden;
pub mod library;
mod schema;

pub use library::{AuditRow, LibraryDb};
