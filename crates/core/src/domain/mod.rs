pub mod document;
pub mod snapshot;
