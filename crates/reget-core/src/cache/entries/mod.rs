//! Entry lookup and insertion.

mod read;
mod write;
