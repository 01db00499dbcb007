pub extern crate serde;
pub extern crate serde_json;

mod completion;
mod message;
mod reconcile;
mod update;

pub use completion::*;
pub use message::*;
pub use reconcile::*;
pub use update::*;
