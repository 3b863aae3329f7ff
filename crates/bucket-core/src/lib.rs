//! Shared data model for the storage engine core: item representation,
//! identifiers, the error taxonomy (§7) and the injectable clock (§6.3).

pub use clock::{Clock, SystemClock};
pub use error::Error;
pub use fatal::fatal_abort;
pub use ids::{Cas, SeqNo, VBucketId};
pub use item::{Item, ItemBuilder, Nru, OperationKind};

mod clock;
mod error;
mod fatal;
mod ids;
mod item;

pub type Result<T> = std::result::Result<T, Error>;
