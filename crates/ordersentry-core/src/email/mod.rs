//! Email records and their backing store.

mod model;
mod repository;
mod store;

pub use model::{EmailRecord, Mailbox, domain_of, parse_recipients};
pub use repository::EmailRepository;
pub use store::{EmailStore, MemoryEmailStore};
