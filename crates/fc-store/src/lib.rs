//! Store interfaces and their in-memory reference implementations (C5).
//!
//! Every trait here is the abstract collaborator §6 describes: concrete
//! adapters (an RDBMS, Mongo, a broker) implement these from outside this
//! workspace. The in-memory implementations are not test doubles bolted on
//! after the fact — they are the reference implementation §2 calls for, and
//! are exercised by the same tests a real adapter would need to pass.

pub mod dead_letter;
pub mod inbox;
pub mod message;
pub mod outbox;
pub mod saga;

pub use dead_letter::{DeadLetterEntry, DeadLetterStore, InMemoryDeadLetterStore};
pub use inbox::{InboxEntry, InboxOptions, InboxStatus, InboxStore, InMemoryInboxStore};
pub use message::{InMemoryMessageStore, MessageStore, QueryFilter, SortOrder, StoredAt, Transaction};
pub use outbox::{InMemoryOutboxStore, OutboxEntry, OutboxOptions, OutboxStatus, OutboxStore};
pub use saga::{InMemorySagaRepository, SagaInstance, SagaRepository};
