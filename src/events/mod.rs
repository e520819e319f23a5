//! Domain events written through a transactional outbox and dispatched in the
//! background.

pub mod dispatcher;
pub mod mailer;
pub mod outbox;
pub mod types;

pub use dispatcher::{OutboxDispatcher, OutboxDispatcherBuilder};
pub use mailer::{Mailer, SendEmail};
pub use outbox::OutboxService;
pub use types::*;
