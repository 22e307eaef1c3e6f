pub mod backoff;
pub mod error;
pub mod notification;
pub mod session;

pub use backoff::{Backoff, compute_delay};
pub use error::{ErrorDescriptor, ErrorKind, Failure, Severity};
pub use notification::{Notification, NotificationKind};
pub use session::{ConnectionState, Session, generate_request_id, generate_session_id};
