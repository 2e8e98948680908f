pub mod columns;
pub mod dedup;
pub mod error;
pub mod mapper;
pub mod notifier;
pub mod parser;
pub mod session;
pub mod timestamps;

pub use dedup::deduplicate;
pub use error::ImportError;
pub use mapper::{format_duration, to_persisted};
pub use notifier::{ChannelNotifier, LogNotifier, Notification, NotificationLevel, Notifier};
pub use parser::parse_file;
pub use session::{ImportSession, ImportSummary, IngestReport, SessionSummary};
