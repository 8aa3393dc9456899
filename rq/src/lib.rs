//! RequestStore - durable question/answer records
//!
//! Persists every question a caller asks a human, together with its answer and
//! status, in a single SQLite table. The store is the source of truth for the
//! `pending -> responded` transition: answers are written with a conditional
//! update so a request can be answered at most once.
//!
//! # Schema
//!
//! ```text
//! requests
//! ├── id            INTEGER PRIMARY KEY AUTOINCREMENT  (never reused)
//! ├── source_name   TEXT   (indexed)
//! ├── app_name      TEXT   (indexed)
//! ├── question      TEXT
//! ├── response      TEXT   ('' until answered)
//! ├── status        TEXT   ('pending' | 'responded', indexed)
//! ├── created_at    TEXT   (RFC 3339, UTC)
//! └── responded_at  TEXT   (RFC 3339, UTC, NULL until answered)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use requeststore::{NewRequest, Store};
//!
//! let store = Store::open("~/.askhuman/app.db")?;
//! let req = store.create(&NewRequest::new("ide-x", "app1", "pick a color"))?;
//! assert!(store.respond_if_pending(req.id, "blue", chrono::Utc::now())?);
//! ```

mod error;
mod record;
mod store;

pub use error::StoreError;
pub use record::{NewRequest, Request, RequestFilter, RequestId, RequestStatus};
pub use store::Store;
