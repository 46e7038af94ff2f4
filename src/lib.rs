//! proptrack - keep object state alive across application runs.
//!
//! The engine binds a declared subset of an object's properties to a
//! persistent key/value [`Store`] and keeps the two in sync: on first
//! [`track`](Tracker::track) it applies any previously stored values to the
//! object; later, on host-defined triggers or a global sweep, it persists
//! the object's current values back.
//!
//! The tracker never owns the objects it tracks (weak references only) and
//! is strictly single-threaded: applies and persists run synchronously on
//! the calling thread.
//!
//! ## Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use proptrack::{MemoryStore, Tracked, Tracker};
//!
//! #[derive(Default)]
//! struct Window {
//!     name: String,
//!     width: u32,
//!     height: u32,
//! }
//! impl Tracked for Window {}
//!
//! let tracker = Tracker::new(MemoryStore::new());
//! tracker
//!     .configure::<Window>()
//!     .id(|w| w.name.clone())
//!     .property("width", |w| w.width, |w, v| w.width = v)
//!     .property("height", |w| w.height, |w, v| w.height = v);
//!
//! let window = Rc::new(RefCell::new(Window {
//!     name: "main".into(),
//!     width: 800,
//!     height: 600,
//! }));
//! tracker.track(&window).unwrap();
//!
//! // ... the application runs; on shutdown (or a trigger):
//! tracker.persist_all();
//! ```

pub mod accessor;
pub mod config;
pub mod error;
pub mod store;
pub mod tracked;
pub mod tracker;
pub mod trigger;

mod registry;

pub use accessor::TrackedProperty;
pub use config::{PropertyOperation, TrackingConfiguration};
pub use error::{Error, PropertyError, StoreError};
pub use store::{Bundle, JsonFileStore, MemoryStore, Store};
pub use tracked::Tracked;
pub use tracker::{ConfigHandle, Tracker};
pub use trigger::{Event, Subscription, Trigger};
