//! Interaction sessions and composed helpers
//!
//! This crate provides:
//! - `Session`: explicit create/dispose lifecycle owning timers and
//!   deduplicators for one UI interaction
//! - `DebouncedValue`: value + debounced async callback (filter changes)
//! - `SearchQuery`: search-as-you-type (debounce -> rate limit -> dedup)
//! - `FormSession`: debounced live validation, synchronous pre-submit
//!   validation and submission with its own error channel
//!
//! Every helper publishes its state through a `tokio::sync::watch` channel
//! so observers can react to value/busy/error changes.

pub mod form;
pub mod search;
pub mod session;
pub mod state;
pub mod value;

// Re-exports
pub use form::{FieldErrors, FieldValues, FormError, FormSession, FormState};
pub use search::{SearchOptions, SearchQuery, SearchState, SearchStats};
pub use session::{DisposeOptions, Session};
pub use state::InteractionState;
pub use value::DebouncedValue;
