//! Form with live and pre-submit validation
//!
//! Every field edit updates the values synchronously. Each field then gets
//! its own debounced async validation for live feedback, so typing in one
//! field never swallows the pending check of another. Submitting runs a
//! synchronous validation pass first and reports submission failures on a
//! separate channel from validation errors.

use crate::session::Session;
use crate::state::{Dispatches, StateCell};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use scheduler::Debounced;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Field name -> value
pub type FieldValues = BTreeMap<String, String>;

/// Field name -> error message
pub type FieldErrors = BTreeMap<String, String>;

type SyncValidator = Box<dyn Fn(&FieldValues) -> FieldErrors + Send + Sync>;
type FieldValidator = Box<dyn Fn(String, String) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("form has {} invalid field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error("submission failed: {0}")]
    Submit(String),

    #[error("a submission is already in progress")]
    AlreadySubmitting,

    #[error("form session has been disposed")]
    Disposed,
}

/// Observable form state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub values: FieldValues,
    /// Validation errors, live and pre-submit
    pub errors: FieldErrors,
    /// Values differ from the initial ones
    pub dirty: bool,
    /// A live field validation is running
    pub validating: bool,
    /// A submission is running
    pub submitting: bool,
    /// Error of the last submission, kept apart from validation errors
    pub submit_error: Option<String>,
}

impl FormState {
    fn new(values: FieldValues) -> Self {
        Self {
            values,
            errors: FieldErrors::new(),
            dirty: false,
            validating: false,
            submitting: false,
            submit_error: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.validating || self.submitting
    }
}

/// Form bound to a session
pub struct FormSession {
    shared: Arc<Shared>,
}

struct Shared {
    session: Session,
    initial: FieldValues,
    delay: Duration,
    state: StateCell<FormState>,
    validate: SyncValidator,
    validate_field: FieldValidator,
    fields: Mutex<HashMap<String, FieldSlot>>,
    errors: Mutex<ErrorSets>,
    in_flight: AtomicUsize,
    submitting: AtomicBool,
}

struct FieldSlot {
    trigger: Debounced<String>,
    dispatches: Arc<Dispatches>,
}

/// Errors by origin; pre-submit errors take precedence when published
#[derive(Default)]
struct ErrorSets {
    live: FieldErrors,
    checked: FieldErrors,
}

impl ErrorSets {
    fn merged(&self) -> FieldErrors {
        let mut errors = self.live.clone();
        errors.extend(self.checked.iter().map(|(k, v)| (k.clone(), v.clone())));
        errors
    }

    fn clear_field(&mut self, field: &str) {
        self.live.remove(field);
        self.checked.remove(field);
    }
}

impl FormSession {
    /// Create a form
    ///
    /// `validate` is the synchronous whole-form check run before submit.
    /// `validate_field` is the async per-field check run `delay` after the
    /// field was last edited.
    pub fn new<V, F, Fut, E>(
        session: &Session,
        initial: FieldValues,
        delay: Duration,
        validate: V,
        validate_field: F,
    ) -> Self
    where
        V: Fn(&FieldValues) -> FieldErrors + Send + Sync + 'static,
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        let validate_field: FieldValidator = Box::new(move |field, value| {
            validate_field(field, value)
                .map(|result| result.map_err(|e| e.to_string()))
                .boxed()
        });

        Self {
            shared: Arc::new(Shared {
                session: session.clone(),
                state: StateCell::new(FormState::new(initial.clone())),
                initial,
                delay,
                validate: Box::new(validate),
                validate_field,
                fields: Mutex::new(HashMap::new()),
                errors: Mutex::new(ErrorSets::default()),
                in_flight: AtomicUsize::new(0),
                submitting: AtomicBool::new(false),
            }),
        }
    }

    /// Edit a field and schedule its live validation
    pub fn set_field(&self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();

        {
            let mut errors = self.shared.errors.lock();
            errors.clear_field(&field);
            let merged = errors.merged();
            let initial = &self.shared.initial;
            self.shared.state.update(|s| {
                s.values.insert(field.clone(), value.clone());
                s.dirty = s.values != *initial;
                s.errors = merged;
            });
        }

        let trigger = Shared::trigger_for(&self.shared, &field);
        trigger.call(value);
    }

    pub fn field(&self, field: &str) -> Option<String> {
        self.shared.state.snapshot().values.get(field).cloned()
    }

    /// Run the synchronous validation pass
    ///
    /// Returns the values when no field has an error, live errors included.
    pub fn validate_now(&self) -> Result<FieldValues, FormError> {
        let mut errors = self.shared.errors.lock();
        let values = self.shared.state.snapshot().values;
        errors.checked = (self.shared.validate)(&values);
        let merged = errors.merged();
        self.shared.state.update(|s| s.errors = merged.clone());

        if merged.is_empty() {
            Ok(values)
        } else {
            debug!(invalid = merged.len(), "Form validation failed");
            Err(FormError::Invalid(merged))
        }
    }

    /// Validate, then hand the values to `submitter`
    ///
    /// A failed submission is reported in `submit_error`; validation errors
    /// are left untouched.
    pub async fn submit<S, Fut, T, E>(&self, submitter: S) -> Result<T, FormError>
    where
        S: FnOnce(FieldValues) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if self.shared.session.is_disposed() {
            return Err(FormError::Disposed);
        }

        let _guard = SubmitGuard::acquire(&self.shared).ok_or(FormError::AlreadySubmitting)?;
        let values = self.validate_now()?;

        self.shared.state.update(|s| {
            s.submitting = true;
            s.submit_error = None;
        });

        let result = submitter(values).await;

        if self.shared.session.is_disposed() {
            return result.map_err(|e| FormError::Submit(e.to_string()));
        }

        match result {
            Ok(output) => {
                info!(session = %self.shared.session.id(), "Form submitted");
                Ok(output)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Form submission failed");
                self.shared
                    .state
                    .update(|s| s.submit_error = Some(message.clone()));
                Err(FormError::Submit(message))
            }
        }
    }

    /// Restore initial values and clear every error
    ///
    /// Pending live validations are cancelled; results of validations
    /// already running are ignored.
    pub fn reset(&self) {
        for slot in self.shared.fields.lock().values() {
            slot.trigger.cancel();
            slot.dispatches.invalidate();
        }

        let mut errors = self.shared.errors.lock();
        *errors = ErrorSets::default();
        let validating = self.shared.in_flight.load(Ordering::Acquire) > 0;
        let submitting = self.shared.submitting.load(Ordering::Acquire);
        self.shared.state.replace(FormState {
            validating,
            submitting,
            ..FormState::new(self.shared.initial.clone())
        });
    }

    pub fn snapshot(&self) -> FormState {
        self.shared.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<FormState> {
        self.shared.state.subscribe()
    }
}

impl Shared {
    fn trigger_for(this: &Arc<Self>, field: &str) -> Debounced<String> {
        let mut fields = this.fields.lock();
        if let Some(slot) = fields.get(field) {
            return slot.trigger.clone();
        }

        let weak = Arc::downgrade(this);
        let name = field.to_string();
        let trigger = this.session.debounce(
            move |value: String| {
                if let Some(shared) = weak.upgrade() {
                    Shared::validate_field(&shared, name.clone(), value);
                }
            },
            this.delay,
        );
        fields.insert(
            field.to_string(),
            FieldSlot {
                trigger: trigger.clone(),
                dispatches: Arc::new(Dispatches::default()),
            },
        );
        trigger
    }

    fn validate_field(this: &Arc<Self>, field: String, value: String) {
        let Some(dispatches) = this
            .fields
            .lock()
            .get(&field)
            .map(|slot| Arc::clone(&slot.dispatches))
        else {
            return;
        };

        let seq = dispatches.begin();
        this.in_flight.fetch_add(1, Ordering::AcqRel);
        this.state.update(|s| s.validating = true);

        let future = (this.validate_field)(field.clone(), value.clone());
        let shared = Arc::clone(this);
        tokio::spawn(async move {
            let result = future.await;
            let latest = dispatches.finish(seq);
            let validating = shared.in_flight.fetch_sub(1, Ordering::AcqRel) > 1;

            if shared.session.is_disposed() {
                return;
            }

            let mut errors = shared.errors.lock();
            let current = shared.state.snapshot().values.get(&field).cloned();
            if latest && current.as_deref() == Some(value.as_str()) {
                match result {
                    Ok(()) => {
                        errors.live.remove(&field);
                    }
                    Err(e) => {
                        debug!(field = %field, error = %e, "Field failed validation");
                        errors.live.insert(field, e);
                    }
                }
            }
            let merged = errors.merged();
            shared.state.update(|s| {
                s.validating = validating;
                s.errors = merged;
            });
        });
    }
}

/// Holds the single submission slot
struct SubmitGuard<'a> {
    shared: &'a Shared,
}

impl<'a> SubmitGuard<'a> {
    fn acquire(shared: &'a Shared) -> Option<Self> {
        shared
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { shared })
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.shared.submitting.store(false, Ordering::Release);
        self.shared.state.update(|s| s.submitting = false);
    }
}
