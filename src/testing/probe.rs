//! Probe: shared lifecycle log for runtime assertions.
//!
//! A [`Probe`] is a cheaply cloneable log that component instances write into
//! as their hooks run. Tests clone one probe into several component
//! factories, drive the runtime, then assert on the recorded order.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tokio::sync::oneshot;

use crate::compile::RenderError;
use crate::markup::MarkupNode;
use crate::runtime::{deferred_hook, Component, EventCtx, Hook};
use crate::scope::{Options, Value};

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Shared, append-only log of lifecycle moments.
///
/// Entries are plain strings in `label:hook` form, e.g. `card:before_mount`
/// or `card:event:saved`. Clones share the same underlying log.
#[derive(Clone, Default)]
pub struct Probe {
    log: Rc<RefCell<Vec<String>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.log.borrow_mut().push(entry.into());
    }

    /// Snapshot of all entries recorded so far, in order.
    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.log.borrow().iter().any(|recorded| recorded == entry)
    }
}

/// Hands the sender half of a deferred hook out of a component factory, so
/// a test can resolve the value after mounting.
pub type DeferredSlot = Rc<RefCell<Option<oneshot::Sender<Value>>>>;

pub fn deferred_slot() -> DeferredSlot {
    Rc::new(RefCell::new(None))
}

// ---------------------------------------------------------------------------
// RecordingComponent
// ---------------------------------------------------------------------------

/// A component whose every hook writes to a [`Probe`], with builder knobs
/// for the behaviors tests need to provoke.
///
/// # Examples
///
/// ```ignore
/// use weft_ui::testing::{Probe, RecordingComponent};
///
/// let probe = Probe::new();
/// let factory_probe = probe.clone();
/// runtime.register_component("App:Card", move || {
///     Box::new(RecordingComponent::new("card", &factory_probe))
/// });
/// ```
pub struct RecordingComponent {
    label: String,
    probe: Probe,
    state: Options,
    accept_updates: Option<bool>,
    boundary: Option<MarkupNode>,
    mount_failure: Option<String>,
    defer_to: Option<DeferredSlot>,
    defer_updates_to: Option<DeferredSlot>,
    stop_on: Option<String>,
    update_on: Option<String>,
}

impl RecordingComponent {
    pub fn new(label: &str, probe: &Probe) -> Self {
        Self {
            label: label.to_owned(),
            probe: probe.clone(),
            state: Options::new(),
            accept_updates: None,
            boundary: None,
            mount_failure: None,
            defer_to: None,
            defer_updates_to: None,
            stop_on: None,
            update_on: None,
        }
    }

    /// Seed an internal state entry, visible to the template above the
    /// control's options.
    pub fn with_state(mut self, name: &str, value: Value) -> Self {
        self.state.insert(name.to_owned(), value);
        self
    }

    /// Force `should_update` to a fixed verdict instead of the default
    /// "anything changed" rule.
    pub fn accept_updates(mut self, accept: bool) -> Self {
        self.accept_updates = Some(accept);
        self
    }

    /// Answer child failures with a placeholder node.
    pub fn with_boundary(mut self, placeholder: MarkupNode) -> Self {
        self.boundary = Some(placeholder);
        self
    }

    /// Fail `before_mount` with the given message.
    pub fn failing_mount(mut self, message: &str) -> Self {
        self.mount_failure = Some(message.to_owned());
        self
    }

    /// Return a deferred hook from `before_mount` and park its sender in
    /// the slot for the test to resolve.
    pub fn deferring_into(mut self, slot: &DeferredSlot) -> Self {
        self.defer_to = Some(slot.clone());
        self
    }

    /// Return a deferred hook from every `before_update`, parking the
    /// sender in the slot.
    pub fn deferring_updates_into(mut self, slot: &DeferredSlot) -> Self {
        self.defer_updates_to = Some(slot.clone());
        self
    }

    /// Mark the named event handled and stop its propagation.
    pub fn stopping_on(mut self, event: &str) -> Self {
        self.stop_on = Some(event.to_owned());
        self
    }

    /// Request an update of this control whenever the named event passes
    /// through.
    pub fn updating_on(mut self, event: &str) -> Self {
        self.update_on = Some(event.to_owned());
        self
    }

    fn note(&self, hook: &str) {
        self.probe.record(format!("{}:{}", self.label, hook));
    }
}

impl Component for RecordingComponent {
    fn before_mount(&mut self, _options: &Options) -> Result<Hook, RenderError> {
        self.note("before_mount");
        if let Some(message) = &self.mount_failure {
            return Err(RenderError::RenderFailure {
                path: self.label.clone(),
                message: message.clone(),
            });
        }
        if let Some(slot) = &self.defer_to {
            let (tx, hook) = deferred_hook();
            *slot.borrow_mut() = Some(tx);
            return Ok(hook);
        }
        Ok(Hook::Ready)
    }

    fn after_mount(&mut self) {
        self.note("after_mount");
    }

    fn state(&self) -> Options {
        self.state.clone()
    }

    fn should_update(&mut self, changed: &BTreeSet<String>) -> bool {
        let names: Vec<&str> = changed.iter().map(String::as_str).collect();
        self.note(&format!("should_update[{}]", names.join(",")));
        self.accept_updates.unwrap_or(!changed.is_empty())
    }

    fn before_update(&mut self, _next: &Options) -> Hook {
        self.note("before_update");
        if let Some(slot) = &self.defer_updates_to {
            let (tx, hook) = deferred_hook();
            *slot.borrow_mut() = Some(tx);
            return hook;
        }
        Hook::Ready
    }

    fn after_update(&mut self, _previous: &Options) {
        self.note("after_update");
    }

    fn before_unmount(&mut self) {
        self.note("before_unmount");
    }

    fn on_event(&mut self, event: &mut EventCtx) {
        self.note(&format!("event:{}", event.name()));
        if self.stop_on.as_deref() == Some(event.name()) {
            event.mark_handled();
            event.stop_propagation();
        }
        if self.update_on.as_deref() == Some(event.name()) {
            event.request_update();
        }
    }

    fn error_boundary(&mut self, _error: &RenderError) -> Option<MarkupNode> {
        self.note("error_boundary");
        self.boundary.clone()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_clones_share_the_log() {
        let probe = Probe::new();
        let clone = probe.clone();
        clone.record("a");
        probe.record("b");
        assert_eq!(probe.entries(), vec!["a", "b"]);
        assert!(clone.contains("a"));
    }

    #[test]
    fn test_recording_component_notes_hooks() {
        let probe = Probe::new();
        let mut component = RecordingComponent::new("x", &probe);
        component.before_mount(&Options::new()).unwrap();
        component.after_mount();
        component.before_unmount();
        assert_eq!(
            probe.entries(),
            vec!["x:before_mount", "x:after_mount", "x:before_unmount"]
        );
    }

    #[test]
    fn test_failing_mount_reports_the_message() {
        let probe = Probe::new();
        let mut component = RecordingComponent::new("x", &probe).failing_mount("nope");
        let error = component.before_mount(&Options::new()).unwrap_err();
        assert!(matches!(
            error,
            RenderError::RenderFailure { message, .. } if message == "nope"
        ));
    }

    #[test]
    fn test_deferring_component_parks_the_sender() {
        let probe = Probe::new();
        let slot = deferred_slot();
        let mut component = RecordingComponent::new("x", &probe).deferring_into(&slot);
        let hook = component.before_mount(&Options::new()).unwrap();
        assert!(matches!(hook, Hook::Deferred(_)));
        assert!(slot.borrow().is_some());
    }
}
