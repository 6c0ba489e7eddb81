//! Event envelopes and dispatch context.
//!
//! A control raises an [`Event`]; the runtime delivers it to the raiser's
//! parent and, for bubbling events, on up the ancestor chain until a
//! handler stops propagation or the root is passed. The raiser itself never
//! receives its own event.

use crate::runtime::control::ControlId;
use crate::scope::Value;

/// A named event raised by a control.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: Value,
    pub bubbles: bool,
}

impl Event {
    /// A bubbling event.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            bubbles: true,
        }
    }

    /// An event delivered to the immediate parent only.
    pub fn non_bubbling(name: impl Into<String>, payload: Value) -> Self {
        Self {
            bubbles: false,
            ..Self::new(name, payload)
        }
    }
}

/// Dispatch state handed to each handler along the delivery path.
#[derive(Debug)]
pub struct EventCtx {
    event: Event,
    target: ControlId,
    current: Option<ControlId>,
    handled: bool,
    propagation_stopped: bool,
    update_requests: Vec<ControlId>,
}

impl EventCtx {
    pub(crate) fn new(target: ControlId, event: Event) -> Self {
        Self {
            event,
            target,
            current: None,
            handled: false,
            propagation_stopped: false,
            update_requests: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn payload(&self) -> &Value {
        &self.event.payload
    }

    /// Control that raised the event.
    pub fn target(&self) -> ControlId {
        self.target
    }

    /// Control whose handler is currently running.
    pub fn current(&self) -> Option<ControlId> {
        self.current
    }

    pub(crate) fn enter(&mut self, id: ControlId) {
        self.current = Some(id);
    }

    /// Mark the event as handled. Does not stop propagation.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Stop the walk after the current handler returns.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub(crate) fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Ask the runtime to re-render the handling control once dispatch
    /// finishes. Handlers mutate their own state and then call this.
    pub fn request_update(&mut self) {
        if let Some(id) = self.current {
            if !self.update_requests.contains(&id) {
                self.update_requests.push(id);
            }
        }
    }

    pub(crate) fn take_update_requests(&mut self) -> Vec<ControlId> {
        std::mem::take(&mut self.update_requests)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::runtime::control::ControlData;
    use crate::scope::Options;
    use crate::template::ast::ComponentPath;

    fn some_id() -> ControlId {
        let mut arena: SlotMap<ControlId, ControlData> = SlotMap::with_key();
        arena.insert(ControlData::new(
            ComponentPath::new("App/x:Y"),
            Options::new(),
            Box::new(crate::runtime::control::DefaultBehavior),
            None,
        ))
    }

    #[test]
    fn test_event_constructors() {
        assert!(Event::new("saved", Value::Null).bubbles);
        assert!(!Event::non_bubbling("saved", Value::Null).bubbles);
    }

    #[test]
    fn test_ctx_tracks_handling() {
        let id = some_id();
        let mut ctx = EventCtx::new(id, Event::new("saved", Value::Number(1.0)));
        assert_eq!(ctx.name(), "saved");
        assert_eq!(ctx.target(), id);
        assert!(!ctx.is_handled());
        ctx.mark_handled();
        ctx.stop_propagation();
        assert!(ctx.is_handled());
        assert!(ctx.propagation_stopped());
    }

    #[test]
    fn test_update_requests_deduplicate() {
        let id = some_id();
        let mut ctx = EventCtx::new(id, Event::new("saved", Value::Null));
        ctx.enter(id);
        ctx.request_update();
        ctx.request_update();
        assert_eq!(ctx.take_update_requests(), vec![id]);
        assert!(ctx.take_update_requests().is_empty());
    }
}
