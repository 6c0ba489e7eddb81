//! Control instances and their lifecycle.
//!
//! A control is one mounted component: behavior (a [`Component`]
//! implementation), resolved options, the retained markup fragment it last
//! rendered, and links to parent and child controls. Controls live in the
//! runtime's arena and are addressed by [`ControlId`].

use std::collections::{BTreeMap, BTreeSet};

use slotmap::new_key_type;
use tokio::sync::oneshot;

use crate::compile::RenderError;
use crate::markup::{MarkupNode, NodePath};
use crate::refs::RefChain;
use crate::runtime::notify::EventCtx;
use crate::scope::{Options, Value};
use crate::template::ast::ComponentPath;

new_key_type! {
    /// Arena key of a mounted control.
    pub struct ControlId;
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle phase of a control. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Mounting,
    Mounted,
    Updating,
    Unmounting,
    Destroyed,
}

impl Phase {
    /// Legal phase transitions. Everything else is a runtime bug.
    pub fn can_transition(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Created, Phase::Mounting)
                | (Phase::Created, Phase::Destroyed)
                | (Phase::Mounting, Phase::Mounted)
                | (Phase::Mounting, Phase::Unmounting)
                | (Phase::Mounted, Phase::Updating)
                | (Phase::Mounted, Phase::Unmounting)
                | (Phase::Updating, Phase::Mounted)
                | (Phase::Updating, Phase::Unmounting)
                | (Phase::Unmounting, Phase::Destroyed)
        )
    }

    /// Whether the control can still take part in renders and events.
    pub fn is_alive(self) -> bool {
        !matches!(self, Phase::Unmounting | Phase::Destroyed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Mounting => "mounting",
            Phase::Mounted => "mounted",
            Phase::Updating => "updating",
            Phase::Unmounting => "unmounting",
            Phase::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Component behavior
// ---------------------------------------------------------------------------

/// Outcome of `before_mount` or `before_update`: ready now, or ready once
/// a deferred value arrives on the channel.
#[derive(Debug)]
pub enum Hook {
    Ready,
    Deferred(oneshot::Receiver<Value>),
}

/// Issue a deferred hook: the component returns the [`Hook`] from
/// `before_mount` or `before_update` and resolves the sender whenever its
/// data is ready.
pub fn deferred_hook() -> (oneshot::Sender<Value>, Hook) {
    let (tx, rx) = oneshot::channel();
    (tx, Hook::Deferred(rx))
}

/// Behavior attached to a mounted component. Every method has a default, so
/// a template-only component needs no implementation at all.
pub trait Component {
    /// Runs before the first render. Returning [`Hook::Deferred`] lets the
    /// first render proceed immediately; the resolved value merges into the
    /// control's state later.
    fn before_mount(&mut self, _options: &Options) -> Result<Hook, RenderError> {
        Ok(Hook::Ready)
    }

    /// Runs after the control and all of its children have mounted. A
    /// control that deferred its mount reaches this once the deferred value
    /// has been applied.
    fn after_mount(&mut self) {}

    /// Extra scope entries layered over the options for every render.
    fn state(&self) -> Options {
        Options::new()
    }

    /// Gate for re-renders. An empty changed set skips by default.
    fn should_update(&mut self, changed: &BTreeSet<String>) -> bool {
        !changed.is_empty()
    }

    /// Runs before a re-render commits, with the incoming options. May
    /// issue a deferred hook of its own; the re-render still proceeds and
    /// the resolved value merges in later.
    fn before_update(&mut self, _next: &Options) -> Hook {
        Hook::Ready
    }

    /// Runs after a re-render and all child updates have committed, with
    /// the options the control held before the update.
    fn after_update(&mut self, _previous: &Options) {}

    /// Runs before teardown, while the control is still mounted.
    fn before_unmount(&mut self) {}

    /// Receives events raised by descendant controls.
    fn on_event(&mut self, _event: &mut EventCtx) {}

    /// Called when mounting or updating a child fails. Returning a
    /// placeholder node swallows the error and renders the placeholder in
    /// the child's slot; `None` propagates the failure upward.
    fn error_boundary(&mut self, _error: &RenderError) -> Option<MarkupNode> {
        None
    }
}

/// Behavior used when only a template was registered for a path.
pub(crate) struct DefaultBehavior;

impl Component for DefaultBehavior {}

// ---------------------------------------------------------------------------
// Control data
// ---------------------------------------------------------------------------

/// Arena entry for one mounted control.
pub(crate) struct ControlData {
    pub(crate) path: ComponentPath,
    pub(crate) options: Options,
    /// Version snapshot of shared-cell options, captured at last commit.
    pub(crate) versions: BTreeMap<String, u64>,
    pub(crate) phase: Phase,
    /// Fragment from the last committed render. Child components appear as
    /// leaf nodes; their controls render separately.
    pub(crate) fragment: Vec<MarkupNode>,
    pub(crate) parent: Option<ControlId>,
    /// Child controls by the slot their component leaf occupies.
    pub(crate) children: BTreeMap<NodePath, ControlId>,
    /// State merged in from resolved deferreds.
    pub(crate) deferred_state: BTreeMap<String, Value>,
    /// Deferred issue counter; stale deferreds carry an older epoch.
    pub(crate) epoch: u64,
    /// Set while a deferred mount holds `after_mount` back.
    pub(crate) after_mount_pending: bool,
    pub(crate) refs: RefChain,
    pub(crate) component: Box<dyn Component>,
}

impl ControlData {
    pub(crate) fn new(
        path: ComponentPath,
        options: Options,
        component: Box<dyn Component>,
        parent: Option<ControlId>,
    ) -> Self {
        Self {
            path,
            options,
            versions: BTreeMap::new(),
            phase: Phase::Created,
            fragment: Vec::new(),
            parent,
            children: BTreeMap::new(),
            deferred_state: BTreeMap::new(),
            epoch: 0,
            after_mount_pending: false,
            refs: RefChain::new(),
            component,
        }
    }

    /// Move to `next`, enforcing the transition table.
    pub(crate) fn transition(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        tracing::trace!(from = %self.phase, to = %next, path = %self.path, "phase transition");
        self.phase = next;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
