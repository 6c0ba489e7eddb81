//! Control tree runtime.
//!
//! The runtime owns every mounted control in a slotmap arena, renders
//! their templates into retained markup fragments, and turns each change
//! into a [`Commit`] of patch operations a host can replay against its own
//! scene. All state lives on [`Runtime`]; nothing here touches thread
//! locals, so independent runtimes can coexist in one process.
//!
//! Work arrives through the public entry points (`mount`, `set_option`,
//! `update`, `notify`, `poll_deferred`, `unmount`). Work raised while a
//! pass is in flight, re-entered entry points and the re-renders event
//! handlers request alike, is queued and drained once the outermost pass
//! completes, which keeps hook re-entrancy from observing half-updated
//! controls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use slotmap::SlotMap;

use crate::compile::{compile_source, CompileError, CompileOptions, RenderError, Template};
use crate::markup::{fragment_to_html, MarkupNode, NodePath};
use crate::refs::{RefChain, RefHandler};
use crate::scope::{Options, Scope, Value};
use crate::template::ComponentPath;

pub mod control;
pub mod defer;
pub mod notify;
pub mod options;
pub mod patch;
pub mod reconcile;

pub use control::{deferred_hook, Component, ControlId, Hook, Phase};
pub use notify::{Event, EventCtx};
pub use options::{capture_versions, diff_options};
pub use patch::{apply, PatchError, PatchOp};

use control::{ControlData, DefaultBehavior};
use defer::{PendingDeferred, PollOutcome};

/// Event raised from a control once its deferred value has been applied.
pub const DEFERRED_READY_EVENT: &str = "deferred-ready";

type Factory = Box<dyn Fn() -> Box<dyn Component>>;

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// A batch of patch operations produced by one render pass of one control.
///
/// Ops inside a commit are ordered for sequential application against the
/// control's previous fragment. Commits themselves are ordered so that a
/// parent's structural changes precede the creation commits of any child
/// controls they introduce.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub control: ControlId,
    pub ops: Vec<PatchOp>,
}

/// Deferred work queued while a pass was in flight.
enum Work {
    SetOption {
        id: ControlId,
        name: String,
        value: Value,
    },
    Update {
        id: ControlId,
        /// Skip the `should_update` consultation. Set for re-renders an
        /// event handler asked for, where nothing in the options moved.
        force: bool,
    },
    Notify {
        id: ControlId,
        event: Event,
    },
}

/// A component leaf discovered in a rendered fragment.
struct ComponentSlot {
    at: NodePath,
    path: ComponentPath,
    key: Option<String>,
    options: Options,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Owns the control tree and drives the render/reconcile cycle.
pub struct Runtime {
    controls: SlotMap<ControlId, ControlData>,
    templates: HashMap<String, Template>,
    factories: HashMap<String, Factory>,
    commits: Vec<Commit>,
    pending_deferred: Vec<PendingDeferred>,
    queue: VecDeque<Work>,
    in_pass: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("controls", &self.controls.len())
            .field("templates", &self.templates.len())
            .field("pending_deferred", &self.pending_deferred.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            controls: SlotMap::with_key(),
            templates: HashMap::new(),
            factories: HashMap::new(),
            commits: Vec::new(),
            pending_deferred: Vec::new(),
            queue: VecDeque::new(),
            in_pass: false,
        }
    }

    // -- registration -------------------------------------------------------

    /// Register a compiled template under a component path. The path is
    /// canonicalized, so `App.cards:Card` and `App/cards:Card` name the
    /// same entry.
    pub fn register_template(&mut self, path: &str, template: Template) {
        let path = ComponentPath::from_tag(path);
        self.templates.insert(path.as_str().to_owned(), template);
    }

    /// Compile markup source and register it as a component template.
    pub fn register_template_source(
        &mut self,
        path: &str,
        source: &str,
    ) -> Result<(), CompileError> {
        let canonical = ComponentPath::from_tag(path);
        let template = compile_source(
            source,
            CompileOptions {
                name: Some(canonical.as_str().to_owned()),
                root_config: false,
                is_control: true,
            },
        )?;
        self.templates.insert(canonical.as_str().to_owned(), template);
        Ok(())
    }

    /// Register a behavior factory for a component path. Each mount of the
    /// path calls the factory for a fresh instance; paths without a factory
    /// mount with inert default behavior.
    pub fn register_component<F>(&mut self, path: &str, factory: F)
    where
        F: Fn() -> Box<dyn Component> + 'static,
    {
        let path = ComponentPath::from_tag(path);
        self.factories.insert(path.as_str().to_owned(), Box::new(factory));
    }

    // -- entry points -------------------------------------------------------

    /// Mount a component as a root control and return its id.
    ///
    /// On failure no control remains mounted and any commits produced by
    /// the partial attempt are discarded.
    pub fn mount(&mut self, path: &str, options: Options) -> Result<ControlId, RenderError> {
        let path = ComponentPath::from_tag(path);
        let mark = self.commits.len();
        self.in_pass = true;
        let result = self.mount_inner(&path, options, None);
        self.in_pass = false;
        if result.is_err() {
            self.commits.truncate(mark);
        }
        self.drain_queue();
        result
    }

    /// Replace one option and re-render if the control accepts the change.
    /// A detached id is a warning, not an error.
    pub fn set_option(
        &mut self,
        id: ControlId,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), RenderError> {
        let name = name.into();
        if self.in_pass {
            self.queue.push_back(Work::SetOption { id, name, value });
            return Ok(());
        }
        let Some(data) = self.controls.get(id) else {
            tracing::warn!(option = %name, "set_option on a detached control");
            return Ok(());
        };
        let mut next = data.options.clone();
        next.insert(name, value);
        self.in_pass = true;
        let result = self.update_control(id, Some(next), false);
        self.in_pass = false;
        self.drain_queue();
        result
    }

    /// Re-render a control against its current options. Shared cells whose
    /// version moved since the last pass count as changed, so this is the
    /// entry point to call after mutating shared state.
    pub fn update(&mut self, id: ControlId) -> Result<(), RenderError> {
        if self.in_pass {
            self.queue.push_back(Work::Update { id, force: false });
            return Ok(());
        }
        self.in_pass = true;
        let result = self.update_control(id, None, false);
        self.in_pass = false;
        self.drain_queue();
        result
    }

    /// Tear a control down, running unmount hooks depth-first and emitting
    /// a removal commit for its fragment.
    pub fn unmount(&mut self, id: ControlId) {
        let Some(data) = self.controls.get(id) else {
            tracing::warn!("unmount of a detached control");
            return;
        };
        let ops = reconcile::diff(&data.fragment, &[]);
        self.commits.push(Commit { control: id, ops });
        self.in_pass = true;
        self.unmount_inner(id);
        self.in_pass = false;
        self.drain_queue();
    }

    /// Raise an event from a control. Delivery starts at the raiser's
    /// parent and walks rootward while the event keeps bubbling; the
    /// raiser itself never handles its own event. Re-renders requested by
    /// handlers are applied after the walk, before this returns.
    pub fn notify(&mut self, id: ControlId, event: Event) {
        if self.in_pass {
            self.queue.push_back(Work::Notify { id, event });
            return;
        }
        self.in_pass = true;
        self.dispatch_event(id, event);
        self.in_pass = false;
        self.drain_queue();
    }

    /// Poll outstanding deferred hooks, apply any resolved values, and
    /// return how many were applied. A control that deferred its mount
    /// fires `after_mount` here once its value lands. Values for controls
    /// that were unmounted or remounted since the hook was issued are
    /// dropped.
    pub fn poll_deferred(&mut self) -> usize {
        if self.in_pass {
            tracing::warn!("poll_deferred during a pass; skipped");
            return 0;
        }
        self.in_pass = true;
        let pending = std::mem::take(&mut self.pending_deferred);
        let mut keep = Vec::new();
        let mut applied = 0;
        for mut entry in pending {
            match entry.poll() {
                PollOutcome::Pending => keep.push(entry),
                PollOutcome::Closed => {
                    tracing::debug!("deferred channel closed without a value");
                }
                PollOutcome::Ready(value) => {
                    let live = self
                        .controls
                        .get(entry.control)
                        .map(|data| data.phase == Phase::Mounted && data.epoch == entry.epoch)
                        .unwrap_or(false);
                    if !live {
                        tracing::debug!("deferred value arrived for a stale control");
                        continue;
                    }
                    let data = &mut self.controls[entry.control];
                    match value.clone() {
                        Value::Map(map) => data.deferred_state.extend(map),
                        other => {
                            data.deferred_state.insert("deferred".to_owned(), other);
                        }
                    }
                    if let Err(error) = self.update_control(entry.control, None, true) {
                        tracing::warn!(%error, "re-render after deferred value failed");
                    }
                    let data = &mut self.controls[entry.control];
                    if data.after_mount_pending {
                        data.after_mount_pending = false;
                        data.component.after_mount();
                    }
                    self.dispatch_event(entry.control, Event::new(DEFERRED_READY_EVENT, value));
                    applied += 1;
                }
            }
        }
        self.pending_deferred.extend(keep);
        self.in_pass = false;
        self.drain_queue();
        applied
    }

    /// Append a ref handler to a control's chain. On a mounted control the
    /// whole chain re-attaches so the new handler sees the current target,
    /// and the handlers' attribute writes are committed as patch ops.
    pub fn add_ref(&mut self, id: ControlId, handler: impl RefHandler + 'static) {
        let Some(data) = self.controls.get_mut(id) else {
            tracing::warn!("ref added to a detached control");
            return;
        };
        data.refs.push(handler);
        if data.phase != Phase::Mounted {
            return;
        }
        data.refs.detach();
        let before = data.fragment.clone();
        let ControlData { refs, fragment, .. } = data;
        decorate_fragment(refs, fragment);
        let ops = reconcile::diff(&before, &data.fragment);
        if !ops.is_empty() {
            self.commits.push(Commit { control: id, ops });
        }
    }

    // -- inspection ---------------------------------------------------------

    pub fn phase(&self, id: ControlId) -> Option<Phase> {
        self.controls.get(id).map(|data| data.phase)
    }

    pub fn is_mounted(&self, id: ControlId) -> bool {
        self.phase(id) == Some(Phase::Mounted)
    }

    pub fn options(&self, id: ControlId) -> Option<&Options> {
        self.controls.get(id).map(|data| &data.options)
    }

    /// Number of live controls in the arena.
    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Ids of the controls mounted inside a control's fragment, in slot
    /// order.
    pub fn children(&self, id: ControlId) -> Vec<ControlId> {
        self.controls
            .get(id)
            .map(|data| data.children.values().copied().collect())
            .unwrap_or_default()
    }

    /// The control's retained fragment, component leaves unspliced. This
    /// is the tree the control's commits patch.
    pub fn fragment(&self, id: ControlId) -> Option<&[MarkupNode]> {
        self.controls.get(id).map(|data| data.fragment.as_slice())
    }

    /// Number of deferred hooks still waiting for a value.
    pub fn deferred_pending(&self) -> usize {
        self.pending_deferred.len()
    }

    /// Drain the commits accumulated since the last call.
    pub fn take_commits(&mut self) -> Vec<Commit> {
        std::mem::take(&mut self.commits)
    }

    /// The control's fragment with child-control fragments spliced in
    /// place of their component leaves.
    pub fn rendered(&self, id: ControlId) -> Option<Vec<MarkupNode>> {
        let data = self.controls.get(id)?;
        Some(self.splice(&data.fragment, &NodePath::root(), &data.children))
    }

    /// Serialized markup for a control subtree, children included.
    pub fn to_html(&self, id: ControlId) -> Option<String> {
        Some(fragment_to_html(&self.rendered(id)?))
    }

    // -- mount --------------------------------------------------------------

    fn mount_inner(
        &mut self,
        path: &ComponentPath,
        options: Options,
        parent: Option<ControlId>,
    ) -> Result<ControlId, RenderError> {
        let template = self
            .templates
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| RenderError::UnknownComponent {
                path: path.as_str().to_owned(),
            })?;
        let component: Box<dyn Component> = match self.factories.get(path.as_str()) {
            Some(factory) => factory(),
            None => Box::new(DefaultBehavior),
        };
        let id = self
            .controls
            .insert(ControlData::new(path.clone(), options, component, parent));

        let data = &mut self.controls[id];
        let hook = match data.component.before_mount(&data.options) {
            Ok(hook) => hook,
            Err(error) => {
                tracing::warn!(path = %path, %error, "before_mount failed");
                self.controls.remove(id);
                return Err(error);
            }
        };
        let data = &mut self.controls[id];
        data.transition(Phase::Mounting);
        if let Hook::Deferred(rx) = hook {
            data.epoch += 1;
            data.after_mount_pending = true;
            let entry = PendingDeferred {
                control: id,
                epoch: data.epoch,
                rx,
            };
            self.pending_deferred.push(entry);
        }

        let mut fragment = match render_fragment(&self.controls[id], &template) {
            Ok(fragment) => fragment,
            Err(error) => {
                tracing::warn!(path = %path, %error, "initial render failed");
                self.discard(id);
                return Err(error);
            }
        };
        decorate_fragment(&mut self.controls[id].refs, &mut fragment);
        let ops = reconcile::diff(&[], &fragment);
        let data = &mut self.controls[id];
        data.fragment = fragment;
        self.commits.push(Commit { control: id, ops });

        if let Err(error) = self.mount_children(id) {
            self.discard(id);
            return Err(error);
        }

        let data = &mut self.controls[id];
        data.transition(Phase::Mounted);
        data.versions = capture_versions(&data.options);
        if data.after_mount_pending {
            tracing::debug!(path = %path, "after_mount waits for the deferred value");
        } else {
            data.component.after_mount();
        }
        tracing::info!(path = %path, "control mounted");
        Ok(id)
    }

    /// Mount a control for every component leaf in the stored fragment.
    /// Children finish mounting, `after_mount` included, before the caller
    /// finishes its own mount.
    fn mount_children(&mut self, id: ControlId) -> Result<(), RenderError> {
        let slots = component_slots(&self.controls[id].fragment);
        for slot in slots {
            let mark = self.commits.len();
            match self.mount_inner(&slot.path, slot.options, Some(id)) {
                Ok(child) => {
                    self.controls[id].children.insert(slot.at, child);
                }
                Err(error) => {
                    self.commits.truncate(mark);
                    match self.boundary_placeholder(id, &error) {
                        Some(placeholder) => self.replace_slot(id, &slot.at, placeholder),
                        None => return Err(error),
                    }
                }
            }
        }
        Ok(())
    }

    /// Tear down a control whose mount never completed. Hooks do not run.
    fn discard(&mut self, id: ControlId) {
        let children: Vec<ControlId> = self
            .controls
            .get(id)
            .map(|data| data.children.values().copied().collect())
            .unwrap_or_default();
        for child in children {
            self.discard(child);
        }
        self.controls.remove(id);
    }

    // -- update -------------------------------------------------------------

    fn update_control(
        &mut self,
        id: ControlId,
        next_options: Option<Options>,
        force: bool,
    ) -> Result<(), RenderError> {
        let Some(data) = self.controls.get_mut(id) else {
            tracing::warn!("update requested for a detached control");
            return Ok(());
        };
        if data.phase != Phase::Mounted {
            tracing::debug!(path = %data.path, phase = %data.phase, "update skipped by phase");
            return Ok(());
        }
        let template = match self.templates.get(data.path.as_str()) {
            Some(template) => template.clone(),
            None => {
                return Err(RenderError::UnknownComponent {
                    path: data.path.as_str().to_owned(),
                })
            }
        };

        let next = next_options.unwrap_or_else(|| data.options.clone());
        let changed = diff_options(&data.options, &next, &data.versions);
        if !force && !data.component.should_update(&changed) {
            tracing::debug!(path = %data.path, "component declined the update");
            data.options = next;
            data.versions = capture_versions(&data.options);
            return Ok(());
        }

        data.transition(Phase::Updating);
        let hook = data.component.before_update(&next);
        let previous = std::mem::replace(&mut data.options, next);
        if let Hook::Deferred(rx) = hook {
            data.epoch += 1;
            let entry = PendingDeferred {
                control: id,
                epoch: data.epoch,
                rx,
            };
            self.pending_deferred.push(entry);
        }

        // All-or-nothing: a failed render rolls the options back, keeps the
        // previous fragment, and returns the control to `Mounted`.
        let mut next_fragment = match render_fragment(data, &template) {
            Ok(fragment) => fragment,
            Err(error) => {
                data.options = previous;
                data.transition(Phase::Mounted);
                tracing::warn!(path = %data.path, %error, "re-render failed; previous tree kept");
                return Err(error);
            }
        };
        decorate_fragment(&mut data.refs, &mut next_fragment);

        let old_slots = slot_info(&data.fragment);
        let ops = reconcile::diff(&data.fragment, &next_fragment);
        let op_count = ops.len();
        data.fragment = next_fragment;
        self.commits.push(Commit { control: id, ops });

        if let Err(error) = self.reconcile_children(id, &old_slots) {
            let data = &mut self.controls[id];
            data.transition(Phase::Mounted);
            return Err(error);
        }

        let data = &mut self.controls[id];
        data.transition(Phase::Mounted);
        data.versions = capture_versions(&data.options);
        data.component.after_update(&previous);
        tracing::debug!(path = %data.path, ops = op_count, "update committed");
        Ok(())
    }

    /// Carry child controls across a parent re-render. Keyed leaves match
    /// by component path and key wherever they moved; unkeyed leaves match
    /// by staying at the same slot with the same path. Unmatched old
    /// children unmount, unmatched new leaves mount.
    fn reconcile_children(
        &mut self,
        id: ControlId,
        old_slots: &BTreeMap<NodePath, (ComponentPath, Option<String>)>,
    ) -> Result<(), RenderError> {
        let prev_children = std::mem::take(&mut self.controls[id].children);
        let next_slots = component_slots(&self.controls[id].fragment);

        let mut keyed: HashMap<(String, String), NodePath> = HashMap::new();
        for (at, (path, key)) in old_slots {
            if let Some(key) = key {
                if prev_children.contains_key(at) {
                    keyed.insert((path.as_str().to_owned(), key.clone()), at.clone());
                }
            }
        }

        let mut remaining = prev_children;
        let mut plan: Vec<(Option<ControlId>, ComponentSlot)> = Vec::new();
        for slot in next_slots {
            let matched_at = match &slot.key {
                Some(key) => keyed.remove(&(slot.path.as_str().to_owned(), key.clone())),
                None => match old_slots.get(&slot.at) {
                    Some((path, None)) if *path == slot.path => Some(slot.at.clone()),
                    _ => None,
                },
            };
            let existing = matched_at.and_then(|at| remaining.remove(&at));
            plan.push((existing, slot));
        }

        for (_, stale) in remaining {
            self.unmount_inner(stale);
        }

        // Survivors are recorded at their new slots before any hook runs,
        // so an error part-way cannot orphan a live control.
        for (existing, slot) in &plan {
            if let Some(child) = existing {
                self.controls[id].children.insert(slot.at.clone(), *child);
            }
        }

        for (existing, slot) in plan {
            match existing {
                Some(child) => {
                    let mark = self.commits.len();
                    if let Err(error) = self.update_control(child, Some(slot.options), false) {
                        self.commits.truncate(mark);
                        match self.boundary_placeholder(id, &error) {
                            Some(placeholder) => {
                                self.unmount_inner(child);
                                self.controls[id].children.remove(&slot.at);
                                self.replace_slot(id, &slot.at, placeholder);
                            }
                            None => return Err(error),
                        }
                    }
                }
                None => {
                    let mark = self.commits.len();
                    match self.mount_inner(&slot.path, slot.options, Some(id)) {
                        Ok(child) => {
                            self.controls[id].children.insert(slot.at, child);
                        }
                        Err(error) => {
                            self.commits.truncate(mark);
                            match self.boundary_placeholder(id, &error) {
                                Some(placeholder) => self.replace_slot(id, &slot.at, placeholder),
                                None => return Err(error),
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // -- unmount ------------------------------------------------------------

    fn unmount_inner(&mut self, id: ControlId) {
        let Some(data) = self.controls.get_mut(id) else {
            return;
        };
        if !data.phase.is_alive() {
            return;
        }
        data.transition(Phase::Unmounting);
        data.component.before_unmount();
        data.refs.detach();
        let children: Vec<ControlId> = data.children.values().copied().collect();
        for child in children {
            self.unmount_inner(child);
        }
        let Some(data) = self.controls.get_mut(id) else {
            return;
        };
        data.transition(Phase::Destroyed);
        tracing::info!(path = %data.path, "control destroyed");
        self.controls.remove(id);
    }

    // -- events -------------------------------------------------------------

    fn dispatch_event(&mut self, target: ControlId, event: Event) {
        let Some(start) = self.controls.get(target).and_then(|data| data.parent) else {
            tracing::debug!(event = %event.name, "event had no ancestors to visit");
            return;
        };
        let bubbles = event.bubbles;
        let mut ctx = EventCtx::new(target, event);
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let Some(data) = self.controls.get_mut(id) else {
                break;
            };
            if !data.phase.is_alive() {
                break;
            }
            ctx.enter(id);
            data.component.on_event(&mut ctx);
            if !bubbles || ctx.propagation_stopped() {
                break;
            }
            cursor = data.parent;
        }
        // Requested re-renders join the work queue; the pass in flight
        // finishes before any of them runs.
        for id in ctx.take_update_requests() {
            self.queue.push_back(Work::Update { id, force: true });
        }
    }

    // -- shared plumbing ----------------------------------------------------

    fn drain_queue(&mut self) {
        while let Some(work) = self.queue.pop_front() {
            self.in_pass = true;
            let result = match work {
                Work::SetOption { id, name, value } => match self.controls.get(id) {
                    Some(data) => {
                        let mut next = data.options.clone();
                        next.insert(name, value);
                        self.update_control(id, Some(next), false)
                    }
                    None => Ok(()),
                },
                Work::Update { id, force } => self.update_control(id, None, force),
                Work::Notify { id, event } => {
                    self.dispatch_event(id, event);
                    Ok(())
                }
            };
            self.in_pass = false;
            if let Err(error) = result {
                tracing::warn!(%error, "queued work failed");
            }
        }
    }

    /// Consult a control's error boundary for a failed child. `Some` means
    /// the boundary supplied a placeholder and the failure stops here.
    fn boundary_placeholder(
        &mut self,
        id: ControlId,
        error: &RenderError,
    ) -> Option<MarkupNode> {
        let data = self.controls.get_mut(id)?;
        let placeholder = data.component.error_boundary(error)?;
        tracing::warn!(path = %data.path, %error, "error boundary supplied a placeholder");
        Some(placeholder)
    }

    /// Swap a fragment slot for a placeholder node and emit the matching
    /// replace op.
    fn replace_slot(&mut self, id: ControlId, at: &NodePath, placeholder: MarkupNode) {
        let data = &mut self.controls[id];
        if let Some(node) = at.get_mut(&mut data.fragment) {
            *node = placeholder.clone();
        }
        self.commits.push(Commit {
            control: id,
            ops: vec![PatchOp::ReplaceNode {
                path: at.clone(),
                node: placeholder,
            }],
        });
    }

    fn splice(
        &self,
        nodes: &[MarkupNode],
        base: &NodePath,
        children: &BTreeMap<NodePath, ControlId>,
    ) -> Vec<MarkupNode> {
        let mut out = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            let at = base.child(index);
            match node {
                MarkupNode::Component { .. } => {
                    match children
                        .get(&at)
                        .and_then(|child| self.controls.get(*child))
                    {
                        Some(child) => out.extend(self.splice(
                            &child.fragment,
                            &NodePath::root(),
                            &child.children,
                        )),
                        None => out.push(node.clone()),
                    }
                }
                MarkupNode::Element {
                    tag,
                    attributes,
                    key,
                    children: nested,
                } => out.push(MarkupNode::Element {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                    key: key.clone(),
                    children: self.splice(nested, &at, children),
                }),
                other => out.push(other.clone()),
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Fragment helpers
// ---------------------------------------------------------------------------

fn render_fragment(
    data: &ControlData,
    template: &Template,
) -> Result<Vec<MarkupNode>, RenderError> {
    let scope = build_scope(data);
    template.render(&scope)
}

/// Options at the bottom, component state above it, deferred values on
/// top. Later layers shadow earlier ones on name collisions.
fn build_scope(data: &ControlData) -> Scope {
    let mut scope = Scope::from_map(data.options.clone());
    let state = data.component.state();
    if !state.is_empty() {
        scope.push_layer(state);
    }
    if !data.deferred_state.is_empty() {
        scope.push_layer(data.deferred_state.clone());
    }
    scope
}

/// Point a ref chain at the first top-level element of a freshly rendered
/// fragment. Runs before the fragment is diffed, so handler writes ride
/// the same commit as the render itself. With no element the chain
/// detaches.
fn decorate_fragment(refs: &mut RefChain, fragment: &mut [MarkupNode]) {
    if refs.is_empty() {
        return;
    }
    let Some(index) = fragment
        .iter()
        .position(|node| matches!(node, MarkupNode::Element { .. }))
    else {
        refs.detach();
        return;
    };
    let at = NodePath(vec![index]);
    if let Some(MarkupNode::Element { tag, attributes, .. }) = at.get_mut(fragment) {
        refs.attach(&at, tag, attributes);
    }
}

/// Collect every component leaf in a fragment, walking through element
/// children. Slot paths are relative to the fragment root.
fn component_slots(fragment: &[MarkupNode]) -> Vec<ComponentSlot> {
    let mut slots = Vec::new();
    collect_slots(fragment, &NodePath::root(), &mut slots);
    slots
}

fn collect_slots(nodes: &[MarkupNode], base: &NodePath, out: &mut Vec<ComponentSlot>) {
    for (index, node) in nodes.iter().enumerate() {
        let at = base.child(index);
        match node {
            MarkupNode::Component { path, options, key } => out.push(ComponentSlot {
                at,
                path: path.clone(),
                key: key.clone(),
                options: options.clone(),
            }),
            MarkupNode::Element { children, .. } => collect_slots(children, &at, out),
            _ => {}
        }
    }
}

fn slot_info(fragment: &[MarkupNode]) -> BTreeMap<NodePath, (ComponentPath, Option<String>)> {
    component_slots(fragment)
        .into_iter()
        .map(|slot| (slot.at, (slot.path, slot.key)))
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
