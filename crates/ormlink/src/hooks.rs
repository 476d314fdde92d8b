//! Lifecycle hooks.
//!
//! Models attach hooks around `save`/`remove`; associations attach them
//! around link replacement and removal. Hooks run synchronously in
//! registration order. A failing `before_*` hook aborts the operation before
//! any driver call; a failing `after_*` hook is logged and ignored since the
//! write already happened.

use std::fmt;
use std::sync::Arc;

use ormlink_core::Result;

use crate::instance::Instance;

/// A hook callback.
pub type Hook = Arc<dyn Fn(&Instance) -> Result<()> + Send + Sync>;

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeSave,
    AfterSave,
    BeforeRemove,
    AfterRemove,
}

impl HookEvent {
    const fn is_before(self) -> bool {
        matches!(self, HookEvent::BeforeSave | HookEvent::BeforeRemove)
    }
}

/// An ordered set of hooks per event.
#[derive(Clone, Default)]
pub struct Hooks {
    before_save: Vec<Hook>,
    after_save: Vec<Hook>,
    before_remove: Vec<Hook>,
    after_remove: Vec<Hook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_save", &self.before_save.len())
            .field("after_save", &self.after_save.len())
            .field("before_remove", &self.before_remove.len())
            .field("after_remove", &self.after_remove.len())
            .finish()
    }
}

impl Hooks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for `event`.
    #[must_use]
    pub fn on(
        mut self,
        event: HookEvent,
        hook: impl Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.slot_mut(event).push(Arc::new(hook));
        self
    }

    /// Register a `before_save` hook.
    #[must_use]
    pub fn before_save(self, hook: impl Fn(&Instance) -> Result<()> + Send + Sync + 'static) -> Self {
        self.on(HookEvent::BeforeSave, hook)
    }

    /// Register an `after_save` hook.
    #[must_use]
    pub fn after_save(self, hook: impl Fn(&Instance) -> Result<()> + Send + Sync + 'static) -> Self {
        self.on(HookEvent::AfterSave, hook)
    }

    /// Register a `before_remove` hook.
    #[must_use]
    pub fn before_remove(
        self,
        hook: impl Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(HookEvent::BeforeRemove, hook)
    }

    /// Register an `after_remove` hook.
    #[must_use]
    pub fn after_remove(
        self,
        hook: impl Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on(HookEvent::AfterRemove, hook)
    }

    fn slot(&self, event: HookEvent) -> &[Hook] {
        match event {
            HookEvent::BeforeSave => &self.before_save,
            HookEvent::AfterSave => &self.after_save,
            HookEvent::BeforeRemove => &self.before_remove,
            HookEvent::AfterRemove => &self.after_remove,
        }
    }

    fn slot_mut(&mut self, event: HookEvent) -> &mut Vec<Hook> {
        match event {
            HookEvent::BeforeSave => &mut self.before_save,
            HookEvent::AfterSave => &mut self.after_save,
            HookEvent::BeforeRemove => &mut self.before_remove,
            HookEvent::AfterRemove => &mut self.after_remove,
        }
    }

    /// Whether any hook is registered for `event`.
    #[must_use]
    pub fn has(&self, event: HookEvent) -> bool {
        !self.slot(event).is_empty()
    }

    /// Run the hooks for `event` against `instance`.
    ///
    /// Before-hooks stop at the first error and return it. After-hook errors
    /// are logged and swallowed.
    pub(crate) fn run(&self, event: HookEvent, instance: &Instance) -> Result<()> {
        for hook in self.slot(event) {
            if let Err(e) = hook(instance) {
                if event.is_before() {
                    tracing::debug!(event = ?event, error = %e, "Hook aborted operation");
                    return Err(e);
                }
                tracing::warn!(
                    event = ?event,
                    model = instance.model().name(),
                    error = %e,
                    "After-hook failed; operation already applied"
                );
            }
        }
        Ok(())
    }
}
