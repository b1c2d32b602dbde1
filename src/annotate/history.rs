use std::collections::VecDeque;

use slab::Slab;

use crate::annotate::error::AnnotateError;

/// A reversible edit recorded by [`UndoableCommandStack`].
pub trait UndoCommand {
    type Target: ?Sized;

    fn redo(&self, target: &mut Self::Target) -> Result<(), AnnotateError>;

    fn undo(&self, target: &mut Self::Target) -> Result<(), AnnotateError>;

    fn description(&self) -> &str;

    fn is_merge_eligible(&self) -> bool {
        false
    }

    /// Folds `newer` into `self` when both are the same logical edit.
    /// Returns `false` and leaves `self` untouched otherwise.
    fn merge_with(&mut self, _newer: &Self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Recorded,
    Merged,
}

/// Linear undo history over an arena of commands.
///
/// `order` holds arena keys oldest first; the first `applied` of them are
/// undoable, the rest are redoable. Truncation and eviction only touch the
/// ends of `order`.
pub struct UndoableCommandStack<C> {
    arena: Slab<C>,
    order: VecDeque<usize>,
    applied: usize,
    capacity: usize,
}

impl<C: UndoCommand> Default for UndoableCommandStack<C> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<C> std::fmt::Debug for UndoableCommandStack<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoableCommandStack")
            .field("len", &self.order.len())
            .field("applied", &self.applied)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<C: UndoCommand> UndoableCommandStack<C> {
    /// `capacity == 0` keeps every entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: Slab::new(),
            order: VecDeque::new(),
            applied: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.order.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        let key = *self.order.get(self.applied.checked_sub(1)?)?;
        self.arena.get(key).map(UndoCommand::description)
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict();
    }

    /// Records an already applied command, coalescing it with the top entry
    /// when both agree. Any redo history is discarded first.
    pub fn push(&mut self, command: C) -> PushOutcome {
        self.truncate_redo();

        if command.is_merge_eligible() {
            if let Some(top) = self.order.back().and_then(|key| self.arena.get_mut(*key)) {
                if top.merge_with(&command) {
                    tracing::trace!(description = command.description(), "merged undo entry");
                    return PushOutcome::Merged;
                }
            }
        }

        tracing::debug!(description = command.description(), "recorded undo entry");
        let key = self.arena.insert(command);
        self.order.push_back(key);
        self.applied = self.order.len();
        self.evict();
        PushOutcome::Recorded
    }

    /// Applies `command` and records it. A command that fails to apply is
    /// dropped and the history is left as it was.
    pub fn push_and_redo(
        &mut self,
        command: C,
        target: &mut C::Target,
    ) -> Result<PushOutcome, AnnotateError> {
        if let Err(err) = command.redo(target) {
            tracing::warn!(description = command.description(), %err, "command not applied");
            return Err(err);
        }
        Ok(self.push(command))
    }

    pub fn undo(&mut self, target: &mut C::Target) -> Result<(), AnnotateError> {
        if self.applied == 0 {
            return Err(AnnotateError::illegal("undo", "nothing to undo"));
        }
        let command = self.command_at(self.applied - 1)?;
        command.undo(target)?;
        tracing::debug!(description = command.description(), "undo");
        self.applied -= 1;
        Ok(())
    }

    pub fn redo(&mut self, target: &mut C::Target) -> Result<(), AnnotateError> {
        if !self.can_redo() {
            return Err(AnnotateError::illegal("redo", "nothing to redo"));
        }
        let command = self.command_at(self.applied)?;
        command.redo(target)?;
        tracing::debug!(description = command.description(), "redo");
        self.applied += 1;
        Ok(())
    }

    fn command_at(&self, position: usize) -> Result<&C, AnnotateError> {
        self.order
            .get(position)
            .and_then(|key| self.arena.get(*key))
            .ok_or_else(|| AnnotateError::illegal("history", "entry missing from arena"))
    }

    fn truncate_redo(&mut self) {
        while self.order.len() > self.applied {
            if let Some(key) = self.order.pop_back() {
                self.arena.remove(key);
            }
        }
    }

    fn evict(&mut self) {
        if self.capacity == 0 {
            return;
        }
        while self.order.len() > self.capacity {
            // Oldest undo entry first; with nothing undoable left, shed the
            // furthest redo entry so the next redo stays valid.
            let key = if self.applied > 0 {
                self.applied -= 1;
                self.order.pop_front()
            } else {
                self.order.pop_back()
            };
            if let Some(key) = key {
                self.arena.remove(key);
            }
        }
    }
}
