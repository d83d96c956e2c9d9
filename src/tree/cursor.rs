//! # Cursors
//!
//! A cursor marks one entry and can walk to its neighbors in key order. It
//! records the descent path as a stack of (node, exit) frames, so stepping to
//! a sibling never re-traverses from the root.
//!
//! A cursor is only meaningful against the tree shape it was positioned in.
//! Every structural mutation bumps the region generation; a cursor created
//! before the bump reports an error from every operation instead of walking
//! freed or rewired blocks. Value overwrites are not structural and leave
//! existing cursors usable.
//!
//! Past-the-end is a real cursor state: `valid` is false there, and stepping
//! past either end parks the cursor rather than wrapping.

use std::marker::PhantomData;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use super::leaf::{self, LeafRef};
use super::node::NodeRef;
use super::{block_kind, Value, KIND_LEAF};
use crate::storage::RegionHeader;
use crate::tx::{ReadScope, TxScope};

/// Which exit of a node the descent path took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The node's terminal leaf.
    Terminal,
    /// The child in this slot index.
    Child(u16),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub pos: u64,
    pub step: Step,
}

/// A position within the tree, stepped with [`advance`](Cursor::advance) and
/// [`prev`](Cursor::prev).
pub struct Cursor<V> {
    frames: SmallVec<[Frame; 16]>,
    leaf: Option<u64>,
    generation: u64,
    _values: PhantomData<fn() -> V>,
}

impl<V: Value> Cursor<V> {
    /// Past-the-end cursor for the given tree generation.
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            frames: SmallVec::new(),
            leaf: None,
            generation,
            _values: PhantomData,
        }
    }

    pub(crate) fn push(&mut self, pos: u64, step: Step) {
        self.frames.push(Frame { pos, step });
    }

    pub(crate) fn place_at_leaf(&mut self, leaf: u64) {
        self.leaf = Some(leaf);
    }

    /// Extends the path from `pos` down to the smallest key beneath it.
    pub(crate) fn descend_min(&mut self, scope: &impl ReadScope, mut pos: u64) -> Result<()> {
        let bytes = scope.bytes();
        loop {
            if block_kind(bytes, pos)? == KIND_LEAF {
                self.leaf = Some(pos);
                return Ok(());
            }
            let node = NodeRef::read(bytes, pos)?;
            if let Some(t) = node.terminal() {
                self.push(pos, Step::Terminal);
                self.leaf = Some(t);
                return Ok(());
            }
            ensure!(
                node.child_count() > 0,
                "node at {} has neither terminal nor children",
                pos
            );
            self.push(pos, Step::Child(0));
            pos = node.slot_child(0)?;
        }
    }

    /// Extends the path from `pos` down to the largest key beneath it.
    pub(crate) fn descend_max(&mut self, scope: &impl ReadScope, mut pos: u64) -> Result<()> {
        let bytes = scope.bytes();
        loop {
            if block_kind(bytes, pos)? == KIND_LEAF {
                self.leaf = Some(pos);
                return Ok(());
            }
            let node = NodeRef::read(bytes, pos)?;
            let count = node.child_count();
            if count > 0 {
                self.push(pos, Step::Child((count - 1) as u16));
                pos = node.slot_child(count - 1)?;
            } else if let Some(t) = node.terminal() {
                self.push(pos, Step::Terminal);
                self.leaf = Some(t);
                return Ok(());
            } else {
                eyre::bail!("node at {} has neither terminal nor children", pos);
            }
        }
    }

    /// Moves to the next entry after the current path, climbing as needed.
    pub(crate) fn step_forward(&mut self, scope: &impl ReadScope) -> Result<bool> {
        loop {
            let Some(top) = self.frames.last_mut() else {
                self.leaf = None;
                return Ok(false);
            };
            let node = NodeRef::read(scope.bytes(), top.pos)?;
            let next = match top.step {
                Step::Terminal => 0,
                Step::Child(i) => i as usize + 1,
            };
            if next < node.child_count() {
                top.step = Step::Child(next as u16);
                let child = node.slot_child(next)?;
                self.descend_min(scope, child)?;
                return Ok(true);
            }
            self.frames.pop();
        }
    }

    fn step_backward(&mut self, scope: &impl ReadScope) -> Result<bool> {
        loop {
            let Some(top) = self.frames.last_mut() else {
                self.leaf = None;
                return Ok(false);
            };
            let node = NodeRef::read(scope.bytes(), top.pos)?;
            match top.step {
                Step::Terminal => {
                    self.frames.pop();
                }
                Step::Child(i) if i > 0 => {
                    top.step = Step::Child(i - 1);
                    let child = node.slot_child(i as usize - 1)?;
                    self.descend_max(scope, child)?;
                    return Ok(true);
                }
                Step::Child(_) => {
                    if let Some(t) = node.terminal() {
                        top.step = Step::Terminal;
                        self.leaf = Some(t);
                        return Ok(true);
                    }
                    self.frames.pop();
                }
            }
        }
    }

    fn check_generation(&self, scope: &impl ReadScope) -> Result<()> {
        let current = RegionHeader::ref_from(scope.bytes())?.generation();
        ensure!(
            current == self.generation,
            "cursor is stale: tree generation is {} but cursor was positioned at {}",
            current,
            self.generation
        );
        Ok(())
    }

    /// Whether the cursor marks an entry (as opposed to past-the-end).
    pub fn valid(&self) -> bool {
        self.leaf.is_some()
    }

    /// Key of the marked entry.
    pub fn key<'s>(&self, scope: &'s impl ReadScope) -> Result<&'s [u8]> {
        self.check_generation(scope)?;
        let leaf = self
            .leaf
            .ok_or_else(|| eyre::eyre!("cursor is past the end"))?;
        LeafRef::read(scope.bytes(), leaf)?.key()
    }

    /// Value of the marked entry, copied out.
    pub fn value(&self, scope: &impl ReadScope) -> Result<V> {
        self.check_generation(scope)?;
        let leaf = self
            .leaf
            .ok_or_else(|| eyre::eyre!("cursor is past the end"))?;
        leaf::read_value(scope.bytes(), leaf)
    }

    /// Overwrites the marked entry's value in place. Transactional, and not
    /// a structural change: other cursors stay usable.
    pub fn set_value<S: TxScope>(&self, scope: &mut S, value: &V) -> Result<()> {
        self.check_generation(scope)?;
        let leaf = self
            .leaf
            .ok_or_else(|| eyre::eyre!("cursor is past the end"))?;
        scope.snapshot(leaf::value_pos(leaf), std::mem::size_of::<V>())?;
        leaf::write_value(scope.bytes_mut(), leaf, value)
    }

    /// Steps to the next entry in key order. Returns false once the cursor
    /// moves past the last entry; further calls keep returning false.
    pub fn advance(&mut self, scope: &impl ReadScope) -> Result<bool> {
        self.check_generation(scope)?;
        if self.leaf.is_none() {
            return Ok(false);
        }
        self.step_forward(scope)
    }

    /// Steps to the previous entry in key order. Returns false once the
    /// cursor moves before the first entry.
    pub fn prev(&mut self, scope: &impl ReadScope) -> Result<bool> {
        self.check_generation(scope)?;
        if self.leaf.is_none() {
            return Ok(false);
        }
        self.step_backward(scope)
    }
}
