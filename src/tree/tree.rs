//! # Tree Algorithms
//!
//! Lookup, emplace, erase, in-place update, clear, ordered seek, and the
//! diagnostic dump, all expressed against the [`ReadScope`]/[`TxScope`]
//! seam. The tree itself holds no state beyond the anchor in the region
//! header (root link, entry count, generation); every algorithm here is a
//! walk over region bytes.
//!
//! ## Emplace
//!
//! Descend consuming node prefixes and one branch byte per node. The descent
//! ends at one of six outcomes: the key exists (no overwrite, emplace
//! semantics), the tree is empty, the key ends at a node missing a terminal,
//! a branch byte is absent, or the key diverges from an existing leaf or
//! inside a node's prefix. The divergence cases splice a fresh branch node:
//! all new blocks are allocated and fully wired first, then the single
//! pre-existing link is rewritten (after a snapshot), so the structure flips
//! from old to new in one slot write.
//!
//! ## Erase
//!
//! Detach the leaf, then re-merge: a node left with one child and no
//! terminal is replaced by that child with `prefix + branch byte + child
//! prefix` as the child's new prefix; a node left with only its terminal is
//! replaced by that leaf. A node holding a terminal plus one child is left
//! alone. Frees are deferred to commit, so an abort mid-erase cannot leave a
//! link pointing at reclaimed space.
//!
//! ## Writers and Readers
//!
//! [`RadixTree`] borrows a transaction scope mutably and offers the full
//! API. [`TreeReader`] borrows a region immutably for lookups and cursors
//! with no transaction at all.

use std::io::Write;
use std::marker::PhantomData;

use eyre::{ensure, Result};

use super::cursor::{Cursor, Step};
use super::leaf::{self, LeafRef};
use super::node::{self, NodeRef, SLOT_SIZE};
use super::relptr::{self, RELPTR_SIZE};
use super::{block_kind, Value, KIND_LEAF};
use crate::region::Region;
use crate::storage::header::{
    RegionHeader, ANCHOR_LEN, ANCHOR_POS, FLAGS_POS, FLAG_VALUE_SIZE_SET, ROOT_FIELD_POS,
    VALUE_SIZE_POS,
};
use crate::tx::{ReadScope, TxScope};

fn tree_root(scope: &impl ReadScope) -> Result<Option<u64>> {
    Ok(RegionHeader::ref_from(scope.bytes())?.root())
}

fn tree_generation(scope: &impl ReadScope) -> Result<u64> {
    Ok(RegionHeader::ref_from(scope.bytes())?.generation())
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Rewrites the link field at `at` inside the current transaction.
fn write_link<S: TxScope>(scope: &mut S, at: u64, target: Option<u64>) -> Result<()> {
    scope.snapshot(at, RELPTR_SIZE)?;
    relptr::write_at(scope.bytes_mut(), at, target)
}

/// Adjusts the entry count and bumps the generation, invalidating cursors.
fn bump_anchor<S: TxScope>(scope: &mut S, entry_delta: i64) -> Result<()> {
    scope.snapshot(ANCHOR_POS, ANCHOR_LEN)?;
    let header = RegionHeader::mut_from(scope.bytes_mut())?;
    let count = header.entry_count();
    header.set_entry_count(count.wrapping_add(entry_delta as u64));
    let generation = header.generation();
    header.set_generation(generation + 1);
    Ok(())
}

/// Walks from the root to the leaf holding `key`, or `None` if absent.
fn find_leaf(scope: &impl ReadScope, key: &[u8]) -> Result<Option<u64>> {
    let bytes = scope.bytes();
    let Some(mut cur) = tree_root(scope)? else {
        return Ok(None);
    };
    let mut depth = 0usize;
    loop {
        if block_kind(bytes, cur)? == KIND_LEAF {
            let lkey = LeafRef::read(bytes, cur)?.key()?;
            return Ok((lkey == key).then_some(cur));
        }
        let node = NodeRef::read(bytes, cur)?;
        let prefix = node.prefix()?;
        let rem = &key[depth..];
        if rem.len() < prefix.len() || &rem[..prefix.len()] != prefix {
            return Ok(None);
        }
        depth += prefix.len();
        if depth == key.len() {
            return Ok(node.terminal());
        }
        match node.search(key[depth])? {
            Ok(idx) => {
                cur = node.slot_child(idx)?;
                depth += 1;
            }
            Err(_) => return Ok(None),
        }
    }
}

/// Positions a cursor at the first entry with key >= `key` (lower bound).
fn seek<V: Value>(scope: &impl ReadScope, key: &[u8]) -> Result<Cursor<V>> {
    let mut cursor = Cursor::new(tree_generation(scope)?);
    let Some(mut cur) = tree_root(scope)? else {
        return Ok(cursor);
    };
    let bytes = scope.bytes();
    let mut depth = 0usize;
    loop {
        if block_kind(bytes, cur)? == KIND_LEAF {
            let lkey = LeafRef::read(bytes, cur)?.key()?;
            if lkey >= key {
                cursor.place_at_leaf(cur);
            } else {
                cursor.step_forward(scope)?;
            }
            return Ok(cursor);
        }

        let node = NodeRef::read(bytes, cur)?;
        let prefix = node.prefix()?;
        let rem = &key[depth..];
        let d = common_prefix(rem, prefix);

        if d == prefix.len() {
            if rem.len() == prefix.len() {
                // The key ends exactly at this node; its smallest entry
                // (terminal first) is the bound.
                cursor.descend_min(scope, cur)?;
                return Ok(cursor);
            }
            match node.search(rem[d])? {
                Ok(idx) => {
                    cursor.push(cur, Step::Child(idx as u16));
                    cur = node.slot_child(idx)?;
                    depth += prefix.len() + 1;
                }
                Err(idx) => {
                    if idx < node.child_count() {
                        cursor.push(cur, Step::Child(idx as u16));
                        let child = node.slot_child(idx)?;
                        cursor.descend_min(scope, child)?;
                    } else {
                        push_last_exit(&mut cursor, &node, cur);
                        cursor.step_forward(scope)?;
                    }
                    return Ok(cursor);
                }
            }
        } else if rem.len() == d || rem[d] < prefix[d] {
            // Every key below this node is greater than the query.
            cursor.descend_min(scope, cur)?;
            return Ok(cursor);
        } else {
            // Every key below this node is smaller; the bound is the
            // successor of the whole subtree.
            push_last_exit(&mut cursor, &node, cur);
            cursor.step_forward(scope)?;
            return Ok(cursor);
        }
    }
}

fn push_last_exit<V: Value>(cursor: &mut Cursor<V>, node: &NodeRef<'_>, pos: u64) {
    if node.child_count() == 0 {
        cursor.push(pos, Step::Terminal);
    } else {
        cursor.push(pos, Step::Child((node.child_count() - 1) as u16));
    }
}

fn cursor_first<V: Value>(scope: &impl ReadScope) -> Result<Cursor<V>> {
    let mut cursor = Cursor::new(tree_generation(scope)?);
    if let Some(root) = tree_root(scope)? {
        cursor.descend_min(scope, root)?;
    }
    Ok(cursor)
}

fn cursor_last<V: Value>(scope: &impl ReadScope) -> Result<Cursor<V>> {
    let mut cursor = Cursor::new(tree_generation(scope)?);
    if let Some(root) = tree_root(scope)? {
        cursor.descend_max(scope, root)?;
    }
    Ok(cursor)
}

fn cursor_upper<V: Value>(scope: &impl ReadScope, key: &[u8]) -> Result<Cursor<V>> {
    let mut cursor = seek::<V>(scope, key)?;
    if cursor.valid() && cursor.key(scope)? == key {
        cursor.step_forward(scope)?;
    }
    Ok(cursor)
}

fn find_cursor<V: Value>(scope: &impl ReadScope, key: &[u8]) -> Result<Option<Cursor<V>>> {
    let cursor = seek::<V>(scope, key)?;
    if cursor.valid() && cursor.key(scope)? == key {
        Ok(Some(cursor))
    } else {
        Ok(None)
    }
}

/// One line per block reachable from the root, preorder.
fn dump_tree(scope: &impl ReadScope, w: &mut dyn Write) -> Result<()> {
    let bytes = scope.bytes();
    let Some(root) = tree_root(scope)? else {
        writeln!(w, "(empty tree)")?;
        return Ok(());
    };
    writeln!(w, "root @{}", root)?;

    let mut stack = vec![root];
    while let Some(pos) = stack.pop() {
        if block_kind(bytes, pos)? == KIND_LEAF {
            let lf = LeafRef::read(bytes, pos)?;
            writeln!(w, "leaf @{} key=\"{}\"", pos, lf.key()?.escape_ascii())?;
            continue;
        }

        let nd = NodeRef::read(bytes, pos)?;
        write!(w, "node @{} prefix=\"{}\"", pos, nd.prefix()?.escape_ascii())?;
        if let Some(t) = nd.terminal() {
            write!(w, " terminal=@{}", t)?;
        }
        if nd.child_count() > 0 {
            write!(w, " children:")?;
            for idx in 0..nd.child_count() {
                write!(
                    w,
                    " {}->@{}",
                    nd.slot_byte(idx)?.escape_ascii(),
                    nd.slot_child(idx)?
                )?;
            }
        }
        writeln!(w)?;

        for idx in (0..nd.child_count()).rev() {
            stack.push(nd.slot_child(idx)?);
        }
        if let Some(t) = nd.terminal() {
            stack.push(t);
        }
    }
    Ok(())
}

/// Where the emplace descent ended.
enum Emplace {
    Exists,
    NewRoot,
    SetTerminal { node: u64 },
    AddChild { node: u64, byte: u8 },
    SplitLeaf { link: u64, leaf: u64, depth: usize },
    SplitNode { link: u64, node: u64, depth: usize, diverge: usize },
}

fn plan_emplace(scope: &impl ReadScope, key: &[u8]) -> Result<Emplace> {
    let Some(root) = tree_root(scope)? else {
        return Ok(Emplace::NewRoot);
    };
    let bytes = scope.bytes();
    let mut link = ROOT_FIELD_POS;
    let mut cur = root;
    let mut depth = 0usize;
    loop {
        if block_kind(bytes, cur)? == KIND_LEAF {
            let lkey = LeafRef::read(bytes, cur)?.key()?;
            if lkey == key {
                return Ok(Emplace::Exists);
            }
            return Ok(Emplace::SplitLeaf { link, leaf: cur, depth });
        }

        let node = NodeRef::read(bytes, cur)?;
        let prefix = node.prefix()?;
        let rem = &key[depth..];
        let d = common_prefix(rem, prefix);
        if d < prefix.len() {
            return Ok(Emplace::SplitNode { link, node: cur, depth, diverge: d });
        }
        depth += prefix.len();
        if depth == key.len() {
            return match node.terminal() {
                Some(_) => Ok(Emplace::Exists),
                None => Ok(Emplace::SetTerminal { node: cur }),
            };
        }
        match node.search(key[depth])? {
            Ok(idx) => {
                link = node.slots_pos()? + (idx * SLOT_SIZE) as u64 + 8;
                cur = node.slot_child(idx)?;
                depth += 1;
            }
            Err(_) => return Ok(Emplace::AddChild { node: cur, byte: key[depth] }),
        }
    }
}

/// What remains of a node after a detach, and what to do about it.
enum Shape {
    Keep,
    ReplaceWithTerminal(u64),
    Merge { byte: u8, child: u64, prefix: Vec<u8> },
}

/// Re-merges a node left under-occupied by an erase. `link` is the field
/// referencing `node_pos` (a parent slot or the root field).
fn collapse<S: TxScope>(scope: &mut S, node_pos: u64, link: u64) -> Result<()> {
    let shape = {
        let view = NodeRef::read(scope.bytes(), node_pos)?;
        match (view.child_count(), view.terminal()) {
            (0, Some(t)) => Shape::ReplaceWithTerminal(t),
            (1, None) => Shape::Merge {
                byte: view.slot_byte(0)?,
                child: view.slot_child(0)?,
                prefix: view.prefix()?.to_vec(),
            },
            _ => Shape::Keep,
        }
    };

    match shape {
        Shape::Keep => Ok(()),
        Shape::ReplaceWithTerminal(t) => {
            write_link(scope, link, Some(t))?;
            node::free_node(scope, node_pos)
        }
        Shape::Merge { byte, child, mut prefix } => {
            if block_kind(scope.bytes(), child)? != KIND_LEAF {
                let child_prefix = NodeRef::read(scope.bytes(), child)?.prefix()?.to_vec();
                prefix.push(byte);
                prefix.extend_from_slice(&child_prefix);
                node::set_prefix(scope, child, &prefix)?;
            }
            write_link(scope, link, Some(child))?;
            node::free_node(scope, node_pos)
        }
    }
}

enum Detach {
    Root { leaf: u64 },
    Terminal { node: u64, link: u64, leaf: u64 },
    Slot { node: u64, link: u64, idx: usize, leaf: u64 },
}

fn plan_erase(scope: &impl ReadScope, key: &[u8]) -> Result<Option<Detach>> {
    let Some(root) = tree_root(scope)? else {
        return Ok(None);
    };
    let bytes = scope.bytes();

    if block_kind(bytes, root)? == KIND_LEAF {
        let lkey = LeafRef::read(bytes, root)?.key()?;
        return Ok((lkey == key).then_some(Detach::Root { leaf: root }));
    }

    let mut cur = root;
    let mut link = ROOT_FIELD_POS;
    let mut depth = 0usize;
    loop {
        let node = NodeRef::read(bytes, cur)?;
        let prefix = node.prefix()?;
        let rem = &key[depth..];
        if rem.len() < prefix.len() || &rem[..prefix.len()] != prefix {
            return Ok(None);
        }
        depth += prefix.len();
        if depth == key.len() {
            return Ok(node
                .terminal()
                .map(|t| Detach::Terminal { node: cur, link, leaf: t }));
        }
        let idx = match node.search(key[depth])? {
            Ok(idx) => idx,
            Err(_) => return Ok(None),
        };
        let child = node.slot_child(idx)?;
        depth += 1;
        if block_kind(bytes, child)? == KIND_LEAF {
            let lkey = LeafRef::read(bytes, child)?.key()?;
            return Ok((lkey == key).then_some(Detach::Slot {
                node: cur,
                link,
                idx,
                leaf: child,
            }));
        }
        link = node.slots_pos()? + (idx * SLOT_SIZE) as u64 + 8;
        cur = child;
    }
}

/// Mutable handle to the tree stored in a region, bound to a transaction.
pub struct RadixTree<'a, S: TxScope, V: Value> {
    scope: &'a mut S,
    _values: PhantomData<fn() -> V>,
}

impl<'a, S: TxScope, V: Value> RadixTree<'a, S, V> {
    /// Binds to the tree in `scope`'s region, recording `size_of::<V>()` in
    /// the header on first use and refusing a mismatched value type after.
    pub fn new(scope: &'a mut S) -> Result<Self> {
        let size = std::mem::size_of::<V>() as u32;
        let header = RegionHeader::ref_from(scope.bytes())?;
        if header.value_size_set() {
            ensure!(
                header.value_size() == size,
                "region stores {}-byte values but a {}-byte value type was requested",
                header.value_size(),
                size
            );
        } else {
            let flags = header.flags();
            scope.snapshot(VALUE_SIZE_POS, 4)?;
            scope.snapshot(FLAGS_POS, 4)?;
            let header = RegionHeader::mut_from(scope.bytes_mut())?;
            header.set_value_size(size);
            header.set_flags(flags | FLAG_VALUE_SIZE_SET);
        }
        Ok(Self { scope, _values: PhantomData })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(RegionHeader::ref_from(self.scope.bytes())?.entry_count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<V>> {
        match find_leaf(&*self.scope, key)? {
            Some(pos) => Ok(Some(leaf::read_value(self.scope.bytes(), pos)?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(find_leaf(&*self.scope, key)?.is_some())
    }

    /// Cursor at `key`, or `None` if absent.
    pub fn find(&self, key: &[u8]) -> Result<Option<Cursor<V>>> {
        find_cursor(&*self.scope, key)
    }

    /// Inserts `key -> value` unless the key is present. Never overwrites;
    /// returns a cursor at the key and whether an insert happened.
    ///
    /// On an allocation error the structure is untouched but blocks
    /// allocated before the failure stay reserved until the transaction is
    /// aborted; committing instead leaks them.
    pub fn try_emplace(&mut self, key: &[u8], value: V) -> Result<(Cursor<V>, bool)> {
        match plan_emplace(&*self.scope, key)? {
            Emplace::Exists => {
                let cursor = seek::<V>(&*self.scope, key)?;
                return Ok((cursor, false));
            }
            Emplace::NewRoot => {
                let new_leaf = leaf::create_leaf(self.scope, key, &value)?;
                write_link(self.scope, ROOT_FIELD_POS, Some(new_leaf))?;
            }
            Emplace::SetTerminal { node } => {
                let new_leaf = leaf::create_leaf(self.scope, key, &value)?;
                node::set_terminal(self.scope, node, Some(new_leaf))?;
            }
            Emplace::AddChild { node, byte } => {
                let new_leaf = leaf::create_leaf(self.scope, key, &value)?;
                node::insert_child(self.scope, node, byte, new_leaf)?;
            }
            Emplace::SplitLeaf { link, leaf: existing, depth } => {
                let existing_key = LeafRef::read(self.scope.bytes(), existing)?.key()?.to_vec();
                let d = common_prefix(&existing_key[depth..], &key[depth..]);
                let fork = depth + d;

                let new_leaf = leaf::create_leaf(self.scope, key, &value)?;
                let branch = if key.len() == fork {
                    let branch =
                        node::create_node(self.scope, &key[depth..fork], Some(new_leaf))?;
                    node::insert_child(self.scope, branch, existing_key[fork], existing)?;
                    branch
                } else if existing_key.len() == fork {
                    let branch =
                        node::create_node(self.scope, &key[depth..fork], Some(existing))?;
                    node::insert_child(self.scope, branch, key[fork], new_leaf)?;
                    branch
                } else {
                    let branch = node::create_node(self.scope, &key[depth..fork], None)?;
                    node::insert_child(self.scope, branch, existing_key[fork], existing)?;
                    node::insert_child(self.scope, branch, key[fork], new_leaf)?;
                    branch
                };
                write_link(self.scope, link, Some(branch))?;
            }
            Emplace::SplitNode { link, node: old, depth, diverge } => {
                let prefix = NodeRef::read(self.scope.bytes(), old)?.prefix()?.to_vec();
                let rem_len = key.len() - depth;

                let new_leaf = leaf::create_leaf(self.scope, key, &value)?;
                let branch = if rem_len == diverge {
                    node::create_node(self.scope, &prefix[..diverge], Some(new_leaf))?
                } else {
                    let branch = node::create_node(self.scope, &prefix[..diverge], None)?;
                    node::insert_child(self.scope, branch, key[depth + diverge], new_leaf)?;
                    branch
                };
                node::insert_child(self.scope, branch, prefix[diverge], old)?;
                node::set_prefix(self.scope, old, &prefix[diverge + 1..])?;
                write_link(self.scope, link, Some(branch))?;
            }
        }

        bump_anchor(self.scope, 1)?;
        let cursor = seek::<V>(&*self.scope, key)?;
        Ok((cursor, true))
    }

    /// Removes `key`, re-merging the tree around the hole. False if absent.
    pub fn erase(&mut self, key: &[u8]) -> Result<bool> {
        let Some(plan) = plan_erase(&*self.scope, key)? else {
            return Ok(false);
        };
        match plan {
            Detach::Root { leaf } => {
                leaf::free_leaf(self.scope, leaf)?;
                write_link(self.scope, ROOT_FIELD_POS, None)?;
            }
            Detach::Terminal { node, link, leaf } => {
                leaf::free_leaf(self.scope, leaf)?;
                node::set_terminal(self.scope, node, None)?;
                collapse(self.scope, node, link)?;
            }
            Detach::Slot { node, link, idx, leaf } => {
                leaf::free_leaf(self.scope, leaf)?;
                node::remove_child_at(self.scope, node, idx)?;
                collapse(self.scope, node, link)?;
            }
        }
        bump_anchor(self.scope, -1)?;
        Ok(true)
    }

    /// Durably rewrites the value for `key` in place. Not a structural
    /// change: cursors stay valid and the generation is not bumped.
    pub fn update(&mut self, key: &[u8], value: &V) -> Result<bool> {
        let Some(pos) = find_leaf(&*self.scope, key)? else {
            return Ok(false);
        };
        self.scope
            .snapshot(leaf::value_pos(pos), std::mem::size_of::<V>())?;
        leaf::write_value(self.scope.bytes_mut(), pos, value)?;
        Ok(true)
    }

    /// Frees every block reachable from the root and empties the anchor.
    pub fn clear(&mut self) -> Result<()> {
        let Some(root) = tree_root(&*self.scope)? else {
            return Ok(());
        };

        let mut stack = vec![root];
        while let Some(pos) = stack.pop() {
            if block_kind(self.scope.bytes(), pos)? == KIND_LEAF {
                leaf::free_leaf(self.scope, pos)?;
                continue;
            }
            {
                let view = NodeRef::read(self.scope.bytes(), pos)?;
                if let Some(t) = view.terminal() {
                    stack.push(t);
                }
                for idx in 0..view.child_count() {
                    stack.push(view.slot_child(idx)?);
                }
            }
            node::free_node(self.scope, pos)?;
        }

        write_link(self.scope, ROOT_FIELD_POS, None)?;
        self.scope.snapshot(ANCHOR_POS, ANCHOR_LEN)?;
        let header = RegionHeader::mut_from(self.scope.bytes_mut())?;
        header.set_entry_count(0);
        let generation = header.generation();
        header.set_generation(generation + 1);
        Ok(())
    }

    pub fn cursor_first(&self) -> Result<Cursor<V>> {
        cursor_first(&*self.scope)
    }

    pub fn cursor_last(&self) -> Result<Cursor<V>> {
        cursor_last(&*self.scope)
    }

    /// First entry with key >= `key`.
    pub fn cursor_seek(&self, key: &[u8]) -> Result<Cursor<V>> {
        seek(&*self.scope, key)
    }

    /// First entry with key > `key`.
    pub fn cursor_upper(&self, key: &[u8]) -> Result<Cursor<V>> {
        cursor_upper(&*self.scope, key)
    }

    /// Overwrites the value at a cursor position through this tree's scope.
    pub fn set_value(&mut self, cursor: &Cursor<V>, value: &V) -> Result<()> {
        cursor.set_value(self.scope, value)
    }

    /// Writes the reachable graph, one line per block.
    pub fn dump(&self, w: &mut dyn Write) -> Result<()> {
        dump_tree(&*self.scope, w)
    }

    /// The read side of the bound scope, for resolving cursors.
    pub fn scope(&self) -> &S {
        self.scope
    }
}

/// Read-only view of the tree in a region. No transaction is held.
pub struct TreeReader<'a, V: Value> {
    region: &'a Region,
    _values: PhantomData<fn() -> V>,
}

impl<'a, V: Value> TreeReader<'a, V> {
    pub fn new(region: &'a Region) -> Result<Self> {
        let header = RegionHeader::ref_from(region.bytes())?;
        if header.value_size_set() {
            let size = std::mem::size_of::<V>() as u32;
            ensure!(
                header.value_size() == size,
                "region stores {}-byte values but a {}-byte value type was requested",
                header.value_size(),
                size
            );
        }
        Ok(Self { region, _values: PhantomData })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(RegionHeader::ref_from(self.region.bytes())?.entry_count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<V>> {
        match find_leaf(self.region, key)? {
            Some(pos) => Ok(Some(leaf::read_value(self.region.bytes(), pos)?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(find_leaf(self.region, key)?.is_some())
    }

    pub fn find(&self, key: &[u8]) -> Result<Option<Cursor<V>>> {
        find_cursor(self.region, key)
    }

    pub fn cursor_first(&self) -> Result<Cursor<V>> {
        cursor_first(self.region)
    }

    pub fn cursor_last(&self) -> Result<Cursor<V>> {
        cursor_last(self.region)
    }

    pub fn cursor_seek(&self, key: &[u8]) -> Result<Cursor<V>> {
        seek(self.region, key)
    }

    pub fn cursor_upper(&self, key: &[u8]) -> Result<Cursor<V>> {
        cursor_upper(self.region, key)
    }

    pub fn dump(&self, w: &mut dyn Write) -> Result<()> {
        dump_tree(self.region, w)
    }

    /// Resolves a cursor's key against this reader's region.
    pub fn key<'s>(&'s self, cursor: &Cursor<V>) -> Result<&'s [u8]> {
        cursor.key(self.region)
    }

    pub fn value(&self, cursor: &Cursor<V>) -> Result<V> {
        cursor.value(self.region)
    }
}
