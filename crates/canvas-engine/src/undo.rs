//! Undo/redo history of graph snapshots
//!
//! Each entry is a zstd-compressed JSON [`GraphSnapshot`]. Restoring an
//! entry goes through [`FlowEngine::restore`](crate::FlowEngine::restore),
//! so history can never reintroduce an invalid graph.

use std::collections::VecDeque;
use std::marker::PhantomData;

use crate::error::{EngineError, Result};
use crate::persistence::GraphSnapshot;
use crate::types::NodeState;

const COMPRESSION_LEVEL: i32 = 3;

/// Undo/redo stack using compressed snapshots
pub struct UndoStack<S> {
    snapshots: VecDeque<Vec<u8>>,
    /// Position of the current snapshot
    current: usize,
    max_snapshots: usize,
    _state: PhantomData<fn() -> S>,
}

impl<S: NodeState> UndoStack<S> {
    /// Create a new undo stack with the specified maximum size
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            max_snapshots: max_snapshots.max(1),
            _state: PhantomData,
        }
    }

    /// Push a new snapshot, discarding any redo history
    pub fn push(&mut self, snapshot: &GraphSnapshot<S>) -> Result<()> {
        let json = serde_json::to_vec(snapshot)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| EngineError::Compression(e.to_string()))?;

        while self.snapshots.len() > self.current + 1 {
            self.snapshots.pop_back();
        }

        self.snapshots.push_back(compressed);
        self.current = self.snapshots.len() - 1;

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
            self.current = self.current.saturating_sub(1);
        }

        Ok(())
    }

    /// Step back one snapshot; `None` at the beginning of history
    pub fn undo(&mut self) -> Option<Result<GraphSnapshot<S>>> {
        if self.can_undo() {
            self.current -= 1;
            Some(self.decompress(self.current))
        } else {
            None
        }
    }

    /// Step forward one snapshot; `None` at the end of history
    pub fn redo(&mut self) -> Option<Result<GraphSnapshot<S>>> {
        if self.can_redo() {
            self.current += 1;
            Some(self.decompress(self.current))
        } else {
            None
        }
    }

    /// The current snapshot without moving
    pub fn current(&self) -> Option<Result<GraphSnapshot<S>>> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.decompress(self.current))
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = 0;
    }

    /// Total compressed size of all snapshots in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(|s| s.len()).sum()
    }

    fn decompress(&self, index: usize) -> Result<GraphSnapshot<S>> {
        let json = zstd::decode_all(&self.snapshots[index][..])
            .map_err(|e| EngineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl<S: NodeState> Default for UndoStack<S> {
    fn default() -> Self {
        Self::new(100)
    }
}
