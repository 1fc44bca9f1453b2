// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::sync::Arc;

use crate::runtime::mem_tracker::MemTracker;

use super::AggStatePtr;

/// Bump allocator for aggregate states.
///
/// Blocks are zero-initialized and never freed until the arena drops, so
/// every [`AggStatePtr`] handed out stays valid for the arena's lifetime.
#[derive(Debug)]
pub struct AggStateArena {
    blocks: Vec<Box<[u8]>>,
    cursor: usize,
    block_size: usize,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl AggStateArena {
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            cursor: 0,
            block_size: block_size.max(1),
            mem_tracker: None,
            accounted_bytes: 0,
        }
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        let bytes = self.blocks.iter().map(|b| b.len()).sum::<usize>();
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        tracker.consume(bytes);
        self.mem_tracker = Some(tracker);
        self.accounted_bytes = bytes;
    }

    pub fn alloc(&mut self, size: usize, align: usize) -> AggStatePtr {
        let align_mask = align.saturating_sub(1);
        let needed = size.max(1);
        if self.blocks.is_empty() || self.remaining() < needed + align_mask {
            self.grow(needed + align_mask);
        }
        let block = self.blocks.last_mut().expect("arena block");
        let base = block.as_mut_ptr() as usize;
        let cursor = (base + self.cursor + align_mask) & !align_mask;
        self.cursor = cursor - base + needed;
        cursor
    }

    fn remaining(&self) -> usize {
        self.blocks
            .last()
            .map(|b| b.len() - self.cursor)
            .unwrap_or(0)
    }

    fn grow(&mut self, needed: usize) {
        let block_size = self.block_size.max(needed);
        self.blocks.push(vec![0u8; block_size].into_boxed_slice());
        self.block_size = self.block_size.max(block_size);
        self.cursor = 0;
        if let Some(tracker) = self.mem_tracker.as_ref() {
            let bytes = i64::try_from(block_size).unwrap_or(i64::MAX);
            tracker.consume(bytes);
            self.accounted_bytes = self.accounted_bytes.saturating_add(bytes);
        }
    }
}

impl Drop for AggStateArena {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_respects_alignment() {
        let mut arena = AggStateArena::new(64);
        for _ in 0..100 {
            let ptr = arena.alloc(24, 16);
            assert_eq!(ptr % 16, 0);
        }
    }

    #[test]
    fn alloc_larger_than_block_size_still_succeeds() {
        let mut arena = AggStateArena::new(8);
        let ptr = arena.alloc(256, 8);
        assert_eq!(ptr % 8, 0);
    }
}
