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
//! Aggregation strategies for framed window aggregates.
//!
//! The default strategy is a segment tree of combined partial states giving
//! O(log N) per frame. Whole-partition frames use one state per partition
//! and broadcast the result; kernels with a dedicated sliding callback can
//! bypass the tree entirely.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::{concat, take};

use crate::common::error::{EngineError, Result};
use crate::exec::expr::agg::{AggKernel, AggStateArena, AggStatePtr};

use super::boundary_mask::BoundaryMask;
use super::bounds::BoundsBuffer;

/// Leaf block width of the segment tree.
const TREE_FANOUT: usize = 16;

/// One window aggregate computation over a hash group: fed batch by batch
/// during the first pass, finalized once, then queried per output batch.
pub(crate) trait WindowAggregator: Send {
    fn sink(
        &mut self,
        payload: Option<&ArrayRef>,
        count: usize,
        input_offset: usize,
        filter_sel: Option<&[u32]>,
    ) -> Result<()>;

    fn finish(&mut self) -> Result<()>;

    fn evaluate(&mut self, bounds: &BoundsBuffer, count: usize) -> Result<ArrayRef>;
}

/// Payload accumulated across sink batches, plus the FILTER mask.
struct AggregatorInputs {
    parts: Vec<ArrayRef>,
    values: Option<ArrayRef>,
    filter: Option<BoundaryMask>,
    count: usize,
}

impl AggregatorInputs {
    fn new(has_filter: bool, total_count: usize) -> Self {
        Self {
            parts: Vec::new(),
            values: None,
            filter: has_filter.then(|| BoundaryMask::new_zeroed(total_count)),
            count: 0,
        }
    }

    fn sink(
        &mut self,
        payload: Option<&ArrayRef>,
        count: usize,
        input_offset: usize,
        filter_sel: Option<&[u32]>,
    ) -> Result<()> {
        if let Some(payload) = payload {
            self.parts.push(payload.clone());
        }
        if let Some(mask) = self.filter.as_mut() {
            let sel = filter_sel.ok_or_else(|| {
                EngineError::internal("FILTER selection missing for filtered aggregate")
            })?;
            for &row in sel {
                mask.set_bit(input_offset + row as usize);
            }
        }
        self.count += count;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.values.is_none() && !self.parts.is_empty() {
            let refs: Vec<&dyn Array> = self.parts.iter().map(|a| a.as_ref()).collect();
            self.values = Some(concat(&refs)?);
            self.parts.clear();
        }
        Ok(())
    }
}

/// Segment tree of partial aggregate states (VLDB'15 design): leaves cover
/// `TREE_FANOUT` rows, every upper level combines `TREE_FANOUT` children.
pub(crate) struct WindowSegmentTree {
    kernel: AggKernel,
    inputs: AggregatorInputs,
    /// `levels[0]` covers TREE_FANOUT rows per state, `levels[l]` covers
    /// TREE_FANOUT^(l+1). Empty when combining is disabled; every frame is
    /// then folded row by row.
    levels: Vec<Vec<AggStatePtr>>,
    build_tree: bool,
    arena: AggStateArena,
    scratch_rows: Vec<usize>,
}

impl WindowSegmentTree {
    pub(crate) fn new(
        kernel: AggKernel,
        has_filter: bool,
        total_count: usize,
        build_tree: bool,
    ) -> Self {
        Self {
            kernel,
            inputs: AggregatorInputs::new(has_filter, total_count),
            levels: Vec::new(),
            build_tree,
            arena: AggStateArena::new(16 * 1024),
            scratch_rows: Vec::new(),
        }
    }

    fn update_leaf_range(&mut self, state: AggStatePtr, begin: usize, end: usize) -> Result<()> {
        match self.inputs.filter.as_ref() {
            Some(mask) => {
                self.scratch_rows.clear();
                mask.collect_set_rows(begin, end, &mut self.scratch_rows);
                self.kernel
                    .update_rows(state, self.inputs.values.as_ref(), &self.scratch_rows)
            }
            None => self
                .kernel
                .update_range(state, self.inputs.values.as_ref(), begin, end),
        }
    }

    /// Fold `[begin, end)` in units of `level` into `state`. Level 0 units
    /// are input rows; level `l > 0` units are states of `levels[l - 1]`.
    fn aggregate_range(
        &mut self,
        level: usize,
        begin: usize,
        end: usize,
        state: AggStatePtr,
    ) -> Result<()> {
        if level == 0 {
            self.update_leaf_range(state, begin, end)
        } else {
            for i in begin..end {
                self.kernel.combine(state, self.levels[level - 1][i]);
            }
            Ok(())
        }
    }

    fn aggregate_frame(&mut self, mut begin: usize, mut end: usize, state: AggStatePtr) -> Result<()> {
        let mut level = 0usize;
        while begin < end {
            let mut parent_begin = begin / TREE_FANOUT;
            let parent_end = end / TREE_FANOUT;
            if parent_begin == parent_end || level == self.levels.len() {
                self.aggregate_range(level, begin, end, state)?;
                return Ok(());
            }
            let group_begin = parent_begin * TREE_FANOUT;
            if begin != group_begin {
                self.aggregate_range(level, begin, group_begin + TREE_FANOUT, state)?;
                parent_begin += 1;
            }
            let group_end = parent_end * TREE_FANOUT;
            if end != group_end {
                self.aggregate_range(level, group_end, end, state)?;
            }
            begin = parent_begin;
            end = parent_end;
            level += 1;
        }
        Ok(())
    }
}

impl WindowAggregator for WindowSegmentTree {
    fn sink(
        &mut self,
        payload: Option<&ArrayRef>,
        count: usize,
        input_offset: usize,
        filter_sel: Option<&[u32]>,
    ) -> Result<()> {
        self.inputs.sink(payload, count, input_offset, filter_sel)
    }

    fn finish(&mut self) -> Result<()> {
        self.inputs.finish()?;
        let mut prev_count = self.inputs.count;
        if prev_count == 0 || !self.build_tree {
            return Ok(());
        }
        let mut level = 0usize;
        while prev_count > 1 {
            let this_count = prev_count.div_ceil(TREE_FANOUT);
            let mut states = Vec::with_capacity(this_count);
            for _ in 0..this_count {
                let state = self
                    .arena
                    .alloc(self.kernel.state_size(), self.kernel.state_align());
                self.kernel.init_state(state);
                states.push(state);
            }
            for (i, &state) in states.iter().enumerate() {
                let begin = i * TREE_FANOUT;
                let end = ((i + 1) * TREE_FANOUT).min(prev_count);
                if level == 0 {
                    self.update_leaf_range(state, begin, end)?;
                } else {
                    for child in begin..end {
                        self.kernel.combine(state, self.levels[level - 1][child]);
                    }
                }
            }
            self.levels.push(states);
            prev_count = this_count;
            level += 1;
        }
        Ok(())
    }

    fn evaluate(&mut self, bounds: &BoundsBuffer, count: usize) -> Result<ArrayRef> {
        let mut arena = AggStateArena::new(self.kernel.state_size().max(1) * count.max(1));
        let mut states = Vec::with_capacity(count);
        for i in 0..count {
            let state = arena.alloc(self.kernel.state_size(), self.kernel.state_align());
            self.kernel.init_state(state);
            let begin = bounds.window_begin[i];
            let end = bounds.window_end[i];
            if begin < end {
                self.aggregate_frame(begin, end, state)?;
            }
            states.push(state);
        }
        self.kernel.finalize_into(&states)
    }
}

/// Whole-partition frames: aggregate each partition once, broadcast at
/// evaluation. O(#partitions) states, no per-row work.
pub(crate) struct WindowConstantAggregate {
    kernel: AggKernel,
    partition_offsets: Vec<usize>,
    states: Vec<AggStatePtr>,
    #[allow(dead_code)]
    arena: AggStateArena,
    results: Option<ArrayRef>,
    input_offset_check: usize,
    scratch_rows: Vec<usize>,
}

impl WindowConstantAggregate {
    pub(crate) fn new(
        kernel: AggKernel,
        partition_mask: &BoundaryMask,
        total_count: usize,
    ) -> Self {
        let mut partition_offsets = Vec::new();
        for i in 0..total_count {
            if partition_mask.is_set(i) {
                partition_offsets.push(i);
            }
        }
        if partition_offsets.is_empty() {
            partition_offsets.push(0);
        }
        let mut arena = AggStateArena::new(8 * 1024);
        let mut states = Vec::with_capacity(partition_offsets.len());
        for _ in 0..partition_offsets.len() {
            let state = arena.alloc(kernel.state_size(), kernel.state_align());
            kernel.init_state(state);
            states.push(state);
        }
        Self {
            kernel,
            partition_offsets,
            states,
            arena,
            results: None,
            input_offset_check: 0,
            scratch_rows: Vec::new(),
        }
    }

    fn partition_of(&self, row: usize) -> usize {
        match self.partition_offsets.binary_search(&row) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        }
    }
}

impl WindowAggregator for WindowConstantAggregate {
    fn sink(
        &mut self,
        payload: Option<&ArrayRef>,
        count: usize,
        input_offset: usize,
        filter_sel: Option<&[u32]>,
    ) -> Result<()> {
        debug_assert_eq!(input_offset, self.input_offset_check);
        self.input_offset_check += count;

        // Walk the partitions overlapping this batch and fold each slice
        // directly; payload rows are batch-relative.
        let mut row = input_offset;
        let batch_end = input_offset + count;
        while row < batch_end {
            let part = self.partition_of(row);
            let part_end = self
                .partition_offsets
                .get(part + 1)
                .copied()
                .unwrap_or(usize::MAX)
                .min(batch_end);
            let state = self.states[part];
            let begin = row - input_offset;
            let end = part_end - input_offset;
            match filter_sel {
                Some(sel) => {
                    self.scratch_rows.clear();
                    self.scratch_rows.extend(
                        sel.iter()
                            .map(|&s| s as usize)
                            .filter(|&s| s >= begin && s < end),
                    );
                    self.kernel.update_rows(state, payload, &self.scratch_rows)?;
                }
                None => {
                    self.kernel.update_range(state, payload, begin, end)?;
                }
            }
            row = part_end;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.results.is_none() {
            self.results = Some(self.kernel.finalize_into(&self.states)?);
        }
        Ok(())
    }

    fn evaluate(&mut self, bounds: &BoundsBuffer, count: usize) -> Result<ArrayRef> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| EngineError::internal("constant aggregate evaluated before finish"))?;
        let mut indices = Vec::with_capacity(count);
        for i in 0..count {
            indices.push(self.partition_of(bounds.partition_begin[i]) as u32);
        }
        let indices = UInt32Array::from(indices);
        Ok(take(results.as_ref(), &indices, None)?)
    }
}

/// Delegates each frame to the kernel's sliding-window callback.
pub(crate) struct WindowCustomAggregate {
    kernel: AggKernel,
    inputs: AggregatorInputs,
}

impl WindowCustomAggregate {
    pub(crate) fn new(kernel: AggKernel, total_count: usize) -> Self {
        Self {
            kernel,
            inputs: AggregatorInputs::new(false, total_count),
        }
    }
}

impl WindowAggregator for WindowCustomAggregate {
    fn sink(
        &mut self,
        payload: Option<&ArrayRef>,
        count: usize,
        input_offset: usize,
        filter_sel: Option<&[u32]>,
    ) -> Result<()> {
        self.inputs.sink(payload, count, input_offset, filter_sel)
    }

    fn finish(&mut self) -> Result<()> {
        self.inputs.finish()
    }

    fn evaluate(&mut self, bounds: &BoundsBuffer, count: usize) -> Result<ArrayRef> {
        let mut arena = AggStateArena::new(self.kernel.state_size().max(1) * count.max(1));
        let mut states = Vec::with_capacity(count);
        for i in 0..count {
            let state = arena.alloc(self.kernel.state_size(), self.kernel.state_align());
            self.kernel.init_state(state);
            let begin = bounds.window_begin[i];
            let end = bounds.window_end[i];
            if begin < end {
                self.kernel
                    .window_frame(state, self.inputs.values.as_ref(), begin, end)?;
            }
            states.push(state);
        }
        self.kernel.finalize_into(&states)
    }
}
