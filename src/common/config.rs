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
//! Engine-wide tunables.
//!
//! Each knob is an accessor function with a hard default and an optional
//! process-wide override installed once by the embedder before any pipeline
//! is built. Overrides installed later are ignored.

use std::sync::OnceLock;

/// How the executor computes framed aggregates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WindowAggregationMode {
    /// Prefer the aggregate's dedicated sliding-window callback when present.
    Window,
    /// Always combine partial states through the segment tree.
    Combine,
    /// Recompute every frame from scratch (debugging aid).
    Separate,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub vector_size: usize,
    pub operator_buffer_chunks: usize,
    pub window_hash_bits: u32,
    pub window_source_parallel_row_threshold: usize,
    pub window_aggregation_mode: WindowAggregationMode,
    pub sort_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vector_size: 2048,
            operator_buffer_chunks: 8,
            window_hash_bits: 4,
            window_source_parallel_row_threshold: 122_880,
            window_aggregation_mode: WindowAggregationMode::Window,
            sort_threads: 4,
        }
    }
}

static OVERRIDES: OnceLock<EngineConfig> = OnceLock::new();

/// Install process-wide overrides. Returns false when overrides were already
/// installed (the earlier values stay in effect).
pub fn set_overrides(config: EngineConfig) -> bool {
    OVERRIDES.set(config).is_ok()
}

fn current() -> EngineConfig {
    OVERRIDES.get().cloned().unwrap_or_default()
}

/// Maximum number of rows per vectorized batch.
pub fn vector_size() -> usize {
    current().vector_size.max(1)
}

/// How many output chunks an operator may buffer before it stops draining.
pub fn operator_buffer_chunks() -> usize {
    current().operator_buffer_chunks.max(1)
}

/// Upper bound (log2) on the number of window hash groups.
pub fn window_hash_bits() -> u32 {
    current().window_hash_bits.clamp(0, 10)
}

/// Below this row count the window source runs single threaded.
pub fn window_source_parallel_row_threshold() -> usize {
    current().window_source_parallel_row_threshold
}

pub fn window_aggregation_mode() -> WindowAggregationMode {
    current().window_aggregation_mode
}

/// Worker threads used to sort hash groups at sink finalize.
pub fn sort_threads() -> usize {
    current().sort_threads.max(1)
}

/// Power-of-two hash group count for a partitioned window sink, derived from
/// the planner's row estimate and capped by `window_hash_bits`.
pub fn window_hash_group_count(estimated_rows: Option<usize>) -> usize {
    let max_bits = window_hash_bits();
    let Some(rows) = estimated_rows else {
        return 1 << max_bits;
    };
    let target = rows / vector_size().max(1);
    let mut bits = 0u32;
    while (1usize << bits) < target && bits < max_bits {
        bits += 1;
    }
    1 << bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_group_count_is_power_of_two_and_capped() {
        let n = window_hash_group_count(Some(usize::MAX / 2));
        assert!(n.is_power_of_two());
        assert!(n <= 1 << window_hash_bits());
        assert_eq!(window_hash_group_count(Some(0)), 1);
    }
}
