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
//! Two-tier partition sink for the window operator.
//!
//! Local tier: per-worker buffers, routed by an FNV hash of the PARTITION BY
//! columns into a power-of-two number of bins (one bin when unpartitioned).
//! Global tier: per-bin buffers behind dedicated latches. Finalize sorts
//! every bin by (partition keys, order keys) on a thread pool; afterwards the
//! sorted groups are immutable and handed to source workers by move.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::{SortColumn, SortOptions, concat_batches, lexsort_to_indices, take};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use threadpool::ThreadPool;

use crate::common::config;
use crate::common::error::{EngineError, Result};
use crate::exec::chunk::Chunk;
use crate::exec::expr::ExprArena;
use crate::exec::node::analytic::AnalyticNode;
use crate::quartzite_logging::debug;
use crate::runtime::runtime_state::RuntimeState;

use super::boundary_mask::BoundaryMask;

const FNV_SEED: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(hash: u64, bytes: &[u8]) -> u64 {
    let mut h = hash;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn hash_column_into(array: &ArrayRef, hashes: &mut [u64]) -> Result<()> {
    use arrow::array::*;

    macro_rules! hash_primitive {
        ($ty:ty) => {{
            let arr = array
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| EngineError::internal("hash column downcast failed"))?;
            for (i, h) in hashes.iter_mut().enumerate() {
                if arr.is_null(i) {
                    *h ^= FNV_SEED;
                    *h = h.wrapping_mul(FNV_PRIME);
                } else {
                    *h = fnv1a(*h, &arr.value(i).to_le_bytes());
                }
            }
        }};
    }

    match array.data_type() {
        DataType::Boolean => {
            let arr = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| EngineError::internal("hash column downcast failed"))?;
            for (i, h) in hashes.iter_mut().enumerate() {
                if arr.is_null(i) {
                    *h ^= FNV_SEED;
                    *h = h.wrapping_mul(FNV_PRIME);
                } else {
                    *h = fnv1a(*h, &[arr.value(i) as u8]);
                }
            }
        }
        DataType::Int8 => hash_primitive!(Int8Array),
        DataType::Int16 => hash_primitive!(Int16Array),
        DataType::Int32 => hash_primitive!(Int32Array),
        DataType::Int64 => hash_primitive!(Int64Array),
        DataType::UInt32 => hash_primitive!(UInt32Array),
        DataType::Float32 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| EngineError::internal("hash column downcast failed"))?;
            for (i, h) in hashes.iter_mut().enumerate() {
                if arr.is_null(i) {
                    *h ^= FNV_SEED;
                    *h = h.wrapping_mul(FNV_PRIME);
                } else {
                    *h = fnv1a(*h, &arr.value(i).to_bits().to_le_bytes());
                }
            }
        }
        DataType::Float64 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| EngineError::internal("hash column downcast failed"))?;
            for (i, h) in hashes.iter_mut().enumerate() {
                if arr.is_null(i) {
                    *h ^= FNV_SEED;
                    *h = h.wrapping_mul(FNV_PRIME);
                } else {
                    *h = fnv1a(*h, &arr.value(i).to_bits().to_le_bytes());
                }
            }
        }
        DataType::Date32 => hash_primitive!(Date32Array),
        DataType::Timestamp(TimeUnit::Second, _) => hash_primitive!(TimestampSecondArray),
        DataType::Timestamp(TimeUnit::Millisecond, _) => hash_primitive!(TimestampMillisecondArray),
        DataType::Timestamp(TimeUnit::Microsecond, _) => hash_primitive!(TimestampMicrosecondArray),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => hash_primitive!(TimestampNanosecondArray),
        DataType::Decimal128(_, _) => {
            let arr = array
                .as_any()
                .downcast_ref::<Decimal128Array>()
                .ok_or_else(|| EngineError::internal("hash column downcast failed"))?;
            for (i, h) in hashes.iter_mut().enumerate() {
                if arr.is_null(i) {
                    *h ^= FNV_SEED;
                    *h = h.wrapping_mul(FNV_PRIME);
                } else {
                    *h = fnv1a(*h, &arr.value(i).to_le_bytes());
                }
            }
        }
        DataType::Utf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| EngineError::internal("hash column downcast failed"))?;
            for (i, h) in hashes.iter_mut().enumerate() {
                if arr.is_null(i) {
                    *h ^= FNV_SEED;
                    *h = h.wrapping_mul(FNV_PRIME);
                } else {
                    *h = fnv1a(*h, arr.value(i).as_bytes());
                }
            }
        }
        other => {
            return Err(EngineError::internal(format!(
                "unsupported PARTITION BY type for hashing: {:?}",
                other
            )));
        }
    }
    Ok(())
}

/// Split one chunk into per-bin chunks by partition-key hash.
fn partition_chunk_by_hash(
    chunk: &Chunk,
    key_arrays: &[ArrayRef],
    num_bins: usize,
) -> Result<Vec<Option<Chunk>>> {
    let num_rows = chunk.len();
    let mut hashes = vec![FNV_SEED; num_rows];
    for array in key_arrays {
        hash_column_into(array, &mut hashes)?;
    }

    let mask = num_bins - 1;
    let mut bin_rows: Vec<Vec<u32>> = vec![Vec::new(); num_bins];
    for (row, &h) in hashes.iter().enumerate() {
        bin_rows[(h as usize) & mask].push(row as u32);
    }

    let mut out = Vec::with_capacity(num_bins);
    for rows in bin_rows {
        if rows.is_empty() {
            out.push(None);
            continue;
        }
        let indices: ArrayRef = Arc::new(UInt32Array::from(rows));
        let mut columns = Vec::with_capacity(chunk.batch.num_columns());
        for col in chunk.batch.columns() {
            columns.push(take(col.as_ref(), indices.as_ref(), None)?);
        }
        let batch = RecordBatch::try_new(chunk.batch.schema(), columns)?;
        out.push(Some(Chunk::try_new(batch)?));
    }
    Ok(out)
}

/// One sorted hash group: rows ordered by (partition keys, order keys).
#[derive(Debug)]
pub(crate) struct WindowHashGroup {
    pub(crate) chunk: Chunk,
    pub(crate) count: usize,
}

impl WindowHashGroup {
    /// Mark partition starts and peer-group starts by adjacent-row key
    /// comparison. NULL keys compare equal to NULL for grouping purposes.
    pub(crate) fn compute_masks(
        &self,
        partition_mask: &mut BoundaryMask,
        order_mask: &mut BoundaryMask,
        partition_keys: &[ArrayRef],
        order_keys: &[ArrayRef],
    ) -> Result<()> {
        partition_mask.set_bit(0);
        order_mask.set_bit(0);
        for i in 1..self.count {
            if !rows_equal_on_keys(partition_keys, i - 1, i)? {
                partition_mask.set_bit(i);
                order_mask.set_bit(i);
            } else if !rows_equal_on_keys(order_keys, i - 1, i)? {
                order_mask.set_bit(i);
            }
        }
        Ok(())
    }
}

fn rows_equal_on_keys(keys: &[ArrayRef], left: usize, right: usize) -> Result<bool> {
    for array in keys {
        if !value_equal_or_both_null(array, left, right)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn value_equal_or_both_null(array: &ArrayRef, left: usize, right: usize) -> Result<bool> {
    use arrow::array::*;

    if array.is_null(left) && array.is_null(right) {
        return Ok(true);
    }
    if array.is_null(left) || array.is_null(right) {
        return Ok(false);
    }

    macro_rules! eq_on {
        ($ty:ty) => {{
            let arr = array
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| EngineError::internal("key compare downcast failed"))?;
            Ok(arr.value(left) == arr.value(right))
        }};
    }

    match array.data_type() {
        DataType::Boolean => eq_on!(BooleanArray),
        DataType::Int8 => eq_on!(Int8Array),
        DataType::Int16 => eq_on!(Int16Array),
        DataType::Int32 => eq_on!(Int32Array),
        DataType::Int64 => eq_on!(Int64Array),
        DataType::UInt32 => eq_on!(UInt32Array),
        DataType::Float32 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| EngineError::internal("key compare downcast failed"))?;
            Ok(arr.value(left).to_bits() == arr.value(right).to_bits())
        }
        DataType::Float64 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| EngineError::internal("key compare downcast failed"))?;
            Ok(arr.value(left).to_bits() == arr.value(right).to_bits())
        }
        DataType::Utf8 => eq_on!(StringArray),
        DataType::Date32 => eq_on!(Date32Array),
        DataType::Timestamp(TimeUnit::Second, _) => eq_on!(TimestampSecondArray),
        DataType::Timestamp(TimeUnit::Millisecond, _) => eq_on!(TimestampMillisecondArray),
        DataType::Timestamp(TimeUnit::Microsecond, _) => eq_on!(TimestampMicrosecondArray),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => eq_on!(TimestampNanosecondArray),
        DataType::Decimal128(_, _) => eq_on!(Decimal128Array),
        other => Err(EngineError::internal(format!(
            "unsupported key type for equality: {:?}",
            other
        ))),
    }
}

/// Per-worker sink buffers.
pub(crate) struct WindowLocalSinkState {
    arena: Arc<ExprArena>,
    node: Arc<AnalyticNode>,
    num_bins: usize,
    buffers: Vec<Vec<Chunk>>,
}

impl WindowLocalSinkState {
    pub(crate) fn sink(&mut self, state: &RuntimeState, mut chunk: Chunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if let Some(tracker) = state.mem_tracker() {
            chunk.transfer_to(&tracker);
        }
        if self.num_bins == 1 {
            self.buffers[0].push(chunk);
            return Ok(());
        }
        let key_arrays = self
            .node
            .partition_exprs
            .iter()
            .map(|&e| self.arena.eval(e, &chunk))
            .collect::<Result<Vec<_>>>()?;
        for (bin, routed) in partition_chunk_by_hash(&chunk, &key_arrays, self.num_bins)?
            .into_iter()
            .enumerate()
        {
            if let Some(routed) = routed {
                self.buffers[bin].push(routed);
            }
        }
        Ok(())
    }
}

/// Shared sink state: per-bin buffers, then sorted hash groups.
#[derive(Debug)]
pub(crate) struct WindowGlobalSinkState {
    arena: Arc<ExprArena>,
    node: Arc<AnalyticNode>,
    num_bins: usize,
    bins: Vec<Mutex<Vec<Chunk>>>,
    groups: Vec<Mutex<Option<WindowHashGroup>>>,
    row_count: AtomicUsize,
    sorted: AtomicBool,
}

impl WindowGlobalSinkState {
    pub(crate) fn new(node: Arc<AnalyticNode>, arena: Arc<ExprArena>) -> Self {
        let num_bins = if node.partition_exprs.is_empty() {
            1
        } else {
            config::window_hash_group_count(node.estimated_rows)
        };
        Self {
            arena,
            node,
            num_bins,
            bins: (0..num_bins).map(|_| Mutex::new(Vec::new())).collect(),
            groups: (0..num_bins).map(|_| Mutex::new(None)).collect(),
            row_count: AtomicUsize::new(0),
            sorted: AtomicBool::new(false),
        }
    }

    pub(crate) fn local(&self) -> WindowLocalSinkState {
        WindowLocalSinkState {
            arena: Arc::clone(&self.arena),
            node: Arc::clone(&self.node),
            num_bins: self.num_bins,
            buffers: (0..self.num_bins).map(|_| Vec::new()).collect(),
        }
    }

    pub(crate) fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub(crate) fn row_count(&self) -> usize {
        self.row_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_sorted(&self) -> bool {
        self.sorted.load(Ordering::Acquire)
    }

    /// Merge one worker's local buffers under the per-bin latches.
    pub(crate) fn combine(&self, local: WindowLocalSinkState) {
        let mut rows = 0usize;
        for (bin, chunks) in local.buffers.into_iter().enumerate() {
            if chunks.is_empty() {
                continue;
            }
            rows += chunks.iter().map(Chunk::len).sum::<usize>();
            let mut guard = self.bins[bin].lock().unwrap_or_else(|e| e.into_inner());
            guard.extend(chunks);
        }
        self.row_count.fetch_add(rows, Ordering::AcqRel);
    }

    /// Sort every non-empty bin on the shared sort pool and install the
    /// resulting hash groups. Idempotent; the first caller does the work.
    pub(crate) fn finalize(this: &Arc<Self>, state: &RuntimeState) -> Result<()> {
        if this.sorted.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(
            "window sink finalize: {} rows across {} bins",
            this.row_count(),
            this.num_bins
        );

        let pool = ThreadPool::new(config::sort_threads().min(this.num_bins.max(1)));
        let pending = Arc::new((Mutex::new(this.num_bins), Condvar::new()));
        let first_error: Arc<Mutex<Option<EngineError>>> = Arc::new(Mutex::new(None));

        for bin in 0..this.num_bins {
            let this = Arc::clone(this);
            let pending = Arc::clone(&pending);
            let first_error = Arc::clone(&first_error);
            let cancelled = state.is_cancelled();
            pool.execute(move || {
                if !cancelled {
                    if let Err(e) = this.sort_bin(bin) {
                        let mut guard = first_error.lock().unwrap_or_else(|e| e.into_inner());
                        if guard.is_none() {
                            *guard = Some(e);
                        }
                    }
                }
                let (count, cv) = &*pending;
                let mut guard = count.lock().unwrap_or_else(|e| e.into_inner());
                *guard -= 1;
                if *guard == 0 {
                    cv.notify_all();
                }
            });
        }

        let (count, cv) = &*pending;
        let mut guard = count.lock().unwrap_or_else(|e| e.into_inner());
        while *guard > 0 {
            guard = cv.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        drop(guard);

        let mut error = first_error.lock().unwrap_or_else(|e| e.into_inner());
        match error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn sort_bin(&self, bin: usize) -> Result<()> {
        let chunks = {
            let mut guard = self.bins[bin].lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        if chunks.is_empty() {
            return Ok(());
        }

        let schema = chunks[0].schema();
        let batches: Vec<RecordBatch> = chunks.iter().map(|c| c.batch.clone()).collect();
        let batch = concat_batches(&schema, &batches)?;
        if batch.num_rows() == 0 {
            return Ok(());
        }
        let chunk = Chunk::try_new(batch.clone())?;

        // Sort key: partition columns first (direction is arbitrary but
        // fixed), then the ORDER BY keys with their declared options.
        let mut sort_columns = Vec::new();
        for &expr in &self.node.partition_exprs {
            sort_columns.push(SortColumn {
                values: self.arena.eval(expr, &chunk)?,
                options: Some(SortOptions {
                    descending: false,
                    nulls_first: true,
                }),
            });
        }
        for sort_expr in &self.node.order_by {
            sort_columns.push(SortColumn {
                values: self.arena.eval(sort_expr.expr, &chunk)?,
                options: Some(SortOptions {
                    descending: !sort_expr.asc,
                    nulls_first: sort_expr.nulls_first,
                }),
            });
        }

        let sorted = if sort_columns.is_empty() {
            chunk
        } else {
            let indices = lexsort_to_indices(&sort_columns, None)?;
            let columns = batch
                .columns()
                .iter()
                .map(|col| take(col.as_ref(), &indices, None))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Chunk::try_new(RecordBatch::try_new(batch.schema(), columns)?)?
        };

        let count = sorted.len();
        debug!("window sort bin {}: {} rows", bin, count);
        let mut guard = self.groups[bin].lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(WindowHashGroup {
            chunk: sorted,
            count,
        });
        Ok(())
    }

    /// Hand the sorted group of `bin` to a source worker. Each bin is
    /// claimed exactly once.
    pub(crate) fn take_group(&self, bin: usize) -> Option<WindowHashGroup> {
        let mut guard = self.groups[bin].lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }
}
