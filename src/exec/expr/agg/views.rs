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
//! Typed read views over Arrow arrays.
//!
//! Kernels downcast once per batch and then read rows through these views,
//! widening every integer-class input to i64 (or i128 for decimals).

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int8Array, Int16Array, Int32Array, Int64Array, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};

use crate::common::error::{EngineError, Result};

pub(crate) enum IntView<'a> {
    Bool(&'a BooleanArray),
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    Date32(&'a Date32Array),
    TimestampSecond(&'a TimestampSecondArray),
    TimestampMillisecond(&'a TimestampMillisecondArray),
    TimestampMicrosecond(&'a TimestampMicrosecondArray),
    TimestampNanosecond(&'a TimestampNanosecondArray),
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, what: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| EngineError::internal(format!("failed to downcast to {}", what)))
}

impl<'a> IntView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> Result<Self> {
        match array.data_type() {
            DataType::Boolean => Ok(IntView::Bool(downcast(array, "BooleanArray")?)),
            DataType::Int8 => Ok(IntView::Int8(downcast(array, "Int8Array")?)),
            DataType::Int16 => Ok(IntView::Int16(downcast(array, "Int16Array")?)),
            DataType::Int32 => Ok(IntView::Int32(downcast(array, "Int32Array")?)),
            DataType::Int64 => Ok(IntView::Int64(downcast(array, "Int64Array")?)),
            DataType::Date32 => Ok(IntView::Date32(downcast(array, "Date32Array")?)),
            DataType::Timestamp(TimeUnit::Second, _) => Ok(IntView::TimestampSecond(downcast(
                array,
                "TimestampSecondArray",
            )?)),
            DataType::Timestamp(TimeUnit::Millisecond, _) => Ok(IntView::TimestampMillisecond(
                downcast(array, "TimestampMillisecondArray")?,
            )),
            DataType::Timestamp(TimeUnit::Microsecond, _) => Ok(IntView::TimestampMicrosecond(
                downcast(array, "TimestampMicrosecondArray")?,
            )),
            DataType::Timestamp(TimeUnit::Nanosecond, _) => Ok(IntView::TimestampNanosecond(
                downcast(array, "TimestampNanosecondArray")?,
            )),
            other => Err(EngineError::internal(format!(
                "unsupported integer-class input type: {:?}",
                other
            ))),
        }
    }

    pub(crate) fn is_null(&self, i: usize) -> bool {
        match self {
            IntView::Bool(a) => a.is_null(i),
            IntView::Int8(a) => a.is_null(i),
            IntView::Int16(a) => a.is_null(i),
            IntView::Int32(a) => a.is_null(i),
            IntView::Int64(a) => a.is_null(i),
            IntView::Date32(a) => a.is_null(i),
            IntView::TimestampSecond(a) => a.is_null(i),
            IntView::TimestampMillisecond(a) => a.is_null(i),
            IntView::TimestampMicrosecond(a) => a.is_null(i),
            IntView::TimestampNanosecond(a) => a.is_null(i),
        }
    }

    pub(crate) fn value(&self, i: usize) -> i64 {
        match self {
            IntView::Bool(a) => a.value(i) as i64,
            IntView::Int8(a) => a.value(i) as i64,
            IntView::Int16(a) => a.value(i) as i64,
            IntView::Int32(a) => a.value(i) as i64,
            IntView::Int64(a) => a.value(i),
            IntView::Date32(a) => a.value(i) as i64,
            IntView::TimestampSecond(a) => a.value(i),
            IntView::TimestampMillisecond(a) => a.value(i),
            IntView::TimestampMicrosecond(a) => a.value(i),
            IntView::TimestampNanosecond(a) => a.value(i),
        }
    }
}

pub(crate) enum FloatView<'a> {
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Int(IntView<'a>),
}

impl<'a> FloatView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> Result<Self> {
        match array.data_type() {
            DataType::Float32 => Ok(FloatView::Float32(downcast(array, "Float32Array")?)),
            DataType::Float64 => Ok(FloatView::Float64(downcast(array, "Float64Array")?)),
            _ => Ok(FloatView::Int(IntView::new(array)?)),
        }
    }

    pub(crate) fn is_null(&self, i: usize) -> bool {
        match self {
            FloatView::Float32(a) => a.is_null(i),
            FloatView::Float64(a) => a.is_null(i),
            FloatView::Int(v) => v.is_null(i),
        }
    }

    pub(crate) fn value(&self, i: usize) -> f64 {
        match self {
            FloatView::Float32(a) => a.value(i) as f64,
            FloatView::Float64(a) => a.value(i),
            FloatView::Int(v) => v.value(i) as f64,
        }
    }
}

pub(crate) struct DecimalView<'a> {
    array: &'a Decimal128Array,
}

impl<'a> DecimalView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> Result<Self> {
        Ok(Self {
            array: downcast(array, "Decimal128Array")?,
        })
    }

    pub(crate) fn is_null(&self, i: usize) -> bool {
        self.array.is_null(i)
    }

    pub(crate) fn value(&self, i: usize) -> i128 {
        self.array.value(i)
    }
}
