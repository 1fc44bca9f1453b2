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

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, NullArray,
    StringArray,
};

use crate::common::error::Result;

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Date32(i32),
}

pub fn eval(value: &LiteralValue, len: usize) -> Result<ArrayRef> {
    match value {
        LiteralValue::Null => Ok(Arc::new(NullArray::new(len))),
        LiteralValue::Bool(v) => Ok(Arc::new(BooleanArray::from(vec![*v; len]))),
        LiteralValue::Int32(v) => Ok(Arc::new(Int32Array::from(vec![*v; len]))),
        LiteralValue::Int64(v) => Ok(Arc::new(Int64Array::from(vec![*v; len]))),
        LiteralValue::Float64(v) => Ok(Arc::new(Float64Array::from(vec![*v; len]))),
        LiteralValue::Utf8(v) => Ok(Arc::new(StringArray::from(vec![v.as_str(); len]))),
        LiteralValue::Date32(v) => Ok(Arc::new(Date32Array::from(vec![*v; len]))),
    }
}
