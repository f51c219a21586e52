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

//! Sumfold error types

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::result;

use arrow::error::ArrowError;

/// Result type for operations that could result in a [SumfoldError]
pub type Result<T> = result::Result<T, SumfoldError>;

/// Error type for generic operations that could result in
/// [SumfoldError::External]
pub type GenericError = Box<dyn Error + Send + Sync>;

/// Sumfold error
#[derive(Debug)]
pub enum SumfoldError {
    /// Error returned by arrow.
    ArrowError(ArrowError),
    /// Error returned on a branch that we know it is possible
    /// but to which we still have no implementation for.
    NotImplemented(String),
    /// Error raised when an internal invariant the compiler cannot
    /// check for us is not verified during execution. This error
    /// should not happen in normal usage.
    Internal(String),
    /// Errors originating from outside this codebase.
    External(GenericError),
}

impl From<ArrowError> for SumfoldError {
    fn from(e: ArrowError) -> Self {
        SumfoldError::ArrowError(e)
    }
}

impl From<SumfoldError> for ArrowError {
    fn from(e: SumfoldError) -> Self {
        match e {
            SumfoldError::ArrowError(e) => e,
            SumfoldError::External(e) => ArrowError::ExternalError(e),
            other => ArrowError::ExternalError(Box::new(other)),
        }
    }
}

impl From<GenericError> for SumfoldError {
    fn from(err: GenericError) -> Self {
        SumfoldError::External(err)
    }
}

impl Display for SumfoldError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match *self {
            SumfoldError::ArrowError(ref desc) => write!(f, "Arrow error: {desc}"),
            SumfoldError::NotImplemented(ref desc) => {
                write!(f, "This feature is not implemented: {desc}")
            }
            SumfoldError::Internal(ref desc) => write!(
                f,
                "Internal error: {desc}. This was likely caused by a bug in \
                 sumfold's code and we would welcome that you file a bug report \
                 in our issue tracker"
            ),
            SumfoldError::External(ref desc) => write!(f, "External error: {desc}"),
        }
    }
}

impl Error for SumfoldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SumfoldError::ArrowError(e) => Some(e),
            SumfoldError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Construct a [`SumfoldError::Internal`] from the given format string
#[macro_export]
macro_rules! internal_sumfold_err {
    ($($args:expr),*) => {
        $crate::SumfoldError::Internal(format!($($args),*))
    };
}

/// Return an `Err` wrapping a [`SumfoldError::Internal`] built from the
/// given format string
#[macro_export]
macro_rules! internal_err {
    ($($args:expr),*) => {
        Err($crate::internal_sumfold_err!($($args),*))
    };
}

/// Return an `Err` wrapping a [`SumfoldError::NotImplemented`] built from
/// the given format string
#[macro_export]
macro_rules! not_impl_err {
    ($($args:expr),*) => {
        Err($crate::SumfoldError::NotImplemented(format!($($args),*)))
    };
}
