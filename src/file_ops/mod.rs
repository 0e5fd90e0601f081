// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! File-level operation scheduling and execution.

pub mod handler;
pub mod map;
pub mod operation;

pub use handler::FileOperationHandler;
pub use map::{Admission, FileOpRegistration, FileOperationMap, OperationOutcome};
pub use operation::{FileOpState, FileOperation};
