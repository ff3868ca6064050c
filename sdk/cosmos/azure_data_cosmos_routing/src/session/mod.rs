// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Session consistency tracking.
//!
//! A session token is a vector clock returned by the service on every write and read.
//! Sending it back on later requests guarantees the client reads its own writes,
//! even when the read lands on a different replica or region.

mod container;
mod error;
mod partition;
mod vector;

pub use container::*;
pub use error::*;
pub use partition::*;
pub use vector::*;
