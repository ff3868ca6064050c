// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Endpoint and partition routing.

mod caches;
mod global_endpoint_manager;
mod location_cache;
pub mod location_helper;
mod partition_key_range;
mod store_model;

pub use caches::*;
pub use global_endpoint_manager::*;
pub use location_cache::*;
pub use partition_key_range::*;
pub use store_model::*;
