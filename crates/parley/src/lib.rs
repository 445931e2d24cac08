// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod api;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod driver;
pub mod error;
pub mod event;
pub mod session;
pub mod store;
pub mod test_support;
pub mod unwrap;
