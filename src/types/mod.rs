// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource definitions owned by the operator.

pub mod binding;

pub use binding::{AcrPullBinding, AcrPullBindingSpec, AcrPullBindingStatus};
