// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The [`Event`] trait implemented by payload types.

/// Contract for event payload types.
///
/// Payloads are cloned into the deferral queue when a busy interface is
/// occupied, and the clone may be replayed on a different thread, hence the
/// `Clone + Send` bounds.
pub trait Event: Clone + Send + 'static {
    /// When `true`, a single trigger consumes the server's entire
    /// registration list: every current callback fires once and the list is
    /// left empty. When `false` (the default), registrations persist until
    /// cancelled.
    const ONE_SHOT: bool = false;
}
