// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer
//!
//! Hardware access lives behind [`camera::NativeSession`]. The controller
//! never talks to a platform API directly:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            CameraController                 │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌──────────────────┐  ┌──────────────────┐ │
//! │  │  VirtualSession  │  │   GstSession     │ │
//! │  │   (synthetic)    │  │  (GStreamer)     │ │
//! │  └──────────────────┘  └──────────────────┘ │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The GStreamer session is compiled with the `gstreamer` feature.

pub mod camera;
