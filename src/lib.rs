//! # echo-loopback
//!
//! Delayed audio loopback: capture from a microphone, hold each frame for a
//! fixed delay, then play it back through an output device.
//!
//! `echo-loopback` wires three pieces together: a capture worker that turns
//! raw 16-bit PCM into fixed-size frames stamped with a release time, a
//! time-ordered delay queue, and a playback worker that releases due frames
//! to the output sink. A single controller owns the lifecycle; `start`,
//! `stop`, and `toggle` are idempotent and safe to call from anywhere.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use echo_loopback::{EchoLoopback, LoopbackConfig};
//! use echo_loopback::sink::CpalPlayback;
//! use echo_loopback::source::CpalCapture;
//! use std::time::Duration;
//!
//! let controller = EchoLoopback::builder()
//!     .capture(CpalCapture::provider())
//!     .playback(CpalPlayback::provider())
//!     .config(LoopbackConfig {
//!         delay: Duration::from_secs(5),
//!         ..Default::default()
//!     })
//!     .on_event(|e| tracing::warn!(?e, "loopback event"))
//!     .spawn()?;
//!
//! controller.start().await;
//! // ... speak, hear yourself five seconds later ...
//! controller.stop().await;
//! controller.shutdown().await;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **CPAL Threads**: Each device adapter owns its stream on a dedicated
//!   thread; the audio callbacks never block
//! - **Delay Queue**: FIFO of timestamped frames shared by the two workers
//! - **Tokio Runtime**: The capture and playback workers are plain tasks
//!   that park on an idle interval whenever there is nothing to do
//!
//! Devices are acquired lazily on `start()` and a failed acquisition is not
//! fatal: the loopback stays idle and the next `start()` retries, so a
//! permission granted after the fact just works.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
mod controller;
mod error;
mod event;
mod frame;
mod permission;
mod pipeline;
mod queue;
mod route;
pub mod sink;
pub mod source;

pub use builder::{EchoLoopback, LoopbackBuilder};
pub use config::{AudioConfig, LoopbackConfig, BYTES_PER_SAMPLE};
pub use controller::{LoopbackController, LoopbackStats};
pub use error::{DeviceError, LoopbackError};
pub use event::{event_callback, EventCallback, LoopbackEvent};
pub use frame::AudioFrame;
pub use permission::{AlwaysAllowed, PermissionGate};
pub use queue::DelayQueue;
pub use route::{DeviceRouter, NoopRouter};
