//! Audio playback pipeline core: PTS-aware decode, clock sync and
//! render worker.
//!
//! This crate reimplements the audio leg of a classic demuxer/decoder/
//! renderer playback pipeline as a free-standing library: a dedicated
//! worker thread pulls packets from a priority message queue, decodes
//! them, recovers timestamps through a PTS recovery queue, and applies
//! one of three synchronization disciplines before handing frames to
//! a renderer.
//!
//! # Architecture
//!
//! * **Pipeline core**
//!   - [`message`]: the bounded, priority-aware queue that carries
//!     packets and control messages into the worker thread
//!   - [`pts_queue`]: recovers a timestamp for decoder output that has
//!     been reordered or delayed by internal codec buffering
//!   - [`decode_step`]: drains one packet's worth of frames out of a
//!     codec, including the mid-stream codec-switch path
//!   - [`sync`]: picks and applies the effective synchronization
//!     strategy (discontinuity correction, skip/duplicate, resample)
//!   - [`worker`]: the worker thread itself and its public handle,
//!     [`worker::AudioWorker`]
//!
//! * **External collaborator boundaries** (no concrete implementation
//!   lives in this crate; a host supplies one)
//!   - [`codec`]: [`codec::Codec`] and [`codec::CodecFactory`]
//!   - [`renderer`]: [`renderer::Renderer`]
//!   - [`clock`]: [`clock::ReferenceClock`]
//!
//! * **Ambient stack**
//!   - [`config`]: tunables such as queue caps and sync limits
//!   - [`error`]: the crate's error taxonomy
//!   - [`telemetry`]: a read-only snapshot of worker state for UIs
//!   - [`time`]: the fixed time base shared by every timestamp
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::{mpsc, Arc};
//! use audio_player_core::codec::{CodecFactory, StreamHints};
//! use audio_player_core::config::Config;
//! use audio_player_core::worker::AudioWorker;
//!
//! fn example(
//!     factory: Arc<dyn CodecFactory>,
//!     renderer: Box<dyn audio_player_core::renderer::Renderer>,
//!     clock: Box<dyn audio_player_core::clock::ReferenceClock>,
//! ) -> audio_player_core::error::Result<()> {
//!     let (tx, _rx) = mpsc::channel();
//!     let hints = StreamHints {
//!         codec_id: 0,
//!         channels: 2,
//!         sample_rate: 44_100,
//!         bitrate_kbps: 0.0,
//!     };
//!     let worker = AudioWorker::open_stream(
//!         hints,
//!         factory,
//!         renderer,
//!         clock,
//!         None,
//!         Config::default(),
//!         tx,
//!     )?;
//!     worker.close_stream(false);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with
//! most functions returning [`Result`](error::Result).
//!
//! # Concurrency
//!
//! The worker runs on its own OS thread; hosts communicate with it
//! through [`message::MessageQueue`] and a handful of mutex-guarded
//! accessors on [`worker::AudioWorker`]. No async runtime is involved.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod clock;
pub mod codec;
pub mod config;
pub mod decode_step;
pub mod error;
pub mod message;
pub mod pts_queue;
pub mod renderer;
pub mod sync;
pub mod telemetry;
pub mod time;
pub mod worker;
