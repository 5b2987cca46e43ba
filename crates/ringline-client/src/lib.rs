//! Client-side call signaling for Ringline
//!
//! The two client views of a call request and the ringtone they drive:
//!
//! - `IncomingCallWatcher` - the broadcaster side; shows the newest ringing
//!   request and exposes accept/reject/ban
//! - `CallerWaitView` - the caller side; rings until the request resolves
//!   and exposes cancel
//! - `RingtoneTask` - a start/stop repeating ring cue over an `AudioSink`
//!
//! Both views learn about changes through the detector traits and act
//! through a `SignalingBackend`, either in-process or over HTTP.

pub mod audio;
pub mod backend;
pub mod detector;
pub mod http;
pub mod ringtone;
pub mod wait_view;
pub mod watcher;

pub use audio::{AudioSink, AudioStream, MemoryAudioSink, RingCue, TracingAudioSink};
pub use backend::{LocalBackend, SignalingBackend};
pub use detector::{
    CallStatusDetector, IncomingCallDetector, PollingIncomingDetector, PollingStatusDetector,
    PushIncomingDetector, PushStatusDetector,
};
pub use http::HttpBackend;
pub use ringtone::RingtoneTask;
pub use wait_view::{CallerWaitView, WaitOutcome};
pub use watcher::{IncomingCallWatcher, WatcherState};
