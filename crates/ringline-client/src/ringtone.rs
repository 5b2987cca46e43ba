//! Ringtone Task
//!
//! Plays the ring cue immediately on start and then once per period until
//! stopped. The task knows nothing about call requests; its owner drives it
//! with `set_ringing`.
//!
//! At most one repeat schedule and one audio stream exist per task. `stop`
//! drops the stream before returning and is safe to call any number of
//! times. Dropping the task stops it.

use parking_lot::Mutex;
use ringline_core::{config::RingtoneConfig, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::{AudioSink, AudioStream, RingCue};

type SharedStream = Arc<Mutex<Option<Box<dyn AudioStream>>>>;

struct Schedule {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    stream: SharedStream,
}

pub struct RingtoneTask {
    sink: Arc<dyn AudioSink>,
    cue: RingCue,
    period: Duration,
    active: Mutex<Option<Schedule>>,
}

impl RingtoneTask {
    pub fn new(sink: Arc<dyn AudioSink>, config: &RingtoneConfig) -> Self {
        Self {
            sink,
            cue: RingCue::render(config),
            period: Duration::from_millis(config.period_ms.max(1)),
            active: Mutex::new(None),
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Follow a boolean ringing signal
    pub fn set_ringing(&self, ringing: bool) -> AppResult<()> {
        if ringing {
            self.start()
        } else {
            self.stop();
            Ok(())
        }
    }

    /// Start ringing. A no-op if already ringing.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(&self) -> AppResult<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Ok(());
        }

        let stream: SharedStream = Arc::new(Mutex::new(Some(self.sink.open()?)));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(ring_loop(
            self.cue.clone(),
            self.period,
            stream.clone(),
            cancel.clone(),
        ));

        debug!("Ringtone started (period {:?})", self.period);
        *active = Some(Schedule {
            cancel,
            handle,
            stream,
        });
        Ok(())
    }

    /// Stop ringing and release the audio stream
    pub fn stop(&self) {
        let Some(schedule) = self.active.lock().take() else {
            return;
        };

        schedule.cancel.cancel();
        schedule.handle.abort();
        let released = schedule.stream.lock().take();
        drop(released);
        debug!("Ringtone stopped");
    }
}

impl Drop for RingtoneTask {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn ring_loop(cue: RingCue, period: Duration, stream: SharedStream, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut guard = stream.lock();
                let Some(out) = guard.as_mut() else { break };
                if let Err(e) = out.play(&cue) {
                    warn!("Ring cue failed: {}", e);
                }
            }
        }
    }
}
