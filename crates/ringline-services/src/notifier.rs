//! Call notification emitter
//!
//! Writes one notification record per resolution. Delivery is handled
//! elsewhere; a failed write is logged and never fails the transition.

use ringline_core::{
    models::{CallRequest, EndReason, Notification, NotificationKind},
    traits::NotificationRepository,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CallNotifier {
    notifications: Arc<dyn NotificationRepository>,
}

impl CallNotifier {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Which notification a resolved call produces, if any
    pub fn kind_for(call: &CallRequest) -> Option<NotificationKind> {
        match call.end_reason? {
            EndReason::Accepted => Some(NotificationKind::CallAccepted),
            EndReason::RejectedByBroadcaster => Some(NotificationKind::CallDeclined),
            EndReason::Expired | EndReason::Superseded => Some(NotificationKind::CallMissed),
            EndReason::CancelledByCaller => Some(NotificationKind::CallCancelled),
            // The banned caller is not told
            EndReason::Banned => None,
        }
    }

    /// Record the notification for a resolved call
    pub async fn notify_resolution(&self, call: &CallRequest) -> Option<Notification> {
        let kind = Self::kind_for(call)?;
        let notification = Notification::about(call, kind);

        match self.notifications.create(&notification).await {
            Ok(created) => {
                debug!("Notified {} of {} for {}", created.user_id, kind, call.id);
                Some(created)
            }
            Err(e) => {
                warn!("Failed to record {} notification for {}: {}", kind, call.id, e);
                None
            }
        }
    }
}
