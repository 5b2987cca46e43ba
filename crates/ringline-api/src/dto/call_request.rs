//! Call request DTOs
//!
//! Request and response types for the call signaling endpoints.

use chrono::Utc;
use ringline_core::models::{CallRequest, CallType, NewCallRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Booking request sent by a caller
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CallRequestCreateRequest {
    /// Broadcaster to ring
    pub broadcaster_id: Uuid,

    /// video, audio or text
    #[serde(default = "default_call_type")]
    pub call_type: CallType,

    /// Booked length of the session
    #[validate(range(min = 1, max = 480, message = "Duration must be between 1 and 480 minutes"))]
    pub duration_minutes: i32,

    /// Price the caller agreed to pay for the whole session
    pub total_price: Decimal,

    /// Display name shown to the broadcaster while ringing
    #[validate(length(min = 1, max = 120, message = "Caller name is required"))]
    pub caller_name: String,

    /// Avatar URL shown to the broadcaster while ringing
    #[validate(length(max = 2048))]
    pub caller_photo: Option<String>,
}

fn default_call_type() -> CallType {
    CallType::Video
}

impl From<CallRequestCreateRequest> for NewCallRequest {
    fn from(req: CallRequestCreateRequest) -> Self {
        NewCallRequest {
            broadcaster_id: req.broadcaster_id,
            call_type: req.call_type,
            duration_minutes: req.duration_minutes,
            total_price: req.total_price,
            caller_name: req.caller_name,
            caller_photo: req.caller_photo,
        }
    }
}

/// Call request as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequestResponse {
    #[serde(flatten)]
    pub call_request: CallRequest,

    /// Seconds spent ringing so far, or until resolution
    pub ringing_seconds: i64,
}

impl From<CallRequest> for CallRequestResponse {
    fn from(call_request: CallRequest) -> Self {
        let ringing_seconds = call_request.ringing_for(Utc::now()).num_seconds().max(0);
        Self {
            call_request,
            ringing_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_request_defaults_and_validation() {
        let req: CallRequestCreateRequest = serde_json::from_value(serde_json::json!({
            "broadcaster_id": Uuid::new_v4(),
            "duration_minutes": 30,
            "total_price": "21.00",
            "caller_name": "Sam"
        }))
        .unwrap();

        assert_eq!(req.call_type, CallType::Video);
        assert!(req.validate().is_ok());

        let mut empty_name = req.clone();
        empty_name.caller_name.clear();
        assert!(empty_name.validate().is_err());

        let booking: NewCallRequest = req.into();
        assert_eq!(booking.total_price, dec!(21.00));
    }

    #[test]
    fn test_response_flattens_call_request() {
        let mut call = CallRequest::default();
        call.created_at = Utc::now() - Duration::seconds(12);

        let json = serde_json::to_value(CallRequestResponse::from(call.clone())).unwrap();
        assert_eq!(json["status"], "ringing");
        assert!(json["ringing_seconds"].as_i64().unwrap() >= 12);

        // Clients can read it back as a plain call request
        let back: CallRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, call.id);
    }
}
