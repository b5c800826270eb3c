#[cfg(test)]
mod tests {
    use crate::handlers::{validate_client_id, CallbackRequest, LockRequest, StatusResponse};
    use rlock_core::types::{LockId, LockStatus};

    #[test]
    fn test_client_id_must_be_an_address() {
        assert!(validate_client_id("127.0.0.1:4100").is_ok());
        assert!(validate_client_id("worker-3.internal:80").is_ok());

        assert!(validate_client_id("").is_err());
        assert!(validate_client_id("no-port").is_err());
        assert!(validate_client_id(":4100").is_err());
        assert!(validate_client_id("host:99999").is_err());
    }

    #[test]
    fn test_lock_request_wire_format() {
        let req: LockRequest =
            serde_json::from_str(r#"{"lid": 5, "client_id": "10.0.0.2:4100", "xid": 12}"#).unwrap();
        assert_eq!(req.lid, LockId(5));
        assert_eq!(req.client_id.as_str(), "10.0.0.2:4100");
        assert_eq!(req.xid, 12);
        assert!(req.validate().is_ok());

        // The basic server does not need an xid
        let req: LockRequest = serde_json::from_str(r#"{"lid": 5, "client_id": "h:1"}"#).unwrap();
        assert_eq!(req.xid, 0);
    }

    #[test]
    fn test_status_values_are_uppercase() {
        let body = serde_json::to_string(&StatusResponse {
            status: LockStatus::IoErr,
        })
        .unwrap();
        assert_eq!(body, r#"{"status":"IOERR"}"#);

        let reply: StatusResponse = serde_json::from_str(r#"{"status":"RETRY"}"#).unwrap();
        assert_eq!(reply.status, LockStatus::Retry);
    }

    #[test]
    fn test_callback_request_wire_format() {
        let body = serde_json::to_value(CallbackRequest { lid: LockId(7), xid: 3 }).unwrap();
        assert_eq!(body, serde_json::json!({"lid": 7, "xid": 3}));
    }
}
