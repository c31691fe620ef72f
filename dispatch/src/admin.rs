//! Worker control-plane operations sharing the messenger with the
//! execution plane.
//!
//! Service frames (suspend/resume/status/drain) and per-request
//! management frames carry their own header type, so workers route them
//! past the execution queue.

use crate::messenger::{encode_request, Messenger, SendOutcome};
use crate::request::RequestId;
use crate::{Error, Result};
use prost::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use wire_types::{
    FrameHeader, ManagementRequest, ManagementType, ServiceAction, ServiceRequest, ServiceState,
};

// Control-plane frames draw ids from their own range so they never
// collide with query request ids.
static NEXT_ADMIN_ID: AtomicU64 = AtomicU64::new(1 << 48);

fn next_admin_id() -> RequestId {
    NEXT_ADMIN_ID.fetch_add(1, Ordering::SeqCst)
}

/// Ask `worker` to perform a service action and return its reported
/// state.
pub async fn service_request(
    messenger: &Messenger,
    worker: &str,
    action: ServiceAction,
) -> Result<ServiceState> {
    let id = next_admin_id();
    let header = FrameHeader::service(id);
    let payload = ServiceRequest {
        action: action as i32,
    }
    .encode_to_vec();
    let frame = encode_request(&header, &payload).map_err(|e| Error::ClientError {
        worker: worker.to_string(),
        message: e.to_string(),
    })?;

    match messenger.send(worker, id, frame).await {
        SendOutcome::Response(_, payload) => {
            ServiceState::decode(payload.as_ref()).map_err(|e| Error::ClientError {
                worker: worker.to_string(),
                message: format!("undecodable service state: {}", e),
            })
        }
        SendOutcome::ClientError(message) => Err(Error::ClientError {
            worker: worker.to_string(),
            message,
        }),
        SendOutcome::Cancelled => Err(Error::Cancelled { id }),
    }
}

/// Ask `worker` about one earlier request.
pub async fn request_status(
    messenger: &Messenger,
    worker: &str,
    target_id: RequestId,
) -> Result<()> {
    management_request(messenger, worker, target_id, ManagementType::Status).await
}

/// Tell `worker` to stop one earlier request.
pub async fn request_stop(
    messenger: &Messenger,
    worker: &str,
    target_id: RequestId,
) -> Result<()> {
    management_request(messenger, worker, target_id, ManagementType::Stop).await
}

async fn management_request(
    messenger: &Messenger,
    worker: &str,
    target_id: RequestId,
    management_type: ManagementType,
) -> Result<()> {
    let id = next_admin_id();
    let header = FrameHeader::management(id, management_type);
    let payload = ManagementRequest { target_id }.encode_to_vec();
    let frame = encode_request(&header, &payload).map_err(|e| Error::ClientError {
        worker: worker.to_string(),
        message: e.to_string(),
    })?;
    match messenger.send(worker, id, frame).await {
        SendOutcome::Response(..) => Ok(()),
        SendOutcome::ClientError(message) => Err(Error::ClientError {
            worker: worker.to_string(),
            message,
        }),
        SendOutcome::Cancelled => Err(Error::Cancelled { id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::{WorkerConnector, WorkerStream};
    use async_trait::async_trait;
    use std::sync::Arc;
    use wire_types::{read_frame, write_frame, FrameType};

    #[derive(Debug)]
    struct ControlWorker;

    #[async_trait]
    impl WorkerConnector for ControlWorker {
        async fn connect(&self, _worker: &str) -> std::io::Result<Box<dyn WorkerStream>> {
            let (ours, mut theirs) = tokio::io::duplex(16 * 1024);
            tokio::spawn(async move {
                loop {
                    let (header, _payload) = match read_frame(&mut theirs).await {
                        Ok(frame) => frame,
                        Err(_) => return,
                    };
                    assert_ne!(header.frame_type, FrameType::Request as i32);
                    let reply = ServiceState {
                        state: "RUNNING".to_string(),
                        queued: 2,
                        in_progress: 1,
                    };
                    write_frame(&mut theirs, &header, &reply.encode_to_vec())
                        .await
                        .ok();
                }
            });
            Ok(Box::new(ours))
        }
    }

    #[tokio::test]
    async fn service_round_trip() {
        let messenger = Messenger::new(Arc::new(ControlWorker));
        let state = service_request(&messenger, "w1", ServiceAction::Status)
            .await
            .unwrap();
        assert_eq!(state.state, "RUNNING");
        assert_eq!(state.queued, 2);
        assert_eq!(state.in_progress, 1);
    }

    #[tokio::test]
    async fn management_round_trip() {
        let messenger = Messenger::new(Arc::new(ControlWorker));
        request_stop(&messenger, "w1", 42).await.unwrap();
        request_status(&messenger, "w1", 42).await.unwrap();
    }
}
