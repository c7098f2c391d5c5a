//! Waiting for export jobs to finish.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{AppError, FileOperation, FileOperationState, PollConfig, Result};
use crate::infrastructure::Transport;

use super::client::JobClient;

/// Poll a job until it reaches a terminal state.
///
/// Pending jobs are re-checked after a fixed interval. The loop is bounded by
/// `config.timeout`, checked between polls; cancellation interrupts the wait
/// immediately.
///
/// # Errors
/// Returns error if the job fails or expires, reports an unknown state, the
/// deadline elapses, or the wait is cancelled.
pub async fn wait_for_job<T: Transport>(
    client: &JobClient<T>,
    id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<FileOperation> {
    let start = Instant::now();
    let deadline = start + config.timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let job = client.get_job(id, cancel).await?;

        match &job.state {
            FileOperationState::Complete => {
                tracing::info!(id, name = %job.name, "File operation complete");
                return Ok(job);
            }
            FileOperationState::Error => {
                return Err(AppError::JobFailed {
                    id: id.to_string(),
                    message: job.error_message(),
                });
            }
            FileOperationState::Expired => {
                return Err(AppError::JobExpired { id: id.to_string() });
            }
            FileOperationState::Creating | FileOperationState::Uploading => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(AppError::Timeout {
                        waited_secs: (now - start).as_secs(),
                    });
                }

                tracing::info!(id, state = %job.state, "Waiting for file operation to complete");

                let pause = config.interval.min(deadline - now);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(AppError::Cancelled),
                    () = tokio::time::sleep(pause) => {}
                }

                if Instant::now() >= deadline {
                    return Err(AppError::Timeout {
                        waited_secs: start.elapsed().as_secs(),
                    });
                }
            }
            FileOperationState::Unknown(state) => {
                return Err(AppError::Protocol {
                    message: format!("unknown file operation state: {state}"),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::infrastructure::mock::{job_json, MockTransport};
    use chrono::Utc;
    use serde_json::json;

    /// Client whose `fileOperations.info` walks through `states`, repeating the last.
    fn scripted(states: &'static [&'static str]) -> JobClient<MockTransport> {
        let now = Utc::now();
        let calls = Arc::new(AtomicUsize::new(0));
        JobClient::new(MockTransport::new(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let state = states[n.min(states.len() - 1)];
            let mut job = job_json("op-1", state, "outline-markdown", now);
            if state == "error" {
                job["error"] = json!("export crashed");
            }
            Ok(json!({ "data": job }))
        }))
    }

    fn polls(client: &JobClient<MockTransport>) -> usize {
        client.transport().calls("/fileOperations.info")
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_states_repoll_after_interval() {
        let client = scripted(&["creating", "uploading", "complete"]);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let job = wait_for_job(&client, "op-1", &PollConfig::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(job.state, FileOperationState::Complete);
        assert_eq!(polls(&client), 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_returns_immediately() {
        let client = scripted(&["complete"]);
        let cancel = CancellationToken::new();

        wait_for_job(&client, "op-1", &PollConfig::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(polls(&client), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_carries_message() {
        let client = scripted(&["creating", "error"]);
        let cancel = CancellationToken::new();

        let err = wait_for_job(&client, "op-1", &PollConfig::default(), &cancel)
            .await
            .unwrap_err();
        match err {
            AppError::JobFailed { id, message } => {
                assert_eq!(id, "op-1");
                assert_eq!(message, "export crashed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(polls(&client), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_state_fails() {
        let client = scripted(&["expired"]);
        let cancel = CancellationToken::new();

        let err = wait_for_job(&client, "op-1", &PollConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::JobExpired { .. }));
        assert_eq!(polls(&client), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_state_fails_without_retry() {
        let client = scripted(&["archiving"]);
        let cancel = CancellationToken::new();

        let err = wait_for_job(&client, "op-1", &PollConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Protocol { .. }));
        assert_eq!(polls(&client), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_wait() {
        let client = scripted(&["creating"]);
        let cancel = CancellationToken::new();
        let config = PollConfig {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(7),
        };

        let err = wait_for_job(&client, "op-1", &config, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { waited_secs: 7 }));
        // Polls at 0s, 2s, 4s and 6s; the last sleep is cut to the deadline.
        assert_eq!(polls(&client), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let client = scripted(&["creating"]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let err = wait_for_job(&client, "op-1", &PollConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(polls(&client), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let client = JobClient::new(MockTransport::new(|_| {
            Err(AppError::RequestFailed { status: 404 })
        }));
        let cancel = CancellationToken::new();

        let err = wait_for_job(&client, "gone", &PollConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.transport().calls("/fileOperations.info"), 1);
    }
}
