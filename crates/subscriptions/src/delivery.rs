//! Webhook delivery with retry/backoff: delivered on 2xx, retried on a
//! network error or 5xx, failed once attempts are exhausted.

use std::time::Duration;

use serde_json::Value;

use crate::backoff::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, detail: String },
}

/// POST `body` to `destination`, retrying transient failures under `policy`.
/// A 4xx response (other than a network hiccup) is not retried — the
/// destination has rejected the payload, not merely stumbled.
pub async fn deliver(
    client: &reqwest::Client,
    destination: &str,
    body: &Value,
    policy: &RetryPolicy,
) -> DeliveryOutcome {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match client.post(destination).json(body).send().await {
            Ok(response) if response.status().is_success() => {
                return DeliveryOutcome::Delivered { attempts: attempt };
            }
            Ok(response) if response.status().is_client_error() => {
                let status = response.status();
                return DeliveryOutcome::Failed {
                    attempts: attempt,
                    detail: format!("destination rejected delivery: {status}"),
                };
            }
            Ok(response) => {
                let status = response.status();
                if !policy.should_retry(attempt) {
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        detail: format!("destination returned {status} after {attempt} attempt(s)"),
                    };
                }
                tracing::warn!(destination, %status, attempt, "webhook delivery failed, retrying");
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
            Err(error) => {
                if !policy.should_retry(attempt) {
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        detail: format!("network error after {attempt} attempt(s): {error}"),
                    };
                }
                tracing::warn!(destination, %error, attempt, "webhook delivery errored, retrying");
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
        }
    }
}

/// Test-only seam: a fixed delay policy so retry tests don't block on real
/// backoff timings.
#[cfg(test)]
pub fn immediate_retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        jitter: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn succeeds_on_first_2xx() {
        let mut server = mockito_server().await;
        let mock = server.mock("POST", "/hook").with_status(200).create_async().await;
        let client = reqwest::Client::new();

        let outcome = deliver(&client, &format!("{}/hook", server.url()), &json!({"events": []}), &immediate_retry_policy(3)).await;

        mock.assert_async().await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
    }

    #[tokio::test]
    async fn retries_a_5xx_then_succeeds() {
        let mut server = mockito_server().await;
        let first = server.mock("POST", "/hook").with_status(503).expect(1).create_async().await;
        let second = server.mock("POST", "/hook").with_status(200).expect(1).create_async().await;
        let client = reqwest::Client::new();

        let outcome = deliver(&client, &format!("{}/hook", server.url()), &json!({}), &immediate_retry_policy(3)).await;

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut server = mockito_server().await;
        let mock = server.mock("POST", "/hook").with_status(500).expect(2).create_async().await;
        let client = reqwest::Client::new();

        let outcome = deliver(&client, &format!("{}/hook", server.url()), &json!({}), &immediate_retry_policy(2)).await;

        mock.assert_async().await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn a_4xx_is_not_retried() {
        let mut server = mockito_server().await;
        let mock = server.mock("POST", "/hook").with_status(400).expect(1).create_async().await;
        let client = reqwest::Client::new();

        let outcome = deliver(&client, &format!("{}/hook", server.url()), &json!({}), &immediate_retry_policy(5)).await;

        mock.assert_async().await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 1, .. }));
    }

    async fn mockito_server() -> mockito::ServerGuard {
        mockito::Server::new_async().await
    }
}
