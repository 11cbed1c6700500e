// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        admin_backoff, default_backoff, failure_backoff, is_retryable_error, retry_api_call,
        BackoffPolicy, ExponentialBackoff, KUBE_API_POLICY,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(Box::new(kube::core::Status {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: format!("HTTP {code}"),
            reason: "Test".to_string(),
            code,
            metadata: None,
            details: None,
        }))
    }

    #[test]
    fn test_backoff_configuration() {
        let backoff = default_backoff();
        assert_eq!(backoff.policy(), &KUBE_API_POLICY);
        assert_eq!(backoff.current(), Duration::from_millis(100));
        assert_eq!(KUBE_API_POLICY.deadline, Some(Duration::from_secs(120)));

        let admin = admin_backoff();
        assert_eq!(admin.current(), Duration::from_millis(50));
        assert_eq!(admin.policy().deadline, None);
    }

    #[test]
    fn test_next_backoff_grows_and_caps() {
        let mut backoff = admin_backoff();
        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(45) && first <= Duration::from_millis(55));
        for _ in 0..20 {
            let next = backoff.next_backoff().unwrap();
            assert!(next <= Duration::from_secs(2));
        }
        assert_eq!(backoff.current(), Duration::from_secs(2));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(50));
    }

    #[test]
    fn test_deadline_stops_backoff() {
        let mut backoff = ExponentialBackoff::new(BackoffPolicy {
            deadline: Some(Duration::ZERO),
            ..KUBE_API_POLICY
        });
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let mut backoff = ExponentialBackoff::new(BackoffPolicy {
            jitter: 0.0,
            ..KUBE_API_POLICY
        });
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_failure_backoff_doubles_up_to_cap() {
        let cap = Duration::from_secs(60);
        assert_eq!(failure_backoff(1, cap), Duration::from_secs(1));
        assert_eq!(failure_backoff(2, cap), Duration::from_secs(2));
        assert_eq!(failure_backoff(5, cap), Duration::from_secs(16));
        assert_eq!(failure_backoff(7, cap), cap);
        assert_eq!(failure_backoff(u32::MAX, cap), cap);
    }

    #[test]
    fn test_retryable_kube_errors() {
        assert!(is_retryable_error(&api_error(429)));
        assert!(is_retryable_error(&api_error(500)));
        assert!(is_retryable_error(&api_error(503)));
        assert!(!is_retryable_error(&api_error(400)));
        assert!(!is_retryable_error(&api_error(404)));
        assert!(!is_retryable_error(&api_error(409)));

        let io: Box<dyn std::error::Error + Send + Sync> = Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(is_retryable_error(&kube::Error::Service(io)));
    }

    #[tokio::test]
    async fn test_retry_api_call_recovers_from_transient_error() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call(
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(api_error(503))
                    } else {
                        Ok("patched")
                    }
                }
            },
            "patch status",
        )
        .await
        .unwrap();
        assert_eq!(result, "patched");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_api_call_fails_fast_on_client_error() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_api_call(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(api_error(422)) }
            },
            "patch status",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
