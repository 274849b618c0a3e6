use futures_util::future::join_all;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use tracing::{info, warn};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemOutcome<R> {
    pub identifier: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<R> BatchItemOutcome<R> {
    fn succeeded(identifier: String, result: R) -> Self {
        Self {
            identifier,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn failed(identifier: String, error: String) -> Self {
        Self {
            identifier,
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport<R> {
    pub total: usize,
    pub success_count: usize,
    pub fail_count: usize,
    /// One entry per input item, in input order.
    pub outcomes: Vec<BatchItemOutcome<R>>,
}

/// Runs `per_item` over every item concurrently and waits for all of them.
///
/// Each item runs in its own task, so one failing or panicking item is
/// recorded as a failed outcome without disturbing its siblings. Batches that
/// are empty or larger than `limit` are rejected before anything is spawned.
pub async fn run_batch<T, R, E, F, Fut>(
    items: Vec<(String, T)>,
    limit: usize,
    per_item: F,
) -> Result<BatchReport<R>, ValidationError>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    if items.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if items.len() > limit {
        return Err(ValidationError::BatchTooLarge {
            size: items.len(),
            limit,
        });
    }

    info!(items = items.len(), "Dispatching batch");

    let (identifiers, handles): (Vec<_>, Vec<_>) = items
        .into_iter()
        .map(|(identifier, input)| (identifier, tokio::spawn(per_item(input))))
        .unzip();

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .zip(identifiers)
        .map(|(joined, identifier)| match joined {
            Ok(Ok(result)) => BatchItemOutcome::succeeded(identifier, result),
            Ok(Err(e)) => {
                warn!(item = %identifier, error = %e, "Batch item failed");
                BatchItemOutcome::failed(identifier, e.to_string())
            }
            Err(join_error) => {
                warn!(item = %identifier, error = %join_error, "Batch item task aborted");
                BatchItemOutcome::failed(identifier, "item processing aborted".to_string())
            }
        })
        .collect();

    let success_count = outcomes.iter().filter(|o| o.success).count();
    let report = BatchReport {
        total: outcomes.len(),
        success_count,
        fail_count: outcomes.len() - success_count,
        outcomes,
    };
    info!(
        total = report.total,
        succeeded = report.success_count,
        failed = report.fail_count,
        "Batch completed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn named(inputs: &[u64]) -> Vec<(String, u64)> {
        inputs
            .iter()
            .map(|n| (format!("item-{n}.png"), *n))
            .collect()
    }

    #[tokio::test]
    async fn middle_failure_does_not_disturb_siblings() {
        let report = run_batch(named(&[1, 2, 3]), 100, |n| async move {
            if n == 2 {
                Err(format!("provider rejected item {n}"))
            } else {
                Ok(n * 10)
            }
        })
        .await
        .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.fail_count, 1);
        assert_eq!(report.outcomes[0].result, Some(10));
        assert!(!report.outcomes[1].success);
        assert_eq!(
            report.outcomes[1].error.as_deref(),
            Some("provider rejected item 2")
        );
        assert_eq!(report.outcomes[2].result, Some(30));
    }

    #[tokio::test]
    async fn output_order_follows_input_not_completion() {
        let report = run_batch(named(&[30, 20, 10, 0]), 100, |n| async move {
            tokio::time::sleep(Duration::from_millis(n)).await;
            Ok::<_, String>(n)
        })
        .await
        .unwrap();

        let identifiers: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| o.identifier.as_str())
            .collect();
        assert_eq!(
            identifiers,
            ["item-30.png", "item-20.png", "item-10.png", "item-0.png"]
        );
    }

    #[tokio::test]
    async fn panicking_item_is_recorded_as_failure() {
        let report = run_batch(named(&[1, 2]), 100, |n| async move {
            if n == 1 {
                panic!("decoder exploded");
            }
            Ok::<_, String>(n)
        })
        .await
        .unwrap();

        assert_eq!(report.success_count, 1);
        assert_eq!(report.fail_count, 1);
        assert!(!report.outcomes[0].success);
        assert!(report.outcomes[1].success);
    }

    #[tokio::test]
    async fn oversized_and_empty_batches_are_rejected() {
        let err = run_batch(named(&[1, 2, 3]), 2, |n| async move { Ok::<_, String>(n) })
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::BatchTooLarge { size: 3, limit: 2 });

        let err = run_batch(Vec::<(String, u64)>::new(), 2, |n| async move {
            Ok::<_, String>(n)
        })
        .await
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyBatch);
    }

    #[tokio::test]
    async fn report_serialises_in_camel_case() {
        let report = run_batch(named(&[5]), 10, |n| async move { Ok::<_, String>(n) })
            .await
            .unwrap();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["successCount"], 1);
        assert_eq!(value["failCount"], 0);
        assert_eq!(value["outcomes"][0]["identifier"], "item-5.png");
        assert!(value["outcomes"][0].get("error").is_none());
    }
}
