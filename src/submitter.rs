// src/submitter.rs
use std::sync::Arc;

use ethers::types::{Address, H256};
use tokio::time::{sleep, timeout};
use tracing::{info, instrument, warn};

use crate::bundler::Bundler;
use crate::config::SubmissionConfig;
use crate::error::ChipInError;
use crate::types::{OperationReceipt, UserOperation};

/// Outcome of handing an operation to the bundler.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Confirmed(OperationReceipt),
    /// Accepted by the bundler but not included before the timeout.
    Pending { user_op_hash: H256 },
}

pub struct OperationSubmitter {
    bundler: Arc<dyn Bundler>,
    entry_point: Address,
    config: SubmissionConfig,
}

impl OperationSubmitter {
    pub fn new(bundler: Arc<dyn Bundler>, entry_point: Address, config: SubmissionConfig) -> Self {
        Self {
            bundler,
            entry_point,
            config,
        }
    }

    #[instrument(skip_all, fields(sender = ?user_op.sender, nonce = %user_op.nonce))]
    pub async fn submit(&self, user_op: &UserOperation) -> Result<Submission, ChipInError> {
        let user_op_hash = self
            .bundler
            .send_user_operation(user_op, self.entry_point)
            .await
            .map_err(ChipInError::Submission)?;
        info!(?user_op_hash, "User operation accepted by bundler");

        match timeout(self.config.timeout, self.wait_for_receipt(user_op_hash)).await {
            Ok(receipt) => {
                info!(
                    ?user_op_hash,
                    transaction_hash = ?receipt.transaction_hash,
                    success = receipt.success,
                    "User operation included"
                );
                Ok(Submission::Confirmed(receipt))
            }
            Err(_) => {
                warn!(
                    ?user_op_hash,
                    timeout_secs = self.config.timeout.as_secs(),
                    "No receipt before timeout, operation may still be included"
                );
                Ok(Submission::Pending { user_op_hash })
            }
        }
    }

    /// Polls until a receipt shows up. Poll failures are transient.
    async fn wait_for_receipt(&self, user_op_hash: H256) -> OperationReceipt {
        loop {
            match self.bundler.get_user_operation_receipt(user_op_hash).await {
                Ok(Some(receipt)) => return receipt.into(),
                Ok(None) => {}
                Err(err) => warn!(?user_op_hash, %err, "Receipt poll failed"),
            }
            sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::MockBundler;
    use crate::error::BundlerError;
    use crate::types::{BundleReceipt, UserOperationReceipt};
    use ethers::types::U256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast() -> SubmissionConfig {
        SubmissionConfig {
            timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn receipt(hash: H256) -> UserOperationReceipt {
        UserOperationReceipt {
            user_op_hash: hash,
            sender: Address::repeat_byte(0xac),
            nonce: U256::zero(),
            paymaster: Some(Address::repeat_byte(0x31)),
            actual_gas_cost: U256::from(1_000u64),
            actual_gas_used: U256::from(90_000u64),
            success: true,
            reason: None,
            logs: vec![],
            receipt: BundleReceipt {
                transaction_hash: H256::repeat_byte(0xbb),
                block_number: None,
            },
        }
    }

    #[tokio::test]
    async fn polls_through_errors_until_receipt() {
        let hash = H256::repeat_byte(0xab);
        let polls = Arc::new(AtomicUsize::new(0));
        let mut bundler = MockBundler::new();
        bundler
            .expect_send_user_operation()
            .times(1)
            .returning(move |_, _| Ok(hash));
        let counter = polls.clone();
        bundler
            .expect_get_user_operation_receipt()
            .returning(move |hash| match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(None),
                1 => Err(BundlerError::Transport {
                    method: "eth_getUserOperationReceipt",
                    message: "timeout".into(),
                }),
                _ => Ok(Some(receipt(hash))),
            });

        let submitter = OperationSubmitter::new(Arc::new(bundler), Address::repeat_byte(0x71), fast());
        let outcome = submitter.submit(&UserOperation::default()).await.unwrap();

        let Submission::Confirmed(receipt) = outcome else {
            panic!("expected a confirmed submission");
        };
        assert_eq!(receipt.transaction_hash, H256::repeat_byte(0xbb));
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn timeout_yields_pending_with_hash() {
        let hash = H256::repeat_byte(0xab);
        let mut bundler = MockBundler::new();
        bundler
            .expect_send_user_operation()
            .returning(move |_, _| Ok(hash));
        bundler
            .expect_get_user_operation_receipt()
            .returning(|_| Ok(None));

        let config = SubmissionConfig {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
        };
        let submitter = OperationSubmitter::new(Arc::new(bundler), Address::repeat_byte(0x71), config);
        let outcome = submitter.submit(&UserOperation::default()).await.unwrap();
        assert_eq!(outcome, Submission::Pending { user_op_hash: hash });
    }

    #[tokio::test]
    async fn rejected_send_is_a_submission_error() {
        let mut bundler = MockBundler::new();
        bundler.expect_send_user_operation().returning(|_, _| {
            Err(BundlerError::rejected(
                "eth_sendUserOperation",
                -32500,
                "AA25 invalid account nonce".into(),
                None,
            ))
        });
        bundler.expect_get_user_operation_receipt().never();

        let submitter = OperationSubmitter::new(Arc::new(bundler), Address::repeat_byte(0x71), fast());
        let err = submitter.submit(&UserOperation::default()).await.unwrap_err();
        assert!(matches!(err, ChipInError::Submission(_)));
    }
}
