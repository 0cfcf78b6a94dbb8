/// Local proof-of-work
///
/// A nonce is valid when sha256(index || data || nonce_le) has at least the
/// target number of leading zero bits. The target grows with payload size.

use crate::error::{DidError, DidResult};
use crate::ledger::retry::CancelSignal;
use crate::metrics;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Each full step of payload bytes adds one bit of difficulty
pub const POW_SIZE_STEP: usize = 4096;

/// Hard ceiling on the target
pub const MAX_POW_DIFFICULTY: u32 = 32;

/// Nonces tried between stop checks
const STOP_CHECK_INTERVAL: u64 = 4096;

/// Leading zero bits required for a payload of the given size
pub fn target_difficulty(base: u32, payload_len: usize) -> u32 {
    let size_bits = (payload_len / POW_SIZE_STEP).min(MAX_POW_DIFFICULTY as usize) as u32;
    base.saturating_add(size_bits).min(MAX_POW_DIFFICULTY)
}

pub fn pow_hash(index: &str, data: &[u8], nonce: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(index.as_bytes());
    hasher.update(data);
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

pub fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// Check a nonce against a target
pub fn verify(index: &str, data: &[u8], nonce: u64, target: u32) -> bool {
    leading_zero_bits(&pow_hash(index, data, nonce)) >= target
}

/// Search a nonce on the current thread; `None` if `should_stop` fires first
pub fn solve(index: &str, data: &[u8], target: u32, should_stop: impl Fn() -> bool) -> Option<u64> {
    let mut nonce = 0u64;
    loop {
        if verify(index, data, nonce, target) {
            return Some(nonce);
        }
        nonce = nonce.wrapping_add(1);
        if nonce % STOP_CHECK_INTERVAL == 0 && should_stop() {
            return None;
        }
    }
}

/// Search a nonce on a blocking thread, bounded by `timeout` and `cancel`
pub async fn solve_async(
    index: String,
    data: Vec<u8>,
    target: u32,
    timeout: Duration,
    cancel: &CancelSignal,
) -> DidResult<u64> {
    let stop = Arc::new(AtomicBool::new(false));
    let started = Instant::now();

    let handle = tokio::task::spawn_blocking({
        let index = index.clone();
        let stop = Arc::clone(&stop);
        let cancel = cancel.clone();
        move || {
            solve(&index, &data, target, || {
                stop.load(Ordering::Relaxed) || cancel.is_cancelled()
            })
        }
    });

    let result = tokio::time::timeout(timeout, handle).await;
    metrics::record_pow(started.elapsed().as_secs_f64());

    match result {
        Ok(Ok(Some(nonce))) => {
            debug!(
                "Proof-of-work found nonce {} for target {} in {:?}",
                nonce,
                target,
                started.elapsed()
            );
            Ok(nonce)
        }
        Ok(Ok(None)) => Err(DidError::Cancelled { message_id: None }),
        Ok(Err(e)) => Err(DidError::Internal(format!(
            "proof-of-work worker failed: {}",
            e
        ))),
        Err(_) => {
            stop.store(true, Ordering::Relaxed);
            Err(DidError::ProofOfWorkTimeout {
                index,
                timeout_ms: timeout.as_millis() as u64,
                target,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::retry::Canceller;

    #[test]
    fn test_target_scales_with_size() {
        assert_eq!(target_difficulty(8, 100), 8);
        assert_eq!(target_difficulty(8, POW_SIZE_STEP), 9);
        assert_eq!(target_difficulty(8, POW_SIZE_STEP * 3 + 1), 11);
        assert_eq!(target_difficulty(30, POW_SIZE_STEP * 10), MAX_POW_DIFFICULTY);
    }

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0, 0, 0x80]), 16);
        assert_eq!(leading_zero_bits(&[0, 0x0f]), 12);
        assert_eq!(leading_zero_bits(&[0xff]), 0);
        assert_eq!(leading_zero_bits(&[0, 0]), 16);
    }

    #[test]
    fn test_solve_and_verify() {
        let nonce = solve("tag", b"payload", 10, || false).unwrap();
        assert!(verify("tag", b"payload", nonce, 10));
        assert!(leading_zero_bits(&pow_hash("tag", b"payload", nonce)) >= 10);
    }

    #[test]
    fn test_zero_target_is_free() {
        assert_eq!(solve("tag", b"payload", 0, || false), Some(0));
    }

    #[test]
    fn test_solve_stops() {
        assert_eq!(solve("tag", b"payload", 64, || true), None);
    }

    #[tokio::test]
    async fn test_solve_async_times_out() {
        let result = solve_async(
            "tag".to_string(),
            b"payload".to_vec(),
            MAX_POW_DIFFICULTY,
            Duration::from_millis(20),
            &CancelSignal::never(),
        )
        .await;
        assert!(matches!(
            result,
            Err(DidError::ProofOfWorkTimeout { ref index, .. }) if index == "tag"
        ));
    }

    #[tokio::test]
    async fn test_solve_async_cancelled() {
        let canceller = Canceller::new();
        let signal = canceller.signal();
        canceller.cancel();

        let result = solve_async(
            "tag".to_string(),
            b"payload".to_vec(),
            MAX_POW_DIFFICULTY,
            Duration::from_secs(30),
            &signal,
        )
        .await;
        assert!(matches!(result, Err(DidError::Cancelled { .. })));
    }
}
