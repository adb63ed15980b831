//! Push-certificate nonce issuance and verification (HMAC-SHA1).
//!
//! Matches the scheme used by `git`/JGit for `receive.certNonceSeed`: the
//! server issues a nonce bound to the repository path and the time it was
//! issued, then verifies the value echoed back in the push certificate,
//! allowing a small clock/latency slop window.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Outcome of verifying a push certificate's nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    /// The received nonce matches what was issued (exactly, or within slop).
    Ok,
    /// The client sent no nonce at all.
    Missing,
    /// A nonce was received but the server never issued one for this session.
    Unsolicited,
    /// The received nonce's HMAC does not recompute to match.
    Bad,
    /// The HMAC matches but the timestamp drifted beyond the allowed slop.
    Slop,
}

impl NonceStatus {
    /// Whether this status should cause the whole certificate-covered batch to be rejected.
    pub fn rejects_batch(self) -> bool {
        matches!(self, NonceStatus::Missing | NonceStatus::Bad | NonceStatus::Unsolicited)
    }
}

/// Compute `HMAC-SHA1(seed, path || ":" || t)` and render as lowercase hex.
fn compute_hmac_hex(seed: &str, repo_identity: &str, timestamp: u64) -> String {
    let payload = format!("{repo_identity}:{timestamp}");
    let mut mac = HmacSha1::new_from_slice(seed.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    let result = mac.finalize().into_bytes();
    hex_lower(&result)
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{:02x}", b).expect("writing to a String never fails");
    }
    s
}

/// Issue a nonce for the given repository identity at timestamp `t` (seconds).
///
/// Returns `"<t>-<hex(hmac)>"`, matching the format the client is expected to echo back.
pub fn issue(seed: &str, repo_identity: &str, t: u64) -> String {
    let hmac_hex = compute_hmac_hex(seed, repo_identity, t);
    format!("{t}-{hmac_hex}")
}

/// Verify a nonce received from the client against the one we issued.
///
/// `issued` is `None` if no nonce was issued this session (e.g. signed-push
/// is not configured, or the advertisement never carried `push-cert=`).
pub fn verify(issued: Option<&str>, received: &str, seed: &str, repo_identity: &str, slop: u64) -> NonceStatus {
    if received.is_empty() {
        return NonceStatus::Missing;
    }
    let Some(issued) = issued else {
        return NonceStatus::Unsolicited;
    };
    if issued == received {
        return NonceStatus::Ok;
    }

    let Some((issued_t_str, _)) = issued.split_once('-') else {
        return NonceStatus::Bad;
    };
    let Some((received_t_str, _received_hex)) = received.split_once('-') else {
        return NonceStatus::Bad;
    };

    let (Ok(issued_t), Ok(received_t)) = (issued_t_str.parse::<u64>(), received_t_str.parse::<u64>()) else {
        return NonceStatus::Bad;
    };

    let recomputed = compute_hmac_hex(seed, repo_identity, received_t);
    let recomputed_full = format!("{received_t}-{recomputed}");
    if recomputed_full != received {
        return NonceStatus::Bad;
    }

    let drift = issued_t.abs_diff(received_t);
    if slop > 0 && drift <= slop {
        NonceStatus::Ok
    } else {
        NonceStatus::Slop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_exact_match_is_ok() {
        let nonce = issue("s3cr3t", "/srv/repo.git", 1_000);
        let status = verify(Some(&nonce), &nonce, "s3cr3t", "/srv/repo.git", 5);
        assert_eq!(status, NonceStatus::Ok);
    }

    #[test]
    fn empty_received_is_missing() {
        let status = verify(Some("1000-abcd"), "", "seed", "repo", 5);
        assert_eq!(status, NonceStatus::Missing);
    }

    #[test]
    fn no_issued_nonce_is_unsolicited() {
        let status = verify(None, "1000-abcd", "seed", "repo", 5);
        assert_eq!(status, NonceStatus::Unsolicited);
    }

    #[test]
    fn tampered_hmac_is_bad() {
        let nonce = issue("s3cr3t", "/srv/repo.git", 1_000);
        let tampered = format!("{}-deadbeefdeadbeefdeadbeefdeadbeefdeadbeef", 1_000);
        let status = verify(Some(&nonce), &tampered, "s3cr3t", "/srv/repo.git", 5);
        assert_eq!(status, NonceStatus::Bad);
    }

    #[test]
    fn drifted_timestamp_within_slop_is_ok() {
        let issued = issue("s3cr3t", "/srv/repo.git", 1_000);
        let received = issue("s3cr3t", "/srv/repo.git", 1_003);
        let status = verify(Some(&issued), &received, "s3cr3t", "/srv/repo.git", 5);
        assert_eq!(status, NonceStatus::Ok);
    }

    #[test]
    fn drifted_timestamp_beyond_slop_is_slop() {
        let issued = issue("s3cr3t", "/srv/repo.git", 1_000);
        let received = issue("s3cr3t", "/srv/repo.git", 1_100);
        let status = verify(Some(&issued), &received, "s3cr3t", "/srv/repo.git", 5);
        assert_eq!(status, NonceStatus::Slop);
    }

    #[test]
    fn zero_slop_never_forgives_drift() {
        let issued = issue("s3cr3t", "/srv/repo.git", 1_000);
        let received = issue("s3cr3t", "/srv/repo.git", 1_001);
        let status = verify(Some(&issued), &received, "s3cr3t", "/srv/repo.git", 0);
        assert_eq!(status, NonceStatus::Slop);
    }

    #[test]
    fn rejects_batch_classification() {
        assert!(NonceStatus::Missing.rejects_batch());
        assert!(NonceStatus::Bad.rejects_batch());
        assert!(NonceStatus::Unsolicited.rejects_batch());
        assert!(!NonceStatus::Ok.rejects_batch());
        assert!(!NonceStatus::Slop.rejects_batch());
    }
}
