//! Redis key constants and builders
//!
//! # Key Patterns
//!
//! - `sweep_lock:{job}` - Single-runner lease for a periodic sweep
//!
//! # Example
//!
//! ```
//! use park_cache::keys;
//!
//! let key = keys::sweep_lock_key("payout");
//! assert_eq!(key, "parkshare:sweep_lock:payout");
//! ```

/// Namespace shared by every key this engine writes
pub const NAMESPACE: &str = "parkshare";

/// Prefix for sweep leases
///
/// Format: `parkshare:sweep_lock:{job}`
pub const SWEEP_LOCK_PREFIX: &str = "sweep_lock";

/// Build the lease key for a sweep job
///
/// # Example
///
/// ```
/// use park_cache::keys::sweep_lock_key;
///
/// assert_eq!(sweep_lock_key("expiry"), "parkshare:sweep_lock:expiry");
/// ```
pub fn sweep_lock_key(job: &str) -> String {
    format!("{}:{}:{}", NAMESPACE, SWEEP_LOCK_PREFIX, job)
}
