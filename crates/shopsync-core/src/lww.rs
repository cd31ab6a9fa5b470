//! # Last-Write-Wins
//!
//! Conflict rule shared by pull and push: the copy with the strictly newer
//! `updated_at` wins; equal timestamps keep whatever is already stored.
//!
//! ```text
//!   pull:  central.updated_at >  local.updated_at  → overwrite local
//!          central.updated_at <= local.updated_at  → keep local
//!
//!   push:  queued snapshot older than current local row → superseded, drop
//!          central.updated_at >  pushed.updated_at      → central keeps its row
//! ```

use chrono::{DateTime, Utc};

/// Decision for a pulled record that already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    TakeCentral,
    KeepLocal,
}

/// Resolves a pulled record against the local copy. Ties go to local.
pub fn resolve(local_updated_at: DateTime<Utc>, central_updated_at: DateTime<Utc>) -> Resolution {
    if central_updated_at > local_updated_at {
        Resolution::TakeCentral
    } else {
        Resolution::KeepLocal
    }
}

/// True when a queued snapshot has been replaced by a later local write.
#[inline]
pub fn is_superseded(snapshot_updated_at: DateTime<Utc>, current_updated_at: DateTime<Utc>) -> bool {
    snapshot_updated_at < current_updated_at
}

/// True when the central copy must not be overwritten by a push.
#[inline]
pub fn central_wins(central_updated_at: DateTime<Utc>, pushed_updated_at: DateTime<Utc>) -> bool {
    central_updated_at > pushed_updated_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_millis;

    #[test]
    fn test_newer_central_wins() {
        assert_eq!(
            resolve(from_millis(1_000).unwrap(), from_millis(1_001).unwrap()),
            Resolution::TakeCentral
        );
    }

    #[test]
    fn test_tie_keeps_local() {
        let t = from_millis(1_000).unwrap();
        assert_eq!(resolve(t, t), Resolution::KeepLocal);
        assert!(!central_wins(t, t));
        assert!(!is_superseded(t, t));
    }

    #[test]
    fn test_newer_local_kept() {
        assert_eq!(
            resolve(from_millis(2_000).unwrap(), from_millis(1_000).unwrap()),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn test_superseded_snapshot() {
        assert!(is_superseded(from_millis(1_000).unwrap(), from_millis(1_005).unwrap()));
        assert!(central_wins(from_millis(1_010).unwrap(), from_millis(1_005).unwrap()));
    }
}
