//! Derives overall and per-variant status from variant snapshots
//!
//! Pure and deterministic: no I/O, no clock, no stored state. The input is
//! trusted as-is; guarding against regressing snapshots is the merge rule's
//! job in the song store, not this function's.

use tunecraft_common::db::models::{SongStatus, VariantSnapshot, VariantStatus};

/// Result of evaluating a record's variant set
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCalculation {
    /// Overall job status derived from the variant set.
    ///
    /// Never `Failed`: failure is only ever persisted by the reconciler when
    /// the provider explicitly reports a terminal error.
    pub overall_status: SongStatus,
    /// Readiness per variant, in input order (variant id, status)
    pub variant_statuses: Vec<(String, VariantStatus)>,
    pub has_any_stream_ready: bool,
    pub has_any_download_ready: bool,
    pub all_variants_download_ready: bool,
}

/// Classify a single variant from the presence of its audio URLs.
///
/// A download URL implies stream capability, so `DownloadReady` wins over
/// `StreamReady`.
pub fn classify_variant(variant: &VariantSnapshot) -> VariantStatus {
    if !variant.audio_url.is_empty() {
        VariantStatus::DownloadReady
    } else if !variant.stream_audio_url.is_empty() {
        VariantStatus::StreamReady
    } else {
        VariantStatus::Pending
    }
}

/// Compute the overall job status for a set of variant snapshots.
///
/// `Completed` iff every variant (and at least one) is download-ready;
/// otherwise `StreamAvailable` iff any variant is stream- or download-ready;
/// otherwise `Pending` (including the empty set).
pub fn calculate(variants: &[VariantSnapshot]) -> StatusCalculation {
    let variant_statuses: Vec<(String, VariantStatus)> = variants
        .iter()
        .map(|v| (v.id.clone(), classify_variant(v)))
        .collect();

    let all_variants_download_ready = !variant_statuses.is_empty()
        && variant_statuses
            .iter()
            .all(|(_, s)| *s == VariantStatus::DownloadReady);
    let has_any_download_ready = variant_statuses
        .iter()
        .any(|(_, s)| *s == VariantStatus::DownloadReady);
    let has_any_stream_ready = variant_statuses
        .iter()
        .any(|(_, s)| matches!(s, VariantStatus::StreamReady | VariantStatus::DownloadReady));

    let overall_status = if all_variants_download_ready {
        SongStatus::Completed
    } else if has_any_stream_ready {
        SongStatus::StreamAvailable
    } else {
        SongStatus::Pending
    };

    StatusCalculation {
        overall_status,
        variant_statuses,
        has_any_stream_ready,
        has_any_download_ready,
        all_variants_download_ready,
    }
}
