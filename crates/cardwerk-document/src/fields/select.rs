// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use cardwerk_core::FieldCandidate;
use tracing::debug;

/// Keep candidates whose left edge lies strictly right of `x_threshold`
/// and put them in reading order (ascending `y`). Candidates on the same
/// row keep their emission order.
pub fn select_fields(candidates: &[FieldCandidate], x_threshold: u32) -> Vec<FieldCandidate> {
    let mut selected: Vec<FieldCandidate> = candidates
        .iter()
        .filter(|c| c.x > x_threshold)
        .cloned()
        .collect();
    selected.sort_by_key(|c| c.y);
    debug!(
        total = candidates.len(),
        selected = selected.len(),
        x_threshold,
        "Fields selected"
    );
    selected
}
