use crate::model::*;

// ── Busy / free interval algebra ──────────────────────────────────

/// Busy spans of the active events overlapping `window`, clamped to it,
/// sorted and merged.
pub fn busy_spans(events: &[Event], window: &Span) -> Vec<Span> {
    let mut spans: Vec<Span> = events
        .iter()
        .filter(|e| e.is_active() && e.span.overlaps(window))
        .map(|e| Span::new(e.span.start.max(window.start), e.span.end.min(window.end)))
        .collect();
    spans.sort_by_key(|s| s.start);
    merge_overlapping(&spans)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(*span);
    }
    merged
}

/// Subtract `to_remove` from `base`. Both must be sorted by start.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut j = 0;

    for b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        // Skip removals that end before this base span starts.
        while j < to_remove.len() && to_remove[j].end <= current_start {
            j += 1;
        }

        let mut k = j;
        while k < to_remove.len() && to_remove[k].start < current_end {
            let r = &to_remove[k];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            k += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
