//! Compression-trigger arithmetic over session offsets.

use dramatis_window::TurnFragment;

/// Fragments written past the last summarized end offset. `current_offset`
/// is the next offset to be assigned; a session with no summaries has
/// everything pending.
pub(crate) fn pending_fragments(current_offset: u64, max_end_offset: Option<u64>) -> u64 {
    current_offset.saturating_sub(max_end_offset.map_or(0, |end| end + 1))
}

/// Closed offset range a compression pass covers: from the oldest fragment
/// still held in the window through the last offset written.
pub(crate) fn compression_range(current_offset: u64, window_len: usize) -> (u64, u64) {
    let end = current_offset.saturating_sub(1);
    let start = current_offset.saturating_sub(window_len as u64);
    (start, end)
}

/// Transcript block handed to the digest call, speaker-labelled, oldest first.
pub(crate) fn transcript_block(fragments: &[&TurnFragment]) -> String {
    fragments
        .iter()
        .map(|f| format!("{}: {}", f.role.as_str(), f.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use dramatis_window::{FragmentKind, Role, TurnFragment};

    use super::{compression_range, pending_fragments, transcript_block};

    #[test]
    fn pending_counts_everything_without_summaries() {
        assert_eq!(pending_fragments(0, None), 0);
        assert_eq!(pending_fragments(9, None), 9);
    }

    #[test]
    fn pending_is_zero_right_after_a_summary() {
        // A summary covering [0, 5] leaves nothing pending at offset 6.
        assert_eq!(pending_fragments(6, Some(5)), 0);
        assert_eq!(pending_fragments(9, Some(5)), 3);
    }

    #[test]
    fn range_covers_window_through_last_written() {
        assert_eq!(compression_range(6, 6), (0, 5));
        assert_eq!(compression_range(12, 6), (6, 11));
    }

    #[test]
    fn range_clamps_at_zero() {
        assert_eq!(compression_range(4, 10), (0, 3));
        assert_eq!(compression_range(0, 3), (0, 0));
    }

    #[test]
    fn transcript_labels_speakers() {
        let a = TurnFragment::new("s", "c", Role::User, FragmentKind::Conversation, "hi", 0);
        let b = TurnFragment::new(
            "s",
            "c",
            Role::Assistant,
            FragmentKind::Conversation,
            "hello",
            1,
        );
        assert_eq!(transcript_block(&[&a, &b]), "user: hi\nassistant: hello");
    }
}
