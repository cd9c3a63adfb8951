//! In-band `%SKIP%` / `%ABORT%` tokens
//!
//! Sentinels are only meaningful inside value fences and table cells. A cell
//! sentinel may carry a parenthesized reason: `%SKIP% (not published)`.

use crate::models::response::{ABORT_SENTINEL, SKIP_SENTINEL};
use crate::models::{CellState, ResponseState};

/// State named by a fence body consisting of exactly one sentinel token
#[must_use]
pub fn fence_sentinel(content: &str) -> Option<ResponseState> {
    match content.trim() {
        SKIP_SENTINEL => Some(ResponseState::Skipped),
        ABORT_SENTINEL => Some(ResponseState::Aborted),
        _ => None,
    }
}

/// State and optional reason of a sentinel table cell
#[must_use]
pub fn cell_sentinel(cell: &str) -> Option<(CellState, Option<String>)> {
    let cell = cell.trim();
    let (state, rest) = if let Some(rest) = cell.strip_prefix(SKIP_SENTINEL) {
        (CellState::Skipped, rest)
    } else if let Some(rest) = cell.strip_prefix(ABORT_SENTINEL) {
        (CellState::Aborted, rest)
    } else {
        return None;
    };

    let rest = rest.trim();
    if rest.is_empty() {
        return Some((state, None));
    }
    let reason = rest.strip_prefix('(')?.strip_suffix(')')?.trim();
    Some((state, (!reason.is_empty()).then(|| reason.to_string())))
}

/// Text written into a table cell for a skipped or aborted cell
#[must_use]
pub fn cell_sentinel_text(state: CellState, reason: Option<&str>) -> Option<String> {
    let token = match state {
        CellState::Skipped => SKIP_SENTINEL,
        CellState::Aborted => ABORT_SENTINEL,
        CellState::Answered => return None,
    };
    Some(match reason {
        Some(reason) if !reason.trim().is_empty() => format!("{token} ({})", reason.trim()),
        _ => token.to_string(),
    })
}

/// Whether a free-text value would be read back as a sentinel
#[must_use]
pub fn is_sentinel_text(text: &str) -> bool {
    fence_sentinel(text).is_some() || cell_sentinel(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_tokens_are_case_sensitive() {
        assert_eq!(fence_sentinel(" %SKIP%\n"), Some(ResponseState::Skipped));
        assert_eq!(fence_sentinel("%ABORT%"), Some(ResponseState::Aborted));
        assert_eq!(fence_sentinel("%skip%"), None);
        assert_eq!(fence_sentinel("%SKIP% because"), None);
    }

    #[test]
    fn cell_sentinel_with_reason() {
        assert_eq!(
            cell_sentinel("%SKIP% (not listed)"),
            Some((CellState::Skipped, Some("not listed".to_string())))
        );
        assert_eq!(cell_sentinel("%ABORT%"), Some((CellState::Aborted, None)));
        assert_eq!(cell_sentinel("%SKIP%()"), Some((CellState::Skipped, None)));
        assert_eq!(cell_sentinel("%SKIP% later"), None);
        assert_eq!(cell_sentinel("SKIP"), None);
    }

    #[test]
    fn cell_text_round_trips() {
        let text = cell_sentinel_text(CellState::Aborted, Some("site down")).unwrap();
        assert_eq!(text, "%ABORT% (site down)");
        assert_eq!(
            cell_sentinel(&text),
            Some((CellState::Aborted, Some("site down".to_string())))
        );
        assert_eq!(cell_sentinel_text(CellState::Answered, None), None);
    }
}
