// logscope - core/merge.rs
//
// Interleaves a window of search results with user-marked lines so marks
// show up in context between the matches around them.

use crate::core::model::ParsedLine;

/// Merge `matches` (one search window) with `marks`.
///
/// Both inputs are ordered by line ordinal first, so their given order does
/// not matter. Marks are kept only within the window's line range; the range
/// is open towards the file start on the first window and towards the file
/// end on the last one (`total_matches` tells which window is last). A mark
/// on a matching line is emitted once, as the match, and repeated marks
/// collapse to one. Marks take the match
/// ordinal of the nearest match before them, or of the first match.
pub fn merge_lines(
    matches: &[ParsedLine],
    marks: &[ParsedLine],
    total_matches: u64,
) -> Vec<ParsedLine> {
    let mut matches = matches.to_vec();
    let mut marks = marks.to_vec();
    matches.sort_by_key(ParsedLine::line_ordinal);
    marks.sort_by_key(ParsedLine::line_ordinal);
    marks.dedup_by_key(|m| m.line_ordinal());

    let (Some(first_match), Some(last_match)) = (matches.first(), matches.last()) else {
        return marks;
    };
    let Some(last_mark) = marks.last() else {
        return matches;
    };

    let window_start = if first_match.match_ordinal == Some(0) {
        0
    } else {
        first_match.line_ordinal()
    };
    let is_last_window = total_matches
        .checked_sub(1)
        .is_some_and(|last| last_match.match_ordinal == Some(last));
    let window_end = if is_last_window {
        last_mark.line_ordinal()
    } else {
        last_match.line_ordinal()
    };

    let mut merged = Vec::with_capacity(matches.len() + marks.len());
    let mut marks = marks
        .into_iter()
        .skip_while(|m| m.line_ordinal() < window_start)
        .take_while(|m| m.line_ordinal() <= window_end)
        .peekable();
    let mut previous_ordinal = first_match.match_ordinal;

    for line in &matches {
        while let Some(mark) = marks.next_if(|m| m.line_ordinal() < line.line_ordinal()) {
            merged.push(ParsedLine {
                match_ordinal: previous_ordinal,
                ..mark
            });
        }
        while marks.next_if(|m| m.line_ordinal() == line.line_ordinal()).is_some() {}
        merged.push(line.clone());
        previous_ordinal = line.match_ordinal;
    }
    merged.extend(marks.map(|mark| ParsedLine {
        match_ordinal: previous_ordinal,
        ..mark
    }));
    merged
}
