//! Start-index/count windowing over a matched result set.
//!
//! `startIndex` is 1-based and inclusive, defaulting to 1; `count` defaults
//! to 100. Unlike the behavior this module replaces, `startIndex` really is
//! applied as an offset into the matched set — previously every page started
//! at the first matched entry regardless of the requested index. Callers that
//! depended on the old non-offsetting pages will observe different windows.

/// Default page size when the caller sends no `count`.
const DEFAULT_COUNT: usize = 100;

/// A window over a matched result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<T> {
	/// Entries within the window, in match order.
	pub items: Vec<T>,
	/// The effective 1-based start index (requested, clamped to at least 1).
	pub start_index: usize,
	/// Number of entries matched by the query, before windowing.
	pub total_results: usize,
}

/// Apply start-index/count windowing to a matched set.
///
/// `total_results` is the matched size, not the directory size. The returned
/// window holds `min(count, total - (start - 1))` entries; with a start index
/// of 1 that reduces to `min(count, total)`.
#[must_use]
pub fn window<T>(matched: Vec<T>, start_index: Option<usize>, count: Option<usize>) -> Window<T> {
	let start_index = start_index.unwrap_or(1).max(1);
	let count = count.unwrap_or(DEFAULT_COUNT);
	let total_results = matched.len();

	let items = matched.into_iter().skip(start_index - 1).take(count).collect();
	Window { items, start_index, total_results }
}
