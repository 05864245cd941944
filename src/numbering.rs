//! Season and episode number allocation
//!
//! Pure functions over snapshots of existing numbers. The catalog store
//! applies the same rules atomically in SQL (see `Database::next_episode_number`);
//! these are the reference semantics and are used where a caller already holds
//! the full set.

use std::collections::BTreeSet;

/// Smallest positive season number not in `existing`
///
/// Season 0 is reserved for specials and never returned.
pub fn next_season_number<I>(existing: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    let taken: BTreeSet<u32> = existing.into_iter().collect();
    (1..)
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(u32::MAX)
}

/// Next episode number for a (channel, season) given its current episodes
///
/// Equal to `count + 1` for a dense `1..=count` sequence. When earlier
/// episodes were deleted the maximum wins, so a number is never handed out
/// twice.
pub fn next_episode_number(count: u32, max_episode: Option<u32>) -> u32 {
    count.max(max_episode.unwrap_or(0)).saturating_add(1)
}

/// 1-based episode numbers for an ordered playlist listing
pub fn enumerate_listing<T>(entries: &[T]) -> impl Iterator<Item = (u32, &T)> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (index as u32 + 1, entry))
}
