use std::collections::BTreeMap;

use time::OffsetDateTime;

/// ISO week bucket (`2024-W07`) of a snapshot timestamp, in UTC.
pub fn weekly_group_key(ts: OffsetDateTime) -> String {
    let (year, week, _) = ts.to_offset(time::UtcOffset::UTC).date().to_iso_week_date();
    format!("{year}-W{week:02}")
}

/// Row indices per side of a group-aware split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub train_groups: Vec<String>,
    pub validation_groups: Vec<String>,
}

/// Split rows so every group lands entirely on one side.
///
/// Groups are ranked by a seeded hash and the first
/// `round(fraction * groups)` (at least one, never all) become validation.
/// Returns `None` when there are fewer than two distinct groups.
pub fn split_by_group<S: AsRef<str>>(
    group_keys: &[S],
    validation_fraction: f64,
    seed: u64,
) -> Option<GroupSplit> {
    let mut rows_by_group: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, key) in group_keys.iter().enumerate() {
        rows_by_group.entry(key.as_ref()).or_default().push(idx);
    }
    let group_count = rows_by_group.len();
    if group_count < 2 {
        return None;
    }

    let mut ranked: Vec<(u64, &str)> = rows_by_group
        .keys()
        .map(|&group| (group_rank(seed, group), group))
        .collect();
    ranked.sort();
    let wanted = (validation_fraction.clamp(0.0, 1.0) * group_count as f64).round() as usize;
    let validation_count = wanted.clamp(1, group_count - 1);

    let mut split = GroupSplit::default();
    for (position, (_, group)) in ranked.into_iter().enumerate() {
        let rows = rows_by_group.get(group).cloned().unwrap_or_default();
        if position < validation_count {
            split.validation.extend(rows);
            split.validation_groups.push(group.to_string());
        } else {
            split.train.extend(rows);
            split.train_groups.push(group.to_string());
        }
    }
    split.train.sort_unstable();
    split.validation.sort_unstable();
    split.train_groups.sort();
    split.validation_groups.sort();
    Some(split)
}

fn group_rank(seed: u64, group: &str) -> u64 {
    let hash = blake3::hash(format!("{seed}|{group}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}
