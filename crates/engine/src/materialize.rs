use std::collections::BTreeSet;

use pairsort_core::{GroupRegistry, ItemId, ItemStore, SortState};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How a tie group's rank is rendered. Groups are counted for `Standard` and
/// `Ordinal`; items are counted for the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankStyle {
    /// 1-based group position.
    Standard,
    /// 1 + number of items ranked strictly above (1, 1, 3).
    Competition,
    /// Item span of the group, `"3-5"`, or a bare number for singletons.
    #[default]
    Range,
    /// Midpoint of the item span, `"2.5"`.
    Fractional,
    /// English ordinal of the group position, `"2nd"`.
    Ordinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Ranked,
    Removed,
    InProgress,
    Unsorted,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ranked => "ranked",
            Self::Removed => "removed",
            Self::InProgress => "in_progress",
            Self::Unsorted => "unsorted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub item_id: ItemId,
    /// 1-based group position; `None` for anything not in the ranked order.
    pub rank: Option<u32>,
    pub group_size: usize,
    pub status: ItemStatus,
    pub annotation: Option<String>,
    /// Rank rendered in the requested style.
    pub display: Option<String>,
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// `position` is the 1-based group index, `preceding` the number of items in
/// earlier groups, `size` the group's member count.
pub fn format_rank(style: RankStyle, position: u32, preceding: usize, size: usize) -> String {
    let start = preceding + 1;
    let end = preceding + size;
    match style {
        RankStyle::Standard => position.to_string(),
        RankStyle::Competition => start.to_string(),
        RankStyle::Range if size > 1 => format!("{start}-{end}"),
        RankStyle::Range => start.to_string(),
        RankStyle::Fractional => {
            let sum = start + end;
            if sum % 2 == 0 {
                (sum / 2).to_string()
            } else {
                format!("{}.5", sum / 2)
            }
        }
        RankStyle::Ordinal => ordinal(position),
    }
}

/// Flatten the ranked order into one entry per item, then append removed
/// items and, if asked, the item in progress and the unsorted queue.
pub fn materialize(
    state: &SortState,
    groups: &GroupRegistry,
    removed: &BTreeSet<ItemId>,
    items: &ItemStore,
    include_unplaced: bool,
    style: RankStyle,
) -> Result<Vec<RankedEntry>, EngineError> {
    let mut out = Vec::with_capacity(items.len());
    let annotation = |id: ItemId| items.annotation(id).map(str::to_string);

    let mut preceding = 0;
    for (index, group_id) in state.ranked_order.iter().enumerate() {
        let members = groups
            .members(*group_id)
            .ok_or_else(|| EngineError::corrupt(Some(*group_id), index as i64))?;
        let position = index as u32 + 1;
        let display = format_rank(style, position, preceding, members.len());
        for item_id in members {
            out.push(RankedEntry {
                item_id: *item_id,
                rank: Some(position),
                group_size: members.len(),
                status: ItemStatus::Ranked,
                annotation: annotation(*item_id),
                display: Some(display.clone()),
            });
        }
        preceding += members.len();
    }

    for item_id in removed {
        out.push(RankedEntry {
            item_id: *item_id,
            rank: None,
            group_size: 0,
            status: ItemStatus::Removed,
            annotation: annotation(*item_id),
            display: None,
        });
    }

    if include_unplaced {
        let unplaced = state
            .active_item
            .map(|id| (id, ItemStatus::InProgress))
            .into_iter()
            .chain(state.unranked.iter().map(|id| (*id, ItemStatus::Unsorted)));
        for (item_id, status) in unplaced {
            let group_size = groups.group_of(item_id).map_or(0, |g| groups.size(g));
            out.push(RankedEntry {
                item_id,
                rank: None,
                group_size,
                status,
                annotation: annotation(item_id),
                display: None,
            });
        }
    }

    Ok(out)
}
