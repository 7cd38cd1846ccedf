use serde::{Deserialize, Serialize};

/// Direction of a list query. Anything unrecognised sorts descending.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse_order(s: &str) -> Option<SortOrder> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortOrder::Desc)
        } else {
            None
        }
    }
}

/// Tag recorded in `trash.item_type` naming where a snapshot came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Workers,
    WorkDone,
    WorkToDo,
    Notifications,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Workers => "workers",
            ItemType::WorkDone => "work_done",
            ItemType::WorkToDo => "work_to_do",
            ItemType::Notifications => "notifications",
        }
    }
}
