//! Per-entity descriptors: table name, allow-listed sort and search columns,
//! permanent filters and updatable columns.
//!
//! Every identifier that ends up in SQL text comes from this file.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use super::model::{
    CattleHealth, Infrastructure, Notification, TrashItem, WorkDone, WorkToDo, Worker,
};
use super::query::{Column, Exclusion, SearchColumn, SortField};
use crate::model::ItemType;

/// A listable table.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Unpin + 'static {
    const TABLE: &'static str;
    /// Human label used in not-found messages.
    const LABEL: &'static str;
    type Sort: SortField;
    const SEARCH: &'static [SearchColumn];
    /// Rows matching this are never listed, whatever the caller asks for.
    const EXCLUDE: Option<Exclusion> = None;
}

/// A table that supports get/update and trash-on-delete.
pub trait Managed: Entity {
    const ITEM_TYPE: ItemType;
    const COLUMNS: &'static [Column];
}

macro_rules! sort_fields {
    ($(#[$meta:meta])* $name:ident { $default:ident => $dcol:literal $(, $variant:ident => $col:literal)* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub enum $name {
            #[default]
            $default,
            $($variant,)*
        }

        impl SortField for $name {
            fn parse_field(s: &str) -> Option<Self> {
                match s {
                    $dcol => Some(Self::$default),
                    $($col => Some(Self::$variant),)*
                    _ => None,
                }
            }

            fn column(self) -> &'static str {
                match self {
                    Self::$default => $dcol,
                    $(Self::$variant => $col,)*
                }
            }
        }
    };
}

sort_fields!(WorkerSort {
    Id => "id",
    Name => "name",
    Role => "role",
    Contact => "contact",
    Hours => "hours",
    Sector => "sector",
});

sort_fields!(WorkDoneSort {
    Date => "date",
    Id => "id",
    Task => "task",
    WorkerId => "worker_id",
    Sector => "sector",
    CattleCount => "cattle_count",
    Cost => "cost",
    Duration => "duration",
    Equipment => "equipment",
    Status => "status",
});

sort_fields!(WorkToDoSort {
    DueDate => "due_date",
    Id => "id",
    Task => "task",
    WorkerId => "worker_id",
    Sector => "sector",
    CattleCount => "cattle_count",
    Cost => "cost",
    Duration => "duration",
    Equipment => "equipment",
    Priority => "priority",
    Nb => "nb",
    Status => "status",
});

sort_fields!(NotificationSort {
    Timestamp => "timestamp",
    Id => "id",
    Message => "message",
    WorkerId => "worker_id",
});

sort_fields!(TrashSort {
    DeletedAt => "deleted_at",
    Id => "id",
    ItemType => "item_type",
});

sort_fields!(CattleSort {
    Timestamp => "timestamp",
    AnimalId => "animal_id",
    Age => "age",
    BodyTemp => "body_temp",
    HeartRate => "heart_rate",
    Movement => "movement",
    Location => "location",
});

sort_fields!(InfrastructureSort {
    Timestamp => "timestamp",
    Sector => "sector",
    FenceIntegrity => "fence_integrity",
    BarnTemp => "barn_temp",
    Humidity => "humidity",
    AirQuality => "air_quality",
    FeedLevel => "feed_level",
    WaterLevel => "water_level",
    PumpStatus => "pump_status",
    Condition => "condition",
    CapacityLevel => "capacity_level",
});

impl Entity for Worker {
    const TABLE: &'static str = "workers";
    const LABEL: &'static str = "Worker";
    type Sort = WorkerSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("name"),
        SearchColumn::Text("role"),
        SearchColumn::Text("contact"),
        SearchColumn::Text("sector"),
        SearchColumn::Cast("hours"),
    ];
}

impl Managed for Worker {
    const ITEM_TYPE: ItemType = ItemType::Workers;
    const COLUMNS: &'static [Column] = &[
        Column::required_text("name"),
        Column::text("role"),
        Column::text("contact"),
        Column::real("hours"),
        Column::text("sector"),
    ];
}

impl Entity for WorkDone {
    const TABLE: &'static str = "work_done";
    const LABEL: &'static str = "Work Done";
    type Sort = WorkDoneSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("task"),
        SearchColumn::Text("sector"),
        SearchColumn::Text("equipment"),
        SearchColumn::Text("status"),
        SearchColumn::Cast("cattle_count"),
        SearchColumn::Cast("cost"),
        SearchColumn::Cast("duration"),
    ];
}

impl Managed for WorkDone {
    const ITEM_TYPE: ItemType = ItemType::WorkDone;
    const COLUMNS: &'static [Column] = &[
        Column::required_text("task"),
        Column::required_date("date"),
        Column::integer("worker_id"),
        Column::text("sector"),
        Column::integer("cattle_count"),
        Column::real("cost"),
        Column::real("duration"),
        Column::text("equipment"),
        Column::text("status"),
    ];
}

impl Entity for WorkToDo {
    const TABLE: &'static str = "work_to_do";
    const LABEL: &'static str = "Work To-Do";
    type Sort = WorkToDoSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("task"),
        SearchColumn::Text("sector"),
        SearchColumn::Text("equipment"),
        SearchColumn::Text("priority"),
        SearchColumn::Text("status"),
        SearchColumn::Cast("cattle_count"),
        SearchColumn::Cast("cost"),
        SearchColumn::Cast("duration"),
        SearchColumn::Bool("nb"),
    ];
    const EXCLUDE: Option<Exclusion> = Some(Exclusion {
        column: "status",
        value: "completed",
    });
}

impl Managed for WorkToDo {
    const ITEM_TYPE: ItemType = ItemType::WorkToDo;
    const COLUMNS: &'static [Column] = &[
        Column::required_text("task"),
        Column::date("due_date"),
        Column::integer("worker_id"),
        Column::text("sector"),
        Column::integer("cattle_count"),
        Column::real("cost"),
        Column::real("duration"),
        Column::text("equipment"),
        Column::text("priority"),
        Column::flag("nb"),
        Column::text("status"),
    ];
}

impl Entity for Notification {
    const TABLE: &'static str = "notifications";
    const LABEL: &'static str = "Notification";
    type Sort = NotificationSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("message"),
        SearchColumn::Cast("worker_id"),
    ];
}

impl Managed for Notification {
    const ITEM_TYPE: ItemType = ItemType::Notifications;
    const COLUMNS: &'static [Column] = &[
        Column::required_text("message"),
        Column::integer("worker_id"),
        Column::required_timestamp("timestamp"),
    ];
}

impl Entity for TrashItem {
    const TABLE: &'static str = "trash";
    const LABEL: &'static str = "Trash item";
    type Sort = TrashSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("item_type"),
        SearchColumn::Text("item_data"),
    ];
}

impl Entity for CattleHealth {
    const TABLE: &'static str = "cattle_health";
    const LABEL: &'static str = "Cattle reading";
    type Sort = CattleSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("animal_id"),
        SearchColumn::Text("movement"),
        SearchColumn::Text("location"),
        SearchColumn::Cast("age"),
        SearchColumn::Cast("body_temp"),
        SearchColumn::Cast("heart_rate"),
    ];
}

impl Entity for Infrastructure {
    const TABLE: &'static str = "infrastructure";
    const LABEL: &'static str = "Infrastructure reading";
    type Sort = InfrastructureSort;
    const SEARCH: &'static [SearchColumn] = &[
        SearchColumn::Text("sector"),
        SearchColumn::Cast("fence_integrity"),
        SearchColumn::Cast("barn_temp"),
        SearchColumn::Cast("humidity"),
        SearchColumn::Text("air_quality"),
        SearchColumn::Cast("feed_level"),
        SearchColumn::Cast("water_level"),
        SearchColumn::Text("pump_status"),
        SearchColumn::Text("condition"),
        SearchColumn::Cast("capacity_level"),
    ];
}
