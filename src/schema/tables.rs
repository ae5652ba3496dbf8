//! Descriptors of the Info21 tables

use super::{DefaultValue, FieldDescriptor, FieldType, KeyPolicy, TableDescriptor};
use crate::value::{CellValue, Record};
use once_cell::sync::Lazy;
use regex::Regex;

const NAME: FieldType = FieldType::Text { max_length: 255 };

const fn id_field() -> FieldDescriptor {
    FieldDescriptor {
        name: "id",
        column: None,
        field_type: FieldType::Integer,
        label: "ID",
        nullable: false,
        default: None,
        references: None,
    }
}

const fn field(name: &'static str, column: &'static str, field_type: FieldType, label: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        name,
        column: Some(column),
        field_type,
        label,
        nullable: false,
        default: None,
        references: None,
    }
}

const fn nullable(mut f: FieldDescriptor) -> FieldDescriptor {
    f.nullable = true;
    f
}

const fn with_default(mut f: FieldDescriptor, default: DefaultValue) -> FieldDescriptor {
    f.default = Some(default);
    f
}

const fn owned_by(mut f: FieldDescriptor, table: &'static str) -> FieldDescriptor {
    f.references = Some(table);
    f
}

static TASK_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(C|CPP|A|DO|SQL)\d_").expect("valid regex"));

fn clean_task(table: &TableDescriptor, record: &Record) -> Result<(), String> {
    let title = match table.value_of(record, "title") {
        CellValue::Text(t) => t.as_str(),
        _ => "",
    };
    if !TASK_TITLE.is_match(title) {
        return Err("Task title must follow the School 21 naming format (e.g. A5_s21_memory)".into());
    }

    if let CellValue::Text(parent) = table.value_of(record, "parent_task") {
        if parent != "0" && !TASK_TITLE.is_match(parent) {
            return Err(
                "Parent task must follow the School 21 naming format (e.g. A5_s21_memory) or be 0"
                    .into(),
            );
        }
    }

    if let CellValue::Int(xp) = table.value_of(record, "max_xp") {
        if *xp < 0 {
            return Err("Maximum XP cannot be negative".into());
        }
    }
    Ok(())
}

fn clean_time_tracking(table: &TableDescriptor, record: &Record) -> Result<(), String> {
    match table.value_of(record, "state") {
        CellValue::Int(1) | CellValue::Int(2) => Ok(()),
        _ => Err("State must be 1 (entered) or 2 (left)".into()),
    }
}

pub static PEERS: TableDescriptor = TableDescriptor {
    name: "Peers",
    verbose_name: "Peer",
    fields: &[
        field("nickname", "Nickname", NAME, "Peer nickname"),
        nullable(field("birthday", "Birthday", FieldType::Date, "Birthday")),
    ],
    key_policy: KeyPolicy::Natural,
    unique_together: &[],
    clean: None,
};

pub static TASKS: TableDescriptor = TableDescriptor {
    name: "Tasks",
    verbose_name: "Task",
    fields: &[
        field("title", "Title", NAME, "Task title"),
        nullable(with_default(
            field("parent_task", "ParentTask", NAME, "Task required to enter"),
            DefaultValue::Text("0"),
        )),
        nullable(with_default(
            field("max_xp", "MaxXP", FieldType::Integer, "Maximum XP"),
            DefaultValue::Int(0),
        )),
    ],
    key_policy: KeyPolicy::Natural,
    unique_together: &[],
    clean: Some(clean_task),
};

pub static CHECKS: TableDescriptor = TableDescriptor {
    name: "Checks",
    verbose_name: "Check",
    fields: &[
        id_field(),
        owned_by(field("peer", "Peer", NAME, "Peer nickname"), "Peers"),
        owned_by(field("task", "Task", NAME, "Task title"), "Tasks"),
        nullable(field("date", "Date", FieldType::Date, "Check date")),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &["peer", "task", "date"],
    clean: None,
};

pub static P2P: TableDescriptor = TableDescriptor {
    name: "P2P",
    verbose_name: "P2P check",
    fields: &[
        id_field(),
        owned_by(field("check", "Check", FieldType::Integer, "Check"), "Checks"),
        owned_by(field("checking_peer", "CheckingPeer", NAME, "Checking peer nickname"), "Peers"),
        field("state", "State", FieldType::Status, "Check status"),
        nullable(field("time", "Time", FieldType::Time, "Check time")),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &["check", "checking_peer", "state", "time"],
    clean: None,
};

pub static VERTER: TableDescriptor = TableDescriptor {
    name: "Verter",
    verbose_name: "Verter check",
    fields: &[
        id_field(),
        owned_by(field("check", "Check", FieldType::Integer, "Check"), "Checks"),
        field("state", "State", FieldType::Status, "Verter check status"),
        nullable(field("time", "Time", FieldType::Time, "Check time")),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &["check", "state", "time"],
    clean: None,
};

pub static TRANSFERRED_POINTS: TableDescriptor = TableDescriptor {
    name: "TransferredPoints",
    verbose_name: "Transferred peer point",
    fields: &[
        id_field(),
        owned_by(field("checking_peer", "CheckingPeer", NAME, "Checking peer nickname"), "Peers"),
        owned_by(field("checked_peer", "CheckedPeer", NAME, "Checked peer nickname"), "Peers"),
        nullable(with_default(
            field("points_amount", "PointsAmount", FieldType::Integer, "Transferred points"),
            DefaultValue::Int(0),
        )),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &[],
    clean: None,
};

pub static FRIENDS: TableDescriptor = TableDescriptor {
    name: "Friends",
    verbose_name: "Friend",
    fields: &[
        id_field(),
        owned_by(field("peer1", "Peer1", NAME, "First peer nickname"), "Peers"),
        owned_by(field("peer2", "Peer2", NAME, "Second peer nickname"), "Peers"),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &[],
    clean: None,
};

pub static RECOMMENDATIONS: TableDescriptor = TableDescriptor {
    name: "Recommendations",
    verbose_name: "Recommendation",
    fields: &[
        id_field(),
        owned_by(field("peer", "Peer", NAME, "Recommending peer nickname"), "Peers"),
        owned_by(field("recommended_peer", "RecommendedPeer", NAME, "Recommended peer nickname"), "Peers"),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &[],
    clean: None,
};

pub static XP: TableDescriptor = TableDescriptor {
    name: "XP",
    verbose_name: "XP",
    fields: &[
        id_field(),
        owned_by(field("check", "Check", FieldType::Integer, "Check"), "Checks"),
        field("xp_amount", "XPAmount", FieldType::Integer, "Received XP"),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &["check", "xp_amount"],
    clean: None,
};

pub static TIME_TRACKING: TableDescriptor = TableDescriptor {
    name: "TimeTracking",
    verbose_name: "Campus visit",
    fields: &[
        id_field(),
        owned_by(field("peer", "Peer", NAME, "Peer nickname"), "Peers"),
        nullable(field("date", "Date", FieldType::Date, "Date")),
        nullable(field("time", "Time", FieldType::Time, "Time")),
        field("state", "State", FieldType::Integer, "State (1 - entered, 2 - left)"),
    ],
    key_policy: KeyPolicy::Synthetic,
    unique_together: &[],
    clean: Some(clean_time_tracking),
};

/// All tables, owners before the tables that reference them
pub static TABLES: [&TableDescriptor; 10] = [
    &PEERS,
    &TASKS,
    &CHECKS,
    &P2P,
    &VERTER,
    &TRANSFERRED_POINTS,
    &FRIENDS,
    &RECOMMENDATIONS,
    &XP,
    &TIME_TRACKING,
];

/// Order the tables are offered for browsing
pub static BROWSE_ORDER: [&str; 10] = [
    "P2P",
    "XP",
    "Checks",
    "Friends",
    "Peers",
    "Recommendations",
    "Tasks",
    "TimeTracking",
    "TransferredPoints",
    "Verter",
];

/// Order used when every fixture is ingested at once
pub static IMPORT_ORDER: [&str; 10] = [
    "Peers",
    "Tasks",
    "Checks",
    "P2P",
    "Verter",
    "TransferredPoints",
    "Friends",
    "Recommendations",
    "XP",
    "TimeTracking",
];
