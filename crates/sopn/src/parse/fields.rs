//! Column headings and cell values recognised in nomination tables.
//!
//! Every entry is in canonical form with parentheticals dropped, matching
//! how header cells are cleaned before comparison.

pub const FIRST_NAME_FIELDS: &[&str] = &[
    "other name",
    "other names",
    "candidate forename",
    "candidates other names",
    "other names in full",
    "other names / enwau eraill",
];

pub const LAST_NAME_FIELDS: &[&str] = &[
    "surname",
    "candidate surname",
    "candidates surname",
    "last name",
    "surname / cyfenw",
];

const FULL_NAME_FIELDS: &[&str] = &[
    "name of candidate",
    "names of candidate",
    "candidate name",
    "surname other names",
    "surname other names in full",
];

pub const WELSH_NAME_FIELDS: &[&str] = &[
    "enwr ymgeisydd",
    "enwr ymgeisydd candidate name",
    "enwr ymgeisydd name of candidate",
];

pub const DESCRIPTION_FIELDS: &[&str] = &[
    "description of candidate",
    "description",
    "disgrifiad",
    "disgrifiad or ymgeisydd",
    "disgrifiad or ymgeisydd description of candidate",
];

/// Welsh-run ballots list a candidate's previous party in this column.
pub const PARTY_MEMBERSHIP_FIELD: &str = "statement of party membership";

/// Descriptions that mean the candidate stands without a party.
pub const INDEPENDENT_VALUES: &[&str] = &["independent", "", "annibynnol", "independents"];

/// Every heading that names a name column.
pub fn name_fields() -> impl Iterator<Item = &'static str> {
    FIRST_NAME_FIELDS
        .iter()
        .chain(LAST_NAME_FIELDS)
        .chain(FULL_NAME_FIELDS)
        .chain(WELSH_NAME_FIELDS)
        .copied()
}

pub fn is_name_field(cell: &str) -> bool {
    name_fields().any(|field| field == cell)
}

pub fn is_last_name_field(cell: &str) -> bool {
    LAST_NAME_FIELDS.contains(&cell)
}

pub fn is_description_field(cell: &str) -> bool {
    DESCRIPTION_FIELDS.contains(&cell)
}

/// True when `text` mentions any name heading.
pub fn mentions_name_field(text: &str) -> bool {
    name_fields().any(|field| text.contains(field))
}
